//! VectorStore (C2): upsert/query vectors with payload filters.
//!
//! `FileVectorStore` is the crate's reference implementation: a resident
//! `Vec` of entries backed by a single JSON cache file. The read-whole-
//! file/mutate-in-memory/write-back shape mirrors `VectorMemory`'s
//! persist/reload discipline in the source project, generalized from a
//! memory-entry cache to a generic vector-plus-payload store; the
//! temp-file-then-rename write (so a crash mid-write never leaves a
//! partial file observable to a subsequent load) is this crate's own
//! addition on top of that.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Exact-match equality predicates on payload keys.
    pub equals: Vec<(String, Value)>,
    /// Payload `tags` array must contain all of these.
    pub tags: Vec<String>,
}

impl QueryFilter {
    pub fn matches(&self, payload: &Value) -> bool {
        for (key, expected) in &self.equals {
            match payload.get(key) {
                Some(actual) if actual == expected => {}
                _ => return false,
            }
        }
        if !self.tags.is_empty() {
            let payload_tags: HashSet<String> = payload
                .get("tags")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|t| t.as_str().map(|s| s.to_string()))
                        .collect()
                })
                .unwrap_or_default();
            if !self.tags.iter().all(|t| payload_tags.contains(t)) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Value) -> Result<(), StoreError>;
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(String, Value, f32)>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<(Vec<f32>, Value)>, StoreError>;
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
    async fn list(&self, filter: &QueryFilter) -> Result<Vec<(String, Value)>, StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: String,
    vector: Vec<f32>,
    payload: Value,
}

pub struct FileVectorStore {
    path: PathBuf,
    entries: Arc<RwLock<Vec<Entry>>>,
}

impl FileVectorStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading vector store cache {}", path.display()))?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw).unwrap_or_else(|_| Vec::new())
            }
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            entries: Arc::new(RwLock::new(entries)),
        })
    }

    async fn persist(&self, entries: &[Entry]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StoreError::ProtocolError(e.to_string()))?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for FileVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, payload: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.iter_mut().find(|e| e.id == id) {
            existing.vector = vector;
            existing.payload = payload;
        } else {
            entries.push(Entry {
                id: id.to_string(),
                vector,
                payload,
            });
        }
        self.persist(&entries).await
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: &QueryFilter,
    ) -> Result<Vec<(String, Value, f32)>, StoreError> {
        let entries = self.entries.read().await;
        let mut scored: Vec<(String, Value, f32)> = entries
            .iter()
            .filter(|e| filter.matches(&e.payload))
            .map(|e| {
                let sim = crate::collaborators::embedder::cosine_similarity(vector, &e.vector);
                (e.id.clone(), e.payload.clone(), sim)
            })
            .collect();
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn get(&self, id: &str) -> Result<Option<(Vec<f32>, Value)>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| (e.vector.clone(), e.payload.clone())))
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.retain(|e| e.id != id);
        self.persist(&entries).await
    }

    async fn list(&self, filter: &QueryFilter) -> Result<Vec<(String, Value)>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| filter.matches(&e.payload))
            .map(|e| (e.id.clone(), e.payload.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::new(dir.path().join("vectors.json"))
            .await
            .unwrap();
        store
            .upsert("a", vec![1.0, 0.0], json!({"kind": "FUNCTION"}))
            .await
            .unwrap();
        let (vec, payload) = store.get("a").await.unwrap().unwrap();
        assert_eq!(vec, vec![1.0, 0.0]);
        assert_eq!(payload["kind"], "FUNCTION");
    }

    #[tokio::test]
    async fn query_respects_filter_and_returns_sorted_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::new(dir.path().join("vectors.json"))
            .await
            .unwrap();
        store
            .upsert("a", vec![1.0, 0.0], json!({"kind": "FUNCTION"}))
            .await
            .unwrap();
        store
            .upsert("b", vec![0.0, 1.0], json!({"kind": "PLAN"}))
            .await
            .unwrap();

        let filter = QueryFilter {
            equals: vec![("kind".to_string(), json!("FUNCTION"))],
            tags: vec![],
        };
        let results = store.query(&[1.0, 0.0], 5, &filter).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
    }

    #[tokio::test]
    async fn reload_from_disk_recovers_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        {
            let store = FileVectorStore::new(&path).await.unwrap();
            store.upsert("a", vec![1.0], json!({})).await.unwrap();
        }
        let reloaded = FileVectorStore::new(&path).await.unwrap();
        assert!(reloaded.get("a").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileVectorStore::new(dir.path().join("vectors.json"))
            .await
            .unwrap();
        store.upsert("a", vec![1.0], json!({})).await.unwrap();
        store.delete("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }
}
