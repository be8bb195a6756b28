//! ArtifactStore (C5): typed CRUD + tag index over artifacts, backed by
//! an `Embedder` and a `VectorStore`.
//!
//! The sidecar JSON files under `<root>/artifacts/` (§6.1) are the
//! durable source of truth; the vector index is a resident, rebuildable
//! projection, same split as the source's `VectorMemory` cache file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::artifact::{Artifact, ArtifactKind};
use crate::collaborators::{Embedder, QueryFilter, VectorStore};
use crate::error::StoreError;

pub struct ArtifactStore {
    root: PathBuf,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
}

impl ArtifactStore {
    pub async fn new(root: impl AsRef<Path>, embedder: Arc<dyn Embedder>, vectors: Arc<dyn VectorStore>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        for dir in ["artifacts", "evaluations", "performance", "recipes"] {
            tokio::fs::create_dir_all(root.join(dir))
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        Ok(Self {
            root,
            embedder,
            vectors,
        })
    }

    /// Sidecar directory per §6.6's persisted-state layout: EVALUATION and
    /// PERFORMANCE records get their own subtree, a `static_tool_fix`
    /// recipe goes under `recipes/`, everything else under `artifacts/`.
    /// An id's directory is fixed at first write -- changing an artifact's
    /// kind across a `replace=true` re-store is not supported.
    fn sidecar_dir_for(&self, kind: ArtifactKind, tags: &std::collections::HashSet<String>) -> &'static str {
        if tags.contains("static_tool_fix") {
            "recipes"
        } else {
            match kind {
                ArtifactKind::Evaluation => "evaluations",
                ArtifactKind::Performance => "performance",
                _ => "artifacts",
            }
        }
    }

    fn sidecar_path(&self, id: &str, kind: ArtifactKind, tags: &std::collections::HashSet<String>) -> PathBuf {
        self.root.join(self.sidecar_dir_for(kind, tags)).join(format!("{id}.json"))
    }

    /// Locates an id's sidecar without knowing its kind up front, by
    /// checking each subtree in turn.
    fn locate(&self, id: &str) -> Option<PathBuf> {
        for dir in ["artifacts", "evaluations", "performance", "recipes"] {
            let candidate = self.root.join(dir).join(format!("{id}.json"));
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// `store(artifact, auto_embed=true)`. `replace=false` by default --
    /// re-storing an existing id without `replace` is a `DuplicateId`.
    pub async fn store(&self, mut artifact: Artifact, auto_embed: bool, replace: bool) -> Result<Artifact, StoreError> {
        let existing = self.locate(&artifact.id);
        if existing.is_some() && !replace {
            return Err(StoreError::DuplicateId(artifact.id.clone()));
        }
        // A replace targets the sidecar the id already lives under, even
        // if the in-memory artifact's kind/tags drifted since first write.
        let path = existing.unwrap_or_else(|| self.sidecar_path(&artifact.id, artifact.kind, &artifact.tags));

        if auto_embed && artifact.embedding.is_none() {
            let text = artifact.embeddable_text().to_string();
            let vector = self
                .embedder
                .embed(&text)
                .await
                .map_err(|e| StoreError::ProtocolError(e.to_string()))?;
            artifact.embedding = Some(vector);
        }
        artifact.touch();

        if let Some(vector) = artifact.embedding.clone() {
            let payload = json!({
                "kind": artifact.kind,
                "tags": artifact.tags.iter().collect::<Vec<_>>(),
                "quality_score": artifact.metadata.quality_score,
                "updated_at": artifact.updated_at.to_rfc3339(),
                "pinned": artifact.metadata.pinned,
                "inlined": artifact.metadata.inlined,
            });
            self.vectors.upsert(&artifact.id, vector, payload).await?;
        }

        let mut sidecar = artifact.clone();
        sidecar.embedding = None; // embedding lives in the vector store, not the sidecar (§6.1)
        let json = serde_json::to_string_pretty(&sidecar)
            .map_err(|e| StoreError::ProtocolError(e.to_string()))?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        Ok(artifact)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Artifact>, StoreError> {
        let Some(path) = self.locate(id) else {
            return Ok(None);
        };
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        let mut artifact: Artifact =
            serde_json::from_str(&raw).map_err(|e| StoreError::ProtocolError(e.to_string()))?;
        if let Some((vector, _)) = self.vectors.get(id).await? {
            artifact.embedding = Some(vector);
        }
        Ok(Some(artifact))
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        if let Some(path) = self.locate(id) {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        }
        self.vectors.delete(id).await
    }

    /// `find_similar(query, kind?, tags?, min_similarity, top_k)`.
    pub async fn find_similar(
        &self,
        query: &str,
        kind: Option<ArtifactKind>,
        tags: &[String],
        min_similarity: f32,
        top_k: usize,
    ) -> Result<Vec<(Artifact, f32)>, StoreError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| StoreError::ProtocolError(e.to_string()))?;

        let mut filter = QueryFilter {
            equals: Vec::new(),
            tags: tags.to_vec(),
        };
        if let Some(k) = kind {
            filter.equals.push(("kind".to_string(), json!(k)));
        }

        let hits = self.vectors.query(&vector, top_k.max(1) * 4, &filter).await?;
        let mut results = Vec::new();
        for (id, payload, similarity) in hits {
            if similarity < min_similarity {
                continue;
            }
            if let Some(artifact) = self.get(&id).await? {
                results.push((artifact, similarity, payload));
            }
        }

        // Tie-break: similarity desc, then quality_score desc, then updated_at desc.
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let qa = a.0.metadata.quality_score.unwrap_or(0.0);
                    let qb = b.0.metadata.quality_score.unwrap_or(0.0);
                    qb.partial_cmp(&qa).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.0.updated_at.cmp(&a.0.updated_at))
        });
        results.truncate(top_k);

        Ok(results.into_iter().map(|(a, s, _)| (a, s)).collect())
    }

    pub async fn find_by_tags(&self, tags: &[String], match_all: bool) -> Result<Vec<Artifact>, StoreError> {
        let filter = if match_all {
            QueryFilter {
                equals: Vec::new(),
                tags: tags.to_vec(),
            }
        } else {
            QueryFilter::default()
        };
        let listed = self.vectors.list(&filter).await?;
        let mut out = Vec::new();
        for (id, payload) in listed {
            if !match_all && !tags.is_empty() {
                let payload_tags: Vec<String> = payload
                    .get("tags")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|t| t.as_str().map(String::from)).collect())
                    .unwrap_or_default();
                if !tags.iter().any(|t| payload_tags.contains(t)) {
                    continue;
                }
            }
            if let Some(artifact) = self.get(&id).await? {
                out.push(artifact);
            }
        }
        Ok(out)
    }

    pub async fn record_execution(
        &self,
        id: &str,
        latency_ms: f64,
        memory_mb: f64,
        success: bool,
        quality_score: Option<f32>,
    ) -> Result<Artifact, StoreError> {
        let mut artifact = self.get(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        artifact.record_execution(success, latency_ms, memory_mb, quality_score);
        self.store(artifact, false, true).await
    }

    /// Removes artifacts of `kind` beyond the `keep_recent` most-recently
    /// updated, skipping anything `pinned` or `inlined` (§8 B2).
    pub async fn trim(&self, kind: ArtifactKind, keep_recent: usize, exclude_pinned: bool, exclude_inlined: bool) -> Result<usize, StoreError> {
        let filter = QueryFilter {
            equals: vec![("kind".to_string(), json!(kind))],
            tags: Vec::new(),
        };
        let listed = self.vectors.list(&filter).await?;
        let mut artifacts = Vec::new();
        for (id, _) in listed {
            if let Some(a) = self.get(&id).await? {
                artifacts.push(a);
            }
        }
        artifacts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut removed = 0;
        for artifact in artifacts.into_iter().skip(keep_recent) {
            if exclude_pinned && artifact.metadata.pinned {
                continue;
            }
            if exclude_inlined && artifact.metadata.inlined {
                continue;
            }
            self.delete(&artifact.id).await?;
            removed += 1;
        }
        Ok(removed)
    }

    pub fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{FileVectorStore};

    struct StubEmbedder;

    #[async_trait::async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            // Deterministic fake embedding: hash-ish bucket by first byte.
            let b = text.bytes().next().unwrap_or(0) as f32 / 255.0;
            Ok(vec![b, 1.0 - b])
        }
        fn dim(&self) -> usize {
            2
        }
    }

    async fn make_store(root: &Path) -> ArtifactStore {
        let vectors = Arc::new(FileVectorStore::new(root.join("vectors.json")).await.unwrap());
        let embedder = Arc::new(StubEmbedder);
        ArtifactStore::new(root, embedder, vectors).await.unwrap()
    }

    #[tokio::test]
    async fn store_then_get_round_trips_modulo_updated_at() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path()).await;
        let artifact = Artifact::new(ArtifactKind::Function, "sum", "sum a list of numbers", "code");
        let id = artifact.id.clone();
        store.store(artifact, true, false).await.unwrap();

        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.description, "sum a list of numbers");
    }

    #[tokio::test]
    async fn storing_duplicate_id_without_replace_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path()).await;
        let artifact = Artifact::new(ArtifactKind::Function, "sum", "sum", "code").with_id("fixed-id");
        store.store(artifact.clone(), true, false).await.unwrap();
        let err = store.store(artifact, true, false).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn trim_never_removes_pinned_or_inlined_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path()).await;

        let mut pinned = Artifact::new(ArtifactKind::Function, "p", "p", "code");
        pinned.metadata.pinned = true;
        store.store(pinned.clone(), true, false).await.unwrap();

        for i in 0..5 {
            let a = Artifact::new(ArtifactKind::Function, "x", format!("x{i}"), "code");
            store.store(a, true, false).await.unwrap();
        }

        let removed = store.trim(ArtifactKind::Function, 0, true, true).await.unwrap();
        assert_eq!(removed, 5);
        assert!(store.get(&pinned.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn record_execution_persists_updated_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = make_store(dir.path()).await;
        let artifact = Artifact::new(ArtifactKind::Function, "sum", "sum", "code");
        let id = artifact.id.clone();
        store.store(artifact, true, false).await.unwrap();

        store.record_execution(&id, 50.0, 2.0, true, Some(0.9)).await.unwrap();
        let fetched = store.get(&id).await.unwrap().unwrap();
        assert_eq!(fetched.usage_count, 1);
        assert_eq!(fetched.metadata.quality_score, Some(0.9));
    }
}
