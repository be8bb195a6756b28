//! Pin registry (§6.6): `<root>/pins.json`, `{id -> {reason, pinned_at, scope?}}`.
//!
//! A pin is an explicit user action (§3 "Lifecycle": artifacts are mutated
//! only by the Evolution Controller or an explicit user action). This is
//! the durable record of *why* something was pinned, kept separate from
//! `Artifact::metadata.pinned` (which is what `ArtifactStore::trim` and
//! the Evolution Controller actually gate on) so a pin survives even if
//! an artifact is re-stored with stale metadata. Grounded on the same
//! temp-file-then-rename discipline `FileVectorStore` uses, so a crash
//! mid-write never leaves a torn `pins.json` behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::StoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinEntry {
    pub reason: String,
    pub pinned_at: DateTime<Utc>,
    pub scope: Option<String>,
}

pub struct PinRegistry {
    path: PathBuf,
    entries: RwLock<HashMap<String, PinEntry>>,
}

impl PinRegistry {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| StoreError::Unreachable(e.to_string()))?;
            if raw.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&raw).unwrap_or_default()
            }
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self, entries: &HashMap<String, PinEntry>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| StoreError::ProtocolError(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await.map_err(|e| StoreError::Unreachable(e.to_string()))?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(())
    }

    pub async fn pin(&self, id: &str, reason: impl Into<String>, scope: Option<String>) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            id.to_string(),
            PinEntry {
                reason: reason.into(),
                pinned_at: Utc::now(),
                scope,
            },
        );
        self.persist(&entries).await
    }

    pub async fn unpin(&self, id: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.remove(id);
        self.persist(&entries).await
    }

    pub async fn is_pinned(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }

    pub async fn get(&self, id: &str) -> Option<PinEntry> {
        self.entries.read().await.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pin_then_unpin_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = PinRegistry::new(dir.path().join("pins.json")).await.unwrap();
        registry.pin("abc", "keep for demo", None).await.unwrap();
        assert!(registry.is_pinned("abc").await);
        registry.unpin("abc").await.unwrap();
        assert!(!registry.is_pinned("abc").await);
    }

    #[tokio::test]
    async fn reload_from_disk_recovers_pins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pins.json");
        {
            let registry = PinRegistry::new(&path).await.unwrap();
            registry.pin("x", "reason", Some("global".to_string())).await.unwrap();
        }
        let reloaded = PinRegistry::new(&path).await.unwrap();
        assert!(reloaded.is_pinned("x").await);
        assert_eq!(reloaded.get("x").await.unwrap().scope.as_deref(), Some("global"));
    }
}
