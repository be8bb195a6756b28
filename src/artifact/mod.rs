//! Artifact data model (§3): the unit of memory.
//!
//! Grounded on the source's `MemoryEntry`/`MemoryMetadata`
//! (`memory/entry.rs`), generalized from a single free-form metadata map
//! into the closed `ArtifactKind` taxonomy and the recognized-metadata-key
//! set the design names explicitly.

pub mod store;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactKind {
    Plan,
    Function,
    Workflow,
    Pattern,
    Failure,
    Conversation,
    Performance,
    Evaluation,
    BugReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeedTier {
    VeryFast,
    Fast,
    Medium,
    Slow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Free,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QualityTier {
    Poor,
    Good,
    VeryGood,
    Excellent,
}

/// Recognized metadata keys (§3). All optional; anything else a caller
/// stashes in `extra` is carried but not interpreted by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub speed_tier: Option<SpeedTier>,
    pub cost_tier: Option<CostTier>,
    pub quality_tier: Option<QualityTier>,
    pub quality_score: Option<f32>,
    pub latency_ms: Option<f64>,
    pub memory_mb_peak: Option<f64>,
    pub source_model: Option<String>,
    pub parent_id: Option<String>,
    pub variant_id: Option<String>,
    pub pinned: bool,
    pub inlined: bool,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: ArtifactKind,
    pub name: String,
    pub description: String,
    pub content: String,
    pub tags: HashSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub metadata: ArtifactMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub usage_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Set once ValidationPipeline + TestOrchestrator accept the artifact,
    /// or EscalationController exhausts its retries (in which case `ready`
    /// stays false and the `unstable` tag is added instead).
    pub ready: bool,
}

impl Artifact {
    pub fn new(kind: ArtifactKind, name: impl Into<String>, description: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            name: name.into(),
            description: description.into(),
            content: content.into(),
            tags: HashSet::new(),
            embedding: None,
            metadata: ArtifactMetadata::default(),
            created_at: now,
            updated_at: now,
            usage_count: 0,
            success_count: 0,
            failure_count: 0,
            ready: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.metadata.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_unstable(&self) -> bool {
        self.tags.contains("unstable")
    }

    /// Text the embedder should run over: `content` unless it looks
    /// binary, in which case fall back to `description`.
    pub fn embeddable_text(&self) -> &str {
        if self.content.bytes().any(|b| b == 0) {
            &self.description
        } else {
            &self.content
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Welford-style running mean update for a newly observed execution,
    /// used by `ArtifactStore::record_execution`.
    pub fn record_execution(&mut self, success: bool, latency_ms: f64, memory_mb: f64, quality_score: Option<f32>) {
        self.usage_count += 1;
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        let n = self.usage_count as f64;
        let prev_latency = self.metadata.latency_ms.unwrap_or(latency_ms);
        self.metadata.latency_ms = Some(prev_latency + (latency_ms - prev_latency) / n);

        let prev_mem = self.metadata.memory_mb_peak.unwrap_or(memory_mb);
        self.metadata.memory_mb_peak = Some(prev_mem.max(memory_mb));

        if let Some(q) = quality_score {
            self.metadata.quality_score = Some(q);
        }
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_artifact_has_a_unique_id_and_zeroed_counters() {
        let a = Artifact::new(ArtifactKind::Function, "sum", "sum a list", "fn main() {}");
        let b = Artifact::new(ArtifactKind::Function, "sum", "sum a list", "fn main() {}");
        assert_ne!(a.id, b.id);
        assert_eq!(a.usage_count, 0);
    }

    #[test]
    fn record_execution_increments_counters_and_updates_rolling_latency() {
        let mut a = Artifact::new(ArtifactKind::Function, "sum", "sum a list", "fn main() {}");
        a.record_execution(true, 100.0, 5.0, Some(0.9));
        a.record_execution(true, 200.0, 10.0, Some(0.95));
        assert_eq!(a.usage_count, 2);
        assert_eq!(a.success_count, 2);
        assert_eq!(a.failure_count, 0);
        assert_eq!(a.metadata.latency_ms, Some(150.0));
        assert_eq!(a.metadata.memory_mb_peak, Some(10.0));
        assert_eq!(a.metadata.quality_score, Some(0.95));
    }

    #[test]
    fn embeddable_text_falls_back_to_description_for_binary_content() {
        let mut a = Artifact::new(ArtifactKind::Function, "x", "a description", "");
        a.content = "\0binary".to_string();
        assert_eq!(a.embeddable_text(), "a description");
    }
}
