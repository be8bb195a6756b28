//! EvolutionController (C15): periodically re-examines the worst
//! cost/quality offenders and tries to replace them with something
//! strictly better.
//!
//! Grounded on the teacher's `orchestrator/evolution.rs` idiom of
//! ranking candidates and recording the outcome whether or not a
//! replacement lands, and on `queue.rs`'s job-per-id model here made
//! idempotent (§9 redesign flag) via `JobQueue`'s unique `job_key`.

use std::path::PathBuf;
use std::sync::Arc;

use crate::artifact::store::ArtifactStore;
use crate::artifact::{Artifact, ArtifactKind};
use crate::classifier::TaskClassifier;
use crate::config::EvolutionConfig;
use crate::escalation::EscalationController;
use crate::queue::JobQueue;

const QUALITY_HISTORY_KEY: &str = "quality_history";

#[derive(Debug, Clone)]
pub struct EvolutionCycleReport {
    pub scheduled: usize,
    pub candidates: Vec<String>,
}

pub struct EvolutionController {
    store: Arc<ArtifactStore>,
    queue: Arc<JobQueue>,
    classifier: TaskClassifier,
    escalation: EscalationController,
    config: EvolutionConfig,
}

impl EvolutionController {
    pub fn new(
        store: Arc<ArtifactStore>,
        queue: Arc<JobQueue>,
        classifier: TaskClassifier,
        escalation: EscalationController,
        config: EvolutionConfig,
    ) -> Self {
        Self {
            store,
            queue,
            classifier,
            escalation,
            config,
        }
    }

    async fn candidates(&self) -> anyhow::Result<Vec<Artifact>> {
        let mut all = self.store.find_by_tags(&[], false).await?;
        all.retain(|a| matches!(a.kind, ArtifactKind::Function | ArtifactKind::Workflow) && !a.metadata.pinned);
        Ok(all)
    }

    /// `usage_count * (1 - quality_score) * avg_cost_per_exec`, descending.
    /// Latency stands in for cost-per-exec -- there is no separate dollar
    /// cost tracked per artifact.
    fn rank_score(artifact: &Artifact) -> f64 {
        let quality = artifact.metadata.quality_score.unwrap_or(0.5) as f64;
        let cost = artifact.metadata.latency_ms.unwrap_or(1.0).max(1.0);
        artifact.usage_count as f64 * (1.0 - quality) * cost
    }

    /// Ranks every FUNCTION/WORKFLOW artifact and enqueues a re-evaluate
    /// job (idempotent by artifact id) for the top `config.budget`.
    pub async fn schedule_cycle(&self) -> anyhow::Result<EvolutionCycleReport> {
        let mut ranked = self.candidates().await?;
        ranked.sort_by(|a, b| Self::rank_score(b).partial_cmp(&Self::rank_score(a)).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.config.budget);

        let mut scheduled_ids = Vec::new();
        for artifact in &ranked {
            self.queue
                .enqueue(&artifact.id, "re_evaluate", serde_json::json!({"artifact_id": artifact.id}))
                .await?;
            scheduled_ids.push(artifact.id.clone());
        }

        Ok(EvolutionCycleReport {
            scheduled: scheduled_ids.len(),
            candidates: scheduled_ids,
        })
    }

    /// Dequeues one pending job (if any) and re-plans/re-generates/re-tests
    /// its artifact, promoting the replacement only if it is strictly
    /// better. A `PERFORMANCE` artifact is always recorded, whether or not
    /// the promotion happens.
    pub async fn process_one(&self, scratch_root: PathBuf) -> anyhow::Result<Option<Artifact>> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(None);
        };

        let artifact_id = job
            .payload
            .get("artifact_id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_default();

        let Some(mut original) = self.store.get(&artifact_id).await? else {
            self.queue.fail(&job.id, "artifact no longer exists", false).await?;
            return Ok(None);
        };

        let classification = self.classifier.classify(&original.description).await;
        let min_accept_quality = 0.75;

        let outcome = self
            .escalation
            .run(&original.description, &classification, &[], min_accept_quality, scratch_root)
            .await;

        let (new_quality, promoted) = match &outcome {
            Ok(o) => {
                let new_quality = o.artifact.metadata.quality_score.unwrap_or(0.0);
                let old_quality = original.metadata.quality_score.unwrap_or(0.0);
                let strictly_better = o.artifact.ready && new_quality > old_quality;
                if strictly_better {
                    original.content = o.artifact.content.clone();
                    original.metadata.quality_score = Some(new_quality);
                    original.metadata.source_model = o.artifact.metadata.source_model.clone();
                    original.metadata.variant_id = Some(o.artifact.id.clone());
                    original.embedding = None; // force re-embed against the new content
                    self.store.store(original.clone(), true, true).await?;
                }
                (new_quality, strictly_better)
            }
            Err(_) => (original.metadata.quality_score.unwrap_or(0.0), false),
        };

        let drift = self.record_quality_history(&artifact_id, new_quality).await?;

        let performance_content = serde_json::json!({
            "artifact_id": artifact_id,
            "old_quality": original.metadata.quality_score,
            "new_quality": new_quality,
            "promoted": promoted,
            "drift": drift,
        })
        .to_string();
        let performance = Artifact::new(
            ArtifactKind::Performance,
            "evolution-cycle",
            format!("re-evaluation of {artifact_id}"),
            performance_content,
        )
        .with_parent(artifact_id.clone());
        self.store.store(performance, true, false).await?;

        match &outcome {
            Ok(_) => self.queue.complete(&job.id).await?,
            Err(e) => self.queue.fail(&job.id, &e.to_string(), false).await?,
        }

        Ok(outcome.ok().map(|o| o.artifact))
    }

    /// Appends `new_quality` to a bounded rolling window kept in the
    /// artifact's metadata and reports whether the window's mean moved by
    /// more than `drift_threshold` since the previous reading.
    async fn record_quality_history(&self, artifact_id: &str, new_quality: f32) -> anyhow::Result<Option<f32>> {
        let Some(mut artifact) = self.store.get(artifact_id).await? else {
            return Ok(None);
        };
        let mut history: Vec<f32> = artifact
            .metadata
            .extra
            .get(QUALITY_HISTORY_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();

        let previous_mean = rolling_mean(&history);
        history.push(new_quality);
        if history.len() > self.config.rolling_window {
            history.drain(0..history.len() - self.config.rolling_window);
        }
        let current_mean = rolling_mean(&history);

        artifact.metadata.extra.insert(QUALITY_HISTORY_KEY.to_string(), serde_json::json!(history));
        self.store.store(artifact, false, true).await?;

        let drift = previous_mean.map(|prev| (current_mean.unwrap_or(prev) - prev).abs());
        Ok(drift.filter(|d| *d > self.config.drift_threshold))
    }
}

fn rolling_mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_score_favors_heavily_used_low_quality_artifacts() {
        let mut cheap_and_good = Artifact::new(ArtifactKind::Function, "a", "a", "c");
        cheap_and_good.usage_count = 100;
        cheap_and_good.metadata.quality_score = Some(0.95);
        cheap_and_good.metadata.latency_ms = Some(10.0);

        let mut expensive_and_bad = Artifact::new(ArtifactKind::Function, "b", "b", "c");
        expensive_and_bad.usage_count = 100;
        expensive_and_bad.metadata.quality_score = Some(0.3);
        expensive_and_bad.metadata.latency_ms = Some(500.0);

        assert!(EvolutionController::rank_score(&expensive_and_bad) > EvolutionController::rank_score(&cheap_and_good));
    }

    #[test]
    fn rolling_mean_of_empty_history_is_none() {
        assert_eq!(rolling_mean(&[]), None);
    }

    #[test]
    fn rolling_mean_averages_observed_scores() {
        assert_eq!(rolling_mean(&[0.5, 0.7, 0.6]), Some(0.6));
    }
}
