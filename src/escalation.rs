//! EscalationController (C13): bounded retry loop across model tiers.
//!
//! Grounded on the source's `Supervisor` retry/backoff discipline
//! (`orchestrator/supervisor.rs`) generalized from process-level restarts
//! to the tier-ascension + temperature-climb schedule named in §4.11, and
//! on its "never leave a task silently dropped" rule, which here shows up
//! as the terminal `unstable` tag rather than a swallowed failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::artifact::store::ArtifactStore;
use crate::artifact::{Artifact, ArtifactKind};
use crate::classifier::ClassificationResult;
use crate::config::EscalationConfig;
use crate::generator::{FailureContext, Generator};
use crate::model_registry::{ModelRegistry, Role, Tier};
use crate::planner::{Planner, Specification};
use crate::sandbox::Sandbox;
use crate::test_orchestrator::{TestOrchestrator, TestReport};
use crate::validation::{ValidationPipeline, ValidationReport};

pub struct EscalationOutcome {
    pub artifact: Artifact,
    pub attempts: u32,
    pub final_tier: Tier,
    pub validation: ValidationReport,
    pub test_report: TestReport,
}

pub struct EscalationController {
    planner: Planner,
    generator: Generator,
    validation: ValidationPipeline,
    tests: TestOrchestrator,
    registry: Arc<ModelRegistry>,
    store: Arc<ArtifactStore>,
    config: EscalationConfig,
}

impl EscalationController {
    pub fn new(
        planner: Planner,
        generator: Generator,
        validation: ValidationPipeline,
        tests: TestOrchestrator,
        registry: Arc<ModelRegistry>,
        store: Arc<ArtifactStore>,
        config: EscalationConfig,
    ) -> Self {
        Self {
            planner,
            generator,
            validation,
            tests,
            registry,
            store,
            config,
        }
    }

    /// Temperature climbs `min(0.1 + 0.2 * attempt, 0.9)` (§4.11).
    fn temperature_for(attempt: u32) -> f32 {
        (0.1 + 0.2 * attempt as f32).min(0.9)
    }

    /// A prior escalation episode for a near-identical description skips
    /// straight to the tier that eventually worked, instead of restarting
    /// at `VeryFast` every time (§4.11's "learned starting tier").
    async fn learned_starting_tier(&self, description: &str) -> Tier {
        match self
            .store
            .find_similar(description, Some(ArtifactKind::Pattern), &["escalation_history".to_string()], self.config.pattern_similarity_threshold, 1)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .next()
                .and_then(|(a, _)| a.metadata.extra.get("final_tier").and_then(|v| v.as_str()).map(str_to_tier))
                .unwrap_or(Tier::VeryFast),
            Err(_) => Tier::VeryFast,
        }
    }

    async fn record_escalation_history(&self, description: &str, final_tier: Tier) {
        let artifact = Artifact::new(
            ArtifactKind::Pattern,
            "escalation-history",
            description,
            format!("learned starting tier for similar requests: {final_tier:?}"),
        )
        .with_tags(["escalation_history".to_string()]);
        let mut artifact = artifact;
        artifact.metadata.extra.insert("final_tier".to_string(), serde_json::json!(format!("{final_tier:?}")));
        let _ = self.store.store(artifact, true, false).await;
    }

    pub async fn run(
        &self,
        description: &str,
        classification: &ClassificationResult,
        context_artifacts: &[Artifact],
        min_accept_quality: f32,
        scratch_root: PathBuf,
    ) -> anyhow::Result<EscalationOutcome> {
        let role = classification.recommended_role;
        let mut tier = self.learned_starting_tier(description).await;
        let mut failures = FailureContext::default();
        let mut attempt = 0u32;

        const DEFAULT_PLANNING_TIMEOUT_MS: u64 = 10_000;
        let model = self.registry.pick(role, tier)?;
        let plan_artifact = self
            .planner
            .plan(description, classification, context_artifacts, &model, Self::temperature_for(0), DEFAULT_PLANNING_TIMEOUT_MS)
            .await?;
        let spec: Specification = serde_json::from_str(&plan_artifact.content)
            .unwrap_or_else(|_| fallback_spec(description));

        loop {
            let model = self.registry.pick(role, tier)?;
            let temperature = Self::temperature_for(attempt);
            let timeout = Duration::from_millis(spec.safety_caps.soft_timeout_ms);

            let source = self
                .generator
                .generate(&spec, &model.id, temperature, spec.safety_caps.soft_timeout_ms, &failures)
                .await?;

            let report = self.validation.run(&source).await;
            let scratch_dir = scratch_root.join(format!("attempt-{attempt}"));
            let test_report = self
                .tests
                .evaluate(&report.final_source, &spec, classification.task_type, timeout, scratch_dir)
                .await?;

            let validation_ok = report.all_pass_or_fixed() && report.quality_score >= min_accept_quality;
            let tests_ok = test_report.quality_score >= min_accept_quality || test_report.smoke_tested && test_report.pass_rate >= 1.0;

            if validation_ok && tests_ok {
                let mut artifact = Artifact::new(ArtifactKind::Function, describe_name(description), description, report.final_source.clone());
                artifact.metadata.quality_score = Some(composite_quality(&report, &test_report));
                artifact.metadata.source_model = Some(model.id.clone());
                artifact.ready = true;
                let stored = self.store.store(artifact, true, false).await?;
                let evaluation = TestOrchestrator::to_evaluation_artifact(&test_report, "escalation-evaluation", description, &stored.id);
                self.store.store(evaluation, true, false).await.ok();
                self.record_escalation_history(description, tier).await;
                return Ok(EscalationOutcome {
                    artifact: stored,
                    attempts: attempt + 1,
                    final_tier: tier,
                    validation: report,
                    test_report,
                });
            }

            failures.validator_messages.extend(report.failure_messages());
            failures.test_messages.extend(
                test_report
                    .cases
                    .iter()
                    .filter(|c| !c.passed)
                    .map(|c| c.error.clone().unwrap_or_else(|| format!("expected {} got {:?}", c.expected, c.actual))),
            );

            attempt += 1;
            if attempt > self.config.max_escalations {
                let mut artifact = Artifact::new(ArtifactKind::Function, describe_name(description), description, report.final_source.clone());
                artifact.metadata.quality_score = Some(composite_quality(&report, &test_report));
                artifact.metadata.source_model = Some(model.id.clone());
                artifact.ready = false;
                artifact = artifact.with_tags(["unstable".to_string()]);
                let stored = self.store.store(artifact, true, false).await?;
                let evaluation = TestOrchestrator::to_evaluation_artifact(&test_report, "escalation-evaluation", description, &stored.id);
                self.store.store(evaluation, true, false).await.ok();
                self.record_escalation_history(description, tier).await;
                return Ok(EscalationOutcome {
                    artifact: stored,
                    attempts: attempt,
                    final_tier: tier,
                    validation: report,
                    test_report,
                });
            }
            tier = tier.next();
        }
    }
}

fn composite_quality(validation: &ValidationReport, tests: &TestReport) -> f32 {
    0.5 * validation.quality_score + 0.5 * tests.quality_score
}

fn describe_name(description: &str) -> String {
    description.split_whitespace().take(6).collect::<Vec<_>>().join("-").to_lowercase()
}

fn str_to_tier(s: &str) -> Tier {
    match s {
        "VeryFast" => Tier::VeryFast,
        "Fast" => Tier::Fast,
        "General" => Tier::General,
        "Escalation" => Tier::Escalation,
        "God" => Tier::God,
        _ => Tier::VeryFast,
    }
}

fn fallback_spec(description: &str) -> Specification {
    Specification {
        problem_definition: description.to_string(),
        io_interface: "stdin JSON in, stdout JSON {result|error} out".to_string(),
        algorithmic_requirements: String::new(),
        safety_caps: crate::planner::SafetyCaps {
            max_sequence_elements: 10_000,
            max_loop_iterations: 1_000,
            max_file_size_mb: 10,
            soft_timeout_ms: 10_000,
        },
        test_cases: Vec::new(),
        recommended_tools: Vec::new(),
        diff_sections: None,
        truncated: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_climbs_and_saturates() {
        assert_eq!(EscalationController::temperature_for(0), 0.1);
        assert!((EscalationController::temperature_for(1) - 0.3).abs() < 1e-6);
        assert_eq!(EscalationController::temperature_for(10), 0.9);
    }

    #[test]
    fn str_to_tier_round_trips_known_names() {
        assert_eq!(str_to_tier("Escalation"), Tier::Escalation);
        assert_eq!(str_to_tier("garbage"), Tier::VeryFast);
    }
}
