//! Top-level request handler (§2 "Data flow (happy path)"): wires
//! classification, the semantic cache, and the plan/generate/validate/
//! test pipeline into the single entry point the CLI and the
//! EvolutionController's sibling (re-evaluation) both call through.
//!
//! Grounded on the source's `Supervisor::handle` (`orchestrator/mod.rs`):
//! same "route, check memory, act, record" shape, generalized from a
//! single best-effort ReAct loop into the REUSE/MUTATE/NEW branch the
//! design requires and the bounded escalation retry already implemented
//! in [`crate::escalation`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::artifact::store::ArtifactStore;
use crate::artifact::{Artifact, ArtifactKind};
use crate::cache::{CacheDecision, CacheVerdict, SemanticCache};
use crate::classifier::{ClassificationResult, TaskClassifier};
use crate::config::{AppConfig, PressureLevel};
use crate::generator::{FailureContext, Generator};
use crate::model_registry::ModelRegistry;
use crate::planner::{Planner, Specification};
use crate::pressure::PressureManager;
use crate::sandbox::{Sandbox, SandboxRequest};
use crate::test_orchestrator::TestOrchestrator;
use crate::validation::ValidationPipeline;
use crate::escalation::EscalationController;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub request_id: String,
    pub description: String,
    pub user_context: Option<String>,
    pub pressure_hint: Option<PressureLevel>,
    pub deadline: Option<DateTime<Utc>>,
}

impl Request {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            description: description.into(),
            user_context: None,
            pressure_hint: None,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub artifact: Artifact,
    pub cache_decision: CacheDecision,
    pub classification: ClassificationResult,
    pub ready: bool,
    pub run_output: Option<serde_json::Value>,
}

pub struct Pipeline {
    classifier: TaskClassifier,
    cache: SemanticCache,
    store: Arc<ArtifactStore>,
    planner: Planner,
    generator: Generator,
    validation: ValidationPipeline,
    tests: TestOrchestrator,
    escalation: EscalationController,
    sandbox: Sandbox,
    registry: Arc<ModelRegistry>,
    pressure: Arc<PressureManager>,
    config: AppConfig,
    scratch_root: PathBuf,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        classifier: TaskClassifier,
        cache: SemanticCache,
        store: Arc<ArtifactStore>,
        planner: Planner,
        generator: Generator,
        validation: ValidationPipeline,
        tests: TestOrchestrator,
        escalation: EscalationController,
        sandbox: Sandbox,
        registry: Arc<ModelRegistry>,
        pressure: Arc<PressureManager>,
        config: AppConfig,
        scratch_root: PathBuf,
    ) -> Self {
        Self {
            classifier,
            cache,
            store,
            planner,
            generator,
            validation,
            tests,
            escalation,
            sandbox,
            registry,
            pressure,
            config,
            scratch_root,
        }
    }

    /// `IA2`: Planner runs at most once when the verdict is NEW or MUTATE,
    /// zero times on REUSE.
    pub async fn handle(&self, request: &Request, input: Option<serde_json::Value>) -> anyhow::Result<PipelineOutcome> {
        self.pressure.refresh();
        if let Some(hint) = request.pressure_hint {
            self.pressure.set_hint(Some(hint));
            self.pressure.refresh();
        }

        let classification = self.classifier.classify(&request.description).await;
        let decision = self.cache.decide(&request.description).await;

        let outcome = match decision.verdict {
            CacheVerdict::Reuse => self.reuse(&request.description, &decision, classification.clone(), input).await?,
            CacheVerdict::Mutate => self.mutate(request, &decision, &classification, input).await?,
            CacheVerdict::New => self.generate_new(request, &classification, input).await?,
        };

        Ok(outcome)
    }

    async fn reuse(
        &self,
        description: &str,
        decision: &CacheDecision,
        classification: ClassificationResult,
        input: Option<serde_json::Value>,
    ) -> anyhow::Result<PipelineOutcome> {
        let matched_id = decision
            .matched_artifact_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("REUSE verdict without a matched artifact id"))?;
        let artifact = self
            .store
            .get(&matched_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("matched artifact {matched_id} vanished from the store"))?;

        let deterministic = crate::test_orchestrator::is_deterministic(classification.task_type);
        let input_was_some = input.is_some();
        let run_output = if let Some(input) = input {
            // Deterministic tasks may reuse a pinned output from the
            // artifact's most recent EVALUATION instead of re-executing.
            if deterministic {
                if let Some(pinned) = self.pinned_output_for(&matched_id, &input).await? {
                    Some(pinned)
                } else {
                    self.execute(&artifact, &input).await.ok()
                }
            } else {
                // Creative/non-deterministic: structure reused, content
                // re-executed fresh every time (§4.5 stage-2 REUSE rule).
                self.execute(&artifact, &input).await.ok()
            }
        } else {
            None
        };

        if input_was_some {
            self.store
                .record_execution(&artifact.id, 0.0, 0.0, run_output.is_some(), artifact.metadata.quality_score)
                .await
                .ok();
        }

        Ok(PipelineOutcome {
            ready: artifact.ready,
            artifact,
            cache_decision: decision.clone(),
            classification,
            run_output,
        })
    }

    async fn pinned_output_for(&self, artifact_id: &str, input: &serde_json::Value) -> anyhow::Result<Option<serde_json::Value>> {
        let evaluations = self
            .store
            .find_by_tags(&["evaluation".to_string()], true)
            .await?;
        for evaluation in evaluations.into_iter().filter(|e| e.metadata.parent_id.as_deref() == Some(artifact_id)) {
            if let Ok(report) = serde_json::from_str::<serde_json::Value>(&evaluation.content) {
                if let Some(cases) = report.get("cases").and_then(|c| c.as_array()) {
                    for case in cases {
                        if case.get("input") == Some(input) && case.get("passed").and_then(|p| p.as_bool()) == Some(true) {
                            return Ok(case.get("actual").cloned());
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    async fn execute(&self, artifact: &Artifact, input: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let settings = self.pressure.settings();
        let req = SandboxRequest {
            source: &artifact.content,
            stdin_json: input,
            timeout: Duration::from_millis(settings.max_latency_ms.min(600_000)),
            grace_ms: self.pressure.grace_ms(),
            scratch_dir: self.scratch_root.join(format!("run-{}", Uuid::new_v4())),
            env_allowlist: &[],
        };
        let outcome = self.sandbox.run(req).await?;
        outcome
            .parsed_json
            .ok_or_else(|| anyhow::anyhow!("sandbox produced no parseable JSON object"))
    }

    async fn mutate(
        &self,
        request: &Request,
        decision: &CacheDecision,
        classification: &ClassificationResult,
        input: Option<serde_json::Value>,
    ) -> anyhow::Result<PipelineOutcome> {
        let template_id = decision
            .matched_artifact_id
            .clone()
            .ok_or_else(|| anyhow::anyhow!("MUTATE verdict without a matched template id"))?;
        let template = self
            .store
            .get(&template_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("template artifact {template_id} vanished from the store"))?;

        let model = self.registry.pick(classification.recommended_role, classification.recommended_tier)?;
        let plan_artifact = self
            .planner
            .plan_modification(&template, &request.description, &model, 0.1, 10_000)
            .await?;
        let spec: Specification = serde_json::from_str(&plan_artifact.content)?;

        let source = self
            .generator
            .generate_modification(&template.content, &spec, &model.id, 0.1, spec.safety_caps.soft_timeout_ms, &FailureContext::default())
            .await?;

        let report = self.validation.run(&source).await;
        let scratch_dir = self.scratch_root.join(format!("mutate-{}", request.request_id));
        let test_report = self
            .tests
            .evaluate(&report.final_source, &spec, classification.task_type, Duration::from_millis(spec.safety_caps.soft_timeout_ms), scratch_dir.clone())
            .await?;

        let quality = 0.5 * report.quality_score + 0.5 * test_report.quality_score;
        let ready = report.all_pass_or_fixed() && quality >= self.config.escalation.min_accept_quality;

        let mut artifact = Artifact::new(
            ArtifactKind::Function,
            format!("{}-variant", template.name),
            &request.description,
            report.final_source.clone(),
        )
        .with_parent(template.id.clone());
        artifact.metadata.quality_score = Some(quality);
        artifact.metadata.source_model = Some(model.id.clone());
        artifact.ready = ready;
        if !ready {
            artifact = artifact.with_tags(["unstable".to_string()]);
        }
        let stored = self.store.store(artifact, true, false).await?;

        let evaluation = TestOrchestrator::to_evaluation_artifact(&test_report, "mutation-evaluation", &request.description, &stored.id);
        self.store.store(evaluation, true, false).await.ok();

        let run_output = if let Some(input) = input {
            self.execute(&stored, &input).await.ok()
        } else {
            None
        };

        Ok(PipelineOutcome {
            ready,
            artifact: stored,
            cache_decision: decision.clone(),
            classification: classification.clone(),
            run_output,
        })
    }

    async fn generate_new(
        &self,
        request: &Request,
        classification: &ClassificationResult,
        input: Option<serde_json::Value>,
    ) -> anyhow::Result<PipelineOutcome> {
        let scratch_root = self.scratch_root.join(format!("escalate-{}", request.request_id));
        let result = self
            .escalation
            .run(&request.description, classification, &[], self.config.escalation.min_accept_quality, scratch_root)
            .await?;

        let run_output = if let Some(input) = input {
            self.execute(&result.artifact, &input).await.ok()
        } else {
            None
        };

        Ok(PipelineOutcome {
            ready: result.artifact.ready,
            artifact: result.artifact,
            cache_decision: CacheDecision {
                verdict: CacheVerdict::New,
                matched_artifact_id: None,
                stage1_score: 0.0,
                stage2_score: None,
                rationale: "no reusable candidate".to_string(),
            },
            classification: classification.clone(),
            run_output,
        })
    }
}
