//! TestOrchestrator (C12): runs a generated script against the
//! specification's test cases and turns the results into a quality
//! score.
//!
//! Grounded on the teacher's evaluation idiom in `orchestrator/queue.rs`
//! and `memory/manager.rs` for the "never trust a single signal, keep a
//! running account" discipline; the comparator split (strict equality
//! for deterministic tasks, embedding similarity for creative ones) is
//! this crate's own synthesis of that idiom applied to §4.4's task
//! classification.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ArtifactKind};
use crate::classifier::TaskType;
use crate::collaborators::Embedder;
use crate::planner::{Specification, TestCase};
use crate::sandbox::{Sandbox, SandboxRequest};

/// Matches `PressureConfig::default().grace_ms` (`config.rs`): the
/// orchestrator has no pressure handle of its own, so test-case runs use
/// the same default grace period the sandbox otherwise gets from it.
const DEFAULT_GRACE_MS: u64 = 2_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub input: serde_json::Value,
    pub expected: serde_json::Value,
    pub actual: Option<serde_json::Value>,
    pub passed: bool,
    pub similarity: Option<f32>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    pub cases: Vec<CaseResult>,
    pub pass_rate: f32,
    pub coverage: f32,
    pub quality_score: f32,
    pub smoke_tested: bool,
}

/// Determinism decides the comparator: creative/content tasks compare by
/// embedding similarity against a threshold, everything else compares by
/// strict structural equality.
pub fn is_deterministic(task_type: TaskType) -> bool {
    !matches!(task_type, TaskType::CreativeContent | TaskType::Summary)
}

pub struct TestOrchestrator {
    sandbox: Sandbox,
    embedder: Arc<dyn Embedder>,
    similarity_threshold: f32,
}

impl TestOrchestrator {
    pub fn new(sandbox: Sandbox, embedder: Arc<dyn Embedder>, similarity_threshold: f32) -> Self {
        Self { sandbox, embedder, similarity_threshold }
    }

    pub async fn evaluate(
        &self,
        source: &str,
        spec: &Specification,
        task_type: TaskType,
        timeout: Duration,
        scratch_dir: PathBuf,
    ) -> anyhow::Result<TestReport> {
        if spec.test_cases.is_empty() {
            return self.smoke_test(source, timeout, scratch_dir).await;
        }

        let deterministic = is_deterministic(task_type);
        let mut cases = Vec::with_capacity(spec.test_cases.len());
        let mut passed = 0usize;

        for case in &spec.test_cases {
            let result = self.run_case(source, case, deterministic, timeout, &scratch_dir).await;
            if result.passed {
                passed += 1;
            }
            cases.push(result);
        }

        let pass_rate = passed as f32 / spec.test_cases.len() as f32;
        let coverage = 1.0; // every declared case was exercised
        let quality_score = pass_rate * coverage;

        Ok(TestReport {
            cases,
            pass_rate,
            coverage,
            quality_score,
            smoke_tested: false,
        })
    }

    async fn run_case(
        &self,
        source: &str,
        case: &TestCase,
        deterministic: bool,
        timeout: Duration,
        scratch_dir: &PathBuf,
    ) -> CaseResult {
        let req = SandboxRequest {
            source,
            stdin_json: &case.input,
            timeout,
            grace_ms: DEFAULT_GRACE_MS,
            scratch_dir: scratch_dir.clone(),
            env_allowlist: &[],
        };
        match self.sandbox.run(req).await {
            Ok(outcome) => {
                let actual = outcome.parsed_json.and_then(|v| v.get("result").cloned().or(Some(v)));
                let (passed, similarity) = match &actual {
                    Some(value) => {
                        if deterministic {
                            (*value == case.expected, None)
                        } else {
                            let sim = self.compare_by_similarity(value, &case.expected).await;
                            (sim >= self.similarity_threshold, Some(sim))
                        }
                    }
                    None => (false, None),
                };
                CaseResult {
                    input: case.input.clone(),
                    expected: case.expected.clone(),
                    actual,
                    passed,
                    similarity,
                    error: None,
                }
            }
            Err(e) => CaseResult {
                input: case.input.clone(),
                expected: case.expected.clone(),
                actual: None,
                passed: false,
                similarity: None,
                error: Some(e.to_string()),
            },
        }
    }

    async fn compare_by_similarity(&self, actual: &serde_json::Value, expected: &serde_json::Value) -> f32 {
        let actual_text = value_to_text(actual);
        let expected_text = value_to_text(expected);
        let (a, b) = match (self.embedder.embed(&actual_text).await, self.embedder.embed(&expected_text).await) {
            (Ok(a), Ok(b)) => (a, b),
            _ => return 0.0,
        };
        crate::collaborators::embedder::cosine_similarity(&a, &b)
    }

    /// No declared test cases: run the script once with an empty object
    /// on stdin and accept a clean exit + parseable JSON as the bar.
    async fn smoke_test(&self, source: &str, timeout: Duration, scratch_dir: PathBuf) -> anyhow::Result<TestReport> {
        let req = SandboxRequest {
            source,
            stdin_json: &serde_json::json!({}),
            timeout,
            grace_ms: DEFAULT_GRACE_MS,
            scratch_dir,
            env_allowlist: &[],
        };
        let outcome = self.sandbox.run(req).await;
        let (passed, error) = match &outcome {
            Ok(o) => (o.parsed_json.is_some(), None),
            Err(e) => (false, Some(e.to_string())),
        };
        let score = if passed { 0.5 } else { 0.0 }; // smoke pass never earns full confidence
        Ok(TestReport {
            cases: vec![CaseResult {
                input: serde_json::json!({}),
                expected: serde_json::Value::Null,
                actual: outcome.ok().and_then(|o| o.parsed_json),
                passed,
                similarity: None,
                error,
            }],
            pass_rate: if passed { 1.0 } else { 0.0 },
            coverage: 0.0,
            quality_score: score,
            smoke_tested: true,
        })
    }

    pub fn to_evaluation_artifact(report: &TestReport, name: &str, description: &str, parent_id: &str) -> Artifact {
        let content = serde_json::to_string_pretty(report).unwrap_or_default();
        Artifact::new(ArtifactKind::Evaluation, name, description, content)
            .with_tags(["evaluation".to_string()])
            .with_parent(parent_id)
    }
}

fn value_to_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
