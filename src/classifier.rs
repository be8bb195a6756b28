//! TaskClassifier (C6): two-layer classification of a user request into
//! task-type + complexity.
//!
//! Grounded on the source's `Router` (`orchestrator/router.rs`): a
//! heuristic cascade runs first, with its JSON-then-regex LLM-triage
//! fallback invoked only when no override rule matches. Here the heuristic
//! layer is authoritative (§4.4 explicitly makes override rules win over
//! the LLM label) rather than a router preempting an LLM call.

use serde::{Deserialize, Serialize};

use crate::collaborators::{GenerateParams, LlmBackend};
use crate::model_registry::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CreativeContent,
    Arithmetic,
    DataProcessing,
    DataGeneration,
    CodeGeneration,
    Translation,
    Summary,
    Analysis,
    QuestionAnswering,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Moderate,
    Hard,
    Unbounded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub requires_llm: bool,
    pub requires_tools: bool,
    pub recommended_role: Role,
    pub recommended_tier: crate::model_registry::Tier,
    pub reason: String,
}

const DATA_GENERATION_PHRASES: &[&str] = &[
    "generate data", "create data", "sample data", "random data", "fake data",
    "mock data", "test data", "dummy data", "synthetic data", "generate sample",
    "create sample", "make up data",
];

const DATA_PROCESSING_PHRASES: &[&str] = &["filter", "sort", "map", "reduce", "transform", "aggregate"];

const CODE_GENERATION_OVERRIDE_PHRASES: &[&str] = &["random.randint", "random number generator"];

pub struct TaskClassifier {
    llm: std::sync::Arc<dyn LlmBackend>,
    triage_model: String,
}

impl TaskClassifier {
    pub fn new(llm: std::sync::Arc<dyn LlmBackend>, triage_model: impl Into<String>) -> Self {
        Self {
            llm,
            triage_model: triage_model.into(),
        }
    }

    /// First-match-wins keyword override pass, run before (and
    /// authoritative over) the LLM triage call.
    fn override_rule(description: &str) -> Option<TaskType> {
        let lower = description.to_lowercase();

        if DATA_GENERATION_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(TaskType::CreativeContent);
        }
        if CODE_GENERATION_OVERRIDE_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(TaskType::CodeGeneration);
        }
        if DATA_PROCESSING_PHRASES.iter().any(|p| lower.contains(p)) {
            return Some(TaskType::DataProcessing);
        }
        None
    }

    fn recommended_role(task_type: TaskType) -> Role {
        match task_type {
            TaskType::CodeGeneration | TaskType::DataProcessing => Role::Code,
            TaskType::CreativeContent | TaskType::Summary | TaskType::Translation => Role::Content,
            _ => Role::General,
        }
    }

    fn tier_for(complexity: Complexity) -> crate::model_registry::Tier {
        use crate::model_registry::Tier;
        match complexity {
            Complexity::Trivial => Tier::Fast,
            Complexity::Moderate => Tier::General,
            Complexity::Hard => Tier::Escalation,
            Complexity::Unbounded => Tier::God,
        }
    }

    /// `classify(description) -> ClassificationResult`. Never raises past
    /// this boundary: triage timeout/protocol errors fall back to
    /// `{task_type: unknown, tier: general}` with `reason` explaining why.
    pub async fn classify(&self, description: &str) -> ClassificationResult {
        if let Some(task_type) = Self::override_rule(description) {
            let complexity = Complexity::Moderate;
            return ClassificationResult {
                task_type,
                complexity,
                requires_llm: !matches!(task_type, TaskType::Arithmetic | TaskType::DataProcessing),
                requires_tools: false,
                recommended_role: Self::recommended_role(task_type),
                recommended_tier: Self::tier_for(complexity),
                reason: "matched keyword override rule".to_string(),
            };
        }

        let prompt = format!(
            "Classify the following request into exactly one label from this set: \
             creative_content, arithmetic, data_processing, data_generation, code_generation, \
             translation, summary, analysis, question_answering, unknown. \
             Respond with only the label.\n\nRequest: {description}"
        );

        let params = GenerateParams {
            temperature: 0.0,
            timeout_ms: 5_000,
            ..Default::default()
        };

        match self.llm.generate(&self.triage_model, &prompt, &params).await {
            Ok(text) => {
                let task_type = parse_task_type(&text).unwrap_or(TaskType::Unknown);
                let complexity = Complexity::Moderate;
                ClassificationResult {
                    task_type,
                    complexity,
                    requires_llm: true,
                    requires_tools: false,
                    recommended_role: Self::recommended_role(task_type),
                    recommended_tier: Self::tier_for(complexity),
                    reason: "triage LLM call".to_string(),
                }
            }
            Err(e) => ClassificationResult {
                task_type: TaskType::Unknown,
                complexity: Complexity::Moderate,
                requires_llm: false,
                requires_tools: false,
                recommended_role: Role::General,
                recommended_tier: crate::model_registry::Tier::General,
                reason: format!("triage unavailable ({e}), falling back to defaults"),
            },
        }
    }
}

fn parse_task_type(text: &str) -> Option<TaskType> {
    let lower = text.trim().to_lowercase();
    Some(match lower.as_str() {
        s if s.contains("creative_content") => TaskType::CreativeContent,
        s if s.contains("arithmetic") => TaskType::Arithmetic,
        s if s.contains("data_processing") => TaskType::DataProcessing,
        s if s.contains("data_generation") => TaskType::DataGeneration,
        s if s.contains("code_generation") => TaskType::CodeGeneration,
        s if s.contains("translation") => TaskType::Translation,
        s if s.contains("summary") => TaskType::Summary,
        s if s.contains("analysis") => TaskType::Analysis,
        s if s.contains("question_answering") => TaskType::QuestionAnswering,
        _ => TaskType::Unknown,
    })
}
