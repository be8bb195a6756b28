//! SemanticCache (C7): two-stage reuse/mutate/new decision.
//!
//! Stage 1 (vector prefilter) is a thin wrapper over
//! `ArtifactStore::find_similar`; stage 2 (LLM semantic judge) follows the
//! source `Router::llm_route`'s JSON-then-regex response parsing idiom
//! (`orchestrator/router.rs`), adapted to parse a bare integer score
//! instead of a routing decision object.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::artifact::store::ArtifactStore;
use crate::artifact::{Artifact, ArtifactKind};
use crate::collaborators::{GenerateParams, LlmBackend};
use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheVerdict {
    Reuse,
    Mutate,
    New,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDecision {
    pub verdict: CacheVerdict,
    pub matched_artifact_id: Option<String>,
    pub stage1_score: f32,
    pub stage2_score: Option<u32>,
    pub rationale: String,
}

pub struct SemanticCache {
    store: Arc<ArtifactStore>,
    judge: Arc<dyn LlmBackend>,
    judge_model: String,
    config: CacheConfig,
}

impl SemanticCache {
    pub fn new(store: Arc<ArtifactStore>, judge: Arc<dyn LlmBackend>, judge_model: impl Into<String>, config: CacheConfig) -> Self {
        Self {
            store,
            judge,
            judge_model: judge_model.into(),
            config,
        }
    }

    pub async fn decide(&self, description: &str) -> CacheDecision {
        // Stage 1: vector prefilter over FUNCTION/WORKFLOW artifacts meeting
        // the quality floor. We query both kinds and keep the best hit.
        let mut candidates = Vec::new();
        for kind in [ArtifactKind::Function, ArtifactKind::Workflow] {
            match self
                .store
                .find_similar(description, Some(kind), &[], 0.0, 5)
                .await
            {
                Ok(hits) => candidates.extend(hits),
                Err(_) => continue,
            }
        }
        candidates.retain(|(a, _)| a.metadata.quality_score.unwrap_or(0.0) >= self.config.min_quality);
        candidates.retain(|(a, _)| {
            let age = chrono::Utc::now().signed_duration_since(a.updated_at).num_seconds();
            age <= self.config.max_age_secs
        });
        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let Some((best_artifact, stage1_score)) = candidates.into_iter().next() else {
            return CacheDecision {
                verdict: CacheVerdict::New,
                matched_artifact_id: None,
                stage1_score: 0.0,
                stage2_score: None,
                rationale: "no candidate in store".to_string(),
            };
        };

        // B1: stage 2 is never invoked unless stage 1 passed its gate.
        if stage1_score < self.config.gate1 {
            return CacheDecision {
                verdict: CacheVerdict::New,
                matched_artifact_id: Some(best_artifact.id.clone()),
                stage1_score,
                stage2_score: None,
                rationale: format!("stage1_score {stage1_score:.3} below gate1 {}", self.config.gate1),
            };
        }

        match self.stage2_judge(description, &best_artifact).await {
            Ok(score) => {
                let verdict = if score == 100 {
                    CacheVerdict::Reuse
                } else if (50..=99).contains(&score) {
                    CacheVerdict::Mutate
                } else {
                    CacheVerdict::New
                };
                CacheDecision {
                    verdict,
                    matched_artifact_id: Some(best_artifact.id.clone()),
                    stage1_score,
                    stage2_score: Some(score),
                    rationale: format!("stage2 judge score {score}"),
                }
            }
            Err(e) => CacheDecision {
                verdict: CacheVerdict::New,
                matched_artifact_id: Some(best_artifact.id.clone()),
                stage1_score,
                stage2_score: None,
                rationale: format!("stage2 judge failed, treating as NEW: {e}"),
            },
        }
    }

    async fn stage2_judge(&self, description: &str, candidate: &Artifact) -> anyhow::Result<u32> {
        let prompt = format!(
            "You compare two task descriptions and output a single integer from 0 to 100 \
             measuring how semantically identical they are as implementation requests. \
             100 means an identical request. 50-99 means related but meaningfully different \
             (e.g. same operation run backwards, or with an added constraint). Below 50 means \
             unrelated. Output only the integer.\n\n\
             Stored artifact description: {}\n\
             New request description: {}\n",
            candidate.description, description
        );
        let params = GenerateParams {
            temperature: self.config.stage2_temperature,
            timeout_ms: 10_000,
            ..Default::default()
        };
        let text = self
            .judge
            .generate(&self.judge_model, &prompt, &params)
            .await?;
        parse_score(&text).ok_or_else(|| anyhow::anyhow!("could not parse integer score from judge response: {text}"))
    }
}

fn parse_score(text: &str) -> Option<u32> {
    // JSON-first, same idiom as the source's routing-response parser:
    // the judge is asked for a bare integer but may wrap it in prose.
    if let Ok(v) = text.trim().parse::<u32>() {
        return Some(v.min(100));
    }
    let re = Regex::new(r"\b(\d{1,3})\b").ok()?;
    let captured = re.captures(text)?.get(1)?.as_str();
    captured.parse::<u32>().ok().map(|v| v.min(100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_score_handles_bare_integer() {
        assert_eq!(parse_score("100"), Some(100));
    }

    #[test]
    fn parse_score_handles_prose_wrapped_integer() {
        assert_eq!(parse_score("The score is 73 out of 100."), Some(73));
    }

    #[test]
    fn parse_score_clamps_above_100() {
        assert_eq!(parse_score("150"), Some(100));
    }

    #[test]
    fn parse_score_returns_none_for_unparseable_text() {
        assert_eq!(parse_score("no numbers here"), None);
    }
}
