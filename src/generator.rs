//! Generator (C9): produces an executable artifact from a `Specification`.
//!
//! Grounded on the teacher's `ForgeTool` (`tools/dynamic.rs`): both turn an
//! LLM response into a saved, runnable script rather than Rust source --
//! here the wire format (§6.2) fixes the target shape to a Python-style
//! JSON-stdio script (`if __name__ == "__main__": main()`), independent of
//! what language the *core* itself is written in.

use std::sync::Arc;

use crate::collaborators::{GenerateParams, LlmBackend};
use crate::planner::Specification;

pub struct Generator {
    llm: Arc<dyn LlmBackend>,
}

/// The fallback failure-context block prepended to the Generator prompt on
/// an escalation retry (§4.11 step 2).
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    pub validator_messages: Vec<String>,
    pub test_messages: Vec<String>,
}

impl FailureContext {
    pub fn is_empty(&self) -> bool {
        self.validator_messages.is_empty() && self.test_messages.is_empty()
    }

    fn dedup(mut v: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        v.retain(|m| seen.insert(m.clone()));
        v
    }

    fn render(&self) -> String {
        let validators = Self::dedup(self.validator_messages.clone());
        let tests = Self::dedup(self.test_messages.clone());
        let mut block = String::from("Previous attempt failed. Fix the following issues:\n");
        for v in &validators {
            block.push_str("- validator: ");
            block.push_str(v);
            block.push('\n');
        }
        for t in &tests {
            block.push_str("- test: ");
            block.push_str(t);
            block.push('\n');
        }
        block
    }
}

impl Generator {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }

    /// Fresh generation from a specification.
    pub async fn generate(
        &self,
        spec: &Specification,
        model_id: &str,
        temperature: f32,
        timeout_ms: u64,
        failures: &FailureContext,
    ) -> anyhow::Result<String> {
        let prompt = self.build_prompt(spec, failures);
        let params = GenerateParams {
            temperature,
            timeout_ms,
            ..Default::default()
        };
        let response = self.llm.generate(model_id, &prompt, &params).await?;
        Ok(extract_source(&response).unwrap_or_else(|| fallback_source(spec)))
    }

    /// Modification mode (§4.7): apply a diff plan against a template's
    /// source, returning the new full source.
    pub async fn generate_modification(
        &self,
        template_source: &str,
        spec: &Specification,
        model_id: &str,
        temperature: f32,
        timeout_ms: u64,
        failures: &FailureContext,
    ) -> anyhow::Result<String> {
        let diff = spec.diff_sections.clone().unwrap_or_default();
        let prompt = format!(
            "{}You are modifying an existing Python script. Apply this diff plan and return the FULL new \
             source wrapped in a ```python fenced block.\n\n\
             Existing source:\n```python\n{template_source}\n```\n\n\
             Keep: {:?}\nChange: {:?}\nAdd: {:?}\nRemove: {:?}\n\n\
             New requirement: {}\n",
            if failures.is_empty() { String::new() } else { failures.render() },
            diff.keep, diff.change, diff.add, diff.remove,
            spec.problem_definition,
        );
        let params = GenerateParams {
            temperature,
            timeout_ms,
            ..Default::default()
        };
        let response = self.llm.generate(model_id, &prompt, &params).await?;
        Ok(extract_source(&response).unwrap_or_else(|| template_source.to_string()))
    }

    fn build_prompt(&self, spec: &Specification, failures: &FailureContext) -> String {
        format!(
            "{}You generate a single self-contained Python script satisfying this specification. \
             The script MUST:\n\
             - read exactly one JSON object from stdin,\n\
             - define a `main()` function,\n\
             - invoke `main()` only inside `if __name__ == \"__main__\":`,\n\
             - write exactly one JSON object to stdout via `json.dumps`, keyed `result` on success \
             or `error` on a handled failure.\n\n\
             Problem: {}\n\
             I/O interface: {}\n\
             Algorithmic requirements: {}\n\
             Safety caps: sequences <= {} elements, loops <= {} iterations, files <= {}MB.\n\n\
             Return ONLY the script in a ```python fenced code block.\n",
            if failures.is_empty() { String::new() } else { failures.render() },
            spec.problem_definition,
            spec.io_interface,
            spec.algorithmic_requirements,
            spec.safety_caps.max_sequence_elements,
            spec.safety_caps.max_loop_iterations,
            spec.safety_caps.max_file_size_mb,
        )
    }
}

/// Pulls the contents of the first ```python fenced block out of an LLM
/// response; returns `None` if no fence is present (triggers the fallback
/// template, same "never return nothing" discipline as the Planner).
fn extract_source(response: &str) -> Option<String> {
    let start_marker = response.find("```python").map(|i| i + "```python".len())
        .or_else(|| response.find("```\n").map(|i| i + 3));
    let start = start_marker?;
    let rest = &response[start..];
    let end = rest.find("```")?;
    let source = rest[..end].trim_start_matches('\n').to_string();
    if source.trim().is_empty() {
        None
    } else {
        Some(source)
    }
}

/// A minimal echo script: reads stdin, emits it back as `result`. Used
/// when the Generator's response could not be parsed, so the pipeline
/// always has *something* for ValidationPipeline to assess.
fn fallback_source(spec: &Specification) -> String {
    format!(
        "import sys, json\n\n\
         def main():\n\
         \x20\x20\x20\x20raw = sys.stdin.read()\n\
         \x20\x20\x20\x20try:\n\
         \x20\x20\x20\x20\x20\x20\x20\x20data = json.loads(raw) if raw.strip() else {{}}\n\
         \x20\x20\x20\x20except json.JSONDecodeError as e:\n\
         \x20\x20\x20\x20\x20\x20\x20\x20print(json.dumps({{\"error\": str(e)}}))\n\
         \x20\x20\x20\x20\x20\x20\x20\x20return\n\
         \x20\x20\x20\x20# {}\n\
         \x20\x20\x20\x20print(json.dumps({{\"result\": data}}))\n\n\
         if __name__ == \"__main__\":\n\
         \x20\x20\x20\x20main()\n",
        spec.problem_definition.replace('\n', " ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use async_trait::async_trait;

    struct StubBackend(String);

    #[async_trait]
    impl LlmBackend for StubBackend {
        fn name(&self) -> &str {
            "stub"
        }
        async fn generate(&self, _m: &str, _p: &str, _params: &GenerateParams) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    fn spec() -> Specification {
        Specification {
            problem_definition: "sum a list of numbers".to_string(),
            io_interface: "xs -> result".to_string(),
            algorithmic_requirements: String::new(),
            safety_caps: crate::planner::SafetyCaps {
                max_sequence_elements: 10_000,
                max_loop_iterations: 1_000,
                max_file_size_mb: 10,
                soft_timeout_ms: 5_000,
            },
            test_cases: Vec::new(),
            recommended_tools: Vec::new(),
            diff_sections: None,
            truncated: false,
        }
    }

    #[tokio::test]
    async fn extracts_source_from_fenced_block() {
        let response = "here you go:\n```python\nprint('hi')\n```\nthanks";
        let generator = Generator::new(Arc::new(StubBackend(response.to_string())));
        let source = generator
            .generate(&spec(), "m", 0.1, 5000, &FailureContext::default())
            .await
            .unwrap();
        assert_eq!(source.trim(), "print('hi')");
    }

    #[tokio::test]
    async fn falls_back_to_template_when_no_fence_present() {
        let generator = Generator::new(Arc::new(StubBackend("no code here".to_string())));
        let source = generator
            .generate(&spec(), "m", 0.1, 5000, &FailureContext::default())
            .await
            .unwrap();
        assert!(source.contains("__main__"));
        assert!(source.contains("def main()"));
    }

    #[test]
    fn failure_context_dedups_repeated_messages() {
        let ctx = FailureContext {
            validator_messages: vec!["bad imports".to_string(), "bad imports".to_string()],
            test_messages: vec![],
        };
        let rendered = ctx.render();
        assert_eq!(rendered.matches("bad imports").count(), 1);
    }
}
