//! External tool invocation (§6.3): the `call_tool` contract exposed to
//! generated code.
//!
//! Grounded on the teacher's `tools` catalogue (`tools/dynamic.rs`'s
//! `DynamicTool` for the executable-script case, `tools/mcp.rs`'s proxy
//! dispatch for the remote-API case): there, every tool kind implements
//! one `Tool` trait and a registry dynamically dispatches by name. Per
//! §9's redesign flag ("runtime reflection... becomes a tagged-variant
//! `Tool = { LLM, Executable, Api }`"), dispatch here is a closed `match`
//! over that enum instead of a trait object per kind.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

use crate::collaborators::{GenerateParams, LlmBackend};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ToolFailure {
    #[error("tool not found in catalogue: {0}")]
    NotFound(String),
    #[error("executable tool exited with code {0}: {1}")]
    ExecutableFailed(i32, String),
    #[error("executable tool timed out after {0}ms")]
    Timeout(u64),
    #[error("llm tool call failed: {0}")]
    LlmFailed(String),
    #[error("api tool call failed: {0}")]
    ApiFailed(String),
}

/// One entry in the tools catalogue. A tagged variant, not a trait
/// object -- `call_tool` is a thin `match` over it (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum ToolDescriptor {
    /// Dispatches through an `LlmBackend`.
    Llm { model_id: String },
    /// Dispatches to an external binary. `arg_template` entries are
    /// substituted with at least `{tool_dir}`, `{source_file}`, `{prompt}`.
    Executable {
        program: String,
        arg_template: Vec<String>,
        tool_dir: String,
        timeout_ms: u64,
    },
    /// Dispatches to a remote HTTP API.
    Api { base_url: String, api_key_env: Option<String> },
}

#[derive(Default, Clone)]
pub struct ToolCatalogue {
    entries: HashMap<String, ToolDescriptor>,
}

impl ToolCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, descriptor: ToolDescriptor) {
        self.entries.insert(name.into(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.entries.get(name)
    }
}

/// The `call_tool(tool_name, prompt, **kwargs) -> string` helper exposed
/// to generated code. `tool_name` is validated by the pri-90 validator to
/// be a literal string before generation is accepted; this function does
/// not re-validate that.
pub struct ToolInvoker {
    catalogue: ToolCatalogue,
    llm: Arc<dyn LlmBackend>,
    http: reqwest::Client,
}

impl ToolInvoker {
    pub fn new(catalogue: ToolCatalogue, llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            catalogue,
            llm,
            http: reqwest::Client::new(),
        }
    }

    pub async fn call_tool(
        &self,
        tool_name: &str,
        prompt: &str,
        kwargs: &HashMap<String, String>,
        source_file: &str,
    ) -> Result<String, ToolFailure> {
        let descriptor = self
            .catalogue
            .get(tool_name)
            .ok_or_else(|| ToolFailure::NotFound(tool_name.to_string()))?;

        match descriptor {
            ToolDescriptor::Llm { model_id } => {
                let params = GenerateParams::default();
                self.llm
                    .generate(model_id, prompt, &params)
                    .await
                    .map_err(|e| ToolFailure::LlmFailed(e.to_string()))
            }
            ToolDescriptor::Executable {
                program,
                arg_template,
                tool_dir,
                timeout_ms,
            } => {
                let args: Vec<String> = arg_template
                    .iter()
                    .map(|a| substitute(a, tool_dir, source_file, prompt, kwargs))
                    .collect();

                let fut = Command::new(program)
                    .args(&args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output();

                let output = tokio::time::timeout(Duration::from_millis(*timeout_ms), fut)
                    .await
                    .map_err(|_| ToolFailure::Timeout(*timeout_ms))?
                    .map_err(|e| ToolFailure::ExecutableFailed(-1, e.to_string()))?;

                if !output.status.success() {
                    let code = output.status.code().unwrap_or(-1);
                    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                    return Err(ToolFailure::ExecutableFailed(code, stderr));
                }
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            ToolDescriptor::Api { base_url, api_key_env } => {
                let mut req = self.http.post(base_url).json(&serde_json::json!({
                    "prompt": prompt,
                    "kwargs": kwargs,
                }));
                if let Some(env_name) = api_key_env {
                    if let Ok(key) = std::env::var(env_name) {
                        req = req.bearer_auth(key);
                    }
                }
                let resp = req
                    .send()
                    .await
                    .map_err(|e| ToolFailure::ApiFailed(e.to_string()))?;
                resp.text().await.map_err(|e| ToolFailure::ApiFailed(e.to_string()))
            }
        }
    }
}

fn substitute(
    template: &str,
    tool_dir: &str,
    source_file: &str,
    prompt: &str,
    kwargs: &HashMap<String, String>,
) -> String {
    let mut out = template
        .replace("{tool_dir}", tool_dir)
        .replace("{source_file}", source_file)
        .replace("{prompt}", prompt);
    for (k, v) in kwargs {
        out = out.replace(&format!("{{{k}}}"), v);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn call_tool_on_unknown_name_returns_not_found() {
        struct NeverCalled;
        #[async_trait::async_trait]
        impl LlmBackend for NeverCalled {
            fn name(&self) -> &str {
                "never"
            }
            async fn generate(&self, _: &str, _: &str, _: &GenerateParams) -> Result<String, crate::error::LlmError> {
                panic!("should not be called");
            }
        }
        let invoker = ToolInvoker::new(ToolCatalogue::new(), Arc::new(NeverCalled));
        let err = invoker
            .call_tool("nope", "hi", &HashMap::new(), "src.py")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::NotFound(_)));
    }

    #[test]
    fn substitute_replaces_all_named_placeholders() {
        let mut kwargs = HashMap::new();
        kwargs.insert("extra".to_string(), "value".to_string());
        let out = substitute("{tool_dir}/run.sh {source_file} {prompt} {extra}", "/tools", "a.py", "hello", &kwargs);
        assert_eq!(out, "/tools/run.sh a.py hello value");
    }
}
