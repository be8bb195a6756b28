//! LlmBackend (C3): `generate(model, prompt, params) -> text`, with
//! timeouts/streaming and four distinct failure kinds.
//!
//! Two reference backends are provided, mirroring the source's provider
//! pair: `OllamaBackend` (local, free, via `ollama-rs`) and
//! `OpenAiCompatBackend` (remote, opt-in, via `reqwest` + manual SSE
//! parsing of `data: ` lines). Both publish status lines through the
//! `StatusBus` around every call, matching `PublishingProvider`.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::Ollama;

use crate::error::LlmError;
use crate::status_bus::StatusBus;

#[derive(Debug, Clone)]
pub struct GenerateParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub timeout_ms: u64,
    pub stream: bool,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: None,
            stop: Vec::new(),
            timeout_ms: 30_000,
            stream: false,
        }
    }
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<String, LlmError>;

    /// Streaming form: a finite, non-restartable sequence of text chunks.
    /// Default implementation falls back to a single-chunk stream built
    /// from `generate`, so backends need not implement true streaming.
    async fn generate_stream(&self, model: &str, prompt: &str, params: &GenerateParams) -> TextStream {
        let result = self.generate(model, prompt, params).await;
        Box::pin(futures_util::stream::once(async move { result }))
    }
}

/// Local Ollama backend, matching the source's `OllamaProvider`.
pub struct OllamaBackend {
    client: Ollama,
    status: StatusBus,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, port: u16, status: StatusBus) -> Self {
        Self {
            client: Ollama::new(base_url.into(), port),
            status,
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<String, LlmError> {
        self.status.publish_op("ollama", model, "generate");

        let options = GenerationOptions::default().temperature(params.temperature);
        let request = GenerationRequest::new(model.to_string(), prompt.to_string())
            .options(options);

        let fut = self.client.generate(request);
        let result = tokio::time::timeout(Duration::from_millis(params.timeout_ms), fut).await;

        self.status.clear("ollama", model);

        match result {
            Err(_) => Err(LlmError::Timeout(params.timeout_ms)),
            Ok(Err(e)) => {
                let msg = e.to_string();
                if msg.contains("connect") || msg.contains("refused") {
                    Err(LlmError::Unreachable(msg))
                } else {
                    Err(LlmError::ProtocolError(msg))
                }
            }
            Ok(Ok(resp)) => Ok(resp.response),
        }
    }
}

/// Remote OpenAI-compatible backend (opt-in, only contacted when its
/// config entry declares `enabled=true` and a key is present -- enforced
/// by the caller, the `ModelRegistry`, not by this type).
pub struct OpenAiCompatBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    status: StatusBus,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, status: StatusBus) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            status,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compatible"
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<String, LlmError> {
        self.status.publish_op("openai-compatible", model, "generate");

        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": params.temperature,
                "max_tokens": params.max_tokens,
                "stop": params.stop,
            }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let fut = req.send();
        let result = tokio::time::timeout(Duration::from_millis(params.timeout_ms), fut).await;
        self.status.clear("openai-compatible", model);

        let response = match result {
            Err(_) => return Err(LlmError::Timeout(params.timeout_ms)),
            Ok(Err(e)) => {
                return if e.is_connect() {
                    Err(LlmError::Unreachable(e.to_string()))
                } else {
                    Err(LlmError::ProtocolError(e.to_string()))
                }
            }
            Ok(Ok(r)) => r,
        };

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000);
            return Err(LlmError::RateLimited { retry_after_ms });
        }
        if !response.status().is_success() {
            return Err(LlmError::ProtocolError(format!(
                "http status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::ProtocolError(e.to_string()))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::ProtocolError("missing choices[0].message.content".into()))
    }

    async fn generate_stream(&self, model: &str, prompt: &str, params: &GenerateParams) -> TextStream {
        if !params.stream {
            let result = self.generate(model, prompt, params).await;
            return Box::pin(futures_util::stream::once(async move { result }));
        }

        // Manual SSE: split on "data: " lines, stop at "[DONE]".
        let mut req = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&serde_json::json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": params.temperature,
                "stream": true,
            }));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                let err = if e.is_connect() {
                    LlmError::Unreachable(e.to_string())
                } else {
                    LlmError::ProtocolError(e.to_string())
                };
                return Box::pin(futures_util::stream::once(async move { Err(err) }));
            }
        };

        let byte_stream = response.bytes_stream();
        let chunks = byte_stream.filter_map(|chunk_result| async move {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => return Some(Err(LlmError::ProtocolError(e.to_string()))),
            };
            let text = String::from_utf8_lossy(&chunk).to_string();
            for line in text.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    if data.trim() == "[DONE]" {
                        return None;
                    }
                    if let Ok(json) = serde_json::from_str::<serde_json::Value>(data) {
                        if let Some(delta) = json["choices"][0]["delta"]["content"].as_str() {
                            return Some(Ok(delta.to_string()));
                        }
                    }
                }
            }
            None
        });

        Box::pin(chunks)
    }
}
