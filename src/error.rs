//! Typed error taxonomy for the core pipeline.
//!
//! Each component boundary surfaces its own narrow error type; `CoreError`
//! wraps them for callers that need to match on "which stage failed" without
//! caring about the lower-level detail. `anyhow::Result` is used at the CLI
//! boundary and in tests, same split the rest of the crate uses.

use thiserror::Error;

/// Failure modes an `LlmBackend::generate` call can surface.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LlmError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),
    #[error("backend timed out after {0}ms")]
    Timeout(u64),
    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },
    #[error("protocol error: {0}")]
    ProtocolError(String),
}

/// Failure modes surfaced by the Runner/Sandbox.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SandboxError {
    #[error("sandbox timed out after {0}ms")]
    Timeout(u64),
    #[error("process exited with code {0}")]
    NonZeroExit(i32),
    #[error("stdout was not a well-formed JSON object: {0}")]
    JsonOutputParseError(String),
}

/// Failure modes surfaced by the ArtifactStore.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("artifact id already exists: {0}")]
    DuplicateId(String),
    #[error("vector store unreachable: {0}")]
    Unreachable(String),
    #[error("vector store protocol error: {0}")]
    ProtocolError(String),
    #[error("artifact not found: {0}")]
    NotFound(String),
}

/// Crate-wide error enum, one variant per §7 taxonomy kind.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("classification unavailable: {0}")]
    Classification(String),

    #[error("cache decision error: {0}")]
    Cache(String),

    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("sandbox failed: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("tool auto-install failed: {0}")]
    ToolInstall(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
