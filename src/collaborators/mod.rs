//! Collaborator interfaces (C1-C3): `Embedder`, `VectorStore`, `LlmBackend`.
//!
//! These are abstract per the design -- the core depends only on the
//! traits in this module. Concrete implementations (fastembed, a
//! file-backed vector cache, ollama-rs/reqwest-backed LLM clients) live
//! alongside the traits because this crate ships its own reference
//! collaborators, but any conforming implementation can be substituted.

pub mod embedder;
pub mod llm_backend;
pub mod vector_store;

pub use embedder::{Embedder, FastEmbedEmbedder};
pub use llm_backend::{GenerateParams, LlmBackend, OllamaBackend, OpenAiCompatBackend};
pub use vector_store::{FileVectorStore, QueryFilter, VectorStore};
