//! Small shared utilities with no component of their own.
pub mod truncate;

pub use truncate::{approx_token_count, truncate_text, TruncationPolicy};