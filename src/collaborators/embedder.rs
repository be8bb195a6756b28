//! Embedder (C1): text -> fixed-dim vector.

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::RwLock;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    /// Dimensionality of vectors this embedder produces, needed by
    /// collection-creating vector stores.
    fn dim(&self) -> usize;
}

/// Reference embedder backed by `fastembed`'s local `AllMiniLML6V2` model,
/// matching the model the source's vector memory already downloads.
pub struct FastEmbedEmbedder {
    model: RwLock<TextEmbedding>,
    dim: usize,
}

impl FastEmbedEmbedder {
    pub fn new() -> Result<Self> {
        let model = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
        )
        .context("initializing fastembed model")?;
        Ok(Self {
            model: RwLock::new(model),
            dim: 384,
        })
    }

    fn normalize(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.write().await;
        let embeddings = model
            .embed(vec![text.to_string()], None)
            .context("embedding text")?;
        let vec = embeddings
            .into_iter()
            .next()
            .context("embedder returned no vectors")?;
        Ok(Self::normalize(vec))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Cosine similarity assuming both inputs are already unit-normalized
/// (a plain dot product then).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_product_of_identical_unit_vectors_is_one() {
        let v = vec![1.0_f32, 0.0, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn dot_product_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
