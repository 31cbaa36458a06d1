//! Embedding provider: test case text to fixed-length vectors.
//!
//! The [`EmbeddingBackend`] trait is the boundary to whatever produces the
//! vectors (a remote OpenAI-compatible service, a local fastembed model, or
//! the deterministic hashing backend used offline). [`EmbeddingProvider`]
//! wraps a backend with input truncation, batching and a content-addressed
//! cache that is shared by all workers.

mod hashed;
mod http;
#[cfg(feature = "local-embeddings")]
mod local;
mod provider;

pub use hashed::HashedEmbeddings;
pub use http::OpenAiEmbeddings;
#[cfg(feature = "local-embeddings")]
pub use local::FastEmbedBackend;
pub use provider::{CacheStats, EmbeddingCache, EmbeddingProvider};

use std::sync::Arc;
use thiserror::Error;

use crate::config::EmbeddingConfig;

/// Errors from embedding backends.
///
/// Provider errors reach the caller unchanged; nothing here retries.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Failed to initialize embedding backend: {0}")]
    Init(String),

    #[error("Unknown embedding provider '{0}' (expected openai, fastembed or hashed)")]
    UnknownProvider(String),

    #[error("Missing API key: environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Embedding API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Embedding generation failed: {0}")]
    Generation(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Upstream embedding service.
///
/// Implementations must return exactly one vector per input text, in input
/// order, all of length [`dimension`](Self::dimension).
pub trait EmbeddingBackend: Send + Sync {
    fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn name(&self) -> &str;
}

/// Default dimension for backends that do not dictate one.
pub const DEFAULT_DIMENSION: usize = 384;

/// Build the backend named by `config.provider`.
pub fn create_backend(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingBackend>> {
    match config.provider.to_lowercase().as_str() {
        "openai" | "azure" => Ok(Arc::new(OpenAiEmbeddings::from_config(config)?)),
        "hashed" | "hash" => Ok(Arc::new(HashedEmbeddings::new(
            config.dimensions.unwrap_or(DEFAULT_DIMENSION),
        ))),
        #[cfg(feature = "local-embeddings")]
        "fastembed" | "local" => Ok(Arc::new(FastEmbedBackend::new(&config.model)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "fastembed" | "local" => Err(EmbeddingError::Init(
            "fastembed support is not compiled in (enable the `local-embeddings` feature)"
                .to_string(),
        )),
        other => Err(EmbeddingError::UnknownProvider(other.to_string())),
    }
}

/// Cosine similarity remapped from `[-1, 1]` to `[0, 1]` via `(cos + 1) / 2`.
///
/// Zero-norm inputs and length mismatches score 0.0.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let cos = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
    ((cos + 1.0) / 2.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_self_similarity_is_one() {
        let v = vec![0.3, -1.2, 4.0, 0.0];
        assert!((similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-2.0, 0.5, 1.0];
        assert_eq!(similarity(&a, &b), similarity(&b, &a));
    }

    #[test]
    fn test_similarity_range_mapping() {
        let a = vec![1.0, 0.0];
        assert!((similarity(&a, &[-1.0, 0.0]) - 0.0).abs() < 1e-6);
        assert!((similarity(&a, &[0.0, 1.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_vectors() {
        assert_eq!(similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_create_backend_rejects_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(matches!(
            create_backend(&config),
            Err(EmbeddingError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_create_hashed_backend_uses_configured_dimension() {
        let config = EmbeddingConfig {
            provider: "hashed".to_string(),
            dimensions: Some(64),
            ..EmbeddingConfig::default()
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.dimension(), 64);
        assert_eq!(backend.name(), "hashed");
    }
}
