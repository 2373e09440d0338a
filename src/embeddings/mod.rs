// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Embedding functions
//!
//! Vector stores only see the [`Embeddings`] trait: a deterministic mapping
//! from text to fixed-length vectors. Concrete models are registered by name
//! in an [`EmbeddingRegistry`].

pub mod cached;
pub mod hash_model;
pub mod http_model;
pub mod registry;

use thiserror::Error;

pub use cached::CachedEmbeddings;
pub use hash_model::HashEmbeddings;
pub use http_model::HttpEmbeddings;
pub use registry::{EmbeddingRegistry, ModelInfo};

/// Errors produced while computing embeddings
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// No model registered under this name
    #[error("Unknown embedding model: {0}")]
    UnknownModel(String),

    /// Model returned vectors of the wrong length
    #[error("Embedding dimension mismatch for {model}: expected {expected}, got {actual}")]
    DimensionMismatch {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// Remote embedding request failed
    #[error("Embedding request failed: {0}")]
    Request(String),

    /// Remote embedding service returned an unusable body
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingError {
    /// Get error code for logging and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            EmbeddingError::UnknownModel(_) => "UNKNOWN_EMBEDDING_MODEL",
            EmbeddingError::DimensionMismatch { .. } => "EMBEDDING_DIMENSION_MISMATCH",
            EmbeddingError::Request(_) => "EMBEDDING_REQUEST_FAILED",
            EmbeddingError::InvalidResponse(_) => "EMBEDDING_INVALID_RESPONSE",
        }
    }
}

/// A text embedding function.
///
/// Implementations must be deterministic per model and free of side effects
/// visible to callers.
pub trait Embeddings: Send + Sync {
    /// Registered model name
    fn model_name(&self) -> &str;

    /// Length of every produced vector
    fn dimensions(&self) -> usize;

    /// Embed a batch of documents, one vector per input text
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_documents(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| {
            EmbeddingError::InvalidResponse(format!(
                "{} returned no vector for the query",
                self.model_name()
            ))
        })
    }
}

/// Scale a vector to unit length. Zero and non-finite magnitudes are left as is.
pub fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let magnitude: f32 = vector.iter().map(|&x| x * x).sum::<f32>().sqrt();

    if magnitude == 0.0 || !magnitude.is_finite() {
        return vector.to_vec();
    }

    vector.iter().map(|&x| x / magnitude).collect()
}
