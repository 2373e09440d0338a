// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for vector stores and vector store pools
//!
//! - Not found: no persisted store and creation disallowed
//! - Load failures: deserialisation or construction failed mid-load
//! - Invariant violations: document counts that contradict the operation
//! - Input errors: bad vectors, unknown ids, unknown index kinds or models

use crate::cache::CacheError;
use crate::embeddings::EmbeddingError;
use thiserror::Error;

/// Errors that can occur while loading or operating on a vector store
#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// No persisted store exists and creation was not allowed
    #[error("Vector store not found: {0}")]
    NotFound(String),

    /// Loading or building the store failed
    #[error("Failed to load vector store {key}: {reason}")]
    LoadFailure { key: String, reason: String },

    /// The store was unloaded while the caller was waiting for it
    #[error("Vector store {0} was unloaded")]
    Evicted(String),

    /// Internal consistency check failed
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// Index kind name is not one of the supported kinds
    #[error("Unknown index kind: {0} (supported: flat, hnsw)")]
    UnknownIndexKind(String),

    /// Vector length does not match the index
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Vector contains NaN or Infinity
    #[error("Vector contains NaN or Infinity values")]
    InvalidVector,

    /// Caller-supplied lists do not line up
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Some ids passed to delete do not exist
    #[error("Document ids not found: {}", .0.join(", "))]
    MissingIds(Vec<String>),

    /// Embedding model failure
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Persisted data could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CacheError> for VectorStoreError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::LoadFailed { key, reason } => VectorStoreError::LoadFailure { key, reason },
            CacheError::Evicted { key } => VectorStoreError::Evicted(key),
        }
    }
}

impl From<bincode::Error> for VectorStoreError {
    fn from(err: bincode::Error) -> Self {
        VectorStoreError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for VectorStoreError {
    fn from(err: serde_json::Error) -> Self {
        VectorStoreError::Serialization(err.to_string())
    }
}

impl VectorStoreError {
    /// Get user-friendly error message for API responses
    pub fn user_message(&self) -> String {
        match self {
            VectorStoreError::NotFound(name) => {
                format!("Knowledge base {} has no vector store", name)
            }
            VectorStoreError::LoadFailure { key, .. } => {
                format!("Knowledge base {} could not be loaded, try again later", key)
            }
            VectorStoreError::Evicted(key) => {
                format!("Knowledge base {} was unloaded, try again", key)
            }
            VectorStoreError::InvariantViolation(_) => {
                "Internal consistency error in vector store".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Get error code for logging and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            VectorStoreError::NotFound(_) => "NOT_FOUND",
            VectorStoreError::LoadFailure { .. } => "LOAD_FAILURE",
            VectorStoreError::Evicted(_) => "EVICTED",
            VectorStoreError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            VectorStoreError::UnknownIndexKind(_) => "UNKNOWN_INDEX_KIND",
            VectorStoreError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            VectorStoreError::InvalidVector => "INVALID_VECTOR",
            VectorStoreError::InvalidInput(_) => "INVALID_INPUT",
            VectorStoreError::MissingIds(_) => "MISSING_IDS",
            VectorStoreError::Embedding(err) => err.error_code(),
            VectorStoreError::Serialization(_) => "SERIALIZATION_ERROR",
            VectorStoreError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if a caller may reasonably retry. The pools themselves never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VectorStoreError::Evicted(_)
                | VectorStoreError::LoadFailure { .. }
                | VectorStoreError::Embedding(EmbeddingError::Request(_))
        )
    }

    /// Check if this error is caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            VectorStoreError::NotFound(_)
                | VectorStoreError::UnknownIndexKind(_)
                | VectorStoreError::DimensionMismatch { .. }
                | VectorStoreError::InvalidVector
                | VectorStoreError::InvalidInput(_)
                | VectorStoreError::MissingIds(_)
                | VectorStoreError::Embedding(EmbeddingError::UnknownModel(_))
        )
    }
}
