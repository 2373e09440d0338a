// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types for cache entries and pools

use thiserror::Error;

/// Errors surfaced when acquiring a cached entry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The designated loader failed before the entry became ready.
    /// Every waiter on the entry receives the loader's reason.
    #[error("Loading {key} failed: {reason}")]
    LoadFailed { key: String, reason: String },

    /// The entry was popped or evicted from its pool
    #[error("Entry {key} has been evicted from the pool")]
    Evicted { key: String },
}

impl CacheError {
    /// Get error code for logging and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            CacheError::LoadFailed { .. } => "LOAD_FAILED",
            CacheError::Evicted { .. } => "EVICTED",
        }
    }

    /// Key of the entry this error refers to
    pub fn key(&self) -> &str {
        match self {
            CacheError::LoadFailed { key, .. } | CacheError::Evicted { key } => key,
        }
    }
}
