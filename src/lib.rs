// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod cache;
pub mod config;
pub mod embeddings;
pub mod service;
pub mod text_splitter;
pub mod vector;

// Re-export main types
pub use cache::{CacheEntry, CacheError, CachePool, EntryGuard, PinnedEntry, PoolKey};
pub use config::{AppConfig, ConfigError};
pub use embeddings::{EmbeddingError, EmbeddingRegistry, Embeddings};
pub use service::{KbService, ServiceError};
pub use vector::{Document, IndexKind, KbVectorPool, MemoVectorPool, VectorStore, VectorStoreError};
