// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! LRU cache in front of an embedding model
//!
//! Only query embeddings are cached: chat traffic repeats queries far more
//! often than it repeats documents.

use crate::embeddings::{EmbeddingError, Embeddings};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Wraps a model with a bounded query-embedding cache
pub struct CachedEmbeddings {
    inner: Arc<dyn Embeddings>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CachedEmbeddings {
    pub fn new(inner: Arc<dyn Embeddings>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// (hits, misses) for query lookups
    pub fn stats(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

impl Embeddings for CachedEmbeddings {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_documents(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(vector) = self.cache.lock().get(text) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(vector.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        // Computed outside the cache lock; a concurrent miss on the same
        // text just computes the same vector twice.
        let vector = self.inner.embed_query(text)?;
        self.cache.lock().put(text.to_string(), vector.clone());
        Ok(vector)
    }
}
