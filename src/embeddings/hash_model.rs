// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Offline feature-hashing embeddings
//!
//! Each lowercase word token is hashed with SHA-256 into one of `dimensions`
//! buckets with a hash-derived sign, and the resulting bag-of-words vector is
//! L2-normalised. Texts sharing vocabulary get a positive cosine similarity,
//! which is enough for local knowledge bases and tests without a model server.

use crate::embeddings::{normalize_vector, EmbeddingError, Embeddings};
use sha2::{Digest, Sha256};

/// Deterministic bag-of-words embedding model
#[derive(Debug, Clone)]
pub struct HashEmbeddings {
    name: String,
    dimensions: usize,
}

impl HashEmbeddings {
    pub fn new(name: impl Into<String>, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            dimensions: dimensions.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let hash = Sha256::digest(token.as_bytes());

            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&hash[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if hash[8] & 1 == 0 { 1.0 } else { -1.0 };

            embedding[bucket] += sign;
        }

        normalize_vector(&embedding)
    }
}

impl Embeddings for HashEmbeddings {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}
