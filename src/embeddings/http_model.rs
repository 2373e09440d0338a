// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Remote embeddings over HTTP
//!
//! Talks to a `/v1/embed` style endpoint:
//!
//! ```json
//! // request
//! { "texts": ["text1", "text2"], "model": "all-MiniLM-L6-v2" }
//! // response
//! { "embeddings": [ { "embedding": [0.1, 0.2, ...] }, ... ] }
//! ```
//!
//! Uses the blocking client because pool loads and store operations run on
//! worker threads, never on the async runtime.

use crate::embeddings::{EmbeddingError, Embeddings};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum texts per request accepted by the embed endpoint
const MAX_BATCH_SIZE: usize = 96;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    texts: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbedResponse {
    embeddings: Vec<EmbeddingResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingResult {
    embedding: Vec<f32>,
}

/// Embedding model served by a remote HTTP endpoint
pub struct HttpEmbeddings {
    name: String,
    url: String,
    dimensions: usize,
    client: reqwest::blocking::Client,
}

impl HttpEmbeddings {
    /// Create a client for `model` at `url` (full endpoint URL)
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            dimensions,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest {
                texts,
                model: &self.name,
            })
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let body: EmbedResponse = response
            .json()
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        self.validate(texts.len(), body)
    }

    fn validate(&self, expected: usize, body: EmbedResponse) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if body.embeddings.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                body.embeddings.len()
            )));
        }

        body.embeddings
            .into_iter()
            .map(|result| {
                if result.embedding.len() != self.dimensions {
                    return Err(EmbeddingError::DimensionMismatch {
                        model: self.name.clone(),
                        expected: self.dimensions,
                        actual: result.embedding.len(),
                    });
                }
                Ok(result.embedding)
            })
            .collect()
    }
}

impl Embeddings for HttpEmbeddings {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch)?);
        }
        Ok(vectors)
    }
}
