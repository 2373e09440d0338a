// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Knowledge base API request types

use crate::service::{LoadOptions, NewDocuments, SearchParams};
use crate::vector::IndexKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Maximum texts accepted in one add request
pub const MAX_TEXTS_PER_REQUEST: usize = 1000;

/// Maximum query length in characters
pub const MAX_QUERY_LENGTH: usize = 2000;

/// Query string selecting a vector store within a knowledge base
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorNameQuery {
    pub vector_name: Option<String>,
}

/// Request body for POST /v1/kb/:kb/load
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    #[serde(default)]
    pub vector_name: Option<String>,

    /// Create an empty store if none is persisted (default true)
    #[serde(default = "default_create")]
    pub create: bool,

    #[serde(default)]
    pub embed_model: Option<String>,

    /// `flat` or `hnsw`; only used when the store is created
    #[serde(default)]
    pub index: Option<String>,
}

fn default_create() -> bool {
    true
}

impl Default for LoadRequest {
    fn default() -> Self {
        Self {
            vector_name: None,
            create: default_create(),
            embed_model: None,
            index: None,
        }
    }
}

impl LoadRequest {
    /// Validate the request and convert it into load options
    pub fn into_options(self) -> Result<LoadOptions, String> {
        let index = match self.index {
            Some(name) => Some(name.parse::<IndexKind>().map_err(|e| e.to_string())?),
            None => None,
        };
        Ok(LoadOptions {
            vector_name: self.vector_name,
            create: self.create,
            embed_model: self.embed_model,
            index,
        })
    }
}

/// Request body for POST /v1/kb/:kb/documents and /v1/memo/:name/documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDocumentsRequest {
    pub texts: Vec<String>,

    #[serde(default)]
    pub metadatas: Option<Vec<Map<String, Value>>>,

    #[serde(default)]
    pub ids: Option<Vec<String>>,

    /// Split texts into sentence-aligned chunks of at most this many characters
    #[serde(default)]
    pub chunk_size: Option<usize>,

    #[serde(default)]
    pub vector_name: Option<String>,
}

impl AddDocumentsRequest {
    /// Validate the request
    pub fn validate(&self) -> Result<(), String> {
        if self.texts.is_empty() {
            return Err("texts cannot be empty".to_string());
        }
        if self.texts.len() > MAX_TEXTS_PER_REQUEST {
            return Err(format!(
                "too many texts (max {})",
                MAX_TEXTS_PER_REQUEST
            ));
        }
        if let Some(metadatas) = &self.metadatas {
            if metadatas.len() != self.texts.len() {
                return Err("metadatas must have one entry per text".to_string());
            }
        }
        if let Some(ids) = &self.ids {
            if ids.len() != self.texts.len() {
                return Err("ids must have one entry per text".to_string());
            }
        }
        if self.chunk_size == Some(0) {
            return Err("chunkSize must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn into_documents(self) -> NewDocuments {
        NewDocuments {
            texts: self.texts,
            metadatas: self.metadatas,
            ids: self.ids,
            chunk_size: self.chunk_size,
        }
    }
}

/// Request body for POST /v1/kb/:kb/search and /v1/memo/:name/search
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,

    /// Number of results (configured default when absent)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Minimum similarity in [0, 1] (configured default when absent)
    #[serde(default)]
    pub score_threshold: Option<f32>,

    #[serde(default)]
    pub vector_name: Option<String>,
}

impl SearchRequest {
    /// Validate the request
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("Query cannot be empty".to_string());
        }
        if self.query.chars().count() > MAX_QUERY_LENGTH {
            return Err(format!(
                "Query too long (max {} characters)",
                MAX_QUERY_LENGTH
            ));
        }
        if self.top_k == Some(0) {
            return Err("topK must be at least 1".to_string());
        }
        if let Some(threshold) = self.score_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err("scoreThreshold must be between 0 and 1".to_string());
            }
        }
        Ok(())
    }

    pub fn params(&self) -> SearchParams {
        SearchParams {
            top_k: self.top_k,
            score_threshold: self.score_threshold,
        }
    }
}

/// Request body for DELETE /v1/kb/:kb/documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDocumentsRequest {
    pub ids: Vec<String>,

    #[serde(default)]
    pub vector_name: Option<String>,
}

impl DeleteDocumentsRequest {
    /// Validate the request
    pub fn validate(&self) -> Result<(), String> {
        if self.ids.is_empty() {
            return Err("ids cannot be empty".to_string());
        }
        Ok(())
    }
}
