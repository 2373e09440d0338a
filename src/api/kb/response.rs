// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Knowledge base API response types

use crate::cache::CacheMetricsSnapshot;
use crate::embeddings::ModelInfo;
use crate::service::StoreInfo;
use crate::vector::{Document, IndexKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Response for GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub kb_resident: usize,
    pub memo_resident: usize,
}

/// State of one pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStatus {
    /// `None` when unbounded
    pub capacity: Option<usize>,
    pub resident: Vec<String>,
    pub metrics: CacheMetricsSnapshot,
}

/// Response for GET /v1/pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolResponse {
    pub kb: PoolStatus,
    pub memo: PoolStatus,
    pub stores: Vec<StoreInfoResponse>,
    pub models: Vec<ModelInfo>,
}

/// A resident store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreInfoResponse {
    pub key: String,
    pub embed_model: String,
    pub index: IndexKind,
    pub dimensions: usize,
    pub docs_count: usize,
}

impl From<StoreInfo> for StoreInfoResponse {
    fn from(info: StoreInfo) -> Self {
        Self {
            key: info.key,
            embed_model: info.embed_model,
            index: info.index,
            dimensions: info.dimensions,
            docs_count: info.docs_count,
        }
    }
}

/// Response for document additions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDocumentsResponse {
    pub ids: Vec<String>,
    pub count: usize,
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: String,
    pub page_content: String,
    pub metadata: Map<String, Value>,
    pub score: f32,
}

impl From<(Document, f32)> for SearchHit {
    fn from((document, score): (Document, f32)) -> Self {
        let id = document
            .metadata
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            id,
            page_content: document.page_content,
            metadata: document.metadata,
            score,
        }
    }
}

/// Response for searches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

/// Response for delete and clear
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted: usize,
}

/// Response for save
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResponse {
    /// False when the store was not resident
    pub saved: bool,
}

/// Response for unload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnloadResponse {
    /// False when the store was not resident
    pub unloaded: bool,
}
