// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Knowledge base HTTP handlers
//!
//! Every pool operation can block on entry locks or disk I/O, so handlers
//! hand the work to `spawn_blocking` and only await its completion.

use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::api::kb::{
    AddDocumentsRequest, AddDocumentsResponse, DeleteDocumentsRequest, DeleteResponse,
    HealthResponse, LoadRequest, PoolResponse, PoolStatus, SaveResponse, SearchHit,
    SearchRequest, SearchResponse, StoreInfoResponse, UnloadResponse, VectorNameQuery,
};
use crate::cache::PoolKey;
use crate::service::KbService;
use crate::vector::{VectorStoreError, VectorStorePool};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

/// Run a blocking service call on the blocking thread pool
async fn run_blocking<T, F>(service: &Arc<KbService>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&KbService) -> Result<T, VectorStoreError> + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(service);
    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ApiError::InternalError(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

fn pool_status<K: PoolKey>(pool: &VectorStorePool<K>) -> PoolStatus {
    let mut resident: Vec<String> = pool.keys().iter().map(|key| key.to_string()).collect();
    resident.sort();
    PoolStatus {
        capacity: pool.capacity(),
        resident,
        metrics: pool.metrics(),
    }
}

/// GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        kb_resident: state.service.kb_pool().base().len(),
        memo_resident: state.service.memo_pool().base().len(),
    })
}

/// GET /v1/pool
pub async fn pool_handler(State(state): State<AppState>) -> Result<Json<PoolResponse>, ApiError> {
    // Reading store info acquires entries, which may wait on a loader
    let response = run_blocking(&state.service, |service| {
        Ok(PoolResponse {
            kb: pool_status(service.kb_pool().base()),
            memo: pool_status(service.memo_pool().base()),
            stores: service
                .resident_kbs()
                .into_iter()
                .map(StoreInfoResponse::from)
                .collect(),
            models: service.registry().list_models(),
        })
    })
    .await?;
    Ok(Json(response))
}

/// POST /v1/kb/:kb/load
///
/// Body (optional): `{"vectorName": "...", "create": true, "embedModel": "...", "index": "flat"}`
pub async fn load_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    body: Option<Json<LoadRequest>>,
) -> Result<Json<StoreInfoResponse>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let options = request.into_options().map_err(ApiError::InvalidRequest)?;

    let info = run_blocking(&state.service, move |service| service.load_kb(&kb, &options)).await?;
    Ok(Json(info.into()))
}

/// POST /v1/kb/:kb/documents
pub async fn add_documents_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Json(request): Json<AddDocumentsRequest>,
) -> Result<Json<AddDocumentsResponse>, ApiError> {
    request.validate().map_err(ApiError::InvalidRequest)?;
    let vector_name = request.vector_name.clone();

    let ids = run_blocking(&state.service, move |service| {
        service.add_kb_documents(&kb, vector_name.as_deref(), request.into_documents())
    })
    .await?;

    Ok(Json(AddDocumentsResponse {
        count: ids.len(),
        ids,
    }))
}

/// POST /v1/kb/:kb/search
pub async fn search_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    request.validate().map_err(|message| ApiError::ValidationError {
        field: "query".to_string(),
        message,
    })?;

    let results = run_blocking(&state.service, move |service| {
        service.search_kb(
            &kb,
            request.vector_name.as_deref(),
            &request.query,
            &request.params(),
        )
    })
    .await?;

    Ok(Json(SearchResponse {
        results: results.into_iter().map(SearchHit::from).collect(),
    }))
}

/// DELETE /v1/kb/:kb/documents
pub async fn delete_documents_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Json(request): Json<DeleteDocumentsRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    request.validate().map_err(ApiError::InvalidRequest)?;

    let deleted = run_blocking(&state.service, move |service| {
        service.delete_kb_documents(&kb, request.vector_name.as_deref(), &request.ids)
    })
    .await?;

    Ok(Json(DeleteResponse { deleted }))
}

/// POST /v1/kb/:kb/save
pub async fn save_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Query(query): Query<VectorNameQuery>,
) -> Result<Json<SaveResponse>, ApiError> {
    let saved = run_blocking(&state.service, move |service| {
        service.save_kb(&kb, query.vector_name.as_deref())
    })
    .await?;
    Ok(Json(SaveResponse { saved }))
}

/// POST /v1/kb/:kb/unload
///
/// Drops the in-memory store without saving it.
pub async fn unload_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Query(query): Query<VectorNameQuery>,
) -> Result<Json<UnloadResponse>, ApiError> {
    let unloaded = run_blocking(&state.service, move |service| {
        service.unload_kb(&kb, query.vector_name.as_deref())
    })
    .await?;
    Ok(Json(UnloadResponse { unloaded }))
}

/// POST /v1/kb/:kb/clear
pub async fn clear_handler(
    State(state): State<AppState>,
    Path(kb): Path<String>,
    Query(query): Query<VectorNameQuery>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let deleted = run_blocking(&state.service, move |service| {
        service.clear_kb(&kb, query.vector_name.as_deref())
    })
    .await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// POST /v1/memo/:name/documents
pub async fn memo_add_documents_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<AddDocumentsRequest>,
) -> Result<Json<AddDocumentsResponse>, ApiError> {
    request.validate().map_err(ApiError::InvalidRequest)?;

    let ids = run_blocking(&state.service, move |service| {
        service.add_memo_documents(&name, request.into_documents())
    })
    .await?;

    Ok(Json(AddDocumentsResponse {
        count: ids.len(),
        ids,
    }))
}

/// POST /v1/memo/:name/search
pub async fn memo_search_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    request.validate().map_err(|message| ApiError::ValidationError {
        field: "query".to_string(),
        message,
    })?;

    let results = run_blocking(&state.service, move |service| {
        service.search_memo(&name, &request.query, &request.params())
    })
    .await?;

    Ok(Json(SearchResponse {
        results: results.into_iter().map(SearchHit::from).collect(),
    }))
}
