// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Knowledge base and memo store endpoints

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{
    add_documents_handler, clear_handler, delete_documents_handler, health_handler, load_handler,
    memo_add_documents_handler, memo_search_handler, pool_handler, save_handler, search_handler,
    unload_handler,
};
pub use request::{
    AddDocumentsRequest, DeleteDocumentsRequest, LoadRequest, SearchRequest, VectorNameQuery,
};
pub use response::{
    AddDocumentsResponse, DeleteResponse, HealthResponse, PoolResponse, PoolStatus, SaveResponse,
    SearchHit, SearchResponse, StoreInfoResponse, UnloadResponse,
};
