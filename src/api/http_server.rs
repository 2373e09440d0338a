// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::kb::{
    add_documents_handler, clear_handler, delete_documents_handler, health_handler, load_handler,
    memo_add_documents_handler, memo_search_handler, pool_handler, save_handler, search_handler,
    unload_handler,
};
use crate::service::KbService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<KbService>,
}

/// Build the HTTP router over a shared service
pub fn create_router(service: Arc<KbService>) -> Router {
    let state = AppState { service };

    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Pool state
        .route("/v1/pool", get(pool_handler))
        // Knowledge base stores
        .route("/v1/kb/:kb/load", post(load_handler))
        .route(
            "/v1/kb/:kb/documents",
            post(add_documents_handler).delete(delete_documents_handler),
        )
        .route("/v1/kb/:kb/search", post(search_handler))
        .route("/v1/kb/:kb/save", post(save_handler))
        .route("/v1/kb/:kb/unload", post(unload_handler))
        .route("/v1/kb/:kb/clear", post(clear_handler))
        // In-memory stores
        .route("/v1/memo/:name/documents", post(memo_add_documents_handler))
        .route("/v1/memo/:name/search", post(memo_search_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves
pub async fn start_server<F>(
    service: Arc<KbService>,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
