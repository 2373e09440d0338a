// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! HTTP tests for the in-memory memo store endpoints

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use kb_vector_pool::{api::create_router, AppConfig, KbService};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

fn setup_app(dir: &TempDir) -> Router {
    let config = AppConfig {
        kb_root_path: dir.path().to_path_buf(),
        embedding_model: "hash-64".to_string(),
        embedding_dimensions: 64,
        ..AppConfig::default()
    };
    create_router(Arc::new(KbService::new(config).unwrap()))
}

async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_memo_add_and_search() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = post_json(
        &app,
        "/v1/memo/chat-42/documents",
        json!({
            "texts": ["The user prefers dark mode. The user lives in Lisbon."],
            "metadatas": [{"turn": 3}],
            "chunkSize": 30
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, body) = post_json(
        &app,
        "/v1/memo/chat-42/search",
        json!({"query": "where does the user live in Lisbon", "topK": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let hit = &body["results"][0];
    assert_eq!(hit["pageContent"], "The user lives in Lisbon.");
    assert_eq!(hit["metadata"]["turn"], 3);
    assert_eq!(hit["id"], hit["metadata"]["id"]);

    // Memo stores never touch the knowledge base root
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_memo_search_unknown_store() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = post_json(&app, "/v1/memo/ghost/search", json!({"query": "hello"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorType"], "not_found");
}

#[tokio::test]
async fn test_memo_rejects_mismatched_metadata() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = post_json(
        &app,
        "/v1/memo/chat-42/documents",
        json!({"texts": ["a", "b"], "metadatas": [{}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorType"], "invalid_request");
}
