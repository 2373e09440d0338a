// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! HTTP tests for the knowledge base endpoints
//!
//! Requests go straight through the router with `oneshot`, no listener.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use kb_vector_pool::{api::create_router, AppConfig, KbService};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

/// Helper: Router over a fresh service rooted in `dir`
fn setup_app(dir: &TempDir) -> Router {
    let config = AppConfig {
        kb_root_path: dir.path().to_path_buf(),
        embedding_model: "hash-64".to_string(),
        embedding_dimensions: 64,
        cached_vs_num: 2,
        ..AppConfig::default()
    };
    let service = KbService::new(config).expect("Failed to create service");
    create_router(Arc::new(service))
}

/// Helper: Send a request and decode the JSON response
async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["kbResident"], 0);
}

#[tokio::test]
async fn test_load_without_body_creates_store() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = send(&app, Method::POST, "/v1/kb/samples/load", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "samples/hash-64");
    assert_eq!(body["embedModel"], "hash-64");
    assert_eq!(body["index"], "flat");
    assert_eq!(body["dimensions"], 64);
    assert_eq!(body["docsCount"], 0);

    assert!(dir
        .path()
        .join("samples/vector_store/hash-64/index.bin")
        .exists());
}

#[tokio::test]
async fn test_load_with_options() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/load",
        Some(json!({"vectorName": "approx", "index": "hnsw"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "samples/approx");
    assert_eq!(body["index"], "hnsw");

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/load",
        Some(json!({"index": "IndexIVFPQ"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorType"], "invalid_request");
}

#[tokio::test]
async fn test_missing_kb_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/nowhere/load",
        Some(json!({"create": false})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/kb/nowhere/search",
        Some(json!({"query": "anything"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_add_search_delete_flow() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/documents",
        Some(json!({
            "texts": [
                "axum routes requests to handlers",
                "tokio schedules async tasks",
                "serde turns structs into json"
            ],
            "metadatas": [{"source": "axum.md"}, {"source": "tokio.md"}, {"source": "serde.md"}],
            "ids": ["axum", "tokio", "serde"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 3);
    assert_eq!(body["ids"], json!(["axum", "tokio", "serde"]));

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/search",
        Some(json!({"query": "tokio async tasks", "topK": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert!(!results.is_empty() && results.len() <= 2);
    assert_eq!(results[0]["id"], "tokio");
    assert_eq!(results[0]["pageContent"], "tokio schedules async tasks");
    assert_eq!(results[0]["metadata"]["source"], "tokio.md");

    // Unknown ids reject the whole delete
    let (status, body) = send(
        &app,
        Method::DELETE,
        "/v1/kb/samples/documents",
        Some(json!({"ids": ["tokio", "missing"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_IDS");

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/v1/kb/samples/documents",
        Some(json!({"ids": ["tokio"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (_, body) = send(&app, Method::POST, "/v1/kb/samples/load", None).await;
    assert_eq!(body["docsCount"], 2);
}

#[tokio::test]
async fn test_save_unload_reload() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    send(
        &app,
        Method::POST,
        "/v1/kb/samples/documents",
        Some(json!({"texts": ["persist this document"]})),
    )
    .await;

    let (status, body) = send(&app, Method::POST, "/v1/kb/samples/save", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["saved"], true);

    let (_, body) = send(&app, Method::POST, "/v1/kb/samples/unload", None).await;
    assert_eq!(body["unloaded"], true);
    let (_, body) = send(&app, Method::POST, "/v1/kb/samples/unload", None).await;
    assert_eq!(body["unloaded"], false);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/search",
        Some(json!({"query": "persist this document", "topK": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["pageContent"], "persist this document");
}

#[tokio::test]
async fn test_clear_with_vector_name_query() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    send(
        &app,
        Method::POST,
        "/v1/kb/samples/documents",
        Some(json!({"texts": ["one", "two"], "vectorName": "notes"})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/clear?vectorName=notes",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);

    // The default vector name was never created
    let (status, _) = send(&app, Method::POST, "/v1/kb/samples/clear", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_validation() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/search",
        Some(json!({"query": "  "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorType"], "validation_error");
    assert_eq!(body["details"]["field"], "query");

    let (status, _) = send(
        &app,
        Method::POST,
        "/v1/kb/samples/documents",
        Some(json!({"texts": ["a"], "ids": ["x"], "chunkSize": 50})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/kb/..%2Fescape/documents",
        Some(json!({"texts": ["a"]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_INPUT");
}

#[tokio::test]
async fn test_pool_status() {
    let dir = TempDir::new().unwrap();
    let app = setup_app(&dir);

    for kb in ["a", "b", "c"] {
        send(&app, Method::POST, &format!("/v1/kb/{}/load", kb), None).await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let (status, body) = send(&app, Method::GET, "/v1/pool", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kb"]["capacity"], 2);
    assert_eq!(body["kb"]["resident"], json!(["b/hash-64", "c/hash-64"]));
    assert_eq!(body["kb"]["metrics"]["evictions"], 1);
    assert_eq!(body["stores"].as_array().unwrap().len(), 2);
    assert_eq!(body["models"][0]["name"], "hash-64");
    assert_eq!(body["models"][0]["is_default"], true);
}
