// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use crate::vector::VectorStoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    InvalidRequest(String),
    ValidationError {
        field: String,
        message: String,
    },
    /// Operation failed with a vector store error code
    Store {
        status: u16,
        code: &'static str,
        message: String,
        retryable: bool,
    },
    ServiceUnavailable(String),
    InternalError(String),
}

impl ApiError {
    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, message, code, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone(), None, None),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None, None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), None, Some(details))
            }
            ApiError::Store {
                status,
                code,
                message,
                retryable,
            } => {
                let error_type = match status {
                    404 => "not_found",
                    400 => "invalid_request",
                    503 => "service_unavailable",
                    _ => "internal_error",
                };
                let mut details = HashMap::new();
                details.insert(
                    "retryable".to_string(),
                    serde_json::Value::Bool(*retryable),
                );
                (
                    error_type,
                    message.clone(),
                    Some(code.to_string()),
                    Some(details),
                )
            }
            ApiError::ServiceUnavailable(msg) => ("service_unavailable", msg.clone(), None, None),
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None, None),
        };

        ErrorResponse {
            error_type: error_type.to_string(),
            message,
            code,
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_) | ApiError::ValidationError { .. } => 400,
            ApiError::Store { status, .. } => *status,
            ApiError::ServiceUnavailable(_) => 503,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl From<VectorStoreError> for ApiError {
    fn from(err: VectorStoreError) -> Self {
        let status = match &err {
            VectorStoreError::NotFound(_) => 404,
            VectorStoreError::LoadFailure { .. } | VectorStoreError::Evicted(_) => 503,
            e if e.is_client_error() => 400,
            e if e.is_retryable() => 503,
            _ => 500,
        };
        if status == 500 {
            tracing::error!(code = err.error_code(), error = %err, "vector store operation failed");
        }

        ApiError::Store {
            status,
            code: err.error_code(),
            message: err.user_message(),
            retryable: err.is_retryable(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::Store { code, message, .. } => write!(f, "{}: {}", code, message),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}
