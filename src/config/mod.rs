// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Loaded from environment variables (after `.env`, see `main.rs`) or from a
//! TOML file with the same field names. Missing values fall back to the
//! defaults below.

use crate::vector::IndexKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors from loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`AppConfig`]
    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },

    /// A value is out of range or inconsistent
    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Get error code for logging and metrics
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::Read { .. } => "CONFIG_READ_FAILED",
            ConfigError::Parse { .. } => "CONFIG_PARSE_FAILED",
            ConfigError::Invalid { .. } => "CONFIG_INVALID",
        }
    }
}

/// Configuration for the knowledge base service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory holding one folder per knowledge base
    pub kb_root_path: PathBuf,
    /// Resident disk-backed vector stores (`<= 0` = unbounded)
    pub cached_vs_num: i64,
    /// Resident in-memory vector stores (`<= 0` = unbounded)
    pub cached_memo_vs_num: i64,
    /// Default embedding model name
    pub embedding_model: String,
    /// Embedding vector length
    pub embedding_dimensions: usize,
    /// Remote `/v1/embed` endpoint serving `embedding_model`
    pub embedding_api_url: Option<String>,
    /// Query embedding LRU size (0 disables the cache)
    pub embedding_cache_size: usize,
    /// Index kind for newly created stores (Flat when unset)
    pub default_index: Option<String>,
    /// Default minimum similarity for search results
    pub score_threshold: f32,
    /// Default number of search results
    pub top_k: usize,
    /// HTTP bind address
    pub api_host: String,
    /// HTTP port
    pub api_port: u16,
    /// Persist resident knowledge bases on shutdown
    pub save_on_shutdown: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            kb_root_path: PathBuf::from("./knowledge_base"),
            cached_vs_num: 1,
            cached_memo_vs_num: 10,
            embedding_model: "hash-384".to_string(),
            embedding_dimensions: 384,
            embedding_api_url: None,
            embedding_cache_size: 1024,
            default_index: None,
            score_threshold: 0.0,
            top_k: 3,
            api_host: "127.0.0.1".to_string(),
            api_port: 7861,
            save_on_shutdown: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            kb_root_path: env::var("KB_ROOT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.kb_root_path),
            cached_vs_num: parse_env("CACHED_VS_NUM").unwrap_or(defaults.cached_vs_num),
            cached_memo_vs_num: parse_env("CACHED_MEMO_VS_NUM")
                .unwrap_or(defaults.cached_memo_vs_num),
            embedding_model: env::var("EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dimensions: parse_env("EMBEDDING_DIMENSIONS")
                .unwrap_or(defaults.embedding_dimensions),
            embedding_api_url: env::var("EMBEDDING_API_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            embedding_cache_size: parse_env("EMBEDDING_CACHE_SIZE")
                .unwrap_or(defaults.embedding_cache_size),
            default_index: env::var("VS_INDEX_TYPE").ok().filter(|kind| !kind.is_empty()),
            score_threshold: parse_env("SCORE_THRESHOLD").unwrap_or(defaults.score_threshold),
            top_k: parse_env("VECTOR_SEARCH_TOP_K").unwrap_or(defaults.top_k),
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: parse_env("API_PORT").unwrap_or(defaults.api_port),
            save_on_shutdown: env::var("SAVE_ON_SHUTDOWN")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.save_on_shutdown),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dimensions == 0 {
            return Err(ConfigError::invalid(
                "embedding_dimensions",
                "must be greater than 0",
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::invalid("embedding_model", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(ConfigError::invalid(
                "score_threshold",
                format!("{} is outside [0, 1]", self.score_threshold),
            ));
        }
        if self.top_k == 0 {
            return Err(ConfigError::invalid("top_k", "must be greater than 0"));
        }
        self.index_kind()?;
        Ok(())
    }

    /// Index kind for newly created stores
    pub fn index_kind(&self) -> Result<IndexKind, ConfigError> {
        match &self.default_index {
            Some(name) => IndexKind::from_str(name)
                .map_err(|e| ConfigError::invalid("default_index", e.to_string())),
            None => Ok(IndexKind::default()),
        }
    }

    /// Socket address string for the HTTP server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
