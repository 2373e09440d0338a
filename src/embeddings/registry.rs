// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Embedding model registry
//!
//! Maps model names to shared [`Embeddings`] handles. Vector stores record the
//! model name they were built with and resolve it here when reloaded from
//! disk.

use crate::config::AppConfig;
use crate::embeddings::{
    CachedEmbeddings, EmbeddingError, Embeddings, HashEmbeddings, HttpEmbeddings,
};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Information about a registered embedding model
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    /// Model name
    pub name: String,
    /// Embedding dimensions
    pub dimensions: usize,
    /// Whether this is the default model
    pub is_default: bool,
}

/// Registered embedding models by name
#[derive(Clone)]
pub struct EmbeddingRegistry {
    models: HashMap<String, Arc<dyn Embeddings>>,
    default_model: String,
}

impl EmbeddingRegistry {
    /// Create a registry whose default is `default_model`
    pub fn new(default_model: Arc<dyn Embeddings>) -> Self {
        let default_name = default_model.model_name().to_string();
        let mut models = HashMap::new();
        models.insert(default_name.clone(), default_model);

        Self {
            models,
            default_model: default_name,
        }
    }

    /// Build the registry described by the configuration.
    ///
    /// A hash model named `hash-<dimensions>` is always available. When
    /// `embedding_api_url` is set, the configured model name is served by that
    /// endpoint. Every model is fronted by a query cache unless
    /// `embedding_cache_size` is 0.
    pub fn from_config(config: &AppConfig) -> Result<Self, EmbeddingError> {
        let cache_size = NonZeroUsize::new(config.embedding_cache_size);
        let wrap = |model: Arc<dyn Embeddings>| -> Arc<dyn Embeddings> {
            match cache_size {
                Some(capacity) => Arc::new(CachedEmbeddings::new(model, capacity)),
                None => model,
            }
        };

        let hash_name = format!("hash-{}", config.embedding_dimensions);
        let hash_model = wrap(Arc::new(HashEmbeddings::new(
            hash_name.clone(),
            config.embedding_dimensions,
        )));

        let mut registry = Self::new(hash_model);

        if let Some(url) = &config.embedding_api_url {
            let remote = HttpEmbeddings::new(
                config.embedding_model.clone(),
                url.clone(),
                config.embedding_dimensions,
                Duration::from_secs(30),
            )?;
            info!(
                "Registered remote embedding model {} at {}",
                config.embedding_model, url
            );
            registry.register(wrap(Arc::new(remote)));
        }

        registry.set_default(&config.embedding_model)?;

        info!(
            "Embedding registry initialized: {} models, default: {}",
            registry.models.len(),
            registry.default_model
        );

        Ok(registry)
    }

    /// Add or replace a model under its own name
    pub fn register(&mut self, model: Arc<dyn Embeddings>) {
        self.models.insert(model.model_name().to_string(), model);
    }

    /// Change the default model
    pub fn set_default(&mut self, name: &str) -> Result<(), EmbeddingError> {
        if !self.models.contains_key(name) {
            return Err(EmbeddingError::UnknownModel(name.to_string()));
        }
        self.default_model = name.to_string();
        Ok(())
    }

    /// Gets a model by name, or the default model if name is None
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn Embeddings>, EmbeddingError> {
        let model_name = name.unwrap_or(&self.default_model);

        self.models
            .get(model_name)
            .cloned()
            .ok_or_else(|| EmbeddingError::UnknownModel(model_name.to_string()))
    }

    /// Returns the name of the default model
    pub fn default_model_name(&self) -> &str {
        &self.default_model
    }

    /// Lists all registered models, sorted by name
    pub fn list_models(&self) -> Vec<ModelInfo> {
        let mut models: Vec<ModelInfo> = self
            .models
            .iter()
            .map(|(name, model)| ModelInfo {
                name: name.clone(),
                dimensions: model.dimensions(),
                is_default: name == &self.default_model,
            })
            .collect();

        models.sort_by(|a, b| a.name.cmp(&b.name));

        models
    }
}
