// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Knowledge base service
//!
//! [`KbService`] owns the embedding registry and both vector store pools.
//! It is constructed once at startup and passed to whoever needs it; there
//! are no process-wide pools. [`KbService::shutdown`] persists resident
//! knowledge bases (when configured) and unloads everything.
//!
//! All methods block: they may wait on entry locks, read or write index
//! files, or call a remote embedding service. Async callers should run them
//! on `tokio::task::spawn_blocking`.

use crate::cache::PoolKey;
use crate::config::{AppConfig, ConfigError};
use crate::embeddings::{EmbeddingError, EmbeddingRegistry};
use crate::text_splitter::SentenceTextSplitter;
use crate::vector::{
    Document, IndexKind, KbKey, KbVectorPool, MemoVectorPool, VectorStoreError, VectorStoreHandle,
};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from constructing the service
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Documents to add to a store
#[derive(Debug, Clone, Default)]
pub struct NewDocuments {
    pub texts: Vec<String>,
    pub metadatas: Option<Vec<Map<String, Value>>>,
    pub ids: Option<Vec<String>>,
    /// Split each text into chunks of at most this many characters first
    pub chunk_size: Option<usize>,
}

/// Search parameters; `None` falls back to the configured defaults
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
}

/// Options for loading or creating a knowledge base store
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub vector_name: Option<String>,
    pub create: bool,
    pub embed_model: Option<String>,
    pub index: Option<IndexKind>,
}

/// Snapshot of a resident store
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoreInfo {
    pub key: String,
    pub embed_model: String,
    pub index: IndexKind,
    pub dimensions: usize,
    pub docs_count: usize,
}

/// What [`KbService::shutdown`] did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub saved: usize,
    pub unloaded_kb: usize,
    pub unloaded_memo: usize,
}

/// Owner of the knowledge base and memo vector store pools
pub struct KbService {
    config: AppConfig,
    registry: Arc<EmbeddingRegistry>,
    kb_pool: KbVectorPool,
    memo_pool: MemoVectorPool,
}

impl KbService {
    /// Validate `config`, build the embedding registry and both pools
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        config.validate()?;
        let registry = Arc::new(EmbeddingRegistry::from_config(&config)?);
        Ok(Self::with_registry(config, registry)?)
    }

    /// Build the service around an existing registry
    pub fn with_registry(
        config: AppConfig,
        registry: Arc<EmbeddingRegistry>,
    ) -> Result<Self, ConfigError> {
        let default_index = config.index_kind()?;
        let kb_pool = KbVectorPool::new(
            config.kb_root_path.clone(),
            config.cached_vs_num,
            Arc::clone(&registry),
            default_index,
        );
        let memo_pool = MemoVectorPool::new(
            config.cached_memo_vs_num,
            Arc::clone(&registry),
            default_index,
        );

        info!(
            kb_root = %config.kb_root_path.display(),
            kb_capacity = ?kb_pool.base().capacity(),
            memo_capacity = ?memo_pool.base().capacity(),
            embed_model = registry.default_model_name(),
            index = %default_index,
            "knowledge base service initialised"
        );

        Ok(Self {
            config,
            registry,
            kb_pool,
            memo_pool,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &EmbeddingRegistry {
        &self.registry
    }

    pub fn kb_pool(&self) -> &KbVectorPool {
        &self.kb_pool
    }

    pub fn memo_pool(&self) -> &MemoVectorPool {
        &self.memo_pool
    }

    /// Create-or-get a knowledge base store
    pub fn load_kb(&self, kb_name: &str, options: &LoadOptions) -> Result<StoreInfo, VectorStoreError> {
        let entry = self.kb_pool.load_vector_store(
            kb_name,
            options.vector_name.as_deref(),
            options.create,
            options.embed_model.as_deref(),
            options.index,
        )?;
        store_info(&entry)
    }

    /// Add documents to a knowledge base, creating its store if needed
    pub fn add_kb_documents(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
        documents: NewDocuments,
    ) -> Result<Vec<String>, VectorStoreError> {
        let entry = self
            .kb_pool
            .load_vector_store(kb_name, vector_name, true, None, None)?;
        add_documents(&entry, documents)
    }

    /// Similarity search over an existing knowledge base
    pub fn search_kb(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        let entry = self
            .kb_pool
            .load_vector_store(kb_name, vector_name, false, None, None)?;
        self.search(&entry, query, params)
    }

    /// Delete documents from an existing knowledge base
    pub fn delete_kb_documents(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
        ids: &[String],
    ) -> Result<usize, VectorStoreError> {
        let entry = self
            .kb_pool
            .load_vector_store(kb_name, vector_name, false, None, None)?;
        let mut store = entry.acquire("delete")?;
        let removed = store.delete(ids)?;
        info!(key = %entry.key(), removed, "deleted documents");
        Ok(removed)
    }

    /// Delete every document of an existing knowledge base
    pub fn clear_kb(&self, kb_name: &str, vector_name: Option<&str>) -> Result<usize, VectorStoreError> {
        let entry = self
            .kb_pool
            .load_vector_store(kb_name, vector_name, false, None, None)?;
        entry.clear()
    }

    /// Persist a resident knowledge base
    pub fn save_kb(&self, kb_name: &str, vector_name: Option<&str>) -> Result<bool, VectorStoreError> {
        self.kb_pool.save_vector_store(kb_name, vector_name)
    }

    /// Drop a resident knowledge base without saving
    pub fn unload_kb(&self, kb_name: &str, vector_name: Option<&str>) -> Result<bool, VectorStoreError> {
        self.kb_pool.unload_vector_store(kb_name, vector_name)
    }

    /// Add documents to an in-memory store, creating it if needed
    pub fn add_memo_documents(
        &self,
        name: &str,
        documents: NewDocuments,
    ) -> Result<Vec<String>, VectorStoreError> {
        let entry = self.memo_pool.load_vector_store(name, None, None)?;
        add_documents(&entry, documents)
    }

    /// Similarity search over an in-memory store
    pub fn search_memo(
        &self,
        name: &str,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        let entry = self
            .memo_pool
            .base()
            .get(&name.to_string())
            .ok_or_else(|| VectorStoreError::NotFound(name.to_string()))?;
        self.search(&entry, query, params)
    }

    /// Info for every resident knowledge base store, sorted by key.
    /// Stores that are still loading or failed are skipped.
    pub fn resident_kbs(&self) -> Vec<StoreInfo> {
        let mut keys: Vec<KbKey> = self.kb_pool.base().keys();
        keys.sort_by_key(|key| key.to_string());
        keys.iter()
            .filter_map(|key| self.kb_pool.base().get(key))
            .filter(|entry| entry.is_ready())
            .filter_map(|entry| store_info(&entry).ok())
            .collect()
    }

    /// Persist resident knowledge bases if configured, then unload both pools
    pub fn shutdown(&self) -> ShutdownReport {
        let saved = if self.config.save_on_shutdown {
            self.kb_pool.save_all()
        } else {
            0
        };
        let report = ShutdownReport {
            saved,
            unloaded_kb: self.kb_pool.base().unload_all(),
            unloaded_memo: self.memo_pool.base().unload_all(),
        };

        info!(
            saved = report.saved,
            unloaded_kb = report.unloaded_kb,
            unloaded_memo = report.unloaded_memo,
            "knowledge base service shut down"
        );
        report
    }

    fn search<K: PoolKey>(
        &self,
        entry: &VectorStoreHandle<K>,
        query: &str,
        params: &SearchParams,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        let top_k = params.top_k.unwrap_or(self.config.top_k);
        let threshold = params.score_threshold.unwrap_or(self.config.score_threshold);
        let store = entry.acquire("search")?;
        store.similarity_search_with_score(query, top_k, threshold)
    }
}

impl fmt::Debug for KbService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KbService")
            .field("kb_root", &self.config.kb_root_path)
            .field("default_model", &self.registry.default_model_name())
            .field("kb_pool", &self.kb_pool)
            .field("memo_pool", &self.memo_pool)
            .finish()
    }
}

fn store_info<K: PoolKey>(entry: &VectorStoreHandle<K>) -> Result<StoreInfo, VectorStoreError> {
    let store = entry.acquire("info")?;
    Ok(StoreInfo {
        key: entry.key().to_string(),
        embed_model: store.embed_model().to_string(),
        index: store.index_kind(),
        dimensions: store.dimensions(),
        docs_count: store.docs_count(),
    })
}

fn add_documents<K: PoolKey>(
    entry: &VectorStoreHandle<K>,
    documents: NewDocuments,
) -> Result<Vec<String>, VectorStoreError> {
    let NewDocuments {
        texts,
        metadatas,
        ids,
        chunk_size,
    } = documents;

    let (texts, metadatas, ids) = match chunk_size {
        Some(chunk_size) => {
            if ids.is_some() {
                return Err(VectorStoreError::InvalidInput(
                    "ids cannot be combined with chunk_size".to_string(),
                ));
            }
            let (texts, metadatas) = chunk_texts(texts, metadatas, chunk_size)?;
            (texts, metadatas, None)
        }
        None => (texts, metadatas, ids),
    };

    let mut store = entry.acquire("add")?;
    let added = store.add_texts(&texts, metadatas, ids)?;
    info!(key = %entry.key(), added = added.len(), docs = store.docs_count(), "added documents");
    Ok(added)
}

/// Split texts into chunks, copying each text's metadata onto its chunks
fn chunk_texts(
    texts: Vec<String>,
    metadatas: Option<Vec<Map<String, Value>>>,
    chunk_size: usize,
) -> Result<(Vec<String>, Option<Vec<Map<String, Value>>>), VectorStoreError> {
    if chunk_size == 0 {
        return Err(VectorStoreError::InvalidInput(
            "chunk_size must be greater than 0".to_string(),
        ));
    }
    if let Some(metadatas) = &metadatas {
        if metadatas.len() != texts.len() {
            return Err(VectorStoreError::InvalidInput(format!(
                "expected {} metadatas, got {}",
                texts.len(),
                metadatas.len()
            )));
        }
    }

    let splitter = SentenceTextSplitter::new(chunk_size);
    let mut chunks = Vec::new();
    let mut chunk_metadatas = metadatas.as_ref().map(|_| Vec::new());

    for (i, text) in texts.iter().enumerate() {
        for chunk in splitter.split_text(text) {
            chunks.push(chunk);
            if let (Some(out), Some(metadatas)) = (chunk_metadatas.as_mut(), metadatas.as_ref()) {
                out.push(metadatas[i].clone());
            }
        }
    }

    Ok((chunks, chunk_metadatas))
}
