// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector store pools
//!
//! [`KbVectorPool`] caches disk-backed stores keyed by (knowledge base,
//! vector name); [`MemoVectorPool`] caches in-memory scratch stores keyed by
//! name. Both run the load-or-create protocol of
//! [`CachePool::get_or_load`]: one caller builds or reads the store outside
//! the pool lock while concurrent callers for the same key wait on the entry.
//!
//! ```rust,ignore
//! let entry = kb_pool.load_vector_store("samples", None, true, None, None)?;
//! let mut store = entry.acquire("ingest")?;
//! store.add_texts(&texts, None, None)?;
//! drop(store);
//! kb_pool.save_vector_store("samples", None)?;
//! ```

use crate::cache::{CacheEntry, CacheMetricsSnapshot, CachePool, PinnedEntry, PoolKey};
use crate::embeddings::EmbeddingRegistry;
use crate::vector::errors::VectorStoreError;
use crate::vector::index::IndexKind;
use crate::vector::store::VectorStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Directory under each knowledge base holding its vector stores
pub const VECTOR_STORE_DIR: &str = "vector_store";

/// Cache entry wrapping a vector store
pub type VectorStoreEntry<K> = CacheEntry<K, VectorStore>;

/// Pinned handle on a resident vector store, as returned by the pools
pub type VectorStoreHandle<K> = PinnedEntry<K, VectorStore>;

/// Operations on a resident vector store, each under the entry lock
impl<K: PoolKey> CacheEntry<K, VectorStore> {
    /// Number of documents in the store
    pub fn docs_count(&self) -> Result<usize, VectorStoreError> {
        let store = self.acquire("docs_count")?;
        Ok(store.docs_count())
    }

    /// Persist the store into `dir`
    pub fn save(&self, dir: &Path) -> Result<(), VectorStoreError> {
        let store = self.acquire("save")?;
        store.save_local(dir)?;
        info!(
            key = %self.key(),
            path = %dir.display(),
            docs = store.docs_count(),
            "saved vector store"
        );
        Ok(())
    }

    /// Delete every document, failing loudly if any survive
    pub fn clear(&self) -> Result<usize, VectorStoreError> {
        let mut store = self.acquire("clear")?;
        let removed = store.delete_all()?;

        let remaining = store.docs_count();
        if remaining != 0 {
            error!(
                key = %self.key(),
                remaining,
                "documents remain after clearing vector store"
            );
            return Err(VectorStoreError::InvariantViolation(format!(
                "{} documents remain in {} after clear",
                remaining,
                self.key()
            )));
        }

        info!(key = %self.key(), removed, "cleared vector store");
        Ok(removed)
    }
}

/// Shared machinery for vector store pools
pub struct VectorStorePool<K: PoolKey> {
    cache: CachePool<K, VectorStore>,
    registry: Arc<EmbeddingRegistry>,
    default_index: IndexKind,
}

impl<K: PoolKey> VectorStorePool<K> {
    /// `cache_num <= 0` means unbounded
    pub fn new(cache_num: i64, registry: Arc<EmbeddingRegistry>, default_index: IndexKind) -> Self {
        Self {
            cache: CachePool::from_cache_num(cache_num),
            registry,
            default_index,
        }
    }

    pub fn cache(&self) -> &CachePool<K, VectorStore> {
        &self.cache
    }

    pub fn registry(&self) -> &EmbeddingRegistry {
        &self.registry
    }

    pub fn default_index(&self) -> IndexKind {
        self.default_index
    }

    pub fn get(&self, key: &K) -> Option<VectorStoreHandle<K>> {
        self.cache.get(key)
    }

    pub fn keys(&self) -> Vec<K> {
        self.cache.keys()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.cache.capacity()
    }

    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.cache.metrics()
    }

    /// Build an empty store for `embed_model` (registry default when `None`)
    pub fn new_vector_store(
        &self,
        embed_model: Option<&str>,
        index: Option<IndexKind>,
    ) -> Result<VectorStore, VectorStoreError> {
        let embeddings = self.registry.get(embed_model)?;
        Ok(VectorStore::new(
            embeddings,
            index.unwrap_or(self.default_index),
        ))
    }

    /// Drop a store from memory without saving it
    pub fn unload(&self, key: &K) -> bool {
        match self.cache.pop(key) {
            Some(_) => {
                info!(key = %key, "unloaded vector store");
                true
            }
            None => false,
        }
    }

    /// Drop every resident store without saving
    pub fn unload_all(&self) -> usize {
        let unloaded = self.cache.clear().len();
        if unloaded > 0 {
            info!(count = unloaded, "unloaded all vector stores");
        }
        unloaded
    }

    fn load_or_create<F>(&self, key: K, load: F) -> Result<VectorStoreHandle<K>, VectorStoreError>
    where
        F: FnOnce(&K) -> Result<VectorStore, VectorStoreError>,
    {
        self.cache.get_or_load(key, load)
    }

    /// Compare the requested model and index kind with a resident store.
    ///
    /// A resident store is never rebuilt for different settings, so a
    /// mismatch is logged and reported as `true`.
    fn check_resident_settings(
        &self,
        entry: &VectorStoreHandle<K>,
        embed_model: Option<&str>,
        index: Option<IndexKind>,
    ) -> Result<bool, VectorStoreError> {
        if embed_model.is_none() && index.is_none() {
            return Ok(false);
        }

        // Lock through the inner entry so the handle stays pinned
        let store = entry.entry().acquire("settings check")?;
        let model_differs = embed_model.is_some_and(|model| model != store.embed_model());
        let index_differs = index.is_some_and(|kind| kind != store.index_kind());
        if model_differs || index_differs {
            warn!(
                key = %entry.key(),
                requested_model = ?embed_model,
                resident_model = store.embed_model(),
                requested_index = ?index,
                resident_index = %store.index_kind(),
                "vector store already resident with different settings, keeping it"
            );
        }
        Ok(model_differs || index_differs)
    }
}

impl<K: PoolKey> fmt::Debug for VectorStorePool<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStorePool")
            .field("cache", &self.cache)
            .field("default_index", &self.default_index)
            .finish()
    }
}

/// Key of a disk-backed vector store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KbKey {
    pub kb_name: String,
    pub vector_name: String,
}

impl KbKey {
    pub fn new(kb_name: impl Into<String>, vector_name: impl Into<String>) -> Self {
        Self {
            kb_name: kb_name.into(),
            vector_name: vector_name.into(),
        }
    }
}

impl fmt::Display for KbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kb_name, self.vector_name)
    }
}

/// Pool of knowledge base vector stores persisted under a root directory
#[derive(Debug)]
pub struct KbVectorPool {
    base: VectorStorePool<KbKey>,
    kb_root: PathBuf,
}

impl KbVectorPool {
    pub fn new(
        kb_root: impl Into<PathBuf>,
        cache_num: i64,
        registry: Arc<EmbeddingRegistry>,
        default_index: IndexKind,
    ) -> Self {
        Self {
            base: VectorStorePool::new(cache_num, registry, default_index),
            kb_root: kb_root.into(),
        }
    }

    pub fn base(&self) -> &VectorStorePool<KbKey> {
        &self.base
    }

    pub fn kb_root(&self) -> &Path {
        &self.kb_root
    }

    /// Resolve the pool key; the vector name defaults to the embedding model
    pub fn key(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
        embed_model: Option<&str>,
    ) -> Result<KbKey, VectorStoreError> {
        validate_name("knowledge base name", kb_name)?;
        let vector_name = vector_name
            .or(embed_model)
            .unwrap_or_else(|| self.base.registry().default_model_name());
        validate_name("vector name", vector_name)?;
        Ok(KbKey::new(kb_name, vector_name))
    }

    /// Directory holding the persisted store for `key`
    pub fn vs_path(&self, key: &KbKey) -> PathBuf {
        self.kb_root
            .join(&key.kb_name)
            .join(VECTOR_STORE_DIR)
            .join(&key.vector_name)
    }

    /// Get the resident store for a knowledge base, loading it from disk or
    /// creating (and persisting) an empty one on first use.
    ///
    /// # Errors
    ///
    /// - [`VectorStoreError::NotFound`] if nothing is persisted and `create` is false
    /// - any load or build error, which is also delivered to concurrent waiters
    pub fn load_vector_store(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
        create: bool,
        embed_model: Option<&str>,
        index: Option<IndexKind>,
    ) -> Result<VectorStoreHandle<KbKey>, VectorStoreError> {
        let key = self.key(kb_name, vector_name, embed_model)?;

        let entry = self.base.load_or_create(key, |key| {
            let path = self.vs_path(key);
            if VectorStore::exists_local(&path) {
                let store = VectorStore::load_local(&path, self.base.registry())?;
                info!(
                    key = %key,
                    path = %path.display(),
                    docs = store.docs_count(),
                    "loaded vector store from disk"
                );
                Ok(store)
            } else if create {
                let store = self.base.new_vector_store(embed_model, index)?;
                store.save_local(&path)?;
                info!(
                    key = %key,
                    path = %path.display(),
                    index = %store.index_kind(),
                    "created empty vector store"
                );
                Ok(store)
            } else {
                Err(VectorStoreError::NotFound(key.to_string()))
            }
        })?;
        self.base.check_resident_settings(&entry, embed_model, index)?;
        Ok(entry)
    }

    /// Persist a resident store. Returns false if it is not loaded.
    pub fn save_vector_store(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
    ) -> Result<bool, VectorStoreError> {
        let key = self.key(kb_name, vector_name, None)?;
        match self.base.get(&key) {
            Some(entry) => {
                entry.save(&self.vs_path(&key))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop a resident store from memory. Unsaved changes are lost.
    pub fn unload_vector_store(
        &self,
        kb_name: &str,
        vector_name: Option<&str>,
    ) -> Result<bool, VectorStoreError> {
        let key = self.key(kb_name, vector_name, None)?;
        Ok(self.base.unload(&key))
    }

    /// Persist every resident store, returning how many were saved.
    /// Stores that fail to save are logged and skipped.
    pub fn save_all(&self) -> usize {
        let mut saved = 0;
        for key in self.base.keys() {
            let Some(entry) = self.base.get(&key) else {
                continue;
            };
            match entry.save(&self.vs_path(&key)) {
                Ok(()) => saved += 1,
                Err(e) => warn!(key = %key, error = %e, "failed to save vector store"),
            }
        }
        saved
    }
}

/// Pool of in-memory vector stores keyed by name
#[derive(Debug)]
pub struct MemoVectorPool {
    base: VectorStorePool<String>,
}

impl MemoVectorPool {
    pub fn new(cache_num: i64, registry: Arc<EmbeddingRegistry>, default_index: IndexKind) -> Self {
        Self {
            base: VectorStorePool::new(cache_num, registry, default_index),
        }
    }

    pub fn base(&self) -> &VectorStorePool<String> {
        &self.base
    }

    /// Get the named store, creating an empty one on first use.
    ///
    /// An already resident store is returned as is; a differing
    /// `embed_model` or `index` is logged and ignored.
    pub fn load_vector_store(
        &self,
        name: &str,
        embed_model: Option<&str>,
        index: Option<IndexKind>,
    ) -> Result<VectorStoreHandle<String>, VectorStoreError> {
        validate_name("memo store name", name)?;

        let entry = self.base.load_or_create(name.to_string(), |key| {
            let store = self.base.new_vector_store(embed_model, index)?;
            info!(
                key = %key,
                embed_model = store.embed_model(),
                "created in-memory vector store"
            );
            Ok(store)
        })?;
        self.base.check_resident_settings(&entry, embed_model, index)?;
        Ok(entry)
    }

    pub fn unload_vector_store(&self, name: &str) -> bool {
        self.base.unload(&name.to_string())
    }
}

/// Names become directory components, so they must be single path segments
fn validate_name(what: &str, name: &str) -> Result<(), VectorStoreError> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(VectorStoreError::InvalidInput(format!(
            "invalid {}: {:?}",
            what, name
        )));
    }
    Ok(())
}
