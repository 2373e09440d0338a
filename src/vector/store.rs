// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector store: a [`VectorIndex`] paired with an in-memory document store
//!
//! Documents are keyed by string id (UUID v4 unless the caller supplies one).
//! The index only knows dense internal ids; two maps translate between them.
//!
//! ## On-disk layout
//!
//! ```text
//! <dir>/index.bin    bincode: index kind, dimensions, internal id -> vector
//! <dir>/index.json   JSON: embedding model, documents, internal id -> document id
//! ```
//!
//! The presence of `index.bin` marks a store as already built. Both files are
//! written under a temporary name and renamed into place.

use crate::embeddings::{EmbeddingRegistry, Embeddings};
use crate::vector::errors::VectorStoreError;
use crate::vector::index::{build_index, validate_vector, IndexKind, VectorIndex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// File holding the serialised index
pub const INDEX_FILE: &str = "index.bin";
/// File holding the document store
pub const DOCSTORE_FILE: &str = "index.json";

/// A stored text chunk with arbitrary JSON metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    kind: IndexKind,
    dimensions: usize,
    vectors: Vec<(usize, Vec<f32>)>,
}

#[derive(Serialize, Deserialize)]
struct PersistedDocstore {
    embed_model: String,
    next_index_id: usize,
    docstore: HashMap<String, Document>,
    index_to_docstore_id: BTreeMap<usize, String>,
}

/// Embedding-backed document store with similarity search
pub struct VectorStore {
    embeddings: Arc<dyn Embeddings>,
    index: Box<dyn VectorIndex>,
    docstore: HashMap<String, Document>,
    index_to_docstore_id: BTreeMap<usize, String>,
    docstore_to_index_id: HashMap<String, usize>,
    next_index_id: usize,
}

impl VectorStore {
    /// Create an empty store sized for the embedding model
    pub fn new(embeddings: Arc<dyn Embeddings>, kind: IndexKind) -> Self {
        let index = build_index(kind, embeddings.dimensions());
        Self {
            embeddings,
            index,
            docstore: HashMap::new(),
            index_to_docstore_id: BTreeMap::new(),
            docstore_to_index_id: HashMap::new(),
            next_index_id: 0,
        }
    }

    pub fn embed_model(&self) -> &str {
        self.embeddings.model_name()
    }

    pub fn index_kind(&self) -> IndexKind {
        self.index.kind()
    }

    pub fn dimensions(&self) -> usize {
        self.index.dimensions()
    }

    /// Number of stored documents
    pub fn docs_count(&self) -> usize {
        self.docstore.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docstore.contains_key(id)
    }

    /// All document ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.docstore.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.docstore.get(id)
    }

    /// Embed and insert texts, returning the ids of the new documents.
    ///
    /// `metadatas` and `ids`, when given, must have one element per text.
    pub fn add_texts(
        &mut self,
        texts: &[String],
        metadatas: Option<Vec<Map<String, Value>>>,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>, VectorStoreError> {
        if let Some(metadatas) = &metadatas {
            check_len("metadatas", metadatas.len(), texts.len())?;
        }
        let ids = self.assign_ids(texts.len(), ids)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let vectors = self.embeddings.embed_documents(texts)?;
        check_len("embeddings", vectors.len(), texts.len())?;

        let metadatas = metadatas.unwrap_or_else(|| vec![Map::new(); texts.len()]);
        let documents = texts
            .iter()
            .zip(metadatas)
            .map(|(text, metadata)| Document::new(text.clone()).with_metadata(metadata))
            .collect();

        self.insert_embedded(ids, documents, vectors)
    }

    /// Embed and insert documents
    pub fn add_documents(
        &mut self,
        documents: Vec<Document>,
        ids: Option<Vec<String>>,
    ) -> Result<Vec<String>, VectorStoreError> {
        let (texts, metadatas): (Vec<String>, Vec<Map<String, Value>>) = documents
            .into_iter()
            .map(|doc| (doc.page_content, doc.metadata))
            .unzip();
        self.add_texts(&texts, Some(metadatas), ids)
    }

    /// Embed `query` and return up to `k` documents scoring at least
    /// `score_threshold`, best first. Each returned document carries its id in
    /// `metadata["id"]`.
    pub fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        let embedding = self.embeddings.embed_query(query)?;
        self.similarity_search_by_vector(&embedding, k, score_threshold)
    }

    /// Search with a precomputed query embedding
    pub fn similarity_search_by_vector(
        &self,
        embedding: &[f32],
        k: usize,
        score_threshold: f32,
    ) -> Result<Vec<(Document, f32)>, VectorStoreError> {
        let hits = self.index.search(embedding, k)?;

        let mut results = Vec::with_capacity(hits.len());
        for (index_id, score) in hits {
            if score < score_threshold {
                continue;
            }
            let doc_id = self.index_to_docstore_id.get(&index_id).ok_or_else(|| {
                VectorStoreError::InvariantViolation(format!(
                    "index id {} has no document",
                    index_id
                ))
            })?;
            let mut document = self.docstore.get(doc_id).cloned().ok_or_else(|| {
                VectorStoreError::InvariantViolation(format!("document {} is missing", doc_id))
            })?;
            document
                .metadata
                .insert("id".to_string(), Value::String(doc_id.clone()));
            results.push((document, score));
        }

        Ok(results)
    }

    /// Delete documents by id. If any id is unknown nothing is removed.
    ///
    /// Returns the number of documents removed.
    pub fn delete(&mut self, ids: &[String]) -> Result<usize, VectorStoreError> {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !self.docstore.contains_key(id.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(VectorStoreError::MissingIds(missing));
        }

        let unique: HashSet<&String> = ids.iter().collect();
        for id in &unique {
            self.docstore.remove(id.as_str());
            if let Some(index_id) = self.docstore_to_index_id.remove(id.as_str()) {
                self.index_to_docstore_id.remove(&index_id);
                self.index.remove(index_id);
            }
        }

        Ok(unique.len())
    }

    /// Delete every document
    pub fn delete_all(&mut self) -> Result<usize, VectorStoreError> {
        let ids = self.ids();
        self.delete(&ids)
    }

    /// Persist the store into `dir`, creating it if needed
    pub fn save_local(&self, dir: &Path) -> Result<(), VectorStoreError> {
        fs::create_dir_all(dir)?;

        let index = PersistedIndex {
            kind: self.index.kind(),
            dimensions: self.index.dimensions(),
            vectors: self.index.vectors(),
        };
        let docstore = PersistedDocstore {
            embed_model: self.embed_model().to_string(),
            next_index_id: self.next_index_id,
            docstore: self.docstore.clone(),
            index_to_docstore_id: self.index_to_docstore_id.clone(),
        };

        // The docstore goes first: index.bin marks the store as built
        write_atomic(dir, DOCSTORE_FILE, &serde_json::to_vec(&docstore)?)?;
        write_atomic(dir, INDEX_FILE, &bincode::serialize(&index)?)?;

        debug!(
            path = %dir.display(),
            docs = self.docs_count(),
            "vector store written"
        );
        Ok(())
    }

    /// Whether `dir` holds a persisted store
    pub fn exists_local(dir: &Path) -> bool {
        dir.join(INDEX_FILE).is_file()
    }

    /// Load a store persisted by [`save_local`](Self::save_local), resolving
    /// the recorded embedding model through `registry`
    pub fn load_local(dir: &Path, registry: &EmbeddingRegistry) -> Result<Self, VectorStoreError> {
        let index_bytes = fs::read(dir.join(INDEX_FILE))?;
        let persisted_index: PersistedIndex = bincode::deserialize(&index_bytes)?;
        let docstore_bytes = fs::read(dir.join(DOCSTORE_FILE))?;
        let persisted_docs: PersistedDocstore = serde_json::from_slice(&docstore_bytes)?;

        let embeddings = registry.get(Some(&persisted_docs.embed_model))?;
        if embeddings.dimensions() != persisted_index.dimensions {
            return Err(VectorStoreError::DimensionMismatch {
                expected: persisted_index.dimensions,
                actual: embeddings.dimensions(),
            });
        }

        let mut index = build_index(persisted_index.kind, persisted_index.dimensions);
        for (index_id, vector) in &persisted_index.vectors {
            index.add(*index_id, vector)?;
        }

        let store = Self::from_parts(embeddings, index, persisted_docs)?;
        debug!(path = %dir.display(), docs = store.docs_count(), "vector store read");
        Ok(store)
    }

    fn from_parts(
        embeddings: Arc<dyn Embeddings>,
        index: Box<dyn VectorIndex>,
        persisted: PersistedDocstore,
    ) -> Result<Self, VectorStoreError> {
        let docstore_to_index_id: HashMap<String, usize> = persisted
            .index_to_docstore_id
            .iter()
            .map(|(index_id, doc_id)| (doc_id.clone(), *index_id))
            .collect();

        let consistent = index.len() == persisted.index_to_docstore_id.len()
            && docstore_to_index_id.len() == persisted.docstore.len()
            && persisted
                .docstore
                .keys()
                .all(|id| docstore_to_index_id.contains_key(id));
        if !consistent {
            return Err(VectorStoreError::InvariantViolation(format!(
                "persisted index holds {} vectors for {} documents",
                index.len(),
                persisted.docstore.len()
            )));
        }

        let next_index_id = persisted
            .index_to_docstore_id
            .keys()
            .next_back()
            .map(|last| last + 1)
            .unwrap_or(0)
            .max(persisted.next_index_id);

        Ok(Self {
            embeddings,
            index,
            docstore: persisted.docstore,
            index_to_docstore_id: persisted.index_to_docstore_id,
            docstore_to_index_id,
            next_index_id,
        })
    }

    fn assign_ids(&self, count: usize, ids: Option<Vec<String>>) -> Result<Vec<String>, VectorStoreError> {
        let ids = match ids {
            Some(ids) => {
                check_len("ids", ids.len(), count)?;
                ids
            }
            None => return Ok((0..count).map(|_| Uuid::new_v4().to_string()).collect()),
        };

        let mut seen = HashSet::with_capacity(ids.len());
        for id in &ids {
            if id.is_empty() {
                return Err(VectorStoreError::InvalidInput("document id must not be empty".to_string()));
            }
            if !seen.insert(id.as_str()) || self.docstore.contains_key(id) {
                return Err(VectorStoreError::InvalidInput(format!(
                    "document id {} already exists",
                    id
                )));
            }
        }
        Ok(ids)
    }

    fn insert_embedded(
        &mut self,
        ids: Vec<String>,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Vec<String>, VectorStoreError> {
        // Validate everything before touching the index so a bad vector
        // leaves the store unchanged
        for vector in &vectors {
            validate_vector(vector, self.index.dimensions())?;
        }

        for ((id, document), vector) in ids.iter().zip(documents).zip(&vectors) {
            let index_id = self.next_index_id;
            self.index.add(index_id, vector)?;
            self.next_index_id += 1;
            self.index_to_docstore_id.insert(index_id, id.clone());
            self.docstore_to_index_id.insert(id.clone(), index_id);
            self.docstore.insert(id.clone(), document);
        }

        Ok(ids)
    }
}

impl fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VectorStore")
            .field("embed_model", &self.embed_model())
            .field("index", &self.index.kind())
            .field("dimensions", &self.dimensions())
            .field("docs", &self.docs_count())
            .finish()
    }
}

fn check_len(what: &str, actual: usize, expected: usize) -> Result<(), VectorStoreError> {
    if actual != expected {
        return Err(VectorStoreError::InvalidInput(format!(
            "expected {} {}, got {}",
            expected, what, actual
        )));
    }
    Ok(())
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), VectorStoreError> {
    let tmp = dir.join(format!("{}.tmp", name));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, dir.join(name))?;
    Ok(())
}
