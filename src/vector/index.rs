// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vector index kinds
//!
//! A [`VectorIndex`] stores L2-normalised vectors under caller-assigned
//! internal ids and answers nearest-neighbour queries by cosine similarity
//! (inner product of unit vectors). Higher scores are better.
//!
//! | Kind | Search | Names accepted |
//! |------|--------|----------------|
//! | [`IndexKind::Flat`] | exact, brute force | `flat`, `IndexFlatIP` |
//! | [`IndexKind::Hnsw`] | approximate graph search | `hnsw`, `IndexHNSWFlat` |

use crate::embeddings::normalize_vector;
use crate::vector::errors::VectorStoreError;
use crate::vector::hnsw::HnswIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Supported index constructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Exact inner-product search
    #[default]
    Flat,
    /// Hierarchical navigable small world graph
    Hnsw,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::Hnsw => "hnsw",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexKind {
    type Err = VectorStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" | "indexflatip" => Ok(IndexKind::Flat),
            "hnsw" | "indexhnswflat" => Ok(IndexKind::Hnsw),
            _ => Err(VectorStoreError::UnknownIndexKind(s.to_string())),
        }
    }
}

/// Nearest-neighbour index over unit vectors keyed by internal id.
///
/// Indices are not safe for concurrent mutation; callers serialise access
/// through the owning cache entry.
pub trait VectorIndex: Send + Sync {
    fn kind(&self) -> IndexKind;

    fn dimensions(&self) -> usize;

    /// Number of live vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert a vector under `id`. The vector is normalised before storage.
    fn add(&mut self, id: usize, vector: &[f32]) -> Result<(), VectorStoreError>;

    /// Remove `id`, returning whether it was present
    fn remove(&mut self, id: usize) -> bool;

    /// Up to `k` `(id, score)` pairs sorted by descending score
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, VectorStoreError>;

    /// Every live `(id, vector)` pair in ascending id order, for persistence
    fn vectors(&self) -> Vec<(usize, Vec<f32>)>;
}

/// Build an empty index of the given kind
pub fn build_index(kind: IndexKind, dimensions: usize) -> Box<dyn VectorIndex> {
    match kind {
        IndexKind::Flat => Box::new(FlatIndex::new(dimensions)),
        IndexKind::Hnsw => Box::new(HnswIndex::new(dimensions)),
    }
}

/// Check length and finiteness of a vector against an index
pub(crate) fn validate_vector(vector: &[f32], dimensions: usize) -> Result<(), VectorStoreError> {
    if vector.len() != dimensions {
        return Err(VectorStoreError::DimensionMismatch {
            expected: dimensions,
            actual: vector.len(),
        });
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(VectorStoreError::InvalidVector);
    }
    Ok(())
}

pub(crate) fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Sort by descending score, ties broken by ascending id
pub(crate) fn rank(mut scored: Vec<(usize, f32)>, k: usize) -> Vec<(usize, f32)> {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored
}

/// Exact inner-product index
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    vectors: BTreeMap<usize, Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: BTreeMap::new(),
        }
    }
}

impl VectorIndex for FlatIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, id: usize, vector: &[f32]) -> Result<(), VectorStoreError> {
        validate_vector(vector, self.dimensions)?;
        self.vectors.insert(id, normalize_vector(vector));
        Ok(())
    }

    fn remove(&mut self, id: usize) -> bool {
        self.vectors.remove(&id).is_some()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, VectorStoreError> {
        validate_vector(query, self.dimensions)?;
        if k == 0 || self.vectors.is_empty() {
            return Ok(Vec::new());
        }

        let query = normalize_vector(query);
        let scored = self
            .vectors
            .iter()
            .map(|(id, vector)| (*id, dot(&query, vector)))
            .collect();
        Ok(rank(scored, k))
    }

    fn vectors(&self) -> Vec<(usize, Vec<f32>)> {
        self.vectors
            .iter()
            .map(|(id, vector)| (*id, vector.clone()))
            .collect()
    }
}
