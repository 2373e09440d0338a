// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HNSW index for approximate vector search
//!
//! Hierarchical Navigable Small World graph over cosine distance, backed by
//! `hnsw_rs`. The graph itself cannot delete points, so removed ids are
//! tombstoned: they stay in the graph, are filtered out of results, and the
//! graph is rebuilt from the live vectors once tombstones outnumber them.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kb_vector_pool::vector::{HnswIndex, VectorIndex};
//!
//! let mut index = HnswIndex::new(384);
//! index.add(0, &embedding)?;
//!
//! for (id, score) in index.search(&query, 10)? {
//!     println!("{}: {:.3}", id, score);
//! }
//! ```

use crate::embeddings::normalize_vector;
use crate::vector::errors::VectorStoreError;
use crate::vector::index::{dot, rank, validate_vector, IndexKind, VectorIndex};
use hnsw_rs::hnsw::{Hnsw, Neighbour};
use hnsw_rs::prelude::*;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Connections per layer (M parameter)
const MAX_NB_CONNECTION: usize = 12;
/// ef during construction (lower = faster build)
const EF_CONSTRUCTION: usize = 48;
/// hnsw_rs supports at most 16 layers
const MAX_LAYER: usize = 16;
/// Initial capacity hint for a fresh graph
const INITIAL_CAPACITY: usize = 1024;
/// Tombstones tolerated before a rebuild is considered
const MIN_TOMBSTONES_FOR_REBUILD: usize = 64;

/// Approximate nearest-neighbour index
pub struct HnswIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// Live normalised vectors by internal id
    live: BTreeMap<usize, Vec<f32>>,
    /// Ids present in the graph but removed from the index
    tombstones: HashSet<usize>,
    dimensions: usize,
}

impl HnswIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            hnsw: new_graph(INITIAL_CAPACITY),
            live: BTreeMap::new(),
            tombstones: HashSet::new(),
            dimensions,
        }
    }

    /// Number of removed ids still present in the graph
    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Rebuild the graph from live vectors, dropping all tombstones
    pub fn rebuild(&mut self) {
        let mut hnsw = new_graph(self.live.len().max(INITIAL_CAPACITY));
        for (id, vector) in &self.live {
            hnsw.insert((vector.as_slice(), *id));
        }
        hnsw.set_searching_mode(true);

        self.hnsw = hnsw;
        self.tombstones.clear();
    }

    fn needs_rebuild(&self) -> bool {
        self.tombstones.len() >= MIN_TOMBSTONES_FOR_REBUILD && self.tombstones.len() > self.live.len()
    }
}

fn new_graph(max_elements: usize) -> Hnsw<'static, f32, DistCosine> {
    Hnsw::new(
        MAX_NB_CONNECTION,
        max_elements,
        MAX_LAYER,
        EF_CONSTRUCTION,
        DistCosine,
    )
}

impl VectorIndex for HnswIndex {
    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.live.len()
    }

    fn add(&mut self, id: usize, vector: &[f32]) -> Result<(), VectorStoreError> {
        validate_vector(vector, self.dimensions)?;
        let normalized = normalize_vector(vector);

        // The graph still has a stale point under this id
        if self.tombstones.remove(&id) || self.live.contains_key(&id) {
            self.live.insert(id, normalized);
            self.rebuild();
            return Ok(());
        }

        self.hnsw.insert((normalized.as_slice(), id));
        self.live.insert(id, normalized);
        Ok(())
    }

    fn remove(&mut self, id: usize) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }
        self.tombstones.insert(id);
        if self.needs_rebuild() {
            self.rebuild();
        }
        true
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, VectorStoreError> {
        validate_vector(query, self.dimensions)?;
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }

        let normalized_query = normalize_vector(query);

        // Oversample so tombstoned neighbours do not starve the result
        let fetch = (k + self.tombstones.len()).min(self.live.len() + self.tombstones.len());
        let ef_search = (fetch * 2).max(50);
        let neighbours: Vec<Neighbour> = self.hnsw.search(&normalized_query, fetch, ef_search);

        // Scores come from the stored vectors so both index kinds agree exactly
        let scored = neighbours
            .into_iter()
            .filter_map(|neighbour| {
                self.live
                    .get(&neighbour.d_id)
                    .map(|vector| (neighbour.d_id, dot(&normalized_query, vector)))
            })
            .collect();

        Ok(rank(scored, k))
    }

    fn vectors(&self) -> Vec<(usize, Vec<f32>)> {
        self.live
            .iter()
            .map(|(id, vector)| (*id, vector.clone()))
            .collect()
    }
}

impl fmt::Debug for HnswIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HnswIndex")
            .field("dimensions", &self.dimensions)
            .field("live", &self.live.len())
            .field("tombstones", &self.tombstones.len())
            .finish()
    }
}
