// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Vector stores and the pools that cache them

pub mod errors;
pub mod hnsw;
pub mod index;
pub mod pool;
pub mod store;

pub use errors::VectorStoreError;
pub use hnsw::HnswIndex;
pub use index::{build_index, FlatIndex, IndexKind, VectorIndex};
pub use pool::{
    KbKey, KbVectorPool, MemoVectorPool, VectorStoreEntry, VectorStoreHandle, VectorStorePool,
};
pub use store::{Document, VectorStore};
