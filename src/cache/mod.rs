// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Concurrent cache of lazily loaded, lock-guarded resources

pub mod entry;
pub mod errors;
pub mod metrics;
pub mod pool;

use std::fmt::Display;
use std::hash::Hash;

pub use entry::{CacheEntry, EntryGuard, PinnedEntry};
pub use errors::CacheError;
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use pool::{CachePool, PendingLoad, Reservation};

/// Requirements for keys stored in a [`CachePool`]
pub trait PoolKey: Clone + Eq + Hash + Display + Send + Sync + 'static {}

impl<K> PoolKey for K where K: Clone + Eq + Hash + Display + Send + Sync + 'static {}
