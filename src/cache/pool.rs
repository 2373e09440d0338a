// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Bounded pool of cache entries
//!
//! The pool lock only guards the key → entry map and is held for map
//! operations alone. Loading happens outside it: a missing key gets a
//! loading entry inserted under the pool lock, the lock is released, and the
//! caller that inserted it loads the value while every other caller for the
//! same key blocks in [`CacheEntry::acquire`].
//!
//! ## Eviction
//!
//! When an insert would exceed capacity the pool removes the least recently
//! acquired entry that nobody holds. If every entry is held the pool grows
//! past capacity instead of blocking, and logs a warning. An overflowed pool
//! shrinks back on the next hit or insert once entries are released.
//!
//! Entries leave the pool as [`PinnedEntry`] handles. The pin is taken under
//! the pool lock, so a returned entry stays resident until the caller
//! acquires it or drops the handle.
//!
//! ```rust,ignore
//! let pool: CachePool<String, Index> = CachePool::new(2);
//! let entry = pool.get_or_load("kb1".to_string(), |key| load_index(key))?;
//! let mut index = entry.acquire("worker 1")?;
//! index.add(vectors)?;
//! ```

use crate::cache::entry::{CacheEntry, PinnedEntry};
use crate::cache::metrics::{CacheMetrics, CacheMetricsSnapshot};
use crate::cache::PoolKey;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

type EntryMap<K, T> = HashMap<K, Arc<CacheEntry<K, T>>>;

/// Process-wide mapping from key to [`CacheEntry`] with LRU eviction
pub struct CachePool<K, T> {
    entries: Mutex<EntryMap<K, T>>,
    /// Maximum resident entries, 0 = unbounded
    capacity: usize,
    metrics: CacheMetrics,
}

/// Outcome of [`CachePool::reserve`]
pub enum Reservation<'a, K: PoolKey, T> {
    /// The key already had an entry (possibly still loading)
    Existing(PinnedEntry<K, T>),
    /// A new loading entry was inserted; the caller is its loader
    Reserved(PendingLoad<'a, K, T>),
}

impl<K: PoolKey, T> CachePool<K, T> {
    /// Create a pool holding at most `capacity` entries (0 = unbounded)
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
            metrics: CacheMetrics::default(),
        }
    }

    /// Create a pool from a configured cache size where `<= 0` means unbounded
    pub fn from_cache_num(cache_num: i64) -> Self {
        Self::new(usize::try_from(cache_num).unwrap_or(0))
    }

    /// Maximum resident entries, `None` if unbounded
    pub fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Keys of all resident entries, in no particular order
    pub fn keys(&self) -> Vec<K> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Look up and pin an entry without waiting for it to become ready
    pub fn get(&self, key: &K) -> Option<PinnedEntry<K, T>> {
        self.entries
            .lock()
            .get(key)
            .filter(|entry| entry.try_pin())
            .map(|entry| PinnedEntry::from_pinned(Arc::clone(entry)))
    }

    /// Insert an entry, evicting the least recently used idle entry if the
    /// pool is full. Replacing an existing key retires the old entry.
    pub fn set(&self, key: K, entry: Arc<CacheEntry<K, T>>) -> Arc<CacheEntry<K, T>> {
        let mut entries = self.entries.lock();
        self.insert_locked(&mut entries, key, Arc::clone(&entry));
        entry
    }

    /// Remove an entry from the pool.
    ///
    /// A thread that currently holds the entry keeps its guard; any later
    /// `acquire` on the removed entry fails with `Evicted`.
    pub fn pop(&self, key: &K) -> Option<Arc<CacheEntry<K, T>>> {
        let removed = self.entries.lock().remove(key);
        if let Some(entry) = &removed {
            entry.retire();
            debug!(key = %key, held = entry.is_held(), "popped cache entry");
        }
        removed
    }

    /// Remove every entry
    pub fn clear(&self) -> Vec<Arc<CacheEntry<K, T>>> {
        let drained: Vec<_> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.retire();
        }
        drained
    }

    /// Copy of the pool's activity counters
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Return the existing entry for `key`, or insert a loading entry and
    /// hand the caller the [`PendingLoad`] that must complete it.
    pub fn reserve(&self, key: K) -> Reservation<'_, K, T> {
        let mut entries = self.entries.lock();

        let existing = entries
            .get(&key)
            .filter(|entry| entry.try_pin())
            .map(|entry| PinnedEntry::from_pinned(Arc::clone(entry)));
        if let Some(entry) = existing {
            self.metrics.record_hit();
            self.trim_locked(&mut entries);
            return Reservation::Existing(entry);
        }

        self.metrics.record_miss();
        let entry = CacheEntry::loading(key.clone());
        self.insert_locked(&mut entries, key, Arc::clone(&entry));

        Reservation::Reserved(PendingLoad {
            pool: self,
            entry,
            settled: false,
        })
    }

    /// Load-or-create: return the entry for `key`, running `load` exactly
    /// once per resident entry.
    ///
    /// Concurrent callers for the same key receive the same entry and block
    /// on `acquire` until the load settles. If `load` fails, the entry is
    /// removed, waiters get [`CacheError::LoadFailed`](crate::cache::CacheError),
    /// and this caller gets the original error. The returned handle is
    /// pinned, see [`PinnedEntry`].
    pub fn get_or_load<F, E>(&self, key: K, load: F) -> Result<PinnedEntry<K, T>, E>
    where
        F: FnOnce(&K) -> Result<T, E>,
        E: fmt::Display,
    {
        let pending = match self.reserve(key) {
            Reservation::Existing(entry) => return Ok(entry),
            Reservation::Reserved(pending) => pending,
        };

        match load(pending.key()) {
            Ok(value) => Ok(pending.finish_loading(value)),
            Err(err) => {
                pending.fail(err.to_string());
                Err(err)
            }
        }
    }

    fn insert_locked(&self, entries: &mut EntryMap<K, T>, key: K, entry: Arc<CacheEntry<K, T>>) {
        if !entries.contains_key(&key) && self.capacity > 0 {
            while entries.len() >= self.capacity {
                if !self.evict_one_locked(entries) {
                    self.metrics.record_overflow();
                    warn!(
                        key = %key,
                        capacity = self.capacity,
                        resident = entries.len(),
                        "all cached entries are in use, exceeding pool capacity"
                    );
                    break;
                }
            }
        }

        if let Some(replaced) = entries.insert(key, entry) {
            replaced.retire();
        }
    }

    /// Evict idle entries until an overflowed pool is back within capacity
    fn trim_locked(&self, entries: &mut EntryMap<K, T>) {
        if self.capacity == 0 {
            return;
        }
        while entries.len() > self.capacity {
            if !self.evict_one_locked(entries) {
                break;
            }
        }
    }

    /// Evict the least recently used idle entry. Returns false if every
    /// entry is held.
    fn evict_one_locked(&self, entries: &mut EntryMap<K, T>) -> bool {
        let mut candidates: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_held())
            .map(|(key, entry)| (entry.last_used_at(), key.clone()))
            .collect();
        candidates.sort_by_key(|(last_used_at, _)| *last_used_at);

        for (_, key) in candidates {
            let claimed = entries
                .get(&key)
                .map(|entry| entry.try_retire_idle())
                .unwrap_or(false);
            if claimed {
                entries.remove(&key);
                self.metrics.record_eviction();
                info!(key = %key, "evicted least recently used cache entry");
                return true;
            }
        }

        false
    }

    fn remove_if_same(&self, key: &K, entry: &Arc<CacheEntry<K, T>>) {
        let mut entries = self.entries.lock();
        if entries
            .get(key)
            .map(|current| Arc::ptr_eq(current, entry))
            .unwrap_or(false)
        {
            entries.remove(key);
        }
    }
}

impl<K: PoolKey, T> fmt::Debug for CachePool<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachePool")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

/// The designated loader's claim on a loading entry.
///
/// Only the thread that inserted the entry receives this token. Dropping it
/// without calling [`finish_loading`](Self::finish_loading) fails the load,
/// wakes all waiters, and removes the entry from the pool.
pub struct PendingLoad<'a, K: PoolKey, T> {
    pool: &'a CachePool<K, T>,
    entry: Arc<CacheEntry<K, T>>,
    settled: bool,
}

impl<K: PoolKey, T> PendingLoad<'_, K, T> {
    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Publish the loaded value and mark the entry ready. The loader's hold
    /// becomes the returned handle's pin.
    pub fn finish_loading(mut self, value: T) -> PinnedEntry<K, T> {
        self.settled = true;
        self.entry.finish_loading(value);
        self.pool.metrics.record_load();
        PinnedEntry::from_pinned(Arc::clone(&self.entry))
    }

    /// Abandon the load, propagating `reason` to every waiter
    pub fn fail(mut self, reason: String) {
        self.abort(reason);
    }

    fn abort(&mut self, reason: String) {
        if self.settled {
            return;
        }
        self.settled = true;

        warn!(key = %self.entry.key(), reason = %reason, "cache entry load failed");
        self.entry.fail_loading(reason);
        self.entry.release_hold();
        self.pool.remove_if_same(self.entry.key(), &self.entry);
        self.entry.retire();
        self.pool.metrics.record_load_failure();
    }
}

impl<K: PoolKey, T> Drop for PendingLoad<'_, K, T> {
    fn drop(&mut self) {
        let reason = if std::thread::panicking() {
            "loader panicked"
        } else {
            "loader exited without finishing"
        };
        self.abort(reason.to_string());
    }
}
