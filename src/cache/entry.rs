// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Lock-guarded cache entry
//!
//! A [`CacheEntry`] wraps one named resource. It is created either ready
//! (holding a value) or loading (empty until the designated loader finishes).
//! All access goes through [`CacheEntry::acquire`], which blocks until the
//! entry lock is free and the entry is ready, and returns an RAII
//! [`EntryGuard`] that releases on drop.
//!
//! Each entry tracks a hold count. It is incremented before an acquirer starts
//! waiting and decremented when its guard drops, so pools never choose a held
//! or waited-on entry as an eviction victim. Pools hand entries out as
//! [`PinnedEntry`] handles whose pin counts as a hold until the first
//! `acquire` through the handle, or until the handle drops.

use crate::cache::errors::CacheError;
use crate::cache::PoolKey;
use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Hold-count value marking an idle entry claimed by an evictor
const EVICTED_HOLDS: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

struct Slot<T> {
    state: LoadState,
    /// `None` unless `state` is `Ready`
    object: Option<T>,
}

/// One named, lock-guarded slot in a [`CachePool`](crate::cache::CachePool)
pub struct CacheEntry<K, T> {
    key: K,
    slot: Mutex<Slot<T>>,
    ready_signal: Condvar,
    /// Mirrors `slot.state == Ready` so it can be read without the entry lock
    ready: AtomicBool,
    holds: AtomicUsize,
    retired: AtomicBool,
    last_used_at: Mutex<Instant>,
}

impl<K: PoolKey, T> CacheEntry<K, T> {
    /// Create an entry in the loading state.
    ///
    /// The entry starts with one hold, owned by the loader, so it cannot be
    /// evicted before loading settles.
    pub(crate) fn loading(key: K) -> Arc<Self> {
        Arc::new(Self {
            key,
            slot: Mutex::new(Slot {
                state: LoadState::Loading,
                object: None,
            }),
            ready_signal: Condvar::new(),
            ready: AtomicBool::new(false),
            holds: AtomicUsize::new(1),
            retired: AtomicBool::new(false),
            last_used_at: Mutex::new(Instant::now()),
        })
    }

    /// Create an entry that is immediately ready
    pub fn with_value(key: K, value: T) -> Arc<Self> {
        Arc::new(Self {
            key,
            slot: Mutex::new(Slot {
                state: LoadState::Ready,
                object: Some(value),
            }),
            ready_signal: Condvar::new(),
            ready: AtomicBool::new(true),
            holds: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
            last_used_at: Mutex::new(Instant::now()),
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// Whether the wrapped object has finished loading
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Whether any thread currently holds, waits on, or is loading this entry
    pub fn is_held(&self) -> bool {
        self.hold_count() > 0
    }

    /// Number of threads holding, waiting on, or pinning this entry
    pub fn hold_count(&self) -> usize {
        match self.holds.load(Ordering::Acquire) {
            EVICTED_HOLDS => 0,
            holds => holds,
        }
    }

    /// Whether the entry has been popped or evicted from its pool
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire) || self.holds.load(Ordering::Acquire) == EVICTED_HOLDS
    }

    /// Time of the last successful acquisition (or creation)
    pub fn last_used_at(&self) -> Instant {
        *self.last_used_at.lock()
    }

    /// Lock the entry and return a guard over the wrapped object.
    ///
    /// Blocks until no other guard exists and the entry is ready. `owner`
    /// annotates the debug log lines emitted on acquire and release.
    ///
    /// # Errors
    ///
    /// - [`CacheError::LoadFailed`] if the loader gave up on this entry
    /// - [`CacheError::Evicted`] if the entry was popped or evicted
    pub fn acquire(&self, owner: &str) -> Result<EntryGuard<'_, K, T>, CacheError> {
        let hold = self.hold()?;

        let mut slot = self.slot.lock();
        while slot.state == LoadState::Loading {
            self.ready_signal.wait(&mut slot);
        }

        if let LoadState::Failed(reason) = &slot.state {
            return Err(CacheError::LoadFailed {
                key: self.key.to_string(),
                reason: reason.clone(),
            });
        }
        if self.retired.load(Ordering::Acquire) {
            return Err(self.evicted_error());
        }

        *self.last_used_at.lock() = Instant::now();

        let object = MutexGuard::try_map(slot, |slot| slot.object.as_mut()).map_err(|_| {
            CacheError::LoadFailed {
                key: self.key.to_string(),
                reason: "entry is ready but holds no object".to_string(),
            }
        })?;

        debug!(key = %self.key, owner, "acquired cache entry");

        Ok(EntryGuard {
            object,
            key: &self.key,
            owner: owner.to_string(),
            _hold: hold,
        })
    }

    /// Store the loaded object and mark the entry ready in one critical section
    pub(crate) fn finish_loading(&self, value: T) {
        {
            let mut slot = self.slot.lock();
            slot.object = Some(value);
            slot.state = LoadState::Ready;
            self.ready.store(true, Ordering::Release);
        }
        *self.last_used_at.lock() = Instant::now();
        self.ready_signal.notify_all();
    }

    /// Mark the load as failed and wake every waiter with `reason`
    pub(crate) fn fail_loading(&self, reason: String) {
        {
            let mut slot = self.slot.lock();
            slot.object = None;
            slot.state = LoadState::Failed(reason);
        }
        self.ready_signal.notify_all();
    }

    /// Take a hold that is not tied to a guard. Fails once an evictor has
    /// claimed the entry.
    pub(crate) fn try_pin(&self) -> bool {
        self.holds
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |holds| match holds {
                EVICTED_HOLDS => None,
                holds => Some(holds + 1),
            })
            .is_ok()
    }

    /// Drop the loader's initial hold or a hold taken by [`try_pin`](Self::try_pin)
    pub(crate) fn release_hold(&self) {
        self.holds.fetch_sub(1, Ordering::AcqRel);
    }

    /// Mark the entry as removed from its pool. Held entries stay usable by
    /// their current holder; later acquisitions fail with `Evicted`.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        // Loading waiters re-check the state after the loader signals, so a
        // wakeup here only matters for entries that are already settled.
        self.ready_signal.notify_all();
    }

    /// Claim an idle entry for eviction. Fails if any thread holds it.
    pub(crate) fn try_retire_idle(&self) -> bool {
        let claimed = self
            .holds
            .compare_exchange(0, EVICTED_HOLDS, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if claimed {
            self.retire();
        }
        claimed
    }

    fn hold(&self) -> Result<HoldToken<'_>, CacheError> {
        if !self.try_pin() {
            return Err(self.evicted_error());
        }
        Ok(HoldToken {
            holds: &self.holds,
        })
    }

    fn evicted_error(&self) -> CacheError {
        CacheError::Evicted {
            key: self.key.to_string(),
        }
    }
}

impl<K: PoolKey, T> fmt::Debug for CacheEntry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key.to_string())
            .field("ready", &self.is_ready())
            .field("holds", &self.hold_count())
            .field("retired", &self.is_retired())
            .finish()
    }
}

/// Shared handle on a pooled entry that keeps it resident.
///
/// The pool takes the pin under its own lock before returning the handle, so
/// a concurrent load of another key cannot evict the entry in the window
/// before the caller locks it. The first [`acquire`](Self::acquire) hands the
/// protection over to the returned guard; dropping the handle releases the
/// pin as well.
pub struct PinnedEntry<K: PoolKey, T> {
    entry: Arc<CacheEntry<K, T>>,
    pinned: AtomicBool,
}

impl<K: PoolKey, T> PinnedEntry<K, T> {
    /// Wrap an entry whose hold count already includes this handle's pin
    pub(crate) fn from_pinned(entry: Arc<CacheEntry<K, T>>) -> Self {
        Self {
            entry,
            pinned: AtomicBool::new(true),
        }
    }

    /// Lock the entry as [`CacheEntry::acquire`] does, then drop the pin
    pub fn acquire(&self, owner: &str) -> Result<EntryGuard<'_, K, T>, CacheError> {
        let result = self.entry.acquire(owner);
        self.unpin();
        result
    }

    /// Whether this handle still protects the entry from eviction
    pub fn is_pinned(&self) -> bool {
        self.pinned.load(Ordering::Acquire)
    }

    pub fn entry(&self) -> &Arc<CacheEntry<K, T>> {
        &self.entry
    }

    /// Release the pin and keep a plain shared reference, which does not
    /// stop the pool from evicting the entry
    pub fn into_entry(self) -> Arc<CacheEntry<K, T>> {
        self.unpin();
        Arc::clone(&self.entry)
    }

    fn unpin(&self) {
        if self.pinned.swap(false, Ordering::AcqRel) {
            self.entry.release_hold();
        }
    }
}

impl<K: PoolKey, T> Deref for PinnedEntry<K, T> {
    type Target = CacheEntry<K, T>;

    fn deref(&self) -> &CacheEntry<K, T> {
        &self.entry
    }
}

impl<K: PoolKey, T> Drop for PinnedEntry<K, T> {
    fn drop(&mut self) {
        self.unpin();
    }
}

impl<K: PoolKey, T> fmt::Debug for PinnedEntry<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedEntry")
            .field("entry", &self.entry)
            .field("pinned", &self.is_pinned())
            .finish()
    }
}

/// Decrements the hold count when dropped
struct HoldToken<'a> {
    holds: &'a AtomicUsize,
}

impl Drop for HoldToken<'_> {
    fn drop(&mut self) {
        self.holds.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Exclusive access to a ready entry's object.
///
/// Releases the entry lock, then the hold, when dropped.
pub struct EntryGuard<'a, K: PoolKey, T> {
    // Field order matters: the lock is released before the hold.
    object: MappedMutexGuard<'a, T>,
    key: &'a K,
    owner: String,
    _hold: HoldToken<'a>,
}

impl<K: PoolKey, T> EntryGuard<'_, K, T> {
    pub fn key(&self) -> &K {
        self.key
    }
}

impl<K: PoolKey, T> fmt::Debug for EntryGuard<'_, K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryGuard")
            .field("key", &self.key.to_string())
            .field("owner", &self.owner)
            .finish()
    }
}

impl<K: PoolKey, T> Deref for EntryGuard<'_, K, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<K: PoolKey, T> DerefMut for EntryGuard<'_, K, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

impl<K: PoolKey, T> Drop for EntryGuard<'_, K, T> {
    fn drop(&mut self) {
        debug!(key = %self.key, owner = %self.owner, "released cache entry");
    }
}
