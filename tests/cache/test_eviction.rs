// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// LRU eviction tests for the cache pool

use kb_vector_pool::cache::{CacheEntry, CacheError, CachePool, PinnedEntry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Helper: load `key` with `value`, counting loader runs
fn load(
    pool: &CachePool<String, u32>,
    loads: &AtomicUsize,
    key: &str,
    value: u32,
) -> PinnedEntry<String, u32> {
    let entry = pool
        .get_or_load(key.to_string(), |_| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(value)
        })
        .unwrap();
    // Separate last-used timestamps
    thread::sleep(Duration::from_millis(2));
    entry
}

#[test]
fn test_oldest_entry_evicted_first() {
    let pool = CachePool::new(2);
    let loads = AtomicUsize::new(0);

    // Without its pin A is an ordinary eviction candidate
    let a = load(&pool, &loads, "A", 1).into_entry();
    load(&pool, &loads, "B", 2);
    load(&pool, &loads, "C", 3);

    let mut keys = pool.keys();
    keys.sort();
    assert_eq!(keys, vec!["B".to_string(), "C".to_string()]);
    assert!(a.is_retired());
    assert_eq!(
        a.acquire("late").unwrap_err(),
        CacheError::Evicted {
            key: "A".to_string()
        }
    );

    // A comes back through a fresh load
    let reloaded = load(&pool, &loads, "A", 10);
    assert!(!Arc::ptr_eq(&a, reloaded.entry()));
    assert_eq!(*reloaded.acquire("reader").unwrap(), 10);
    assert_eq!(loads.load(Ordering::SeqCst), 4);
}

#[test]
fn test_hit_does_not_reload() {
    let pool = CachePool::new(2);
    let loads = AtomicUsize::new(0);

    let first = load(&pool, &loads, "A", 1);
    let second = load(&pool, &loads, "A", 99);

    assert!(Arc::ptr_eq(first.entry(), second.entry()));
    assert_eq!(*second.acquire("reader").unwrap(), 1);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    let metrics = pool.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert!((metrics.hit_rate() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_overflow_shrinks_back_after_release() {
    let pool = CachePool::new(1);
    let loads = AtomicUsize::new(0);

    let a = load(&pool, &loads, "A", 1);
    let guard = a.acquire("holder").unwrap();
    load(&pool, &loads, "B", 2);
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.metrics().overflows, 1);

    drop(guard);
    load(&pool, &loads, "C", 3);
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(&"C".to_string()));
}

#[test]
fn test_returned_entry_is_not_evicted_before_acquire() {
    let pool = CachePool::new(1);
    let loads = AtomicUsize::new(0);

    let a = load(&pool, &loads, "A", 1);
    let b = load(&pool, &loads, "B", 2);

    // Both handles are still pinned, so B overflowed instead of evicting A
    assert!(a.is_pinned());
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.metrics().evictions, 0);
    assert_eq!(*a.acquire("caller").unwrap(), 1);
    assert_eq!(*b.acquire("caller").unwrap(), 2);
    assert!(!a.is_pinned());
}

#[test]
fn test_hit_trims_overflowed_pool() {
    let pool = CachePool::new(1);
    let loads = AtomicUsize::new(0);

    let a = load(&pool, &loads, "A", 1);
    let guard_a = a.acquire("holder").unwrap();
    let b = load(&pool, &loads, "B", 2);
    let guard_b = b.acquire("holder").unwrap();
    let c = load(&pool, &loads, "C", 3);
    let guard_c = c.acquire("holder").unwrap();
    assert_eq!(pool.len(), 3);
    assert_eq!(pool.metrics().overflows, 2);

    drop(guard_a);
    drop(guard_b);
    drop(guard_c);

    // A hit on A evicts the idle B and C
    let again = load(&pool, &loads, "A", 1);
    assert_eq!(pool.len(), 1);
    assert!(pool.contains(&"A".to_string()));
    assert_eq!(pool.metrics().evictions, 2);
    assert_eq!(*again.acquire("reader").unwrap(), 1);
    assert!(b.is_retired());
    assert!(c.is_retired());
    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[test]
fn test_unbounded_pool_never_evicts() {
    let pool = CachePool::from_cache_num(0);
    let loads = AtomicUsize::new(0);
    for i in 0..10 {
        pool.get_or_load(format!("kb{}", i), |_| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok::<_, CacheError>(i)
        })
        .unwrap();
    }
    assert_eq!(pool.len(), 10);
    assert_eq!(pool.metrics().evictions, 0);
}

#[test]
fn test_set_replaces_and_retires_previous() {
    let pool: CachePool<String, u32> = CachePool::new(2);
    let old = pool.set("A".to_string(), CacheEntry::with_value("A".to_string(), 1));
    let new = pool.set("A".to_string(), CacheEntry::with_value("A".to_string(), 2));

    assert_eq!(pool.len(), 1);
    assert!(old.is_retired());
    assert_eq!(*new.acquire("reader").unwrap(), 2);
}
