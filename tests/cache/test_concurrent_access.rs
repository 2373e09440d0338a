// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Concurrency tests for the cache pool: one loader per key, exclusive
// guards, and workers racing eviction on a small pool

use kb_vector_pool::cache::{CacheError, CachePool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const KEYS: [&str; 4] = ["a", "b", "c", "d"];

/// Value guarded by an entry; `busy` catches two guards existing at once
#[derive(Debug, Default)]
struct Counter {
    busy: bool,
    value: u64,
}

fn bump(counter: &mut Counter) {
    assert!(!counter.busy, "two guards held the same entry");
    counter.busy = true;
    thread::sleep(Duration::from_micros(200));
    counter.value += 1;
    counter.busy = false;
}

#[test]
fn test_waiters_share_the_loaded_entry() {
    let pool: Arc<CachePool<String, Counter>> = Arc::new(CachePool::new(2));
    let loads = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let loads = Arc::clone(&loads);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.get_or_load("samples".to_string(), |_| {
                    loads.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(50));
                    Ok::<_, CacheError>(Counter::default())
                })
                .unwrap()
            })
        })
        .collect();

    let entries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(Arc::ptr_eq(entries[0].entry(), entries[1].entry()));
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(pool.len(), 1);
}

#[test]
fn test_guards_are_exclusive() {
    let pool: Arc<CachePool<String, Counter>> = Arc::new(CachePool::new(1));
    let entry = pool
        .get_or_load("kb".to_string(), |_| Ok::<_, CacheError>(Counter::default()))
        .unwrap()
        .into_entry();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let entry = Arc::clone(&entry);
            thread::spawn(move || {
                for _ in 0..20 {
                    bump(&mut entry.acquire("worker").unwrap());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(entry.acquire("reader").unwrap().value, 160);
    assert!(!entry.is_held());
}

#[test]
fn test_workers_racing_eviction() {
    let pool: Arc<CachePool<String, Counter>> = Arc::new(CachePool::new(2));
    let bumps = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            let bumps = Arc::clone(&bumps);
            thread::spawn(move || {
                for round in 0..25 {
                    let key = KEYS[(worker + round) % KEYS.len()].to_string();
                    let entry = pool
                        .get_or_load(key.clone(), |_| Ok::<_, CacheError>(Counter::default()))
                        .unwrap();
                    // Loads of other keys must not evict the entry before it is locked
                    match entry.acquire("worker") {
                        Ok(mut guard) => bump(&mut guard),
                        Err(err) => panic!("acquire on {} failed: {}", key, err),
                    };
                    bumps.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(bumps.load(Ordering::SeqCst), 8 * 25);

    // Nothing is held any more, so the next insert brings the pool back to capacity
    pool.get_or_load("e".to_string(), |_| Ok::<_, CacheError>(Counter::default()))
        .unwrap();
    assert!(pool.len() <= 2);

    let metrics = pool.metrics();
    assert_eq!(metrics.load_failures, 0);
    assert_eq!(metrics.loads, metrics.misses);
    assert!(metrics.evictions > 0);
}
