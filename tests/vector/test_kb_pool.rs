// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Tests for the disk-backed knowledge base pool: shared loading, failed
// loads, persistence round trips, LRU eviction and clearing

use kb_vector_pool::cache::Reservation;
use kb_vector_pool::embeddings::{EmbeddingRegistry, HashEmbeddings};
use kb_vector_pool::vector::{IndexKind, KbKey, KbVectorPool, VectorStore, VectorStoreError};
use std::fs;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Helper: Registry with a single 32-dimension hash model
fn registry() -> Arc<EmbeddingRegistry> {
    Arc::new(EmbeddingRegistry::new(Arc::new(HashEmbeddings::new(
        "hash-32", 32,
    ))))
}

/// Helper: Owned texts
fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_concurrent_create_shares_one_store() {
    let dir = TempDir::new().unwrap();
    let pool = Arc::new(KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.load_vector_store("samples", None, true, None, None)
                    .unwrap()
            })
        })
        .collect();
    let entries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(Arc::ptr_eq(entries[0].entry(), entries[1].entry()));
    assert_eq!(pool.base().len(), 1);
    assert_eq!(pool.base().metrics().loads, 1);
    assert!(VectorStore::exists_local(
        &pool.vs_path(&KbKey::new("samples", "hash-32"))
    ));
}

#[test]
fn test_save_unload_reload_roundtrip() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat);

    let entry = pool
        .load_vector_store("samples", None, true, None, None)
        .unwrap();
    entry
        .acquire("writer")
        .unwrap()
        .add_texts(
            &texts(&[
                "vector stores answer similarity queries",
                "the pool evicts idle stores",
                "persisted stores survive eviction",
            ]),
            None,
            None,
        )
        .unwrap();
    let before = entry
        .acquire("reader")
        .unwrap()
        .similarity_search_with_score("idle stores are evicted", 2, 0.0)
        .unwrap();

    assert!(pool.save_vector_store("samples", None).unwrap());
    assert!(pool.unload_vector_store("samples", None).unwrap());
    assert!(pool.base().is_empty());
    assert!(entry.acquire("stale").is_err());

    let reloaded = pool
        .load_vector_store("samples", None, false, None, None)
        .unwrap();
    assert!(!Arc::ptr_eq(entry.entry(), reloaded.entry()));
    assert_eq!(reloaded.docs_count().unwrap(), 3);

    let after = reloaded
        .acquire("reader")
        .unwrap()
        .similarity_search_with_score("idle stores are evicted", 2, 0.0)
        .unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_unload_discards_unsaved_documents() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat);

    let entry = pool
        .load_vector_store("samples", None, true, None, None)
        .unwrap();
    entry
        .acquire("writer")
        .unwrap()
        .add_texts(&texts(&["never saved"]), None, None)
        .unwrap();

    pool.unload_vector_store("samples", None).unwrap();
    let reloaded = pool
        .load_vector_store("samples", None, false, None, None)
        .unwrap();
    assert_eq!(reloaded.docs_count().unwrap(), 0);
}

#[test]
fn test_missing_store_is_not_found() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat);

    let err = pool
        .load_vector_store("absent", Some("hash-32"), false, None, None)
        .unwrap_err();
    assert!(matches!(err, VectorStoreError::NotFound(ref key) if key == "absent/hash-32"));
    assert_eq!(pool.base().metrics().load_failures, 1);
    assert!(pool.base().is_empty());
}

#[test]
fn test_corrupt_index_fails_every_caller() {
    let dir = TempDir::new().unwrap();
    let pool = Arc::new(KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat));
    let key = KbKey::new("broken", "hash-32");
    let path = pool.vs_path(&key);

    pool.load_vector_store("broken", None, true, None, None)
        .unwrap();
    pool.unload_vector_store("broken", None).unwrap();
    // Large enough that reading it keeps the loader busy while the others arrive
    fs::write(path.join("index.bin"), vec![0xFFu8; 16 << 20]).unwrap();

    let callers = 4;
    let barrier = Arc::new(Barrier::new(callers));
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.load_vector_store("broken", None, false, None, None)
                    .and_then(|entry| entry.docs_count())
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Loaders see the decode error itself, waiters see the propagated failure
    let mut loaders = 0;
    for result in results {
        match result {
            Err(VectorStoreError::Serialization(_)) => loaders += 1,
            Err(VectorStoreError::LoadFailure { key, .. }) => assert_eq!(key, "broken/hash-32"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert!(loaders >= 1);
    assert_eq!(pool.base().metrics().load_failures, loaders);
    assert!(!pool.base().cache().contains(&key));
    assert!(pool.base().is_empty());

    // Once the files are repaired the next call loads normally
    pool.base()
        .new_vector_store(None, None)
        .unwrap()
        .save_local(&path)
        .unwrap();
    let entry = pool
        .load_vector_store("broken", None, false, None, None)
        .unwrap();
    assert_eq!(entry.docs_count().unwrap(), 0);
}

#[test]
fn test_waiters_receive_load_failure() {
    let dir = TempDir::new().unwrap();
    let pool = Arc::new(KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat));
    let key = KbKey::new("pending", "hash-32");

    let pending = match pool.base().cache().reserve(key.clone()) {
        Reservation::Reserved(pending) => pending,
        Reservation::Existing(_) => panic!("expected a fresh reservation"),
    };

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || {
            pool.load_vector_store("pending", None, true, None, None)
                .and_then(|entry| entry.docs_count())
        })
    };
    // Wait until the waiter has the entry: loader, waiter and this lookup each hold it
    while pool
        .base()
        .get(&key)
        .map_or(true, |entry| entry.hold_count() < 3)
    {
        thread::sleep(Duration::from_millis(1));
    }
    pending.fail("index.bin could not be decoded".to_string());

    let err = waiter.join().unwrap().unwrap_err();
    assert!(matches!(err, VectorStoreError::LoadFailure { ref reason, .. } if reason.contains("decoded")));
    assert_eq!(err.error_code(), "LOAD_FAILURE");
    assert!(pool.base().is_empty());
}

#[test]
fn test_clear_empties_store() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat);

    let entry = pool
        .load_vector_store("samples", None, true, None, None)
        .unwrap();
    entry
        .acquire("writer")
        .unwrap()
        .add_texts(&texts(&["one", "two", "three"]), None, None)
        .unwrap();

    assert_eq!(entry.clear().unwrap(), 3);
    assert_eq!(entry.docs_count().unwrap(), 0);

    pool.save_vector_store("samples", None).unwrap();
    pool.unload_vector_store("samples", None).unwrap();
    let reloaded = pool
        .load_vector_store("samples", None, false, None, None)
        .unwrap();
    assert_eq!(reloaded.docs_count().unwrap(), 0);
}

#[test]
fn test_capacity_two_evicts_least_recently_used() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 2, registry(), IndexKind::Flat);

    for kb in ["A", "B", "C"] {
        pool.load_vector_store(kb, None, true, None, None).unwrap();
        thread::sleep(Duration::from_millis(2));
    }

    let mut resident: Vec<String> = pool.base().keys().iter().map(|k| k.kb_name.clone()).collect();
    resident.sort();
    assert_eq!(resident, vec!["B".to_string(), "C".to_string()]);
    assert_eq!(pool.base().metrics().evictions, 1);

    // The evicted store's disk copy is still there
    let reloaded = pool.load_vector_store("A", None, false, None, None).unwrap();
    assert_eq!(reloaded.docs_count().unwrap(), 0);
}

#[test]
fn test_loaded_store_survives_other_loads() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 1, registry(), IndexKind::Flat);

    let a = pool.load_vector_store("a", None, true, None, None).unwrap();
    pool.load_vector_store("b", None, true, None, None).unwrap();

    // The handle for "a" keeps it resident until it is acquired
    a.acquire("writer")
        .unwrap()
        .add_texts(&texts(&["written after b was loaded"]), None, None)
        .unwrap();
    assert_eq!(a.docs_count().unwrap(), 1);
    assert_eq!(pool.base().metrics().overflows, 1);

    // With "a" idle again the next hit shrinks the pool back to capacity
    pool.load_vector_store("a", None, false, None, None).unwrap();
    assert_eq!(pool.base().len(), 1);
}

#[test]
fn test_held_store_survives_eviction() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 1, registry(), IndexKind::Flat);

    let held = pool.load_vector_store("held", None, true, None, None).unwrap();
    let mut guard = held.acquire("long writer").unwrap();

    pool.load_vector_store("other", None, true, None, None).unwrap();
    assert!(pool.base().get(&KbKey::new("held", "hash-32")).is_some());

    guard
        .add_texts(&texts(&["still usable"]), None, None)
        .unwrap();
    drop(guard);
    assert_eq!(held.docs_count().unwrap(), 1);
}

#[test]
fn test_vector_name_selects_separate_store() {
    let dir = TempDir::new().unwrap();
    let pool = KbVectorPool::new(dir.path(), 4, registry(), IndexKind::Flat);

    let default = pool.load_vector_store("samples", None, true, None, None).unwrap();
    let named = pool
        .load_vector_store("samples", Some("experiment"), true, Some("hash-32"), Some(IndexKind::Hnsw))
        .unwrap();

    assert!(!Arc::ptr_eq(default.entry(), named.entry()));
    assert_eq!(named.key(), &KbKey::new("samples", "experiment"));
    assert_eq!(named.acquire("reader").unwrap().index_kind(), IndexKind::Hnsw);
    assert!(dir
        .path()
        .join("samples")
        .join("vector_store")
        .join("experiment")
        .join("index.json")
        .exists());
}
