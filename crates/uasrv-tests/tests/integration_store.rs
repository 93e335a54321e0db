// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Store Integration Tests
//!
//! ## Test Categories
//!
//! - `test_backend_*`: Reads, writes and transactions
//! - `test_checkpoint_*`: Throttled and forced checkpoints
//! - `test_read_only_*`: Immutable snapshots
//! - `test_registrations_*`: The discovery registration table

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::params;

use uasrv_core::error::StoreError;
use uasrv_server::RegistrationStore;
use uasrv_store::{BackendConfig, ManualClock, SqliteBackend, StoreMode};
use uasrv_tests::prelude::*;

fn open_rw(path: &std::path::Path) -> SqliteBackend {
    SqliteBackend::open(path, StoreMode::ReadWrite, BackendConfig::default()).unwrap()
}

fn count(backend: &SqliteBackend) -> i64 {
    backend
        .read_rows("SELECT COUNT(*) FROM samples", [], |row| row.get(0))
        .unwrap()[0]
}

// =============================================================================
// Backend
// =============================================================================

#[test]
fn test_backend_write_read_roundtrip() {
    let dir = temp_test_dir("store_roundtrip");
    let backend = open_rw(&dir.path().join("data.db"));
    backend
        .write_batch("CREATE TABLE samples (id INTEGER PRIMARY KEY, value REAL NOT NULL)")
        .unwrap();

    for i in 0..10 {
        let changed = backend
            .write(Some("INSERT INTO samples (id, value) VALUES (?1, ?2)"), params![i, i as f64 * 1.5], true)
            .unwrap();
        assert_eq!(changed, 1);
    }

    let values: Vec<f64> = backend
        .read_rows("SELECT value FROM samples WHERE id >= ?1 ORDER BY id", params![8], |row| row.get(0))
        .unwrap();
    assert_eq!(values, vec![12.0, 13.5]);
    assert!(backend.stats().writes >= 10);
}

#[test]
fn test_backend_uncommitted_writes_batch_into_one_commit() {
    let dir = temp_test_dir("store_batch");
    let backend = open_rw(&dir.path().join("data.db"));
    backend
        .write_batch("CREATE TABLE samples (id INTEGER PRIMARY KEY, value REAL NOT NULL)")
        .unwrap();
    let commits_before = backend.stats().commits;

    for i in 0..5 {
        backend
            .write(Some("INSERT INTO samples (id, value) VALUES (?1, 0.0)"), params![i], false)
            .unwrap();
    }
    backend.commit().unwrap();

    assert_eq!(backend.stats().commits, commits_before + 1);
    assert_eq!(count(&backend), 5);
}

#[test]
fn test_backend_threads_get_own_connections() {
    let dir = temp_test_dir("store_threads");
    let backend = Arc::new(open_rw(&dir.path().join("data.db")));
    backend
        .write_batch("CREATE TABLE samples (id INTEGER PRIMARY KEY, value REAL NOT NULL)")
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let backend = Arc::clone(&backend);
            thread::spawn(move || {
                for i in 0..25 {
                    backend
                        .write(
                            Some("INSERT INTO samples (id, value) VALUES (?1, ?2)"),
                            params![t * 100 + i, t as f64],
                            true,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(count(&backend), 100);
    assert!(backend.stats().connections_opened >= 2);
}

#[test]
fn test_backend_closed_rejects_calls() {
    let dir = temp_test_dir("store_closed");
    let backend = open_rw(&dir.path().join("data.db"));
    backend.close().unwrap();
    backend.close().unwrap();
    assert!(backend.is_closed());

    let err = backend.write_batch("CREATE TABLE t (x)").unwrap_err();
    assert!(matches!(err, StoreError::Closed { .. }));
}

// =============================================================================
// Checkpoints
// =============================================================================

#[test]
fn test_checkpoint_throttled_by_interval() {
    let dir = temp_test_dir("store_checkpoint");
    let clock = Arc::new(ManualClock::new());
    let backend = SqliteBackend::open_with_clock(
        dir.path().join("data.db"),
        StoreMode::ReadWrite,
        BackendConfig::default().with_checkpoint_interval(Duration::from_secs(60)),
        clock.clone(),
    )
    .unwrap();

    assert!(!backend.throttled_checkpoint().unwrap());
    clock.advance(Duration::from_secs(61));
    assert!(backend.throttled_checkpoint().unwrap());
    assert!(!backend.throttled_checkpoint().unwrap());
    assert!(backend.force_checkpoint().unwrap());

    let stats = backend.stats();
    assert_eq!(stats.checkpoints, 2);
    assert_eq!(stats.checkpoints_skipped, 2);
}

// =============================================================================
// Read-only
// =============================================================================

#[test]
fn test_read_only_snapshot() {
    let dir = temp_test_dir("store_read_only");
    let path = dir.path().join("data.db");
    {
        let backend = open_rw(&path);
        backend
            .write_batch("CREATE TABLE samples (id INTEGER PRIMARY KEY, value REAL NOT NULL)")
            .unwrap();
        backend
            .write(Some("INSERT INTO samples (id, value) VALUES (1, 2.0)"), [], true)
            .unwrap();
        backend.close().unwrap();
    }

    let snapshot = SqliteBackend::open(&path, StoreMode::ReadOnly, BackendConfig::default()).unwrap();
    assert_eq!(snapshot.mode(), StoreMode::ReadOnly);
    assert_eq!(count(&snapshot), 1);
    assert!(!snapshot.force_checkpoint().unwrap());
    assert!(snapshot
        .write(Some("INSERT INTO samples (id, value) VALUES (2, 3.0)"), [], true)
        .is_err());
}

#[test]
fn test_read_only_missing_file_is_unsupported() {
    let dir = temp_test_dir("store_read_only_missing");
    let err = SqliteBackend::open(
        dir.path().join("absent.db"),
        StoreMode::ReadOnly,
        BackendConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedStoreMode { .. }));
}

// =============================================================================
// Registration Table
// =============================================================================

#[test]
fn test_registrations_upsert_replaces_row() {
    let dir = temp_test_dir("store_registrations");
    let store = RegistrationStore::new(Arc::new(open_rw(&dir.path().join("registry.db")))).unwrap();

    let mut description = EndpointFixtures::endpoint("urn:plant:a", "opc.tcp://0.0.0.0:4840").server;
    store.upsert(&description, &[]).unwrap();
    description.discovery_urls = vec!["opc.tcp://0.0.0.0:4850".to_string()];
    store
        .upsert(&description, &[DiscoveryFixtures::mdns_configuration("a")])
        .unwrap();

    let rows = store.load_all().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].description.discovery_urls, vec!["opc.tcp://0.0.0.0:4850"]);
    assert_eq!(rows[0].discovery_configuration.len(), 1);

    assert!(store.remove("urn:plant:a").unwrap());
    assert!(!store.remove("urn:plant:a").unwrap());
    assert!(store.is_empty().unwrap());
}
