// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! SQLite backend with per-thread connections and throttled checkpoints.
//!
//! Every statement runs while holding the backend's single mutex. Each
//! accessing thread gets its own connection, created lazily on first use and
//! kept in a table keyed by [`ThreadId`]. The table lives inside the mutex, so
//! a connection cannot be fetched without holding the lock.
//!
//! A thread-local guard removes the entry when its thread exits. A
//! transaction the thread left uncommitted is rolled back at that point.
//!
//! # Modes
//!
//! - **Read-write**: write-ahead logging with `synchronous=NORMAL`. Commits
//!   that land within the last checkpoint interval of a power loss may be
//!   lost; a checkpoint runs after a commit at most once per interval.
//! - **Read-only**: the file is opened as an immutable snapshot and the
//!   connection is put in `query_only` mode, so writes fail in the engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use uasrv_store::{BackendConfig, SqliteBackend, StoreMode};
//!
//! let backend = SqliteBackend::open("history.db", StoreMode::ReadWrite, BackendConfig::default())?;
//! backend.write_batch("CREATE TABLE IF NOT EXISTS t (v INTEGER)")?;
//! backend.write(Some("INSERT INTO t (v) VALUES (?1)"), [42], true)?;
//!
//! let mut values = Vec::new();
//! backend.read("SELECT v FROM t", [], |row| {
//!     values.push(row.get::<_, i64>(0)?);
//!     Ok(())
//! })?;
//! backend.close()?;
//! ```

use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OpenFlags, Params, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use uasrv_core::error::{StoreError, StoreResult};

use crate::clock::{Clock, SystemClock};
use crate::stats::{StoreStats, StoreStatsInner};

/// Minimum time between two throttled checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(90);

/// How long a connection waits on a locked database file.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Configuration
// =============================================================================

/// How the store file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Immutable snapshot, queries only.
    ReadOnly,
    /// Write-ahead logged, writable.
    #[default]
    ReadWrite,
}

impl StoreMode {
    /// Maps a `read_only` flag onto a mode.
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }

    /// Returns `true` for [`StoreMode::ReadOnly`].
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for StoreMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::ReadWrite => write!(f, "read-write"),
        }
    }
}

/// Tunables for [`SqliteBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    /// Minimum time between throttled checkpoints.
    pub checkpoint_interval: Duration,
    /// Busy timeout applied to every connection.
    pub busy_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl BackendConfig {
    /// Sets the checkpoint interval.
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Sets the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

// =============================================================================
// Backend
// =============================================================================

/// State guarded by the backend mutex.
struct Inner {
    connections: HashMap<ThreadId, Connection>,
    last_checkpoint: Instant,
    closed: bool,
}

impl Inner {
    /// Returns the calling thread's connection, opening it on first use.
    fn connection(&mut self, backend: &SqliteBackend) -> StoreResult<&mut Connection> {
        let thread = thread::current().id();
        match self.connections.entry(thread) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let conn = backend.open_connection()?;
                release_on_thread_exit(Arc::downgrade(&backend.inner), thread);
                Ok(entry.insert(conn))
            }
        }
    }
}

/// Drops a thread's connection when the thread exits.
struct ConnectionGuard {
    inner: Weak<Mutex<Inner>>,
    thread: ThreadId,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.lock().connections.remove(&self.thread);
        }
    }
}

thread_local! {
    static CONNECTION_GUARDS: RefCell<Vec<ConnectionGuard>> = const { RefCell::new(Vec::new()) };
}

fn release_on_thread_exit(inner: Weak<Mutex<Inner>>, thread: ThreadId) {
    // Fails only while the thread is already tearing down its locals; the
    // connection then lives until the backend is closed.
    let _ = CONNECTION_GUARDS.try_with(|guards| {
        let mut guards = guards.borrow_mut();
        guards.retain(|g| g.inner.strong_count() > 0);
        guards.push(ConnectionGuard { inner, thread });
    });
}

/// Thread-safe, checkpointed access to an SQLite file.
pub struct SqliteBackend {
    path: PathBuf,
    mode: StoreMode,
    config: BackendConfig,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<Inner>>,
    stats: StoreStatsInner,
}

impl SqliteBackend {
    /// Opens the store at `path` using the system clock.
    ///
    /// The calling thread's connection is opened eagerly so configuration
    /// problems surface here rather than on first use.
    ///
    /// # Errors
    ///
    /// Read-only opens fail with [`StoreError::UnsupportedStoreMode`] when the
    /// file cannot be opened as an immutable snapshot. Read-write opens fail
    /// with [`StoreError::Database`].
    pub fn open(path: impl AsRef<Path>, mode: StoreMode, config: BackendConfig) -> StoreResult<Self> {
        Self::open_with_clock(path, mode, config, Arc::new(SystemClock))
    }

    /// Opens the store with an injected clock.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        mode: StoreMode,
        config: BackendConfig,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if mode.is_read_only() && !path.is_file() {
            let err = StoreError::unsupported_mode(&path, "file does not exist");
            warn!(path = %path.display(), error = %err, "Cannot open read-only store");
            return Err(err);
        }

        let backend = Self {
            inner: Arc::new(Mutex::new(Inner {
                connections: HashMap::new(),
                last_checkpoint: clock.now(),
                closed: false,
            })),
            path,
            mode,
            config,
            clock,
            stats: StoreStatsInner::new(),
        };

        let opened = {
            let mut inner = backend.inner.lock();
            let result = inner.connection(&backend).map(|_| ());
            if result.is_err() {
                inner.closed = true;
            }
            result
        };
        if let Err(e) = opened {
            warn!(path = %backend.path.display(), %mode, error = %e, "Failed to open store");
            return Err(e);
        }

        info!(
            path = %backend.path.display(),
            %mode,
            checkpoint_interval_secs = backend.config.checkpoint_interval.as_secs(),
            "Store backend opened"
        );
        Ok(backend)
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let conn = match self.mode {
            StoreMode::ReadOnly => {
                let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = Connection::open_with_flags(immutable_uri(&self.path), flags)
                    .map_err(|e| StoreError::unsupported_mode(&self.path, e.to_string()))?;
                conn.pragma_update(None, "query_only", 1)
                    .map_err(|e| StoreError::unsupported_mode(&self.path, e.to_string()))?;
                conn
            }
            StoreMode::ReadWrite => {
                let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX;
                let conn = Connection::open_with_flags(&self.path, flags)
                    .map_err(|e| StoreError::database("open", e))?;
                conn.pragma_update(None, "journal_mode", "WAL")
                    .map_err(|e| StoreError::database("journal_mode", e))?;
                conn.pragma_update(None, "synchronous", "NORMAL")
                    .map_err(|e| StoreError::database("synchronous", e))?;
                conn
            }
        };
        conn.busy_timeout(self.config.busy_timeout)
            .map_err(|e| StoreError::database("busy_timeout", e))?;

        self.stats.record_connection();
        debug!(
            path = %self.path.display(),
            thread = ?thread::current().id(),
            mode = %self.mode,
            "Store connection opened"
        );
        Ok(conn)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        let guard = self.inner.lock();
        if guard.closed {
            return Err(StoreError::closed(&self.path));
        }
        Ok(guard)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Runs a query and invokes `on_row` once per result row.
    ///
    /// All rows are delivered before this returns. The backend lock is held
    /// for the whole iteration, so `on_row` must not call back into the
    /// backend.
    pub fn read<P, F>(&self, sql: &str, params: P, mut on_row: F) -> StoreResult<()>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<()>,
    {
        let mut inner = self.lock()?;
        let conn = inner.connection(self)?;

        let mut stmt = conn.prepare(sql).map_err(|e| StoreError::database("read", e))?;
        let mut rows = stmt.query(params).map_err(|e| StoreError::database("read", e))?;
        while let Some(row) = rows.next().map_err(|e| StoreError::database("read", e))? {
            on_row(row).map_err(|e| StoreError::database("read", e))?;
        }

        self.stats.record_read();
        Ok(())
    }

    /// Runs a query and collects one mapped value per row.
    pub fn read_rows<T, P, F>(&self, sql: &str, params: P, mut map: F) -> StoreResult<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut out = Vec::new();
        self.read(sql, params, |row| {
            out.push(map(row)?);
            Ok(())
        })?;
        Ok(out)
    }

    /// Executes a statement, optionally committing.
    ///
    /// With `commit == false` the statement joins an open transaction,
    /// starting one if needed, so several writes can be committed together.
    /// With `sql == None` only the commit is performed. Every commit is
    /// followed by a throttled checkpoint.
    ///
    /// Returns the number of rows changed by the statement.
    pub fn write<P: Params>(&self, sql: Option<&str>, params: P, commit: bool) -> StoreResult<usize> {
        let mut inner = self.lock()?;

        let mut changed = 0;
        {
            let conn = inner.connection(self)?;
            if let Some(sql) = sql {
                if !commit && conn.is_autocommit() {
                    conn.execute_batch("BEGIN")
                        .map_err(|e| StoreError::database("begin", e))?;
                }
                changed = conn
                    .execute(sql, params)
                    .map_err(|e| StoreError::database("write", e))?;
                self.stats.record_write();
            }
            if commit {
                if !conn.is_autocommit() {
                    conn.execute_batch("COMMIT")
                        .map_err(|e| StoreError::database("commit", e))?;
                }
                self.stats.record_commit();
            }
        }

        if commit {
            self.checkpoint_locked(&mut inner, false)?;
        }
        Ok(changed)
    }

    /// Commits the calling thread's open transaction, if any.
    pub fn commit(&self) -> StoreResult<()> {
        self.write(None, [], true).map(|_| ())
    }

    /// Executes a batch of statements (schema setup) in autocommit mode.
    pub fn write_batch(&self, sql: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        inner
            .connection(self)?
            .execute_batch(sql)
            .map_err(|e| StoreError::database("write_batch", e))?;
        self.stats.record_write();
        self.stats.record_commit();
        self.checkpoint_locked(&mut inner, false)?;
        Ok(())
    }

    // =========================================================================
    // Checkpoints
    // =========================================================================

    /// Checkpoints the write-ahead log regardless of the throttle window.
    ///
    /// Returns `false` without touching the file on a read-only backend.
    pub fn force_checkpoint(&self) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        self.checkpoint_locked(&mut inner, true)
    }

    /// Checkpoints only if the throttle interval has elapsed.
    pub fn throttled_checkpoint(&self) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        self.checkpoint_locked(&mut inner, false)
    }

    fn checkpoint_locked(&self, inner: &mut Inner, force: bool) -> StoreResult<bool> {
        if self.mode.is_read_only() {
            debug!(path = %self.path.display(), "Checkpoint skipped on read-only store");
            return Ok(false);
        }

        let now = self.clock.now();
        if !force && now.saturating_duration_since(inner.last_checkpoint) < self.config.checkpoint_interval {
            self.stats.record_checkpoint_skipped();
            return Ok(false);
        }

        let (mut busy, mut log_frames, mut checkpointed) = (0i64, 0i64, 0i64);
        inner
            .connection(self)?
            .pragma_query(None, "wal_checkpoint", |row| {
                busy = row.get(0)?;
                log_frames = row.get(1)?;
                checkpointed = row.get(2)?;
                Ok(())
            })
            .map_err(|e| StoreError::database("checkpoint", e))?;

        inner.last_checkpoint = now;
        self.stats.record_checkpoint();
        debug!(
            path = %self.path.display(),
            forced = force,
            busy,
            log_frames,
            checkpointed,
            "WAL checkpoint"
        );
        Ok(true)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Closes every connection, checkpointing first if writable.
    ///
    /// Idempotent. Any later call fails with [`StoreError::Closed`].
    pub fn close(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }

        let result = self.checkpoint_locked(&mut inner, true).map(|_| ());
        if let Err(e) = &result {
            warn!(path = %self.path.display(), error = %e, "Final checkpoint failed");
        }

        let connections = inner.connections.len();
        inner.connections.clear();
        inner.closed = true;

        info!(path = %self.path.display(), connections, "Store backend closed");
        result
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Returns the number of live per-thread connections.
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Returns the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the open mode.
    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Returns a snapshot of the backend counters.
    pub fn stats(&self) -> StoreStats {
        self.stats.snapshot()
    }
}

impl Drop for SqliteBackend {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "Store backend did not close cleanly");
        }
    }
}

impl fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

/// Builds a `file:` URI that opens `path` as an immutable snapshot.
fn immutable_uri(path: &Path) -> String {
    let mut uri = String::from("file:");
    for ch in path.to_string_lossy().chars() {
        match ch {
            '%' => uri.push_str("%25"),
            '?' => uri.push_str("%3f"),
            '#' => uri.push_str("%23"),
            _ => uri.push(ch),
        }
    }
    uri.push_str("?immutable=1");
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use tempfile::TempDir;

    fn open_writable(dir: &TempDir) -> SqliteBackend {
        let backend = SqliteBackend::open(
            dir.path().join("store.db"),
            StoreMode::ReadWrite,
            BackendConfig::default(),
        )
        .unwrap();
        backend
            .write_batch("CREATE TABLE IF NOT EXISTS t (v INTEGER NOT NULL)")
            .unwrap();
        backend
    }

    fn count_rows(backend: &SqliteBackend) -> i64 {
        let rows = backend
            .read_rows("SELECT COUNT(*) FROM t", [], |row| row.get::<_, i64>(0))
            .unwrap();
        rows[0]
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let backend = open_writable(&dir);

        for v in 1..=3 {
            let changed = backend
                .write(Some("INSERT INTO t (v) VALUES (?1)"), [v], true)
                .unwrap();
            assert_eq!(changed, 1);
        }

        let mut seen = Vec::new();
        backend
            .read("SELECT v FROM t ORDER BY v", [], |row| {
                seen.push(row.get::<_, i64>(0)?);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);

        let stats = backend.stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.writes, 4);
    }

    #[test]
    fn test_checkpoint_throttling() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new());
        let backend = SqliteBackend::open_with_clock(
            dir.path().join("store.db"),
            StoreMode::ReadWrite,
            BackendConfig::default(),
            clock.clone(),
        )
        .unwrap();
        backend.write_batch("CREATE TABLE t (v INTEGER)").unwrap();
        assert_eq!(backend.stats().checkpoints, 0);

        clock.advance(DEFAULT_CHECKPOINT_INTERVAL);
        backend.write(Some("INSERT INTO t (v) VALUES (1)"), [], true).unwrap();
        assert_eq!(backend.stats().checkpoints, 1);

        clock.advance(DEFAULT_CHECKPOINT_INTERVAL - Duration::from_secs(1));
        backend.write(Some("INSERT INTO t (v) VALUES (2)"), [], true).unwrap();
        assert_eq!(backend.stats().checkpoints, 1);

        clock.advance(Duration::from_secs(2));
        backend.write(Some("INSERT INTO t (v) VALUES (3)"), [], true).unwrap();
        assert_eq!(backend.stats().checkpoints, 2);
    }

    #[test]
    fn test_uncommitted_write_not_checkpointed() {
        let dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::new());
        let backend = SqliteBackend::open_with_clock(
            dir.path().join("store.db"),
            StoreMode::ReadWrite,
            BackendConfig::default(),
            clock.clone(),
        )
        .unwrap();
        backend.write_batch("CREATE TABLE t (v INTEGER)").unwrap();

        clock.advance(Duration::from_secs(600));
        backend.write(Some("INSERT INTO t (v) VALUES (1)"), [], false).unwrap();
        assert_eq!(backend.stats().checkpoints, 0);
        assert_eq!(backend.stats().commits, 1);
    }

    #[test]
    fn test_force_checkpoint_ignores_throttle() {
        let dir = TempDir::new().unwrap();
        let backend = open_writable(&dir);

        assert!(backend.force_checkpoint().unwrap());
        assert!(backend.force_checkpoint().unwrap());
        assert!(!backend.throttled_checkpoint().unwrap());
        assert_eq!(backend.stats().checkpoints, 2);
    }

    #[test]
    fn test_deferred_commit_visibility() {
        let dir = TempDir::new().unwrap();
        let backend = open_writable(&dir);

        backend.write(Some("INSERT INTO t (v) VALUES (1)"), [], false).unwrap();
        backend.write(Some("INSERT INTO t (v) VALUES (2)"), [], false).unwrap();

        let other = thread::scope(|s| s.spawn(|| count_rows(&backend)).join().unwrap());
        assert_eq!(other, 0);

        backend.commit().unwrap();
        let other = thread::scope(|s| s.spawn(|| count_rows(&backend)).join().unwrap());
        assert_eq!(other, 2);
    }

    #[test]
    fn test_one_connection_per_thread() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(open_writable(&dir));
        let threads = 4;
        let barrier = Arc::new(std::sync::Barrier::new(threads + 1));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let backend = Arc::clone(&backend);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    for i in 0..25 {
                        backend
                            .write(Some("INSERT INTO t (v) VALUES (?1)"), [i], true)
                            .unwrap();
                        count_rows(&backend);
                    }
                    barrier.wait();
                    barrier.wait();
                })
            })
            .collect();

        barrier.wait();
        // One per worker plus the opening thread.
        assert_eq!(backend.connection_count(), threads + 1);
        barrier.wait();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(count_rows(&backend), (threads * 25) as i64);
        assert_eq!(backend.stats().connections_opened, threads as u64 + 1);
    }

    #[test]
    fn test_exited_threads_release_connections() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(open_writable(&dir));

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let backend = Arc::clone(&backend);
                thread::spawn(move || count_rows(&backend))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(backend.connection_count(), 1);
        assert_eq!(backend.stats().connections_opened, 51);
    }

    #[test]
    fn test_thread_exit_rolls_back_uncommitted_write() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(open_writable(&dir));

        let worker = Arc::clone(&backend);
        thread::spawn(move || {
            worker
                .write(Some("INSERT INTO t (v) VALUES (1)"), [], false)
                .unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(count_rows(&backend), 0);
        backend.write(Some("INSERT INTO t (v) VALUES (2)"), [], true).unwrap();
        assert_eq!(count_rows(&backend), 1);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t (v) VALUES (7);")
                .unwrap();
        }

        let backend = SqliteBackend::open(&path, StoreMode::ReadOnly, BackendConfig::default()).unwrap();
        assert_eq!(count_rows(&backend), 1);

        let err = backend
            .write(Some("INSERT INTO t (v) VALUES (8)"), [], true)
            .unwrap_err();
        assert!(matches!(err, StoreError::Database { .. }));

        assert!(!backend.force_checkpoint().unwrap());
        assert_eq!(count_rows(&backend), 1);
    }

    #[test]
    fn test_read_only_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = SqliteBackend::open(
            dir.path().join("missing.db"),
            StoreMode::ReadOnly,
            BackendConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedStoreMode { .. }));
    }

    #[test]
    fn test_close_checkpoints_and_rejects_use() {
        let dir = TempDir::new().unwrap();
        let backend = open_writable(&dir);
        backend.write(Some("INSERT INTO t (v) VALUES (1)"), [], true).unwrap();
        let before = backend.stats().checkpoints;

        backend.close().unwrap();
        assert!(backend.is_closed());
        assert_eq!(backend.stats().checkpoints, before + 1);
        assert_eq!(backend.connection_count(), 0);

        backend.close().unwrap();
        let err = backend.read("SELECT v FROM t", [], |_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::Closed { .. }));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let backend = open_writable(&dir);
            backend.write(Some("INSERT INTO t (v) VALUES (5)"), [], true).unwrap();
        }
        let backend = open_writable(&dir);
        assert_eq!(count_rows(&backend), 1);
    }

    #[test]
    fn test_immutable_uri_escapes() {
        assert_eq!(
            immutable_uri(Path::new("/data/a?b#c%d.db")),
            "file:/data/a%3fb%23c%25d.db?immutable=1"
        );
    }
}
