// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Backend statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of backend counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Read statements executed.
    pub reads: u64,
    /// Write statements executed.
    pub writes: u64,
    /// Commits performed.
    pub commits: u64,
    /// Checkpoints performed (forced and throttled).
    pub checkpoints: u64,
    /// Checkpoints skipped by the throttle.
    pub checkpoints_skipped: u64,
    /// Connections opened over the backend's lifetime.
    pub connections_opened: u64,
}

/// Lock-free counters shared by the backend.
#[derive(Debug, Default)]
pub struct StoreStatsInner {
    reads: AtomicU64,
    writes: AtomicU64,
    commits: AtomicU64,
    checkpoints: AtomicU64,
    checkpoints_skipped: AtomicU64,
    connections_opened: AtomicU64,
}

impl StoreStatsInner {
    /// Creates new statistics with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_checkpoint_skipped(&self) {
        self.checkpoints_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_connection(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot.
    pub fn snapshot(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            checkpoints_skipped: self.checkpoints_skipped.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
        }
    }
}
