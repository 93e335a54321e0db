// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-store
//!
//! Durable store backend for the uasrv OPC UA server core.
//!
//! [`SqliteBackend`] gives history and discovery persistence serialized,
//! per-thread access to a single SQLite file, with write-ahead logging and a
//! checkpoint throttled to once per interval.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod backend;
pub mod clock;
pub mod stats;

pub use backend::{
    BackendConfig, SqliteBackend, StoreMode, DEFAULT_BUSY_TIMEOUT, DEFAULT_CHECKPOINT_INTERVAL,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use stats::StoreStats;

pub use uasrv_core::error::{StoreError, StoreResult};
