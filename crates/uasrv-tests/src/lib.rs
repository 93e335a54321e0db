// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv Integration Tests
//!
//! Integration tests for the uasrv OPC UA server core, plus the shared
//! fixtures and mock collaborators they run against.
//!
//! ## Module Structure
//!
//! - [`common`]: Shared test utilities
//!   - `fixtures`: Canned registrations, endpoints and configurations
//!   - `mocks`: In-memory address space, subscription engine, history
//!     manager and user manager with call recording
//!   - `harness`: Builds a server wired to the mocks in a temp directory
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all integration tests
//! cargo test -p uasrv-tests
//!
//! # Run specific test suite
//! cargo test -p uasrv-tests --test integration_session
//! cargo test -p uasrv-tests --test integration_discovery
//! cargo test -p uasrv-tests --test integration_server
//! cargo test -p uasrv-tests --test integration_store
//! cargo test -p uasrv-tests --test integration_config
//! ```
//!
//! ## Test Categories
//!
//! ### Session Tests (`integration_session.rs`)
//! - State machine transitions and guards
//! - Credential checks
//! - Subscription ownership and cleanup on close
//! - Monitored-item callbacks
//!
//! ### Discovery Tests (`integration_discovery.rs`)
//! - FindServers filtering and address rewriting
//! - Registration limit, renewal and expiry
//!
//! ### Server Tests (`integration_server.rs`)
//! - Lifecycle, status nodes and clock
//! - Identifier counters
//! - History toggles
//! - Persistent discovery across restarts
//!
//! ### Store Tests (`integration_store.rs`)
//! - Read/write/commit across threads
//! - Checkpoint throttling
//! - Read-only snapshots
//!
//! ### Config Tests (`integration_config.rs`)
//! - YAML, TOML and JSON parsing
//! - Environment overrides
//! - Validation

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::harness::*;
    pub use crate::common::mocks::*;
    pub use crate::common::{init_test_logging, temp_test_dir, unique_test_id};
}
