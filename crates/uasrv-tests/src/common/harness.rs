// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Harness
//!
//! Builds an [`InternalServer`] wired to fresh mocks, with a private temp
//! directory, and stops it on drop.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use uasrv_config::{ServerConfig, StoreConfig};
use uasrv_server::{DiscoveryOptions, InternalServer, ServerOptions, Session};
use uasrv_core::types::User;

use super::mocks::MockServices;

// =============================================================================
// Test Harness
// =============================================================================

/// Configuration for the test harness.
#[derive(Debug, Clone)]
pub struct TestHarnessConfig {
    /// Name of the test (used for logging and temp directories).
    pub test_name: String,

    /// Run the status clock on start.
    pub clock_enabled: bool,

    /// Status clock period.
    pub clock_interval: Duration,

    /// Discovery registration limit.
    pub max_registrations: usize,

    /// Discovery registration lifetime.
    pub registration_timeout: Duration,

    /// Whether to enable tracing for the test.
    pub enable_tracing: bool,
}

impl Default for TestHarnessConfig {
    fn default() -> Self {
        Self {
            test_name: "unknown_test".to_string(),
            clock_enabled: false,
            clock_interval: Duration::from_millis(20),
            max_registrations: 32,
            registration_timeout: Duration::from_secs(600),
            enable_tracing: false,
        }
    }
}

impl TestHarnessConfig {
    /// Create a new config with a test name.
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            ..Default::default()
        }
    }

    /// Run the clock with `interval`.
    pub fn with_clock(mut self, interval: Duration) -> Self {
        self.clock_enabled = true;
        self.clock_interval = interval;
        self
    }

    /// Set the discovery limit.
    pub fn max_registrations(mut self, limit: usize) -> Self {
        self.max_registrations = limit;
        self
    }

    /// Set the registration lifetime.
    pub fn registration_timeout(mut self, timeout: Duration) -> Self {
        self.registration_timeout = timeout;
        self
    }

    /// Enable tracing.
    pub fn with_tracing(mut self) -> Self {
        self.enable_tracing = true;
        self
    }

    fn server_options(&self) -> ServerOptions {
        ServerOptions {
            clock_enabled: self.clock_enabled,
            clock_interval: self.clock_interval,
            discovery: DiscoveryOptions {
                max_registrations: self.max_registrations,
                registration_timeout: self.registration_timeout,
            },
            ..Default::default()
        }
    }
}

/// A server under test and the mocks behind it.
pub struct TestServer {
    /// The server.
    pub server: InternalServer,

    /// The mocks the server talks to.
    pub mocks: MockServices,

    /// Configuration used to create this harness.
    pub config: TestHarnessConfig,

    temp_dir: TempDir,
}

impl TestServer {
    /// Build a stopped server.
    pub fn new(config: TestHarnessConfig) -> Self {
        if config.enable_tracing {
            super::init_test_logging();
        }
        let mocks = MockServices::new();
        let server = InternalServer::with_options(mocks.service_set(), config.server_options())
            .expect("Failed to build server");
        let temp_dir = super::temp_test_dir(&format!("uasrv_{}_", config.test_name));
        Self {
            server,
            mocks,
            config,
            temp_dir,
        }
    }

    /// Build a stopped server with default settings.
    pub fn with_name(test_name: impl Into<String>) -> Self {
        Self::new(TestHarnessConfig::new(test_name))
    }

    /// Build and start a server.
    pub fn started(config: TestHarnessConfig) -> Self {
        let harness = Self::new(config);
        harness.server.start().expect("Failed to start server");
        harness
    }

    /// Open an external session and activate it anonymously.
    pub fn client_session(&self, name: &str) -> Arc<Session> {
        let session = self
            .server
            .create_session(name, User::Anonymous, true)
            .expect("Failed to create session");
        session
            .activate_session(&Default::default())
            .expect("Failed to activate session");
        session
    }

    /// Get the temp directory path.
    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Create a file path in the temp directory.
    pub fn temp_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// A configuration that persists registrations in this harness's temp
    /// directory.
    pub fn persistent_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.clock.enabled = false;
        config.discovery.persist = true;
        config.discovery.max_registrations = self.config.max_registrations;
        config.store = Some(StoreConfig::new(self.temp_file("registry.db")));
        config
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.stop();
    }
}
