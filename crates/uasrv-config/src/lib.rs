// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-config
//!
//! Configuration management for the uasrv OPC UA server core.
//!
//! ## Features
//!
//! - **Schema Definition**: Server identity, endpoints, discovery limits,
//!   session parameters, the durable store and logging
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Overrides**: Override config values via environment variables
//!
//! ## Quick Start
//!
//! ```no_run
//! use uasrv_config::loader::load_config;
//!
//! let config = load_config("server.yaml").unwrap();
//!
//! println!("Application URI: {}", config.server.application_uri);
//! println!("Endpoints: {}", config.server.endpoints.len());
//! ```
//!
//! ## Configuration Schema
//!
//! - `server` - Application identity, namespaces, endpoints and the status clock
//! - `discovery` - Registration limit, expiry and persistence
//! - `session` - Request size limit and nonce length
//! - `store` - SQLite store used by history and discovery persistence
//! - `history` - Default retention for historized nodes
//! - `logging` - Logging configuration
//!
//! ## Environment Variables
//!
//! ```text
//! UASRV_APPLICATION_URI=urn:plant:server
//! UASRV_ENDPOINTS_0_URL=opc.tcp://0.0.0.0:4841
//! UASRV_STORE_PATH=/var/lib/uasrv/store.db
//! UASRV_LOG_LEVEL=debug
//! ```
//!
//! Values in config files can reference environment variables:
//!
//! ```yaml
//! server:
//!   application_uri: "${APPLICATION_URI:urn:uasrv:server}"
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use schema::{
    // Top-level config
    ServerConfig,
    ServerSection,
    EndpointConfig,
    ClockConfig,
    // Subsystems
    DiscoveryConfig,
    SessionConfig,
    StoreConfig,
    HistoryConfig,
    // Logging config
    LoggingConfig,
    LogLevel,
    LogFormat,
};

pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader, DEFAULT_ENV_PREFIX};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
