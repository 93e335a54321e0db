// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-core
//!
//! Shared types for the uasrv OPC UA server core.
//!
//! - **Error**: unified error hierarchy with OPC UA status mapping
//! - **Types**: node ids, status codes, variants, application and endpoint descriptions
//! - **Service**: decoded request/response parameters for the services a session mediates
//! - **Callback**: server-wide monitored-item callback dispatch
//! - **Address**: endpoint URL parsing and wildcard address rewriting
//!
//! ## Example
//!
//! ```rust,ignore
//! use uasrv_core::address::replace_inaddr_any;
//!
//! let url = replace_inaddr_any("opc.tcp://0.0.0.0:4840", "10.0.0.5:4840");
//! assert_eq!(url, "opc.tcp://10.0.0.5:4840");
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Core Modules
// =============================================================================

pub mod error;
pub mod types;

// =============================================================================
// Service & Dispatch Modules
// =============================================================================

pub mod service;
pub mod callback;
pub mod address;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use error::*;
pub use types::*;

// Re-export callback types
pub use callback::{
    CallbackDispatcher, CallbackHandler, CallbackType, CollectorCallbackHandler,
    FnCallbackHandler, ItemCallbackPayload, ListenerId, ServerItemCallback,
    TracingCallbackHandler,
};

// Re-export address helpers
pub use address::{replace_inaddr_any, resolve_netloc};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
