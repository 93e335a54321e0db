// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # uasrv-server
//!
//! Session, discovery and server engines of the uasrv OPC UA server core.
//!
//! The transport, encoding and address-space implementations live outside
//! this crate. They plug in through the collaborator traits in
//! [`services`]; this crate supplies the state machines around them.
//!
//! ## Modules
//!
//! - [`server`]: [`InternalServer`], the lifecycle, status clock, identifier
//!   counters and history toggles
//! - [`session`]: [`Session`], the per-client state machine and service
//!   dispatch
//! - [`discovery`]: [`LocalDiscoveryService`], the registration registry
//!   with expiry
//! - [`scheduler`]: [`Scheduler`], a single background thread for delayed
//!   and periodic tasks
//! - [`registration_store`]: durable discovery registrations
//! - [`logging`]: subscriber setup from configuration
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use uasrv_server::{InternalServer, ServiceSet};
//!
//! let services = ServiceSet::from_node_store(node_store, subscriptions);
//! let server = InternalServer::new(services)?;
//! server.start()?;
//!
//! let session = server.create_session("client", User::Anonymous, true)?;
//! session.activate_session(&Default::default())?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Engine Modules
// =============================================================================

pub mod discovery;
pub mod endpoints;
pub mod scheduler;
pub mod server;
pub mod session;

// =============================================================================
// Collaborators & Infrastructure
// =============================================================================

pub mod logging;
pub mod registration_store;
pub mod services;

#[cfg(test)]
mod test_support;

// =============================================================================
// Re-exports for convenience
// =============================================================================

pub use discovery::{
    DiscoveryOptions, LocalDiscoveryService, ServerDescription, MAX_REGISTRATIONS,
    REG_EXPIRE_TIMEOUT,
};
pub use endpoints::EndpointList;
pub use logging::init_logging;
pub use registration_store::{RegistrationStore, StoredRegistration};
pub use scheduler::{Scheduler, TaskHandle};
pub use server::{InternalServer, ServerOptions};
pub use services::{
    AddressSpace, AttributeService, HistoryManager, MethodCallback, MethodService,
    NodeManagementService, NotificationCallback, NullHistoryManager, PermissiveUserManager,
    ServiceResult, ServiceSet, SubscriptionService, UserManager, ViewService,
};
pub use session::{Session, SessionContext, SessionInfo, SessionLimits, SessionState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
