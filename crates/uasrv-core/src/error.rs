// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Unified error hierarchy for the server core.
//!
//! Errors raised by this core (state, access, limits) terminate the current
//! request, never the server. Faults raised by external collaborators
//! (address space, subscriptions, history) travel through [`ServiceFault`]
//! without being reinterpreted.
//!
//! # Error Hierarchy
//!
//! ```text
//! UaError (root)
//! ├── SessionError    - Session state machine and credential checks
//! ├── DiscoveryError  - Registration limits and address resolution
//! ├── ServerError     - Lifecycle, scheduler, history enablement
//! ├── StoreError      - Durable store backend
//! └── ServiceFault    - Opaque collaborator faults
//! ```
//!
//! # Examples
//!
//! ```
//! use uasrv_core::error::{UaError, DiscoveryError};
//! use uasrv_core::types::StatusCode;
//!
//! let error: UaError = DiscoveryError::registration_limit(32).into();
//! assert!(!error.is_retryable());
//! assert_eq!(error.status_code(), StatusCode::BAD_TOO_MANY_OPERATIONS);
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::types::StatusCode;

/// Result alias for operations of the server core.
pub type UaResult<T> = Result<T, UaError>;

/// Result alias for durable store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// UaError - Root Error Type
// =============================================================================

/// The root error type of the server core.
#[derive(Debug, Error)]
pub enum UaError {
    /// Session lifecycle error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Discovery registry error.
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Server engine error.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Durable store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Fault raised by an external service collaborator.
    #[error("Service fault: {0}")]
    Service(#[from] ServiceFault),
}

impl UaError {
    /// Returns `true` if the caller may retry the operation as-is.
    ///
    /// Nothing in this core retries automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            UaError::Store(e) => e.is_retryable(),
            UaError::Server(ServerError::NotRunning) => true,
            _ => false,
        }
    }

    /// Returns the error type as a string for logging/metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            UaError::Session(_) => "session",
            UaError::Discovery(_) => "discovery",
            UaError::Server(_) => "server",
            UaError::Store(_) => "store",
            UaError::Service(_) => "service",
        }
    }

    /// Returns the protocol status code reported to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            UaError::Session(e) => e.status_code(),
            UaError::Discovery(e) => e.status_code(),
            UaError::Server(e) => e.status_code(),
            UaError::Store(_) => StatusCode::BAD_INTERNAL_ERROR,
            UaError::Service(e) => e.status,
        }
    }

    /// Returns `true` if the client can correct the condition itself.
    pub fn is_client_correctable(&self) -> bool {
        matches!(
            self,
            UaError::Session(SessionError::AccessDenied { .. })
                | UaError::Discovery(DiscoveryError::RegistrationLimitExceeded { .. })
        )
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session state machine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Operation attempted from the wrong session state.
    #[error("Session '{session}' is {state}, cannot {operation}")]
    InvalidSessionState {
        /// Session display name.
        session: String,
        /// Current state.
        state: String,
        /// Rejected operation.
        operation: String,
    },

    /// User credentials were rejected.
    #[error("Access denied for user '{user}'")]
    AccessDenied {
        /// The rejected user name.
        user: String,
    },
}

impl SessionError {
    /// Creates an invalid session state error.
    pub fn invalid_state(
        session: impl Into<String>,
        state: impl ToString,
        operation: impl Into<String>,
    ) -> Self {
        Self::InvalidSessionState {
            session: session.into(),
            state: state.to_string(),
            operation: operation.into(),
        }
    }

    /// Creates an access denied error.
    pub fn access_denied(user: impl Into<String>) -> Self {
        Self::AccessDenied { user: user.into() }
    }

    /// Returns the protocol status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::InvalidSessionState { .. } => StatusCode::BAD_SESSION_ID_INVALID,
            SessionError::AccessDenied { .. } => StatusCode::BAD_USER_ACCESS_DENIED,
        }
    }
}

// =============================================================================
// DiscoveryError
// =============================================================================

/// Discovery registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiscoveryError {
    /// Registry is full and the application URI is not yet registered.
    #[error("Maximum number of registrations reached: {limit}")]
    RegistrationLimitExceeded {
        /// Configured registration limit.
        limit: usize,
    },

    /// No client-visible address could be derived for URL rewriting.
    #[error("Could not extract network location from endpoint {endpoint_url:?}")]
    AddressResolution {
        /// The endpoint URL supplied by the request, if any.
        endpoint_url: Option<String>,
    },
}

impl DiscoveryError {
    /// Creates a registration limit error.
    pub fn registration_limit(limit: usize) -> Self {
        Self::RegistrationLimitExceeded { limit }
    }

    /// Creates an address resolution error.
    pub fn address_resolution(endpoint_url: Option<&str>) -> Self {
        Self::AddressResolution {
            endpoint_url: endpoint_url.map(str::to_string),
        }
    }

    /// Returns the protocol status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DiscoveryError::RegistrationLimitExceeded { .. } => StatusCode::BAD_TOO_MANY_OPERATIONS,
            DiscoveryError::AddressResolution { .. } => StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
        }
    }
}

// =============================================================================
// ServerError
// =============================================================================

/// Server engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServerError {
    /// Event history requested on a node that does not emit events.
    #[error("Node {node} does not generate events (event notifier {event_notifier:#04x})")]
    NodeNotEventSource {
        /// The source node.
        node: String,
        /// Its current event notifier bits.
        event_notifier: u8,
    },

    /// The scheduler thread loop is not running.
    #[error("Internal server stopped: scheduler thread loop is not running")]
    NotRunning,

    /// The scheduler could not be started.
    #[error("Scheduler failure: {message}")]
    Scheduler {
        /// Error message.
        message: String,
    },

    /// An attribute held a value of an unexpected type.
    #[error("Attribute {attribute} of node {node} has unexpected type: {message}")]
    AttributeType {
        /// The node.
        node: String,
        /// Attribute name.
        attribute: String,
        /// Error message.
        message: String,
    },

    /// An identifier counter reached its maximum.
    #[error("No {kind} identifiers left")]
    IdentifiersExhausted {
        /// Which counter ran out.
        kind: String,
    },
}

impl ServerError {
    /// Creates an identifiers-exhausted error.
    pub fn identifiers_exhausted(kind: impl Into<String>) -> Self {
        Self::IdentifiersExhausted { kind: kind.into() }
    }

    /// Creates a node-not-event-source error.
    pub fn not_event_source(node: impl ToString, event_notifier: u8) -> Self {
        Self::NodeNotEventSource {
            node: node.to_string(),
            event_notifier,
        }
    }

    /// Creates a scheduler error.
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    /// Creates an attribute type error.
    pub fn attribute_type(
        node: impl ToString,
        attribute: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        Self::AttributeType {
            node: node.to_string(),
            attribute: attribute.to_string(),
            message: message.into(),
        }
    }

    /// Returns the protocol status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NodeNotEventSource { .. } => StatusCode::BAD_NOT_SUPPORTED,
            ServerError::NotRunning => StatusCode::BAD_SERVER_HALTED,
            ServerError::Scheduler { .. } => StatusCode::BAD_INTERNAL_ERROR,
            ServerError::AttributeType { .. } => StatusCode::BAD_TYPE_MISMATCH,
            ServerError::IdentifiersExhausted { .. } => StatusCode::BAD_INTERNAL_ERROR,
        }
    }
}

// =============================================================================
// StoreError
// =============================================================================

/// Durable store backend errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The store file cannot be opened in the requested mode.
    #[error("Unsupported store mode for '{path}': {reason}")]
    UnsupportedStoreMode {
        /// Database path.
        path: PathBuf,
        /// Why the mode is unsupported.
        reason: String,
    },

    /// The embedded database reported an error.
    #[error("Database error during {operation}: {message}")]
    Database {
        /// Operation that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// The backend was already closed.
    #[error("Store '{path}' is closed")]
    Closed {
        /// Database path.
        path: PathBuf,
    },
}

impl StoreError {
    /// Creates an unsupported store mode error.
    pub fn unsupported_mode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedStoreMode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a database error.
    pub fn database(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Creates a closed-store error.
    pub fn closed(path: impl Into<PathBuf>) -> Self {
        Self::Closed { path: path.into() }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Database { message, .. } => {
                message.contains("locked") || message.contains("busy")
            }
            _ => false,
        }
    }
}

// =============================================================================
// ServiceFault
// =============================================================================

/// A service-level fault raised by an external collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ServiceFault {
    /// Protocol status code.
    pub status: StatusCode,
    /// Diagnostic message.
    pub message: String,
}

impl ServiceFault {
    /// Creates a new service fault.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates a fault carrying only a status code.
    pub fn status(status: StatusCode) -> Self {
        Self {
            status,
            message: status.name().to_string(),
        }
    }
}

impl From<StatusCode> for ServiceFault {
    fn from(status: StatusCode) -> Self {
        Self::status(status)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_status_codes() {
        let err = SessionError::invalid_state("s1", "Activated", "activate");
        assert_eq!(err.status_code(), StatusCode::BAD_SESSION_ID_INVALID);
        assert!(err.to_string().contains("Activated"));

        let err = SessionError::access_denied("bob");
        assert_eq!(err.status_code(), StatusCode::BAD_USER_ACCESS_DENIED);
    }

    #[test]
    fn test_root_error_conversion() {
        let err: UaError = ServerError::not_event_source("i=85", 0).into();
        assert_eq!(err.error_type(), "server");
        assert_eq!(err.status_code(), StatusCode::BAD_NOT_SUPPORTED);
        assert!(!err.is_client_correctable());

        let err: UaError = SessionError::access_denied("bob").into();
        assert!(err.is_client_correctable());
    }

    #[test]
    fn test_service_fault_passthrough() {
        let fault = ServiceFault::status(StatusCode::BAD_NODE_ID_UNKNOWN);
        let err: UaError = fault.clone().into();
        assert_eq!(err.status_code(), StatusCode::BAD_NODE_ID_UNKNOWN);
        assert_eq!(fault.message, "BadNodeIdUnknown");
    }

    #[test]
    fn test_store_error_retryable() {
        assert!(StoreError::database("write", "database is locked").is_retryable());
        assert!(!StoreError::unsupported_mode("/tmp/x.db", "missing").is_retryable());
        let err: UaError = StoreError::closed("/tmp/x.db").into();
        assert_eq!(err.status_code(), StatusCode::BAD_INTERNAL_ERROR);
    }
}
