// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session engine.
//!
//! A [`Session`] is the server-side record of one client conversation. It
//! walks a three-state machine and mediates every service call between the
//! client and the address-space collaborators.
//!
//! ```text
//!   create ──▶ Created ──activate──▶ Activated ──close──▶ Closed
//!                 │                                          ▲
//!                 └──────────────────close───────────────────┘
//! ```
//!
//! External sessions (opened by remote clients) may only use operational
//! services while `Activated`. Internal sessions, created by the server for
//! its own use, may operate from `Created`. Nothing is permitted once
//! `Closed`.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use uasrv_core::callback::{CallbackDispatcher, ItemCallbackPayload, ServerItemCallback};
use uasrv_core::error::{SessionError, UaResult};
use uasrv_core::service::{
    ActivateSessionParameters, ActivateSessionResult, AddNodesItem, AddNodesResult,
    AddReferencesItem, BrowseParameters, BrowsePath, BrowsePathResult, BrowseResult,
    CallMethodRequest, CallMethodResult, CreateMonitoredItemsParameters, CreateSessionParameters,
    CreateSessionResult, CreateSubscriptionParameters, CreateSubscriptionResult,
    DeleteMonitoredItemsParameters, DeleteNodesItem, DeleteReferencesItem, HistoryReadParameters,
    HistoryReadResult, IdentityToken, ModifyMonitoredItemsParameters,
    ModifySubscriptionParameters, ModifySubscriptionResult, MonitoredItemCreateResult,
    MonitoredItemModifyResult, NotificationMessage, PublishResult, ReadParameters,
    RepublishParameters, SubscriptionAcknowledgement, WriteParameters,
};
use uasrv_core::types::{DataValue, EndpointDescription, NodeId, StatusCode, User};

use crate::endpoints::EndpointList;
use crate::services::{MethodCallback, NotificationCallback, ServiceSet};

/// Default maximum request message size.
pub const DEFAULT_MAX_REQUEST_MESSAGE_SIZE: u32 = 65536;

/// Default server nonce length.
pub const DEFAULT_NONCE_LENGTH: usize = 32;

// =============================================================================
// State
// =============================================================================

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, not yet activated.
    Created,
    /// Activated by the client.
    Activated,
    /// Closed (terminal).
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "Created"),
            SessionState::Activated => write!(f, "Activated"),
            SessionState::Closed => write!(f, "Closed"),
        }
    }
}

/// Identity of a session, as handed to collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session id.
    pub session_id: NodeId,
    /// Authentication token.
    pub authentication_token: NodeId,
    /// Session name.
    pub name: String,
    /// Acting user.
    pub user: User,
    /// Whether a remote client opened the session.
    pub external: bool,
}

// =============================================================================
// SessionContext
// =============================================================================

/// Per-server limits applied to sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Maximum request message size advertised to clients.
    pub max_request_message_size: u32,
    /// Server nonce length in bytes.
    pub nonce_length: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_request_message_size: DEFAULT_MAX_REQUEST_MESSAGE_SIZE,
            nonce_length: DEFAULT_NONCE_LENGTH,
        }
    }
}

impl From<&uasrv_config::SessionConfig> for SessionLimits {
    fn from(config: &uasrv_config::SessionConfig) -> Self {
        Self {
            max_request_message_size: config.max_request_message_size,
            nonce_length: config.nonce_length,
        }
    }
}

/// Server-owned state every session reaches into.
#[derive(Debug)]
pub struct SessionContext {
    /// Collaborators.
    pub services: ServiceSet,
    /// Server-wide callback dispatcher.
    pub callbacks: Arc<CallbackDispatcher>,
    /// Server endpoints.
    pub endpoints: Arc<EndpointList>,
    /// Session limits.
    pub limits: SessionLimits,
}

/// Returns `len` random bytes.
pub fn create_nonce(len: usize) -> Vec<u8> {
    let mut nonce = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

// =============================================================================
// Session
// =============================================================================

/// One client (or internal) session.
pub struct Session {
    session_id: NodeId,
    authentication_token: NodeId,
    name: String,
    external: bool,
    user: RwLock<User>,
    state: RwLock<SessionState>,
    nonce: Mutex<Vec<u8>>,
    subscriptions: Mutex<Vec<u32>>,
    context: Arc<SessionContext>,
}

impl Session {
    /// Creates a session in the `Created` state.
    ///
    /// Identifiers are issued by the owning server.
    pub fn new(
        session_id: NodeId,
        authentication_token: NodeId,
        name: impl Into<String>,
        user: User,
        external: bool,
        context: Arc<SessionContext>,
    ) -> Self {
        let session = Self {
            session_id,
            authentication_token,
            name: name.into(),
            external,
            user: RwLock::new(user),
            state: RwLock::new(SessionState::Created),
            nonce: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            context,
        };
        info!(
            session_id = %session.session_id,
            name = %session.name,
            user = %session.user(),
            external,
            "Session created"
        );
        session
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the session id.
    pub fn session_id(&self) -> &NodeId {
        &self.session_id
    }

    /// Returns the authentication token.
    pub fn authentication_token(&self) -> &NodeId {
        &self.authentication_token
    }

    /// Returns the session name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the acting user.
    pub fn user(&self) -> User {
        self.user.read().clone()
    }

    /// Returns `true` if a remote client opened the session.
    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Returns the current state.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Returns the last issued server nonce.
    pub fn nonce(&self) -> Vec<u8> {
        self.nonce.lock().clone()
    }

    /// Returns the owned subscription ids in creation order.
    pub fn subscription_ids(&self) -> Vec<u32> {
        self.subscriptions.lock().clone()
    }

    /// Returns a snapshot of the session identity.
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id.clone(),
            authentication_token: self.authentication_token.clone(),
            name: self.name.clone(),
            user: self.user(),
            external: self.external,
        }
    }

    fn services(&self) -> &ServiceSet {
        &self.context.services
    }

    /// Fails unless the session may run `operation`.
    fn ensure_operational(&self, operation: &str) -> UaResult<()> {
        let state = self.state();
        let allowed = match state {
            SessionState::Activated => true,
            SessionState::Created => !self.external,
            SessionState::Closed => false,
        };
        if allowed {
            Ok(())
        } else {
            debug!(session_id = %self.session_id, %state, operation, "Operation rejected");
            Err(SessionError::invalid_state(self.session_id.to_string(), state, operation).into())
        }
    }

    fn dispatch(&self, payload: ItemCallbackPayload) {
        let event = ServerItemCallback::new(self.user(), self.name.clone(), payload);
        self.context.callbacks.dispatch(&event);
    }

    // =========================================================================
    // Session Services
    // =========================================================================

    /// Returns the server endpoints as seen from `observed`.
    pub fn get_endpoints(&self, observed: Option<SocketAddr>) -> Vec<EndpointDescription> {
        self.context.endpoints.for_client(observed)
    }

    /// CreateSession: issues a nonce and returns the session identifiers.
    pub fn create_session(
        &self,
        params: &CreateSessionParameters,
        observed: Option<SocketAddr>,
    ) -> UaResult<CreateSessionResult> {
        if self.state() == SessionState::Closed {
            return Err(SessionError::invalid_state(
                self.session_id.to_string(),
                SessionState::Closed,
                "CreateSession",
            )
            .into());
        }

        let nonce = create_nonce(self.context.limits.nonce_length);
        *self.nonce.lock() = nonce.clone();

        debug!(
            session_id = %self.session_id,
            requested_name = %params.session_name,
            "Create session request"
        );
        Ok(CreateSessionResult {
            session_id: self.session_id.clone(),
            authentication_token: self.authentication_token.clone(),
            revised_session_timeout: params.requested_session_timeout,
            server_nonce: nonce,
            server_endpoints: self.get_endpoints(observed),
            max_request_message_size: self.context.limits.max_request_message_size,
        })
    }

    /// ActivateSession: validates credentials and moves to `Activated`.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidSessionState`] unless the session is
    /// `Created`; [`SessionError::AccessDenied`] if a user name token is
    /// rejected, in which case the session stays `Created`.
    pub fn activate_session(
        &self,
        params: &ActivateSessionParameters,
    ) -> UaResult<ActivateSessionResult> {
        let state = self.state();
        if state != SessionState::Created {
            return Err(SessionError::invalid_state(
                self.session_id.to_string(),
                state,
                "ActivateSession",
            )
            .into());
        }

        let mut user = None;
        if let IdentityToken::UserName(token) = &params.user_identity_token {
            if !self.services().users.check_user_token(&self.info(), token) {
                warn!(
                    session_id = %self.session_id,
                    user_name = %token.user_name,
                    "Activation rejected: bad credentials"
                );
                return Err(SessionError::access_denied(token.user_name.clone()).into());
            }
            user = Some(User::Named(token.user_name.clone()));
        }

        {
            // A concurrent activation or close may have won while the
            // credentials were being checked.
            let mut state = self.state.write();
            if *state != SessionState::Created {
                return Err(SessionError::invalid_state(
                    self.session_id.to_string(),
                    *state,
                    "ActivateSession",
                )
                .into());
            }
            if let Some(user) = user {
                *self.user.write() = user;
            }
            *state = SessionState::Activated;
        }

        let nonce = create_nonce(self.context.limits.nonce_length);
        *self.nonce.lock() = nonce.clone();

        info!(session_id = %self.session_id, user = %self.user(), "Session activated");
        Ok(ActivateSessionResult {
            server_nonce: nonce,
            results: vec![StatusCode::GOOD; params.client_software_certificates.len()],
        })
    }

    /// CloseSession: moves to `Closed` and deletes every owned subscription.
    ///
    /// Closing a closed session does nothing.
    pub fn close_session(&self) -> UaResult<()> {
        {
            let mut state = self.state.write();
            if *state == SessionState::Closed {
                return Ok(());
            }
            *state = SessionState::Closed;
        }

        let owned = std::mem::take(&mut *self.subscriptions.lock());
        info!(
            session_id = %self.session_id,
            name = %self.name,
            subscriptions = ?owned,
            "Session closed"
        );
        if !owned.is_empty() {
            self.services().subscriptions.delete_subscriptions(&owned)?;
        }
        Ok(())
    }

    // =========================================================================
    // Attribute / View / Node Management / Method Services
    // =========================================================================

    /// Read.
    pub fn read(&self, params: &ReadParameters) -> UaResult<Vec<DataValue>> {
        self.ensure_operational("Read")?;
        Ok(self.services().attributes.read(params)?)
    }

    /// HistoryRead.
    pub fn history_read(&self, params: &HistoryReadParameters) -> UaResult<Vec<HistoryReadResult>> {
        self.ensure_operational("HistoryRead")?;
        Ok(self.services().history.read_history(params)?)
    }

    /// Write, acting as the session user.
    pub fn write(&self, params: &WriteParameters) -> UaResult<Vec<StatusCode>> {
        self.ensure_operational("Write")?;
        Ok(self.services().attributes.write(params, &self.user())?)
    }

    /// Browse.
    pub fn browse(&self, params: &BrowseParameters) -> UaResult<Vec<BrowseResult>> {
        self.ensure_operational("Browse")?;
        Ok(self.services().view.browse(params)?)
    }

    /// TranslateBrowsePathsToNodeIds.
    pub fn translate_browse_paths_to_node_ids(
        &self,
        paths: &[BrowsePath],
    ) -> UaResult<Vec<BrowsePathResult>> {
        self.ensure_operational("TranslateBrowsePathsToNodeIds")?;
        Ok(self.services().view.translate_browse_paths_to_node_ids(paths)?)
    }

    /// AddNodes.
    pub fn add_nodes(&self, items: &[AddNodesItem]) -> UaResult<Vec<AddNodesResult>> {
        self.ensure_operational("AddNodes")?;
        Ok(self.services().node_management.add_nodes(items, &self.user())?)
    }

    /// DeleteNodes.
    pub fn delete_nodes(&self, items: &[DeleteNodesItem]) -> UaResult<Vec<StatusCode>> {
        self.ensure_operational("DeleteNodes")?;
        Ok(self.services().node_management.delete_nodes(items, &self.user())?)
    }

    /// AddReferences.
    pub fn add_references(&self, items: &[AddReferencesItem]) -> UaResult<Vec<StatusCode>> {
        self.ensure_operational("AddReferences")?;
        Ok(self.services().node_management.add_references(items, &self.user())?)
    }

    /// DeleteReferences.
    pub fn delete_references(&self, items: &[DeleteReferencesItem]) -> UaResult<Vec<StatusCode>> {
        self.ensure_operational("DeleteReferences")?;
        Ok(self.services().node_management.delete_references(items, &self.user())?)
    }

    /// Binds `callback` to the method node `method`.
    pub fn add_method_callback(&self, method: &NodeId, callback: MethodCallback) -> UaResult<()> {
        self.ensure_operational("AddMethodCallback")?;
        Ok(self.services().address_space.add_method_callback(method, callback)?)
    }

    /// Call.
    pub fn call(&self, methods: &[CallMethodRequest]) -> UaResult<Vec<CallMethodResult>> {
        self.ensure_operational("Call")?;
        Ok(self.services().methods.call(methods)?)
    }

    // =========================================================================
    // Subscription Services
    // =========================================================================

    /// CreateSubscription: the new id joins the owned set.
    pub fn create_subscription(
        &self,
        params: &CreateSubscriptionParameters,
        callback: NotificationCallback,
    ) -> UaResult<CreateSubscriptionResult> {
        self.ensure_operational("CreateSubscription")?;
        let result = self.services().subscriptions.create_subscription(params, callback)?;
        {
            // Close sets the state before it takes the owned set, so the
            // state read here decides who deletes the new id.
            let mut owned = self.subscriptions.lock();
            let state = self.state();
            if state == SessionState::Closed {
                drop(owned);
                warn!(
                    session_id = %self.session_id,
                    subscription_id = result.subscription_id,
                    "Session closed during CreateSubscription; deleting subscription"
                );
                self.services()
                    .subscriptions
                    .delete_subscriptions(&[result.subscription_id])?;
                return Err(SessionError::invalid_state(
                    self.session_id.to_string(),
                    state,
                    "CreateSubscription",
                )
                .into());
            }
            owned.push(result.subscription_id);
        }
        debug!(
            session_id = %self.session_id,
            subscription_id = result.subscription_id,
            "Subscription created"
        );
        Ok(result)
    }

    /// ModifySubscription.
    pub fn modify_subscription(
        &self,
        params: &ModifySubscriptionParameters,
    ) -> UaResult<ModifySubscriptionResult> {
        self.ensure_operational("ModifySubscription")?;
        Ok(self.services().subscriptions.modify_subscription(params)?)
    }

    /// DeleteSubscriptions: ids leave the owned set before the engine is
    /// asked to delete them.
    pub fn delete_subscriptions(&self, ids: &[u32]) -> UaResult<Vec<StatusCode>> {
        self.ensure_operational("DeleteSubscriptions")?;
        self.subscriptions.lock().retain(|id| !ids.contains(id));
        Ok(self.services().subscriptions.delete_subscriptions(ids)?)
    }

    /// CreateMonitoredItems, then `ItemSubscriptionCreated`.
    pub fn create_monitored_items(
        &self,
        params: &CreateMonitoredItemsParameters,
    ) -> UaResult<Vec<MonitoredItemCreateResult>> {
        self.ensure_operational("CreateMonitoredItems")?;
        let results = self.services().subscriptions.create_monitored_items(params)?;
        self.dispatch(ItemCallbackPayload::Created {
            request: params.clone(),
            results: results.clone(),
        });
        Ok(results)
    }

    /// ModifyMonitoredItems, then `ItemSubscriptionModified`.
    pub fn modify_monitored_items(
        &self,
        params: &ModifyMonitoredItemsParameters,
    ) -> UaResult<Vec<MonitoredItemModifyResult>> {
        self.ensure_operational("ModifyMonitoredItems")?;
        let results = self.services().subscriptions.modify_monitored_items(params)?;
        self.dispatch(ItemCallbackPayload::Modified {
            request: params.clone(),
            results: results.clone(),
        });
        Ok(results)
    }

    /// DeleteMonitoredItems, then `ItemSubscriptionDeleted`.
    pub fn delete_monitored_items(
        &self,
        params: &DeleteMonitoredItemsParameters,
    ) -> UaResult<Vec<StatusCode>> {
        self.ensure_operational("DeleteMonitoredItems")?;
        let results = self.services().subscriptions.delete_monitored_items(params)?;
        self.dispatch(ItemCallbackPayload::Deleted {
            request: params.clone(),
            results: results.clone(),
        });
        Ok(results)
    }

    /// Publish.
    pub fn publish(&self, acks: &[SubscriptionAcknowledgement]) -> UaResult<PublishResult> {
        self.ensure_operational("Publish")?;
        Ok(self.services().subscriptions.publish(acks)?)
    }

    /// Republish.
    pub fn republish(&self, params: &RepublishParameters) -> UaResult<NotificationMessage> {
        self.ensure_operational("Republish")?;
        Ok(self.services().subscriptions.republish(params)?)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("external", &self.external)
            .finish()
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Session(name: {}, user: {}, id: {}, auth_token: {})",
            self.name,
            self.user(),
            self.session_id,
            self.authentication_token
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, MemoryNodes, RecordingSubscriptions};
    use uasrv_core::callback::CallbackType;
    use uasrv_core::error::UaError;
    use uasrv_core::service::{MonitoredItemCreateRequest, ReadValueId, UserNameIdentityToken};
    use uasrv_core::types::AttributeId;

    struct Fixture {
        session: Session,
        nodes: Arc<MemoryNodes>,
        subscriptions: Arc<RecordingSubscriptions>,
        callbacks: Arc<CallbackDispatcher>,
    }

    fn fixture(external: bool) -> Fixture {
        let (services, nodes, subscriptions) = test_support::services();
        let callbacks = Arc::new(CallbackDispatcher::new());
        let endpoints = Arc::new(EndpointList::new());
        endpoints.add(EndpointDescription {
            endpoint_url: "opc.tcp://0.0.0.0:4840/uasrv/server/".to_string(),
            ..Default::default()
        });
        let context = Arc::new(SessionContext {
            services,
            callbacks: callbacks.clone(),
            endpoints,
            limits: SessionLimits::default(),
        });
        let session = Session::new(
            NodeId::numeric(0, 11),
            NodeId::numeric(0, 1001),
            "test",
            User::Anonymous,
            external,
            context,
        );
        Fixture {
            session,
            nodes,
            subscriptions,
            callbacks,
        }
    }

    fn user_name(name: &str, password: &str) -> ActivateSessionParameters {
        ActivateSessionParameters {
            user_identity_token: IdentityToken::UserName(UserNameIdentityToken {
                policy_id: "username".to_string(),
                user_name: name.to_string(),
                password: password.as_bytes().to_vec(),
            }),
            ..Default::default()
        }
    }

    fn read_one(node: &NodeId) -> ReadParameters {
        ReadParameters {
            max_age: 0.0,
            nodes_to_read: vec![ReadValueId {
                node_id: node.clone(),
                attribute_id: AttributeId::Value,
            }],
        }
    }

    fn is_invalid_state(err: &UaError) -> bool {
        matches!(err, UaError::Session(SessionError::InvalidSessionState { .. }))
    }

    #[test]
    fn test_create_session_result() {
        let f = fixture(true);
        let observed: SocketAddr = "192.168.1.20:4840".parse().unwrap();
        let result = f
            .session
            .create_session(&CreateSessionParameters::default(), Some(observed))
            .unwrap();

        assert_eq!(result.session_id, NodeId::numeric(0, 11));
        assert_eq!(result.authentication_token, NodeId::numeric(0, 1001));
        assert_eq!(result.server_nonce.len(), DEFAULT_NONCE_LENGTH);
        assert_eq!(result.max_request_message_size, 65536);
        assert_eq!(
            result.server_endpoints[0].endpoint_url,
            "opc.tcp://192.168.1.20:4840/uasrv/server/"
        );
        assert_eq!(f.session.nonce(), result.server_nonce);
        assert_eq!(f.session.state(), SessionState::Created);
    }

    #[test]
    fn test_activate_twice_fails() {
        let f = fixture(true);
        f.session
            .activate_session(&ActivateSessionParameters::default())
            .unwrap();
        assert_eq!(f.session.state(), SessionState::Activated);

        let err = f
            .session
            .activate_session(&ActivateSessionParameters::default())
            .unwrap_err();
        assert!(is_invalid_state(&err));
        assert_eq!(f.session.state(), SessionState::Activated);
    }

    #[test]
    fn test_activate_with_bad_credentials_stays_created() {
        let f = fixture(true);
        let err = f
            .session
            .activate_session(&user_name("operator", "wrong"))
            .unwrap_err();
        assert!(matches!(err, UaError::Session(SessionError::AccessDenied { .. })));
        assert_eq!(err.status_code(), StatusCode::BAD_USER_ACCESS_DENIED);
        assert_eq!(f.session.state(), SessionState::Created);
        assert_eq!(f.session.user(), User::Anonymous);

        f.session
            .activate_session(&user_name("operator", "secret"))
            .unwrap();
        assert_eq!(f.session.state(), SessionState::Activated);
        assert_eq!(f.session.user(), User::Named("operator".to_string()));
    }

    #[test]
    fn test_external_session_requires_activation() {
        let f = fixture(true);
        let node = NodeId::numeric(2, 1);
        f.nodes.put(&node, AttributeId::Value, 7i32.into());

        let err = f.session.read(&read_one(&node)).unwrap_err();
        assert!(is_invalid_state(&err));

        f.session
            .activate_session(&ActivateSessionParameters::default())
            .unwrap();
        let values = f.session.read(&read_one(&node)).unwrap();
        assert_eq!(values[0].value, 7i32.into());
    }

    #[test]
    fn test_internal_session_operates_while_created() {
        let f = fixture(false);
        let node = NodeId::numeric(2, 1);
        f.nodes.put(&node, AttributeId::Value, 1i32.into());
        assert!(f.session.read(&read_one(&node)).is_ok());
    }

    #[test]
    fn test_closed_session_rejects_everything() {
        let f = fixture(false);
        f.session.close_session().unwrap();
        assert_eq!(f.session.state(), SessionState::Closed);

        let node = NodeId::numeric(2, 1);
        assert!(is_invalid_state(&f.session.read(&read_one(&node)).unwrap_err()));
        assert!(is_invalid_state(
            &f.session
                .activate_session(&ActivateSessionParameters::default())
                .unwrap_err()
        ));
        assert!(f
            .session
            .create_session(&CreateSessionParameters::default(), None)
            .is_err());

        // closing again is harmless
        f.session.close_session().unwrap();
    }

    #[test]
    fn test_close_deletes_owned_subscriptions() {
        let f = fixture(false);
        let callback: NotificationCallback = Arc::new(|_| {});
        for _ in 0..3 {
            f.session
                .create_subscription(&CreateSubscriptionParameters::default(), callback.clone())
                .unwrap();
        }
        assert_eq!(f.session.subscription_ids(), vec![1, 2, 3]);

        f.session.close_session().unwrap();
        assert_eq!(*f.subscriptions.deleted.lock(), vec![vec![1, 2, 3]]);
        assert!(f.session.subscription_ids().is_empty());
    }

    #[test]
    fn test_delete_subscriptions_shrinks_owned_set() {
        let f = fixture(false);
        let callback: NotificationCallback = Arc::new(|_| {});
        for _ in 0..3 {
            f.session
                .create_subscription(&CreateSubscriptionParameters::default(), callback.clone())
                .unwrap();
        }
        f.session.delete_subscriptions(&[2]).unwrap();
        assert_eq!(f.session.subscription_ids(), vec![1, 3]);

        f.session.close_session().unwrap();
        assert_eq!(*f.subscriptions.deleted.lock(), vec![vec![2], vec![1, 3]]);
    }

    #[test]
    fn test_close_during_create_subscription_deletes_new_id() {
        let f = fixture(false);
        let gate = Arc::new(std::sync::Barrier::new(2));
        *f.subscriptions.gate.lock() = Some(gate.clone());
        let callback: NotificationCallback = Arc::new(|_| {});

        let result = std::thread::scope(|scope| {
            let creating = scope.spawn(|| {
                f.session
                    .create_subscription(&CreateSubscriptionParameters::default(), callback)
            });
            gate.wait();
            f.session.close_session().unwrap();
            gate.wait();
            creating.join().unwrap()
        });

        assert!(is_invalid_state(&result.unwrap_err()));
        assert!(f.session.subscription_ids().is_empty());
        assert_eq!(*f.subscriptions.deleted.lock(), vec![vec![1]]);
    }

    #[test]
    fn test_activated_session_never_writes_anonymously() {
        let f = fixture(true);
        let write = WriteParameters {
            nodes_to_write: vec![uasrv_core::service::WriteValue {
                node_id: NodeId::numeric(2, 9),
                attribute_id: AttributeId::Value,
                value: DataValue::new(1i32),
            }],
        };

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                while f.session.write(&write).is_err() {
                    std::thread::yield_now();
                }
            });
            f.session
                .activate_session(&user_name("operator", "secret"))
                .unwrap();
            writer.join().unwrap();
        });

        let writes = f.nodes.writes.lock();
        assert!(!writes.is_empty());
        assert!(writes.iter().all(|u| *u == User::Named("operator".to_string())));
    }

    #[test]
    fn test_monitored_item_callbacks() {
        let f = fixture(false);
        let collected = Arc::new(Mutex::new(Vec::new()));
        let sink = collected.clone();
        f.callbacks
            .add_listener_fn(CallbackType::ItemSubscriptionCreated, move |event| {
                sink.lock().push((event.session_name.clone(), event.item_count()));
            });

        let params = CreateMonitoredItemsParameters {
            subscription_id: 1,
            items_to_create: vec![MonitoredItemCreateRequest {
                item_to_monitor: ReadValueId {
                    node_id: NodeId::numeric(2, 5),
                    attribute_id: AttributeId::Value,
                },
                monitoring_mode: Default::default(),
                client_handle: 1,
                sampling_interval: 100.0,
                queue_size: 1,
            }],
        };
        let results = f.session.create_monitored_items(&params).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(*collected.lock(), vec![("test".to_string(), 1)]);

        f.session
            .delete_monitored_items(&DeleteMonitoredItemsParameters {
                subscription_id: 1,
                monitored_item_ids: vec![1],
            })
            .unwrap();
        assert_eq!(collected.lock().len(), 1);
    }

    #[test]
    fn test_write_acts_as_session_user() {
        let f = fixture(true);
        f.session
            .activate_session(&user_name("operator", "secret"))
            .unwrap();
        f.session
            .write(&WriteParameters {
                nodes_to_write: vec![uasrv_core::service::WriteValue {
                    node_id: NodeId::numeric(2, 9),
                    attribute_id: AttributeId::Value,
                    value: DataValue::new(3i32),
                }],
            })
            .unwrap();
        assert_eq!(*f.nodes.writes.lock(), vec![User::Named("operator".to_string())]);
        assert_eq!(
            f.nodes.value(&NodeId::numeric(2, 9), AttributeId::Value),
            Some(3i32.into())
        );
    }
}
