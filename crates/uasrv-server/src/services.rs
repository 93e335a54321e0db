// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Collaborator contracts.
//!
//! The address space, its attribute/view/method/node-management services,
//! the subscription engine, history storage and user authentication live
//! outside this crate. The session and server engines reach them only
//! through these traits, bundled together in a [`ServiceSet`].
//!
//! Collaborator faults are returned as [`ServiceFault`] and propagated to the
//! caller without reinterpretation.

use std::sync::Arc;

use uasrv_core::error::ServiceFault;
use uasrv_core::service::{
    AddNodesItem, AddNodesResult, AddReferencesItem, BrowseParameters, BrowsePath,
    BrowsePathResult, BrowseResult, CallMethodRequest, CallMethodResult,
    CreateMonitoredItemsParameters, CreateSubscriptionParameters, CreateSubscriptionResult,
    DeleteMonitoredItemsParameters, DeleteNodesItem, DeleteReferencesItem, HistoryReadParameters,
    HistoryReadResult, HistoryRetention, ModifyMonitoredItemsParameters,
    ModifySubscriptionParameters, ModifySubscriptionResult, MonitoredItemCreateResult,
    MonitoredItemModifyResult, NotificationMessage, PublishResult, ReadParameters,
    RepublishParameters, SubscriptionAcknowledgement, UserNameIdentityToken, WriteParameters,
};
use uasrv_core::types::{AttributeId, DataValue, NodeId, StatusCode, User, Variant};

use crate::scheduler::Scheduler;
use crate::session::SessionInfo;

/// Result alias for collaborator calls.
pub type ServiceResult<T> = Result<T, ServiceFault>;

/// Callback invoked with the input arguments of a method call.
pub type MethodCallback =
    Arc<dyn Fn(&NodeId, &[Variant]) -> ServiceResult<Vec<Variant>> + Send + Sync>;

/// Callback through which a subscription delivers publish results.
pub type NotificationCallback = Arc<dyn Fn(PublishResult) + Send + Sync>;

// =============================================================================
// Address Space
// =============================================================================

/// Direct attribute access to the node store.
pub trait AddressSpace: Send + Sync {
    /// Reads one attribute of a node.
    fn get_attribute_value(&self, node: &NodeId, attribute: AttributeId)
        -> ServiceResult<DataValue>;

    /// Writes one attribute of a node, bypassing access checks.
    fn set_attribute_value(
        &self,
        node: &NodeId,
        attribute: AttributeId,
        value: DataValue,
    ) -> ServiceResult<()>;

    /// Binds a callback to a method node.
    fn add_method_callback(&self, method: &NodeId, callback: MethodCallback) -> ServiceResult<()>;
}

/// Read/Write service set.
pub trait AttributeService: Send + Sync {
    /// Reads attributes.
    fn read(&self, params: &ReadParameters) -> ServiceResult<Vec<DataValue>>;

    /// Writes attributes on behalf of `user`.
    fn write(&self, params: &WriteParameters, user: &User) -> ServiceResult<Vec<StatusCode>>;
}

/// View service set.
pub trait ViewService: Send + Sync {
    /// Browses references of nodes.
    fn browse(&self, params: &BrowseParameters) -> ServiceResult<Vec<BrowseResult>>;

    /// Resolves browse paths to node ids.
    fn translate_browse_paths_to_node_ids(
        &self,
        paths: &[BrowsePath],
    ) -> ServiceResult<Vec<BrowsePathResult>>;
}

/// NodeManagement service set.
pub trait NodeManagementService: Send + Sync {
    /// Adds nodes.
    fn add_nodes(&self, items: &[AddNodesItem], user: &User) -> ServiceResult<Vec<AddNodesResult>>;

    /// Deletes nodes.
    fn delete_nodes(&self, items: &[DeleteNodesItem], user: &User)
        -> ServiceResult<Vec<StatusCode>>;

    /// Adds references.
    fn add_references(
        &self,
        items: &[AddReferencesItem],
        user: &User,
    ) -> ServiceResult<Vec<StatusCode>>;

    /// Deletes references.
    fn delete_references(
        &self,
        items: &[DeleteReferencesItem],
        user: &User,
    ) -> ServiceResult<Vec<StatusCode>>;
}

/// Method service set.
pub trait MethodService: Send + Sync {
    /// Calls methods.
    fn call(&self, methods: &[CallMethodRequest]) -> ServiceResult<Vec<CallMethodResult>>;
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Subscription and monitored-item engine.
pub trait SubscriptionService: Send + Sync {
    /// Creates a subscription that publishes through `callback`.
    fn create_subscription(
        &self,
        params: &CreateSubscriptionParameters,
        callback: NotificationCallback,
    ) -> ServiceResult<CreateSubscriptionResult>;

    /// Modifies a subscription.
    fn modify_subscription(
        &self,
        params: &ModifySubscriptionParameters,
    ) -> ServiceResult<ModifySubscriptionResult>;

    /// Deletes subscriptions, returning one status per id.
    fn delete_subscriptions(&self, ids: &[u32]) -> ServiceResult<Vec<StatusCode>>;

    /// Creates monitored items.
    fn create_monitored_items(
        &self,
        params: &CreateMonitoredItemsParameters,
    ) -> ServiceResult<Vec<MonitoredItemCreateResult>>;

    /// Modifies monitored items.
    fn modify_monitored_items(
        &self,
        params: &ModifyMonitoredItemsParameters,
    ) -> ServiceResult<Vec<MonitoredItemModifyResult>>;

    /// Deletes monitored items.
    fn delete_monitored_items(
        &self,
        params: &DeleteMonitoredItemsParameters,
    ) -> ServiceResult<Vec<StatusCode>>;

    /// Acknowledges notifications and returns the next message or a keep-alive.
    fn publish(&self, acks: &[SubscriptionAcknowledgement]) -> ServiceResult<PublishResult>;

    /// Resends a retained notification message.
    fn republish(&self, params: &RepublishParameters) -> ServiceResult<NotificationMessage>;

    /// Hands the engine the server's scheduler, or `None` when it stops.
    fn set_scheduler(&self, scheduler: Option<Arc<Scheduler>>);
}

// =============================================================================
// History
// =============================================================================

/// Historical data storage.
pub trait HistoryManager: Send + Sync {
    /// Starts storing value changes of `node`.
    fn historize_data_change(&self, node: &NodeId, retention: HistoryRetention)
        -> ServiceResult<()>;

    /// Stops storing history for `node`.
    fn dehistorize(&self, node: &NodeId) -> ServiceResult<()>;

    /// Starts storing events emitted by `source`.
    fn historize_event(&self, source: &NodeId, retention: HistoryRetention) -> ServiceResult<()>;

    /// Reads raw history.
    fn read_history(&self, params: &HistoryReadParameters)
        -> ServiceResult<Vec<HistoryReadResult>>;

    /// Flushes and releases storage.
    fn stop(&self);
}

/// History manager that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHistoryManager;

impl HistoryManager for NullHistoryManager {
    fn historize_data_change(&self, _: &NodeId, _: HistoryRetention) -> ServiceResult<()> {
        Ok(())
    }

    fn dehistorize(&self, _: &NodeId) -> ServiceResult<()> {
        Ok(())
    }

    fn historize_event(&self, _: &NodeId, _: HistoryRetention) -> ServiceResult<()> {
        Ok(())
    }

    fn read_history(&self, params: &HistoryReadParameters) -> ServiceResult<Vec<HistoryReadResult>> {
        Ok(params
            .nodes_to_read
            .iter()
            .map(|_| HistoryReadResult {
                status_code: StatusCode::BAD_NOT_SUPPORTED,
                data_values: Vec::new(),
            })
            .collect())
    }

    fn stop(&self) {}
}

// =============================================================================
// Users
// =============================================================================

/// Validates user name credentials presented at activation.
pub trait UserManager: Send + Sync {
    /// Returns `true` if `token` is acceptable for `session`.
    fn check_user_token(&self, session: &SessionInfo, token: &UserNameIdentityToken) -> bool;
}

/// User manager that accepts every token.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissiveUserManager;

impl UserManager for PermissiveUserManager {
    fn check_user_token(&self, _: &SessionInfo, _: &UserNameIdentityToken) -> bool {
        true
    }
}

// =============================================================================
// ServiceSet
// =============================================================================

/// The collaborators a server is wired to.
#[derive(Clone)]
pub struct ServiceSet {
    /// Node store.
    pub address_space: Arc<dyn AddressSpace>,
    /// Read/Write.
    pub attributes: Arc<dyn AttributeService>,
    /// Browse.
    pub view: Arc<dyn ViewService>,
    /// Node management.
    pub node_management: Arc<dyn NodeManagementService>,
    /// Method calls.
    pub methods: Arc<dyn MethodService>,
    /// Subscription engine.
    pub subscriptions: Arc<dyn SubscriptionService>,
    /// History storage.
    pub history: Arc<dyn HistoryManager>,
    /// Credential checks.
    pub users: Arc<dyn UserManager>,
}

impl ServiceSet {
    /// Wires every service set to one object implementing them all.
    ///
    /// History defaults to [`NullHistoryManager`] and users to
    /// [`PermissiveUserManager`].
    pub fn from_node_store<S>(store: Arc<S>, subscriptions: Arc<dyn SubscriptionService>) -> Self
    where
        S: AddressSpace
            + AttributeService
            + ViewService
            + NodeManagementService
            + MethodService
            + 'static,
    {
        Self {
            address_space: store.clone(),
            attributes: store.clone(),
            view: store.clone(),
            node_management: store.clone(),
            methods: store,
            subscriptions,
            history: Arc::new(NullHistoryManager),
            users: Arc::new(PermissiveUserManager),
        }
    }

    /// Replaces the history manager.
    pub fn with_history(mut self, history: Arc<dyn HistoryManager>) -> Self {
        self.history = history;
        self
    }

    /// Replaces the user manager.
    pub fn with_users(mut self, users: Arc<dyn UserManager>) -> Self {
        self.users = users;
        self
    }
}

impl std::fmt::Debug for ServiceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceSet").finish_non_exhaustive()
    }
}
