// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Mock Implementations
//!
//! In-memory collaborators for exercising the server engines in isolation.
//!
//! ## Design Principles
//!
//! - Recording of interactions for verification
//! - Thread-safe; the scheduler thread writes through them too
//! - Easy to set up error injection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use uasrv_core::error::ServiceFault;
use uasrv_core::service::*;
use uasrv_core::types::{AttributeId, DataValue, NodeId, StatusCode, User, Variant};
use uasrv_server::{
    AddressSpace, AttributeService, HistoryManager, MethodCallback, MethodService,
    NodeManagementService, NotificationCallback, Scheduler, ServiceResult, ServiceSet,
    SessionInfo, SubscriptionService, UserManager, ViewService,
};

// =============================================================================
// Mock Node Store
// =============================================================================

/// An address space holding arbitrary attribute values.
#[derive(Default)]
pub struct MockNodeStore {
    attributes: Mutex<HashMap<(NodeId, AttributeId), DataValue>>,
    references: Mutex<Vec<(NodeId, NodeId)>>,
    methods: Mutex<HashMap<NodeId, MethodCallback>>,
    writers: Mutex<Vec<User>>,
    fail_writes: AtomicBool,
}

impl MockNodeStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an attribute value directly.
    pub fn put(&self, node: &NodeId, attribute: AttributeId, value: impl Into<Variant>) {
        self.attributes
            .lock()
            .insert((node.clone(), attribute), DataValue::new(value.into()));
    }

    /// Get an attribute value.
    pub fn value(&self, node: &NodeId, attribute: AttributeId) -> Option<Variant> {
        self.attributes
            .lock()
            .get(&(node.clone(), attribute))
            .map(|dv| dv.value.clone())
    }

    /// Users that performed writes, in order.
    pub fn writers(&self) -> Vec<User> {
        self.writers.lock().clone()
    }

    /// Forward references currently held.
    pub fn references(&self) -> Vec<(NodeId, NodeId)> {
        self.references.lock().clone()
    }

    /// Make every attribute write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl AddressSpace for MockNodeStore {
    fn get_attribute_value(&self, node: &NodeId, attribute: AttributeId) -> ServiceResult<DataValue> {
        self.attributes
            .lock()
            .get(&(node.clone(), attribute))
            .cloned()
            .ok_or_else(|| ServiceFault::new(StatusCode::BAD_NODE_ID_UNKNOWN, node.to_string()))
    }

    fn set_attribute_value(
        &self,
        node: &NodeId,
        attribute: AttributeId,
        value: DataValue,
    ) -> ServiceResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ServiceFault::new(StatusCode::BAD_INTERNAL_ERROR, "injected write failure"));
        }
        self.attributes.lock().insert((node.clone(), attribute), value);
        Ok(())
    }

    fn add_method_callback(&self, method: &NodeId, callback: MethodCallback) -> ServiceResult<()> {
        self.methods.lock().insert(method.clone(), callback);
        Ok(())
    }
}

impl AttributeService for MockNodeStore {
    fn read(&self, params: &ReadParameters) -> ServiceResult<Vec<DataValue>> {
        Ok(params
            .nodes_to_read
            .iter()
            .map(|r| match self.get_attribute_value(&r.node_id, r.attribute_id) {
                Ok(value) => value,
                Err(fault) => DataValue {
                    status: fault.status,
                    ..Default::default()
                },
            })
            .collect())
    }

    fn write(&self, params: &WriteParameters, user: &User) -> ServiceResult<Vec<StatusCode>> {
        self.writers.lock().push(user.clone());
        Ok(params
            .nodes_to_write
            .iter()
            .map(|w| {
                match self.set_attribute_value(&w.node_id, w.attribute_id, w.value.clone()) {
                    Ok(()) => StatusCode::GOOD,
                    Err(fault) => fault.status,
                }
            })
            .collect())
    }
}

impl ViewService for MockNodeStore {
    fn browse(&self, params: &BrowseParameters) -> ServiceResult<Vec<BrowseResult>> {
        let references = self.references.lock();
        Ok(params
            .nodes_to_browse
            .iter()
            .map(|desc| BrowseResult {
                status_code: StatusCode::GOOD,
                references: references
                    .iter()
                    .filter(|(source, _)| *source == desc.node_id)
                    .map(|(_, target)| ReferenceDescription {
                        reference_type_id: NodeId::numeric(0, 35),
                        is_forward: true,
                        node_id: target.clone(),
                        browse_name: target.to_string(),
                    })
                    .collect(),
            })
            .collect())
    }

    fn translate_browse_paths_to_node_ids(
        &self,
        paths: &[BrowsePath],
    ) -> ServiceResult<Vec<BrowsePathResult>> {
        Ok(paths
            .iter()
            .map(|_| BrowsePathResult {
                status_code: StatusCode::BAD_NOT_SUPPORTED,
                targets: Vec::new(),
            })
            .collect())
    }
}

impl NodeManagementService for MockNodeStore {
    fn add_nodes(&self, items: &[AddNodesItem], _: &User) -> ServiceResult<Vec<AddNodesResult>> {
        Ok(items
            .iter()
            .map(|item| {
                if let Some(value) = &item.value {
                    self.put(&item.requested_new_node_id, AttributeId::Value, value.clone());
                }
                self.references
                    .lock()
                    .push((item.parent_node_id.clone(), item.requested_new_node_id.clone()));
                AddNodesResult {
                    status_code: StatusCode::GOOD,
                    added_node_id: item.requested_new_node_id.clone(),
                }
            })
            .collect())
    }

    fn delete_nodes(&self, items: &[DeleteNodesItem], _: &User) -> ServiceResult<Vec<StatusCode>> {
        let mut attributes = self.attributes.lock();
        Ok(items
            .iter()
            .map(|item| {
                let before = attributes.len();
                attributes.retain(|(node, _), _| *node != item.node_id);
                if attributes.len() < before {
                    StatusCode::GOOD
                } else {
                    StatusCode::BAD_NODE_ID_UNKNOWN
                }
            })
            .collect())
    }

    fn add_references(&self, items: &[AddReferencesItem], _: &User) -> ServiceResult<Vec<StatusCode>> {
        let mut references = self.references.lock();
        for item in items {
            references.push((item.source_node_id.clone(), item.target_node_id.clone()));
        }
        Ok(vec![StatusCode::GOOD; items.len()])
    }

    fn delete_references(
        &self,
        items: &[DeleteReferencesItem],
        _: &User,
    ) -> ServiceResult<Vec<StatusCode>> {
        let mut references = self.references.lock();
        for item in items {
            references.retain(|(s, t)| !(*s == item.source_node_id && *t == item.target_node_id));
        }
        Ok(vec![StatusCode::GOOD; items.len()])
    }
}

impl MethodService for MockNodeStore {
    fn call(&self, methods: &[CallMethodRequest]) -> ServiceResult<Vec<CallMethodResult>> {
        let callbacks = self.methods.lock();
        Ok(methods
            .iter()
            .map(|request| match callbacks.get(&request.method_id) {
                Some(callback) => match callback(&request.object_id, &request.input_arguments) {
                    Ok(output_arguments) => CallMethodResult {
                        status_code: StatusCode::GOOD,
                        output_arguments,
                    },
                    Err(fault) => CallMethodResult {
                        status_code: fault.status,
                        output_arguments: Vec::new(),
                    },
                },
                None => CallMethodResult {
                    status_code: StatusCode::BAD_NODE_ID_UNKNOWN,
                    output_arguments: Vec::new(),
                },
            })
            .collect())
    }
}

// =============================================================================
// Mock Subscription Service
// =============================================================================

/// Subscription engine that hands out sequential ids and records deletes.
pub struct MockSubscriptionService {
    next_id: AtomicU32,
    live: Mutex<Vec<u32>>,
    delete_calls: Mutex<Vec<Vec<u32>>>,
    scheduler_updates: Mutex<Vec<bool>>,
    fail_deletes: AtomicBool,
}

impl MockSubscriptionService {
    /// Create a service whose first subscription id is 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            live: Mutex::new(Vec::new()),
            delete_calls: Mutex::new(Vec::new()),
            scheduler_updates: Mutex::new(Vec::new()),
            fail_deletes: AtomicBool::new(false),
        }
    }

    /// Ids created and not yet deleted.
    pub fn live(&self) -> Vec<u32> {
        self.live.lock().clone()
    }

    /// Every `delete_subscriptions` call, in order.
    pub fn delete_calls(&self) -> Vec<Vec<u32>> {
        self.delete_calls.lock().clone()
    }

    /// `true`/`false` per attach/detach of a scheduler.
    pub fn scheduler_updates(&self) -> Vec<bool> {
        self.scheduler_updates.lock().clone()
    }

    /// Make `delete_subscriptions` fail.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockSubscriptionService {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionService for MockSubscriptionService {
    fn create_subscription(
        &self,
        params: &CreateSubscriptionParameters,
        _callback: NotificationCallback,
    ) -> ServiceResult<CreateSubscriptionResult> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.live.lock().push(id);
        Ok(CreateSubscriptionResult {
            subscription_id: id,
            revised_publishing_interval: params.requested_publishing_interval,
            revised_lifetime_count: params.requested_lifetime_count,
            revised_max_keep_alive_count: params.requested_max_keep_alive_count,
        })
    }

    fn modify_subscription(
        &self,
        params: &ModifySubscriptionParameters,
    ) -> ServiceResult<ModifySubscriptionResult> {
        if !self.live.lock().contains(&params.subscription_id) {
            return Err(ServiceFault::status(StatusCode::BAD_SUBSCRIPTION_ID_INVALID));
        }
        Ok(ModifySubscriptionResult {
            revised_publishing_interval: params.requested_publishing_interval,
            revised_lifetime_count: params.requested_lifetime_count,
            revised_max_keep_alive_count: params.requested_max_keep_alive_count,
        })
    }

    fn delete_subscriptions(&self, ids: &[u32]) -> ServiceResult<Vec<StatusCode>> {
        self.delete_calls.lock().push(ids.to_vec());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(ServiceFault::new(StatusCode::BAD_INTERNAL_ERROR, "injected delete failure"));
        }
        let mut live = self.live.lock();
        Ok(ids
            .iter()
            .map(|id| match live.iter().position(|l| l == id) {
                Some(pos) => {
                    live.remove(pos);
                    StatusCode::GOOD
                }
                None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
            })
            .collect())
    }

    fn create_monitored_items(
        &self,
        params: &CreateMonitoredItemsParameters,
    ) -> ServiceResult<Vec<MonitoredItemCreateResult>> {
        Ok(params
            .items_to_create
            .iter()
            .enumerate()
            .map(|(i, item)| MonitoredItemCreateResult {
                status_code: StatusCode::GOOD,
                monitored_item_id: i as u32 + 1,
                revised_sampling_interval: item.sampling_interval,
                revised_queue_size: item.queue_size,
            })
            .collect())
    }

    fn modify_monitored_items(
        &self,
        params: &ModifyMonitoredItemsParameters,
    ) -> ServiceResult<Vec<MonitoredItemModifyResult>> {
        Ok(params
            .items_to_modify
            .iter()
            .map(|item| MonitoredItemModifyResult {
                status_code: StatusCode::GOOD,
                revised_sampling_interval: item.sampling_interval,
                revised_queue_size: item.queue_size,
            })
            .collect())
    }

    fn delete_monitored_items(
        &self,
        params: &DeleteMonitoredItemsParameters,
    ) -> ServiceResult<Vec<StatusCode>> {
        if params.monitored_item_ids.is_empty() {
            return Err(ServiceFault::status(StatusCode::BAD_NOTHING_TO_DO));
        }
        Ok(vec![StatusCode::GOOD; params.monitored_item_ids.len()])
    }

    fn publish(&self, acks: &[SubscriptionAcknowledgement]) -> ServiceResult<PublishResult> {
        Ok(PublishResult {
            subscription_id: self.live.lock().first().copied().unwrap_or(0),
            available_sequence_numbers: Vec::new(),
            more_notifications: false,
            notification_message: NotificationMessage {
                sequence_number: 1,
                publish_time: Utc::now(),
                notifications: Vec::new(),
            },
            results: vec![StatusCode::GOOD; acks.len()],
        })
    }

    fn republish(&self, _: &RepublishParameters) -> ServiceResult<NotificationMessage> {
        Err(ServiceFault::status(StatusCode::BAD_NOT_SUPPORTED))
    }

    fn set_scheduler(&self, scheduler: Option<Arc<Scheduler>>) {
        self.scheduler_updates.lock().push(scheduler.is_some());
    }
}

// =============================================================================
// Mock History Manager
// =============================================================================

/// A call recorded by [`MockHistoryManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryCall {
    /// `historize_data_change`.
    DataChange(NodeId),
    /// `historize_event`.
    Event(NodeId),
    /// `dehistorize`.
    Dehistorize(NodeId),
    /// `stop`.
    Stop,
}

/// History manager that only records what it is asked to do.
#[derive(Default)]
pub struct MockHistoryManager {
    calls: Mutex<Vec<HistoryCall>>,
}

impl MockHistoryManager {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded calls, in order.
    pub fn calls(&self) -> Vec<HistoryCall> {
        self.calls.lock().clone()
    }
}

impl HistoryManager for MockHistoryManager {
    fn historize_data_change(&self, node: &NodeId, _: HistoryRetention) -> ServiceResult<()> {
        self.calls.lock().push(HistoryCall::DataChange(node.clone()));
        Ok(())
    }

    fn dehistorize(&self, node: &NodeId) -> ServiceResult<()> {
        self.calls.lock().push(HistoryCall::Dehistorize(node.clone()));
        Ok(())
    }

    fn historize_event(&self, source: &NodeId, _: HistoryRetention) -> ServiceResult<()> {
        self.calls.lock().push(HistoryCall::Event(source.clone()));
        Ok(())
    }

    fn read_history(&self, params: &HistoryReadParameters) -> ServiceResult<Vec<HistoryReadResult>> {
        Ok(params
            .nodes_to_read
            .iter()
            .map(|_| HistoryReadResult {
                status_code: StatusCode::GOOD,
                data_values: Vec::new(),
            })
            .collect())
    }

    fn stop(&self) {
        self.calls.lock().push(HistoryCall::Stop);
    }
}

// =============================================================================
// Static User Manager
// =============================================================================

/// User manager backed by a fixed credential table.
#[derive(Debug, Default)]
pub struct StaticUserManager {
    users: HashMap<String, Vec<u8>>,
}

impl StaticUserManager {
    /// Create a manager with no users.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user.
    pub fn with_user(mut self, name: &str, password: &str) -> Self {
        self.users.insert(name.to_string(), password.as_bytes().to_vec());
        self
    }
}

impl UserManager for StaticUserManager {
    fn check_user_token(&self, _: &SessionInfo, token: &UserNameIdentityToken) -> bool {
        self.users
            .get(&token.user_name)
            .is_some_and(|password| *password == token.password)
    }
}

// =============================================================================
// Mock Service Set
// =============================================================================

/// Handles to every mock behind a [`ServiceSet`].
#[derive(Clone)]
pub struct MockServices {
    /// The node store.
    pub nodes: Arc<MockNodeStore>,
    /// The subscription engine.
    pub subscriptions: Arc<MockSubscriptionService>,
    /// The history manager.
    pub history: Arc<MockHistoryManager>,
}

impl MockServices {
    /// Create fresh mocks.
    pub fn new() -> Self {
        Self {
            nodes: Arc::new(MockNodeStore::new()),
            subscriptions: Arc::new(MockSubscriptionService::new()),
            history: Arc::new(MockHistoryManager::new()),
        }
    }

    /// Build the service set; `operator`/`secret` is the only valid login.
    pub fn service_set(&self) -> ServiceSet {
        ServiceSet::from_node_store(self.nodes.clone(), self.subscriptions.clone())
            .with_history(self.history.clone())
            .with_users(Arc::new(StaticUserManager::new().with_user("operator", "secret")))
    }
}

impl Default for MockServices {
    fn default() -> Self {
        Self::new()
    }
}
