// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};

use chrono::Utc;
use parking_lot::Mutex;

use uasrv_core::error::ServiceFault;
use uasrv_core::service::*;
use uasrv_core::types::{AttributeId, DataValue, NodeId, StatusCode, User, Variant};

use crate::scheduler::Scheduler;
use crate::services::*;
use crate::session::SessionInfo;

#[derive(Default)]
pub(crate) struct MemoryNodes {
    pub attributes: Mutex<HashMap<(NodeId, AttributeId), DataValue>>,
    pub writes: Mutex<Vec<User>>,
    pub methods: Mutex<HashMap<NodeId, MethodCallback>>,
}

impl MemoryNodes {
    pub fn value(&self, node: &NodeId, attribute: AttributeId) -> Option<Variant> {
        self.attributes
            .lock()
            .get(&(node.clone(), attribute))
            .map(|v| v.value.clone())
    }

    pub fn put(&self, node: &NodeId, attribute: AttributeId, value: Variant) {
        self.attributes
            .lock()
            .insert((node.clone(), attribute), DataValue::new(value));
    }
}

impl AddressSpace for MemoryNodes {
    fn get_attribute_value(&self, node: &NodeId, attribute: AttributeId) -> ServiceResult<DataValue> {
        self.attributes
            .lock()
            .get(&(node.clone(), attribute))
            .cloned()
            .ok_or_else(|| ServiceFault::status(StatusCode::BAD_NODE_ID_UNKNOWN))
    }

    fn set_attribute_value(&self, node: &NodeId, attribute: AttributeId, value: DataValue) -> ServiceResult<()> {
        self.attributes.lock().insert((node.clone(), attribute), value);
        Ok(())
    }

    fn add_method_callback(&self, method: &NodeId, callback: MethodCallback) -> ServiceResult<()> {
        self.methods.lock().insert(method.clone(), callback);
        Ok(())
    }
}

impl AttributeService for MemoryNodes {
    fn read(&self, params: &ReadParameters) -> ServiceResult<Vec<DataValue>> {
        Ok(params
            .nodes_to_read
            .iter()
            .map(|r| {
                self.get_attribute_value(&r.node_id, r.attribute_id)
                    .unwrap_or_else(|f| DataValue {
                        status: f.status,
                        ..Default::default()
                    })
            })
            .collect())
    }

    fn write(&self, params: &WriteParameters, user: &User) -> ServiceResult<Vec<StatusCode>> {
        self.writes.lock().push(user.clone());
        for w in &params.nodes_to_write {
            self.set_attribute_value(&w.node_id, w.attribute_id, w.value.clone())?;
        }
        Ok(vec![StatusCode::GOOD; params.nodes_to_write.len()])
    }
}

impl ViewService for MemoryNodes {
    fn browse(&self, params: &BrowseParameters) -> ServiceResult<Vec<BrowseResult>> {
        Ok(params
            .nodes_to_browse
            .iter()
            .map(|_| BrowseResult {
                status_code: StatusCode::GOOD,
                references: Vec::new(),
            })
            .collect())
    }

    fn translate_browse_paths_to_node_ids(&self, paths: &[BrowsePath]) -> ServiceResult<Vec<BrowsePathResult>> {
        Ok(paths
            .iter()
            .map(|_| BrowsePathResult {
                status_code: StatusCode::BAD_NOT_SUPPORTED,
                targets: Vec::new(),
            })
            .collect())
    }
}

impl NodeManagementService for MemoryNodes {
    fn add_nodes(&self, items: &[AddNodesItem], _: &User) -> ServiceResult<Vec<AddNodesResult>> {
        Ok(items
            .iter()
            .map(|i| AddNodesResult {
                status_code: StatusCode::GOOD,
                added_node_id: i.requested_new_node_id.clone(),
            })
            .collect())
    }

    fn delete_nodes(&self, items: &[DeleteNodesItem], _: &User) -> ServiceResult<Vec<StatusCode>> {
        Ok(vec![StatusCode::GOOD; items.len()])
    }

    fn add_references(&self, items: &[AddReferencesItem], _: &User) -> ServiceResult<Vec<StatusCode>> {
        Ok(vec![StatusCode::GOOD; items.len()])
    }

    fn delete_references(&self, items: &[DeleteReferencesItem], _: &User) -> ServiceResult<Vec<StatusCode>> {
        Ok(vec![StatusCode::GOOD; items.len()])
    }
}

impl MethodService for MemoryNodes {
    fn call(&self, methods: &[CallMethodRequest]) -> ServiceResult<Vec<CallMethodResult>> {
        let callbacks = self.methods.lock();
        Ok(methods
            .iter()
            .map(|m| match callbacks.get(&m.method_id) {
                Some(cb) => match cb(&m.object_id, &m.input_arguments) {
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

pub(crate) struct RecordingSubscriptions {
    next_id: AtomicU32,
    pub deleted: Mutex<Vec<Vec<u32>>>,
    pub scheduler_set: Mutex<Vec<bool>>,
    /// When set, `create_subscription` waits on it twice: once on entry,
    /// once before returning.
    pub gate: Mutex<Option<Arc<Barrier>>>,
}

impl Default for RecordingSubscriptions {
    fn default() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            deleted: Mutex::new(Vec::new()),
            scheduler_set: Mutex::new(Vec::new()),
            gate: Mutex::new(None),
        }
    }
}

impl SubscriptionService for RecordingSubscriptions {
    fn create_subscription(
        &self,
        params: &CreateSubscriptionParameters,
        _: NotificationCallback,
    ) -> ServiceResult<CreateSubscriptionResult> {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        Ok(CreateSubscriptionResult {
            subscription_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            revised_publishing_interval: params.requested_publishing_interval,
            revised_lifetime_count: params.requested_lifetime_count,
            revised_max_keep_alive_count: params.requested_max_keep_alive_count,
        })
    }

    fn modify_subscription(&self, params: &ModifySubscriptionParameters) -> ServiceResult<ModifySubscriptionResult> {
        Ok(ModifySubscriptionResult {
            revised_publishing_interval: params.requested_publishing_interval,
            revised_lifetime_count: params.requested_lifetime_count,
            revised_max_keep_alive_count: params.requested_max_keep_alive_count,
        })
    }

    fn delete_subscriptions(&self, ids: &[u32]) -> ServiceResult<Vec<StatusCode>> {
        self.deleted.lock().push(ids.to_vec());
        Ok(vec![StatusCode::GOOD; ids.len()])
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

    fn delete_monitored_items(&self, params: &DeleteMonitoredItemsParameters) -> ServiceResult<Vec<StatusCode>> {
        Ok(vec![StatusCode::GOOD; params.monitored_item_ids.len()])
    }

    fn publish(&self, acks: &[SubscriptionAcknowledgement]) -> ServiceResult<PublishResult> {
        Ok(PublishResult {
            subscription_id: acks.first().map(|a| a.subscription_id).unwrap_or(0),
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
        self.scheduler_set.lock().push(scheduler.is_some());
    }
}

/// Accepts only `operator` / `secret`.
pub(crate) struct SingleUser;

impl UserManager for SingleUser {
    fn check_user_token(&self, _: &SessionInfo, token: &UserNameIdentityToken) -> bool {
        token.user_name == "operator" && token.password == b"secret"
    }
}

pub(crate) fn services() -> (ServiceSet, Arc<MemoryNodes>, Arc<RecordingSubscriptions>) {
    let nodes = Arc::new(MemoryNodes::default());
    let subscriptions = Arc::new(RecordingSubscriptions::default());
    let set = ServiceSet::from_node_store(nodes.clone(), subscriptions.clone())
        .with_users(Arc::new(SingleUser));
    (set, nodes, subscriptions)
}
