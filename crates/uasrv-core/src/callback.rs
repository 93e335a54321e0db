// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server-wide callback dispatch.
//!
//! Sessions publish monitored-item lifecycle events here so observers
//! (logging, metrics, audit trails) can react without the session engine
//! knowing about them. Listeners are registered per [`CallbackType`] and
//! invoked synchronously, in registration order, on the thread that
//! triggered the event.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uasrv_core::callback::{CallbackDispatcher, CallbackType, CollectorCallbackHandler};
//!
//! let dispatcher = CallbackDispatcher::new();
//! let collector = Arc::new(CollectorCallbackHandler::new(100));
//! let id = dispatcher.add_listener(CallbackType::ItemSubscriptionCreated, collector.clone());
//!
//! // ... sessions create monitored items ...
//!
//! dispatcher.remove_listener(id);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::service::{
    CreateMonitoredItemsParameters, DeleteMonitoredItemsParameters, ModifyMonitoredItemsParameters,
    MonitoredItemCreateResult, MonitoredItemModifyResult,
};
use crate::types::{StatusCode, User};

// =============================================================================
// Event Types
// =============================================================================

/// Kinds of server-wide callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackType {
    /// Monitored items were created.
    ItemSubscriptionCreated,
    /// Monitored items were modified.
    ItemSubscriptionModified,
    /// Monitored items were deleted.
    ItemSubscriptionDeleted,
}

impl fmt::Display for CallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemSubscriptionCreated => write!(f, "ItemSubscriptionCreated"),
            Self::ItemSubscriptionModified => write!(f, "ItemSubscriptionModified"),
            Self::ItemSubscriptionDeleted => write!(f, "ItemSubscriptionDeleted"),
        }
    }
}

/// Payload of a monitored-item callback: the original request and the
/// collaborator's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemCallbackPayload {
    /// CreateMonitoredItems request and per-item results.
    Created {
        /// The request.
        request: CreateMonitoredItemsParameters,
        /// Per-item results.
        results: Vec<MonitoredItemCreateResult>,
    },
    /// ModifyMonitoredItems request and per-item results.
    Modified {
        /// The request.
        request: ModifyMonitoredItemsParameters,
        /// Per-item results.
        results: Vec<MonitoredItemModifyResult>,
    },
    /// DeleteMonitoredItems request and per-item statuses.
    Deleted {
        /// The request.
        request: DeleteMonitoredItemsParameters,
        /// Per-item statuses.
        results: Vec<StatusCode>,
    },
}

/// A server-wide monitored-item event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerItemCallback {
    /// Acting user of the session that triggered the event.
    pub user: User,
    /// Name of the triggering session.
    pub session_name: String,
    /// When the event was raised.
    pub timestamp: DateTime<Utc>,
    /// Request and result.
    pub payload: ItemCallbackPayload,
}

impl ServerItemCallback {
    /// Creates a new event stamped with the current time.
    pub fn new(user: User, session_name: impl Into<String>, payload: ItemCallbackPayload) -> Self {
        Self {
            user,
            session_name: session_name.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Returns the callback kind this event is dispatched under.
    pub fn callback_type(&self) -> CallbackType {
        match self.payload {
            ItemCallbackPayload::Created { .. } => CallbackType::ItemSubscriptionCreated,
            ItemCallbackPayload::Modified { .. } => CallbackType::ItemSubscriptionModified,
            ItemCallbackPayload::Deleted { .. } => CallbackType::ItemSubscriptionDeleted,
        }
    }

    /// Returns the subscription the event concerns.
    pub fn subscription_id(&self) -> u32 {
        match &self.payload {
            ItemCallbackPayload::Created { request, .. } => request.subscription_id,
            ItemCallbackPayload::Modified { request, .. } => request.subscription_id,
            ItemCallbackPayload::Deleted { request, .. } => request.subscription_id,
        }
    }

    /// Returns the number of items affected.
    pub fn item_count(&self) -> usize {
        match &self.payload {
            ItemCallbackPayload::Created { results, .. } => results.len(),
            ItemCallbackPayload::Modified { results, .. } => results.len(),
            ItemCallbackPayload::Deleted { results, .. } => results.len(),
        }
    }
}

// =============================================================================
// Handler Trait
// =============================================================================

/// A listener for server callbacks.
///
/// Handlers run on the request thread and should return quickly.
pub trait CallbackHandler: Send + Sync {
    /// Returns the handler name for logging.
    fn name(&self) -> &str {
        "anonymous"
    }

    /// Handles a callback event.
    fn handle(&self, event: &ServerItemCallback);
}

/// Adapts a closure into a [`CallbackHandler`].
pub struct FnCallbackHandler<F> {
    name: String,
    f: F,
}

impl<F> FnCallbackHandler<F>
where
    F: Fn(&ServerItemCallback) + Send + Sync,
{
    /// Wraps `f` under the given handler name.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> CallbackHandler for FnCallbackHandler<F>
where
    F: Fn(&ServerItemCallback) + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &ServerItemCallback) {
        (self.f)(event)
    }
}

// =============================================================================
// Built-in Handlers
// =============================================================================

/// Logs every callback at debug level.
#[derive(Debug, Default)]
pub struct TracingCallbackHandler;

impl TracingCallbackHandler {
    /// Creates a new tracing handler.
    pub fn new() -> Self {
        Self
    }
}

impl CallbackHandler for TracingCallbackHandler {
    fn name(&self) -> &str {
        "tracing_handler"
    }

    fn handle(&self, event: &ServerItemCallback) {
        tracing::debug!(
            event = %event.callback_type(),
            session = %event.session_name,
            subscription_id = event.subscription_id(),
            items = event.item_count(),
            "Server item callback"
        );
    }
}

/// Capacity of a default [`CollectorCallbackHandler`].
pub const DEFAULT_COLLECTOR_CAPACITY: usize = 1000;

/// Collects callbacks in memory (useful for testing).
///
/// Keeps the newest `max_events` events. A capacity of zero collects
/// nothing.
#[derive(Debug)]
pub struct CollectorCallbackHandler {
    events: RwLock<VecDeque<ServerItemCallback>>,
    max_events: usize,
}

impl CollectorCallbackHandler {
    /// Creates a collector that keeps at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::with_capacity(max_events.min(DEFAULT_COLLECTOR_CAPACITY))),
            max_events,
        }
    }

    /// Returns collected events, oldest first.
    pub fn events(&self) -> Vec<ServerItemCallback> {
        self.events.read().iter().cloned().collect()
    }

    /// Clears collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the number of collected events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events collected.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl CallbackHandler for CollectorCallbackHandler {
    fn name(&self) -> &str {
        "collector_handler"
    }

    fn handle(&self, event: &ServerItemCallback) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.write();
        while events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event.clone());
    }
}

impl Default for CollectorCallbackHandler {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTOR_CAPACITY)
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Identifies a registered listener for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Listener {
    id: ListenerId,
    kind: CallbackType,
    handler: Arc<dyn CallbackHandler>,
}

/// Dispatches server callbacks to listeners keyed by [`CallbackType`].
pub struct CallbackDispatcher {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
}

impl CallbackDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers `handler` for events of `kind`.
    pub fn add_listener(&self, kind: CallbackType, handler: Arc<dyn CallbackHandler>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::trace!(listener = handler.name(), %kind, "Callback listener added");
        self.listeners.write().push(Listener { id, kind, handler });
        id
    }

    /// Registers a closure for events of `kind`.
    pub fn add_listener_fn<F>(&self, kind: CallbackType, f: F) -> ListenerId
    where
        F: Fn(&ServerItemCallback) + Send + Sync + 'static,
    {
        self.add_listener(kind, Arc::new(FnCallbackHandler::new("closure", f)))
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        before != listeners.len()
    }

    /// Delivers `event` to every listener of its kind.
    ///
    /// Handlers are invoked after the registry lock is released, so a handler
    /// may add or remove listeners.
    pub fn dispatch(&self, event: &ServerItemCallback) {
        let kind = event.callback_type();
        let handlers: Vec<Arc<dyn CallbackHandler>> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.kind == kind)
            .map(|l| Arc::clone(&l.handler))
            .collect();

        for handler in handlers {
            handler.handle(event);
        }
    }

    /// Returns the number of listeners for `kind`.
    pub fn listener_count(&self, kind: CallbackType) -> usize {
        self.listeners.read().iter().filter(|l| l.kind == kind).count()
    }

    /// Returns the total number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let entries: Vec<_> = listeners
            .iter()
            .map(|l| (l.id.0, l.kind, l.handler.name().to_string()))
            .collect();
        f.debug_struct("CallbackDispatcher")
            .field("listeners", &entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn deleted_event(subscription_id: u32, ids: Vec<u32>) -> ServerItemCallback {
        let results = vec![StatusCode::GOOD; ids.len()];
        ServerItemCallback::new(
            User::Admin,
            "test",
            ItemCallbackPayload::Deleted {
                request: DeleteMonitoredItemsParameters {
                    subscription_id,
                    monitored_item_ids: ids,
                },
                results,
            },
        )
    }

    #[test]
    fn test_dispatch_by_kind() {
        let dispatcher = CallbackDispatcher::new();
        let deleted = Arc::new(CollectorCallbackHandler::new(10));
        let created = Arc::new(CollectorCallbackHandler::new(10));
        dispatcher.add_listener(CallbackType::ItemSubscriptionDeleted, deleted.clone());
        dispatcher.add_listener(CallbackType::ItemSubscriptionCreated, created.clone());

        dispatcher.dispatch(&deleted_event(7, vec![1, 2]));

        assert_eq!(deleted.len(), 1);
        assert!(created.is_empty());
        let event = &deleted.events()[0];
        assert_eq!(event.subscription_id(), 7);
        assert_eq!(event.item_count(), 2);
    }

    #[test]
    fn test_collector_capacity() {
        let collector = CollectorCallbackHandler::default();
        collector.handle(&deleted_event(1, vec![1]));
        assert_eq!(collector.len(), 1);

        let bounded = CollectorCallbackHandler::new(2);
        for id in 1..=3 {
            bounded.handle(&deleted_event(id, vec![id]));
        }
        let kept: Vec<u32> = bounded.events().iter().map(|e| e.subscription_id()).collect();
        assert_eq!(kept, vec![2, 3]);

        let disabled = CollectorCallbackHandler::new(0);
        disabled.handle(&deleted_event(1, vec![1]));
        assert!(disabled.is_empty());
    }

    #[test]
    fn test_remove_listener() {
        let dispatcher = CallbackDispatcher::new();
        let collector = Arc::new(CollectorCallbackHandler::new(10));
        let id = dispatcher.add_listener(CallbackType::ItemSubscriptionDeleted, collector.clone());
        assert_eq!(dispatcher.listener_count(CallbackType::ItemSubscriptionDeleted), 1);

        assert!(dispatcher.remove_listener(id));
        assert!(!dispatcher.remove_listener(id));
        assert!(dispatcher.is_empty());

        dispatcher.dispatch(&deleted_event(1, vec![1]));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_registration_order() {
        let dispatcher = CallbackDispatcher::new();
        let order = Arc::new(RwLock::new(Vec::new()));
        for n in 0..3 {
            let order = order.clone();
            dispatcher.add_listener_fn(CallbackType::ItemSubscriptionDeleted, move |_| {
                order.write().push(n);
            });
        }

        dispatcher.dispatch(&deleted_event(1, vec![]));
        assert_eq!(*order.read(), vec![0, 1, 2]);
    }

    #[test]
    fn test_handler_may_remove_itself() {
        let dispatcher = Arc::new(CallbackDispatcher::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<RwLock<Option<ListenerId>>> = Arc::new(RwLock::new(None));

        let id = {
            let inner = dispatcher.clone();
            let calls = calls.clone();
            let slot = slot.clone();
            dispatcher.add_listener_fn(CallbackType::ItemSubscriptionDeleted, move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                let id = *slot.read();
                if let Some(id) = id {
                    inner.remove_listener(id);
                }
            })
        };
        *slot.write() = Some(id);

        dispatcher.dispatch(&deleted_event(1, vec![1]));
        dispatcher.dispatch(&deleted_event(1, vec![1]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collector_max_events() {
        let collector = CollectorCallbackHandler::new(2);
        for sub in 0..4 {
            collector.handle(&deleted_event(sub, vec![]));
        }
        let events = collector.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].subscription_id(), 2);
        assert_eq!(events[1].subscription_id(), 3);
    }
}
