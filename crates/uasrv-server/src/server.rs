// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server engine.
//!
//! [`InternalServer`] owns the endpoints, the sessions' shared context, the
//! lazily built discovery registry and the background [`Scheduler`], and
//! drives the server lifecycle.
//!
//! # Lifecycle
//!
//! ```text
//! new ──▶ start ──▶ (running: clock ticks, registrations expire) ──▶ stop
//!           ▲                                                          │
//!           └──────────────────────── restart ◀────────────────────────┘
//! ```
//!
//! Stopping closes the internal admin session; the next start replaces it
//! with a fresh one.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use uasrv_config::ServerConfig;
use uasrv_core::callback::{CallbackDispatcher, CallbackHandler, CallbackType, ListenerId};
use uasrv_core::error::{ServerError, UaResult};
use uasrv_core::service::HistoryRetention;
use uasrv_core::types::{
    object_ids, AccessLevel, AttributeId, DataValue, EndpointDescription, EventNotifier, NodeId,
    User, Variant, STANDARD_NAMESPACE_URI,
};
use uasrv_store::{BackendConfig, SqliteBackend, StoreMode};

use crate::discovery::{DiscoveryOptions, LocalDiscoveryService, ServerDescription};
use crate::endpoints::EndpointList;
use crate::registration_store::RegistrationStore;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::services::{AddressSpace, ServiceSet};
use crate::session::{Session, SessionContext, SessionLimits, SessionState};

/// First session id issued.
pub const FIRST_SESSION_ID: u32 = 10;

/// First authentication token issued.
pub const FIRST_AUTHENTICATION_TOKEN: u32 = 1000;

/// Channel id counter seed; the first issued id is one higher.
pub const CHANNEL_ID_SEED: u32 = 5;

/// Default status clock period.
pub const DEFAULT_CLOCK_INTERVAL: Duration = Duration::from_secs(1);

/// `ServerStatus.State` value for a running server.
const SERVER_STATE_RUNNING: i32 = 0;

const INTERNAL_SESSION_NAME: &str = "Internal";

// =============================================================================
// ServerOptions
// =============================================================================

/// Settings of an [`InternalServer`].
#[derive(Debug, Clone, PartialEq)]
pub struct ServerOptions {
    /// Namespace array written at construction.
    pub namespace_array: Vec<String>,
    /// Whether start runs the status clock.
    pub clock_enabled: bool,
    /// Status clock period.
    pub clock_interval: Duration,
    /// Discovery limits.
    pub discovery: DiscoveryOptions,
    /// Session limits.
    pub session: SessionLimits,
    /// Default retention for historized nodes.
    pub history_retention: HistoryRetention,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            namespace_array: vec![STANDARD_NAMESPACE_URI.to_string()],
            clock_enabled: true,
            clock_interval: DEFAULT_CLOCK_INTERVAL,
            discovery: DiscoveryOptions::default(),
            session: SessionLimits::default(),
            history_retention: HistoryRetention::default(),
        }
    }
}

impl From<&ServerConfig> for ServerOptions {
    fn from(config: &ServerConfig) -> Self {
        Self {
            namespace_array: config.server.namespace_array(),
            clock_enabled: config.server.clock.enabled,
            clock_interval: config.server.clock.interval(),
            discovery: DiscoveryOptions::from(&config.discovery),
            session: SessionLimits::from(&config.session),
            history_retention: HistoryRetention {
                period: config.history.default_period(),
                max_count: config.history.default_max_count,
            },
        }
    }
}

// =============================================================================
// InternalServer
// =============================================================================

/// The server engine.
pub struct InternalServer {
    options: ServerOptions,
    context: Arc<SessionContext>,
    scheduler: Arc<Scheduler>,
    discovery: OnceCell<Arc<LocalDiscoveryService>>,
    registration_store: Option<RegistrationStore>,
    internal_session: RwLock<Arc<Session>>,
    session_counter: AtomicU32,
    auth_counter: AtomicU32,
    channel_counter: AtomicU32,
    clock_enabled: AtomicBool,
    clock_task: Mutex<Option<TaskHandle>>,
}

impl InternalServer {
    /// Creates a stopped server with default options.
    pub fn new(services: ServiceSet) -> UaResult<Self> {
        Self::with_options(services, ServerOptions::default())
    }

    /// Creates a stopped server.
    ///
    /// Writes the namespace array node and opens the internal admin session.
    pub fn with_options(services: ServiceSet, options: ServerOptions) -> UaResult<Self> {
        let context = Arc::new(SessionContext {
            services,
            callbacks: Arc::new(CallbackDispatcher::new()),
            endpoints: Arc::new(EndpointList::new()),
            limits: options.session,
        });

        let session_counter = AtomicU32::new(FIRST_SESSION_ID);
        let auth_counter = AtomicU32::new(FIRST_AUTHENTICATION_TOKEN);
        let internal_session = Arc::new(new_session(
            &session_counter,
            &auth_counter,
            &context,
            INTERNAL_SESSION_NAME,
            User::Admin,
            false,
        )?);

        let server = Self {
            clock_enabled: AtomicBool::new(options.clock_enabled),
            options,
            context,
            scheduler: Arc::new(Scheduler::new()),
            discovery: OnceCell::new(),
            registration_store: None,
            internal_session: RwLock::new(internal_session),
            session_counter,
            auth_counter,
            channel_counter: AtomicU32::new(CHANNEL_ID_SEED),
            clock_task: Mutex::new(None),
        };
        server.setup_nodes()?;
        Ok(server)
    }

    /// Creates a stopped server from configuration.
    ///
    /// Configured endpoints are added. When `discovery.persist` is set the
    /// store is opened and remote registrations are kept in it.
    pub fn from_config(config: &ServerConfig, services: ServiceSet) -> UaResult<Self> {
        let mut server = Self::with_options(services, ServerOptions::from(config))?;
        for endpoint in config.server.endpoint_descriptions() {
            server.add_endpoint(endpoint);
        }

        if let (true, Some(store)) = (config.discovery.persist, config.store.as_ref()) {
            let backend = open_backend(
                &store.path,
                StoreMode::from_read_only(store.read_only),
                BackendConfig::default()
                    .with_checkpoint_interval(store.checkpoint_interval())
                    .with_busy_timeout(store.busy_timeout()),
            )?;
            server = server.with_registration_store(RegistrationStore::new(Arc::new(backend))?);
        }
        Ok(server)
    }

    /// Persists discovery registrations in `store`.
    ///
    /// Must be set before the discovery registry is first used.
    pub fn with_registration_store(mut self, store: RegistrationStore) -> Self {
        if self.discovery.get().is_some() {
            warn!("Discovery registry already built; registration store ignored");
            return self;
        }
        self.registration_store = Some(store);
        self
    }

    fn setup_nodes(&self) -> UaResult<()> {
        self.set_attribute_value(
            &NodeId::numeric(0, object_ids::SERVER_NAMESPACE_ARRAY),
            DataValue::new(Variant::StringArray(self.options.namespace_array.clone())),
            AttributeId::Value,
        )
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the collaborators.
    pub fn services(&self) -> &ServiceSet {
        &self.context.services
    }

    /// Returns the address space.
    pub fn address_space(&self) -> &Arc<dyn AddressSpace> {
        &self.context.services.address_space
    }

    /// Returns the server-wide callback dispatcher.
    pub fn callback_dispatcher(&self) -> &Arc<CallbackDispatcher> {
        &self.context.callbacks
    }

    /// Returns the background scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Returns the server options.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Returns the current internal admin session.
    pub fn internal_session(&self) -> Arc<Session> {
        self.internal_session.read().clone()
    }

    /// Returns `true` while the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Enables or disables the status clock for the next start.
    pub fn set_clock_enabled(&self, enabled: bool) {
        self.clock_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns the discovery registry, building it on first use.
    ///
    /// A new registry is seeded with one entry per configured endpoint.
    pub fn local_discovery_service(&self) -> &Arc<LocalDiscoveryService> {
        self.discovery.get_or_init(|| {
            let mut service =
                LocalDiscoveryService::new(self.scheduler.clone(), self.options.discovery);
            if let Some(store) = self.registration_store.clone() {
                service = service.with_store(store);
            }

            for endpoint in self.context.endpoints.all() {
                let uri = endpoint.server.application_uri.clone();
                if let Err(e) =
                    service.add_registration(ServerDescription::new(endpoint.server, Vec::new()))
                {
                    warn!(application_uri = %uri, error = %e, "Failed to seed discovery entry");
                }
            }
            debug!(entries = service.len(), "Discovery registry built");
            Arc::new(service)
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts the scheduler, publishes the server status and starts the clock.
    ///
    /// Starting a running server is a no-op. If any step after the scheduler
    /// start fails the server is stopped again before the error is returned.
    pub fn start(&self) -> UaResult<()> {
        if self.is_running() {
            return Ok(());
        }
        info!("Starting internal server");

        self.scheduler.start()?;
        self.context
            .services
            .subscriptions
            .set_scheduler(Some(self.scheduler.clone()));

        if let Err(e) = self.start_services() {
            warn!(error = %e, "Internal server failed to start");
            self.stop();
            return Err(e);
        }

        info!(
            endpoints = self.context.endpoints.len(),
            clock = self.clock_enabled.load(Ordering::Relaxed),
            "Internal server started"
        );
        Ok(())
    }

    fn start_services(&self) -> UaResult<()> {
        self.renew_internal_session()?;

        self.set_attribute_value(
            &NodeId::numeric(0, object_ids::SERVER_SERVER_STATUS_STATE),
            DataValue::new(Variant::Int32(SERVER_STATE_RUNNING)),
            AttributeId::Value,
        )?;
        self.set_attribute_value(
            &NodeId::numeric(0, object_ids::SERVER_SERVER_STATUS_START_TIME),
            DataValue::new(Utc::now()),
            AttributeId::Value,
        )?;

        if let Some(discovery) = self.discovery.get() {
            discovery.rearm_expiries()?;
        }
        if self.registration_store.is_some() {
            self.local_discovery_service().restore()?;
        }

        if self.clock_enabled.load(Ordering::Relaxed) {
            self.start_clock()?;
        }
        Ok(())
    }

    /// Closes the internal session, stops the scheduler (cancelling pending
    /// tasks) and stops the history manager.
    ///
    /// Stopping a stopped server is a no-op.
    pub fn stop(&self) {
        if !self.is_running() {
            debug!("Internal server not running");
            return;
        }
        info!("Stopping internal server");

        if let Err(e) = self.internal_session().close_session() {
            warn!(error = %e, "Failed to close internal session");
        }

        if let Some(task) = self.clock_task.lock().take() {
            task.cancel();
        }
        self.scheduler.stop();
        self.context.services.subscriptions.set_scheduler(None);
        self.context.services.history.stop();

        info!("Internal server stopped");
    }

    fn renew_internal_session(&self) -> UaResult<()> {
        let mut session = self.internal_session.write();
        if session.state() == SessionState::Closed {
            *session = Arc::new(self.new_session(INTERNAL_SESSION_NAME, User::Admin, false)?);
        }
        Ok(())
    }

    fn start_clock(&self) -> UaResult<()> {
        let address_space = self.address_space().clone();
        let node = NodeId::numeric(0, object_ids::SERVER_SERVER_STATUS_CURRENT_TIME);
        let task = self.scheduler.call_every(self.options.clock_interval, move || {
            if let Err(e) =
                address_space.set_attribute_value(&node, AttributeId::Value, DataValue::new(Utc::now()))
            {
                warn!(error = %e, "Failed to update server clock");
            }
        })?;
        *self.clock_task.lock() = Some(task);
        Ok(())
    }

    // =========================================================================
    // Sessions, Endpoints, Channels
    // =========================================================================

    /// Creates a session bound to this server's services.
    ///
    /// # Errors
    ///
    /// [`ServerError::IdentifiersExhausted`] once the session id or
    /// authentication token counter reaches its maximum.
    pub fn create_session(
        &self,
        name: impl Into<String>,
        user: User,
        external: bool,
    ) -> UaResult<Arc<Session>> {
        Ok(Arc::new(self.new_session(name, user, external)?))
    }

    fn new_session(&self, name: impl Into<String>, user: User, external: bool) -> UaResult<Session> {
        new_session(
            &self.session_counter,
            &self.auth_counter,
            &self.context,
            name,
            user,
            external,
        )
    }

    /// Returns a fresh secure channel id.
    ///
    /// Ids are never reused; once the counter is exhausted this fails with
    /// [`ServerError::IdentifiersExhausted`].
    pub fn get_new_channel_id(&self) -> UaResult<u32> {
        Ok(claim_id(&self.channel_counter, "secure channel")? + 1)
    }

    /// Adds an endpoint.
    pub fn add_endpoint(&self, endpoint: EndpointDescription) {
        debug!(url = %endpoint.endpoint_url, "Endpoint added");
        self.context.endpoints.add(endpoint);
    }

    /// Returns the endpoints, with wildcard hosts rewritten for `observed`.
    pub fn get_endpoints(&self, observed: Option<SocketAddr>) -> Vec<EndpointDescription> {
        self.context.endpoints.for_client(observed)
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Writes an attribute directly to the address space.
    pub fn set_attribute_value(
        &self,
        node: &NodeId,
        value: DataValue,
        attribute: AttributeId,
    ) -> UaResult<()> {
        Ok(self.address_space().set_attribute_value(node, attribute, value)?)
    }

    fn attribute_bits(&self, node: &NodeId, attribute: AttributeId) -> UaResult<u8> {
        let value = self.address_space().get_attribute_value(node, attribute)?;
        match value.value {
            Variant::Empty => Ok(0),
            ref v => v.as_byte().ok_or_else(|| {
                let message = format!("expected a bit set, got {}", v.type_name());
                ServerError::attribute_type(node, attribute, message).into()
            }),
        }
    }

    fn update_attribute_bits(
        &self,
        node: &NodeId,
        attribute: AttributeId,
        update: impl FnOnce(u8) -> u8,
    ) -> UaResult<()> {
        let bits = self.attribute_bits(node, attribute)?;
        let updated = update(bits);
        if updated != bits {
            self.set_attribute_value(node, DataValue::new(Variant::Byte(updated)), attribute)?;
        }
        Ok(())
    }

    /// Writes `Historizing` and the history-read access bits together.
    ///
    /// Both access levels are validated before anything is written.
    fn set_history_access(&self, node: &NodeId, historizing: bool) -> UaResult<()> {
        let update = |bits: u8| {
            if historizing {
                bits | AccessLevel::HISTORY_READ
            } else {
                bits & !AccessLevel::HISTORY_READ
            }
        };
        let levels = [
            (AttributeId::AccessLevel, self.attribute_bits(node, AttributeId::AccessLevel)?),
            (AttributeId::UserAccessLevel, self.attribute_bits(node, AttributeId::UserAccessLevel)?),
        ];

        self.set_attribute_value(node, DataValue::new(historizing), AttributeId::Historizing)?;
        for (attribute, bits) in levels {
            if update(bits) != bits {
                self.set_attribute_value(node, DataValue::new(Variant::Byte(update(bits))), attribute)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Returns the configured default retention.
    pub fn default_history_retention(&self) -> HistoryRetention {
        self.options.history_retention
    }

    /// Sets `Historizing`, grants history read and starts storing changes.
    pub fn enable_history_data_change(
        &self,
        node: &NodeId,
        retention: HistoryRetention,
    ) -> UaResult<()> {
        self.set_history_access(node, true)?;
        self.services().history.historize_data_change(node, retention)?;
        info!(node = %node, period = ?retention.period, max_count = retention.max_count, "History enabled");
        Ok(())
    }

    /// Clears `Historizing`, revokes history read and stops storing changes.
    pub fn disable_history_data_change(&self, node: &NodeId) -> UaResult<()> {
        self.set_history_access(node, false)?;
        self.services().history.dehistorize(node)?;
        info!(node = %node, "History disabled");
        Ok(())
    }

    /// Starts storing events emitted by `source`.
    ///
    /// # Errors
    ///
    /// [`ServerError::NodeNotEventSource`] if `source` does not allow
    /// subscribing to events.
    pub fn enable_history_event(&self, source: &NodeId, retention: HistoryRetention) -> UaResult<()> {
        let notifier = EventNotifier(self.attribute_bits(source, AttributeId::EventNotifier)?);
        if !notifier.contains(EventNotifier::SUBSCRIBE_TO_EVENTS) {
            return Err(ServerError::not_event_source(source, notifier.0).into());
        }
        if !notifier.contains(EventNotifier::HISTORY_READ) {
            self.set_attribute_value(
                source,
                DataValue::new(Variant::Byte(notifier.with(EventNotifier::HISTORY_READ).0)),
                AttributeId::EventNotifier,
            )?;
        }
        self.services().history.historize_event(source, retention)?;
        info!(node = %source, "Event history enabled");
        Ok(())
    }

    /// Revokes event history read on `source` and stops storing its events.
    pub fn disable_history_event(&self, source: &NodeId) -> UaResult<()> {
        self.update_attribute_bits(source, AttributeId::EventNotifier, |b| {
            b & !EventNotifier::HISTORY_READ
        })?;
        self.services().history.dehistorize(source)?;
        info!(node = %source, "Event history disabled");
        Ok(())
    }

    // =========================================================================
    // Callbacks
    // =========================================================================

    /// Registers `handler` for server callbacks of `kind`.
    pub fn subscribe_server_callback(
        &self,
        kind: CallbackType,
        handler: Arc<dyn CallbackHandler>,
    ) -> ListenerId {
        self.context.callbacks.add_listener(kind, handler)
    }

    /// Removes a server callback listener.
    pub fn unsubscribe_server_callback(&self, id: ListenerId) -> bool {
        self.context.callbacks.remove_listener(id)
    }
}

impl Drop for InternalServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for InternalServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalServer")
            .field("running", &self.is_running())
            .field("endpoints", &self.context.endpoints.len())
            .field("options", &self.options)
            .finish()
    }
}

fn new_session(
    session_counter: &AtomicU32,
    auth_counter: &AtomicU32,
    context: &Arc<SessionContext>,
    name: impl Into<String>,
    user: User,
    external: bool,
) -> UaResult<Session> {
    let session_id = NodeId::numeric(0, claim_id(session_counter, "session")?);
    let token = NodeId::numeric(0, claim_id(auth_counter, "authentication token")?);
    Ok(Session::new(session_id, token, name, user, external, context.clone()))
}

/// Returns the counter's current value and advances it, refusing to wrap.
fn claim_id(counter: &AtomicU32, kind: &str) -> UaResult<u32> {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |id| id.checked_add(1))
        .map_err(|_| {
            warn!(kind, "Identifier counter exhausted");
            ServerError::identifiers_exhausted(kind).into()
        })
}

fn open_backend(path: &Path, mode: StoreMode, config: BackendConfig) -> UaResult<SqliteBackend> {
    SqliteBackend::open(path, mode, config).map_err(|e| {
        warn!(path = %path.display(), %mode, error = %e, "Failed to open store");
        e.into()
    })
}

// =============================================================================
// Tests
// =============================================================================
