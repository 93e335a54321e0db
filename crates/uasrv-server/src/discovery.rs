// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Local discovery registry.
//!
//! Tracks which servers are known to this discovery endpoint: the server's
//! own endpoints (seeded, never expiring) and remote servers that registered
//! through RegisterServer / RegisterServer2 (expiring unless renewed).
//!
//! # Expiry
//!
//! Each remote registration schedules its own removal on the server's
//! [`Scheduler`]. The scheduled task holds the exact [`ServerDescription`]
//! instance it was created for; a renewal installs a new instance under the
//! same URI, so the stale task finds a different instance and leaves the
//! renewal alone.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use uasrv_core::address::{replace_inaddr_any, resolve_netloc};
use uasrv_core::error::{DiscoveryError, UaResult};
use uasrv_core::service::{FindServersParameters, RegisterServer2Parameters, RegisterServer2Result};
use uasrv_core::types::{
    ApplicationDescription, DiscoveryConfiguration, LocalizedText, RegisteredServer, StatusCode,
};

use crate::registration_store::RegistrationStore;
use crate::scheduler::Scheduler;

/// Registration expiry for remote servers.
pub const REG_EXPIRE_TIMEOUT: Duration = Duration::from_secs(600);

/// Maximum number of simultaneous registrations.
pub const MAX_REGISTRATIONS: usize = 32;

// =============================================================================
// ServerDescription
// =============================================================================

/// One entry of the registry.
#[derive(Debug)]
pub struct ServerDescription {
    application_description: ApplicationDescription,
    discovery_configuration: Vec<DiscoveryConfiguration>,
    remote: bool,
    expired: AtomicBool,
}

impl ServerDescription {
    /// Creates a local entry. Local entries never expire.
    pub fn new(
        application_description: ApplicationDescription,
        discovery_configuration: Vec<DiscoveryConfiguration>,
    ) -> Self {
        Self {
            application_description,
            discovery_configuration,
            remote: false,
            expired: AtomicBool::new(false),
        }
    }

    /// Creates an entry registered by a remote server.
    pub fn remote(
        application_description: ApplicationDescription,
        discovery_configuration: Vec<DiscoveryConfiguration>,
    ) -> Self {
        Self {
            remote: true,
            ..Self::new(application_description, discovery_configuration)
        }
    }

    /// Maps a RegisterServer payload.
    ///
    /// The first server name is advertised.
    pub fn from_registered_server(
        server: &RegisteredServer,
        discovery_configuration: Vec<DiscoveryConfiguration>,
    ) -> Self {
        let description = ApplicationDescription {
            application_uri: server.server_uri.clone(),
            product_uri: server.product_uri.clone(),
            application_name: server
                .server_names
                .first()
                .cloned()
                .unwrap_or_else(|| LocalizedText::new(server.server_uri.clone())),
            application_type: server.server_type,
            gateway_server_uri: server.gateway_server_uri.clone(),
            discovery_profile_uri: None,
            discovery_urls: server.discovery_urls.clone(),
        };
        Self::remote(description, discovery_configuration)
    }

    /// Returns the application URI (the registry key).
    pub fn application_uri(&self) -> &str {
        &self.application_description.application_uri
    }

    /// Returns the advertised description.
    pub fn application_description(&self) -> &ApplicationDescription {
        &self.application_description
    }

    /// Returns the RegisterServer2 discovery configuration.
    pub fn discovery_configuration(&self) -> &[DiscoveryConfiguration] {
        &self.discovery_configuration
    }

    /// Returns `true` for entries that expire unless renewed.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// Returns `true` once this instance's expiry has fired.
    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn mark_expired(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// DiscoveryOptions
// =============================================================================

/// Limits of a [`LocalDiscoveryService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Maximum number of entries.
    pub max_registrations: usize,
    /// Lifetime of a remote registration.
    pub registration_timeout: Duration,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_registrations: MAX_REGISTRATIONS,
            registration_timeout: REG_EXPIRE_TIMEOUT,
        }
    }
}

impl From<&uasrv_config::DiscoveryConfig> for DiscoveryOptions {
    fn from(config: &uasrv_config::DiscoveryConfig) -> Self {
        Self {
            max_registrations: config.max_registrations,
            registration_timeout: config.registration_timeout(),
        }
    }
}

// =============================================================================
// LocalDiscoveryService
// =============================================================================

type Registry = Arc<Mutex<HashMap<String, Arc<ServerDescription>>>>;

/// The discovery registry.
pub struct LocalDiscoveryService {
    known_servers: Registry,
    scheduler: Arc<Scheduler>,
    options: DiscoveryOptions,
    store: Option<RegistrationStore>,
}

impl LocalDiscoveryService {
    /// Creates an empty registry whose expiries run on `scheduler`.
    pub fn new(scheduler: Arc<Scheduler>, options: DiscoveryOptions) -> Self {
        Self {
            known_servers: Arc::new(Mutex::new(HashMap::new())),
            scheduler,
            options,
            store: None,
        }
    }

    /// Persists remote registrations in `store`.
    pub fn with_store(mut self, store: RegistrationStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Returns the configured limits.
    pub fn options(&self) -> DiscoveryOptions {
        self.options
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.known_servers.lock().len()
    }

    /// Returns `true` if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.known_servers.lock().is_empty()
    }

    /// Returns `true` if `application_uri` is registered.
    pub fn contains(&self, application_uri: &str) -> bool {
        self.known_servers.lock().contains_key(application_uri)
    }

    /// Returns the installed entry for `application_uri`.
    pub fn get(&self, application_uri: &str) -> Option<Arc<ServerDescription>> {
        self.known_servers.lock().get(application_uri).cloned()
    }

    /// Returns copies of the matching registrations.
    ///
    /// With no `server_uris` filter every entry matches. Otherwise an entry
    /// matches when the `:`-separated segments of some filter are a prefix
    /// of its application URI's segments. Wildcard hosts in the returned
    /// discovery URLs are replaced by the address the client used.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::AddressResolution`] when neither the
    /// request's endpoint URL nor `observed` yields a client address.
    pub fn find_servers(
        &self,
        params: &FindServersParameters,
        observed: Option<SocketAddr>,
    ) -> UaResult<Vec<ApplicationDescription>> {
        let mut servers: Vec<ApplicationDescription> = {
            let known = self.known_servers.lock();
            known
                .values()
                .filter(|desc| matches_filter(desc.application_uri(), &params.server_uris))
                .map(|desc| desc.application_description.clone())
                .collect()
        };

        let netloc = match resolve_netloc(params.endpoint_url.as_deref(), observed) {
            Ok(netloc) => netloc,
            Err(e) => {
                warn!(
                    endpoint_url = ?params.endpoint_url,
                    error = %e,
                    "FindServers could not resolve the client-visible address"
                );
                return Err(e.into());
            }
        };

        for server in &mut servers {
            for url in &mut server.discovery_urls {
                *url = replace_inaddr_any(url, &netloc);
            }
        }

        debug!(count = servers.len(), filters = params.server_uris.len(), "FindServers");
        Ok(servers)
    }

    /// Installs `desc`, replacing any entry with the same URI.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::RegistrationLimitExceeded`] when the
    /// registry is full and the URI is new. Renewals are always accepted.
    pub fn add_registration(
        &self,
        desc: ServerDescription,
    ) -> Result<Arc<ServerDescription>, DiscoveryError> {
        let desc = Arc::new(desc);
        let uri = desc.application_uri().to_string();

        let mut known = self.known_servers.lock();
        if !known.contains_key(&uri) && known.len() >= self.options.max_registrations {
            warn!(
                application_uri = %uri,
                limit = self.options.max_registrations,
                "Registration rejected: registry full"
            );
            return Err(DiscoveryError::registration_limit(self.options.max_registrations));
        }
        known.insert(uri, desc.clone());
        Ok(desc)
    }

    /// Registers a remote server and schedules its expiry.
    pub fn register_server(
        &self,
        server: &RegisteredServer,
        discovery_configuration: Vec<DiscoveryConfiguration>,
    ) -> UaResult<()> {
        let desc = self.add_registration(ServerDescription::from_registered_server(
            server,
            discovery_configuration,
        ))?;

        if let Err(e) = self.schedule_expiry(&desc) {
            // Never leave a remote registration behind without an expiry.
            let mut known = self.known_servers.lock();
            if known
                .get(desc.application_uri())
                .is_some_and(|current| Arc::ptr_eq(current, &desc))
            {
                known.remove(desc.application_uri());
            }
            return Err(e);
        }

        self.persist(&desc);
        info!(
            application_uri = %desc.application_uri(),
            discovery_urls = ?desc.application_description.discovery_urls,
            "Server registered"
        );
        Ok(())
    }

    /// RegisterServer2: registers and returns one status per discovery
    /// configuration.
    pub fn register_server2(
        &self,
        params: &RegisterServer2Parameters,
    ) -> UaResult<RegisterServer2Result> {
        self.register_server(&params.server, params.discovery_configuration.clone())?;
        Ok(RegisterServer2Result {
            configuration_results: vec![StatusCode::GOOD; params.discovery_configuration.len()],
        })
    }

    /// Reloads persisted registrations, each with a fresh expiry window.
    ///
    /// Returns the number restored. Entries that no longer fit under the
    /// registration limit are skipped.
    pub fn restore(&self) -> UaResult<usize> {
        let Some(store) = self.store.as_ref() else {
            return Ok(0);
        };

        let mut restored = 0;
        for stored in store.load_all()? {
            let uri = stored.description.application_uri.clone();
            let desc = match self.add_registration(ServerDescription::remote(
                stored.description,
                stored.discovery_configuration,
            )) {
                Ok(desc) => desc,
                Err(e) => {
                    warn!(application_uri = %uri, error = %e, "Skipping stored registration");
                    continue;
                }
            };
            self.schedule_expiry(&desc)?;
            restored += 1;
        }

        info!(count = restored, "Restored discovery registrations");
        Ok(restored)
    }

    /// Gives every installed remote entry a fresh expiry window.
    ///
    /// Stopping the scheduler drops pending expiries; the server calls this
    /// on each start so remote entries kept across a restart still expire.
    pub fn rearm_expiries(&self) -> UaResult<usize> {
        let remote: Vec<_> = self
            .known_servers
            .lock()
            .values()
            .filter(|desc| desc.is_remote())
            .cloned()
            .collect();
        for desc in &remote {
            self.schedule_expiry(desc)?;
        }
        if !remote.is_empty() {
            debug!(count = remote.len(), "Registration expiries re-armed");
        }
        Ok(remote.len())
    }

    fn schedule_expiry(&self, desc: &Arc<ServerDescription>) -> UaResult<()> {
        let known = self.known_servers.clone();
        let store = self.store.clone();
        let desc = desc.clone();
        self.scheduler
            .call_later(self.options.registration_timeout, move || {
                expire_server_description(&known, store.as_ref(), &desc);
            })?;
        Ok(())
    }

    fn persist(&self, desc: &ServerDescription) {
        if let Some(store) = self.store.as_ref() {
            if let Err(e) = store.upsert(&desc.application_description, &desc.discovery_configuration)
            {
                warn!(
                    application_uri = %desc.application_uri(),
                    error = %e,
                    "Failed to persist registration"
                );
            }
        }
    }
}

impl fmt::Debug for LocalDiscoveryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDiscoveryService")
            .field("registrations", &self.len())
            .field("options", &self.options)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

/// Marks `desc` expired and removes it if it is still the installed entry.
fn expire_server_description(
    known: &Mutex<HashMap<String, Arc<ServerDescription>>>,
    store: Option<&RegistrationStore>,
    desc: &Arc<ServerDescription>,
) {
    desc.mark_expired();
    let uri = desc.application_uri();

    let removed = {
        let mut known = known.lock();
        let stale = known
            .get(uri)
            .is_some_and(|current| Arc::ptr_eq(current, desc) && current.is_expired());
        if stale {
            known.remove(uri);
        }
        stale
    };

    if !removed {
        debug!(application_uri = %uri, "Registration was renewed, expiry ignored");
        return;
    }

    info!(application_uri = %uri, "Registration expired");
    if let Some(store) = store {
        if let Err(e) = store.remove(uri) {
            warn!(application_uri = %uri, error = %e, "Failed to delete expired registration");
        }
    }
}

/// Colon-segment prefix match of `uri` against any of `filters`.
fn matches_filter(uri: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    let segments: Vec<&str> = uri.split(':').collect();
    filters.iter().any(|filter| {
        let prefix: Vec<&str> = filter.split(':').collect();
        segments.len() >= prefix.len() && segments[..prefix.len()] == prefix[..]
    })
}

// =============================================================================
// Tests
// =============================================================================
