// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions.
//!
//! # Schema Structure
//!
//! ```text
//! ServerConfig
//! ├── server: ServerSection
//! │   ├── endpoints: Vec<EndpointConfig>
//! │   └── clock: ClockConfig
//! ├── discovery: DiscoveryConfig
//! ├── session: SessionConfig
//! ├── store: Option<StoreConfig>
//! ├── history: HistoryConfig
//! └── logging: LoggingConfig
//! ```
//!
//! Every field has a default, so an empty document is a valid configuration.

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use uasrv_core::types::{
    ApplicationDescription, ApplicationType, EndpointDescription, LocalizedText,
    MessageSecurityMode, UserTokenPolicy, UserTokenType, STANDARD_NAMESPACE_URI,
};

// =============================================================================
// Constants
// =============================================================================

/// Default endpoint URL.
pub const DEFAULT_ENDPOINT_URL: &str = "opc.tcp://0.0.0.0:4840/uasrv/server/";

/// Default application URI.
pub const DEFAULT_APPLICATION_URI: &str = "urn:uasrv:server";

/// Default product URI.
pub const DEFAULT_PRODUCT_URI: &str = "urn:uasrv";

/// Default application name.
pub const DEFAULT_SERVER_NAME: &str = "uasrv OPC UA Server";

/// Security policy URI for unsecured endpoints.
pub const SECURITY_POLICY_NONE: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

/// Binary TCP transport profile.
pub const TRANSPORT_PROFILE_BINARY: &str =
    "http://opcfoundation.org/UA-Profile/Transport/uatcp-uasc-uabinary";

/// Default period of the server clock in milliseconds.
pub const DEFAULT_CLOCK_INTERVAL_MS: u64 = 1000;

/// Default maximum number of live remote registrations.
pub const DEFAULT_MAX_REGISTRATIONS: usize = 32;

/// Default registration lifetime in seconds.
pub const DEFAULT_REGISTRATION_TIMEOUT_SECS: u64 = 600;

/// Default maximum request message size advertised on CreateSession.
pub const DEFAULT_MAX_REQUEST_MESSAGE_SIZE: u32 = 65536;

/// Default server nonce length in bytes.
pub const DEFAULT_NONCE_LENGTH: usize = 32;

/// Default minimum seconds between WAL checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 90;

/// Default store busy timeout in milliseconds.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Default history retention in days.
pub const DEFAULT_HISTORY_PERIOD_DAYS: u32 = 7;

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// The root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Application identity, endpoints and clock.
    #[serde(default)]
    pub server: ServerSection,

    /// Local discovery registry.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Session parameters.
    #[serde(default)]
    pub session: SessionConfig,

    /// Durable store; absent means nothing is persisted.
    #[serde(default)]
    pub store: Option<StoreConfig>,

    /// History defaults.
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Validates the whole configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;
        self.discovery.validate()?;
        self.session.validate()?;
        if let Some(ref store) = self.store {
            store.validate()?;
        }
        if self.discovery.persist && self.store.is_none() {
            return Err(ConfigError::validation(
                "discovery.persist",
                "a store must be configured to persist registrations",
            ));
        }
        if self.discovery.persist && self.store.as_ref().is_some_and(|s| s.read_only) {
            return Err(ConfigError::validation(
                "discovery.persist",
                "registrations cannot be persisted to a read-only store",
            ));
        }
        self.history.validate()?;
        Ok(())
    }
}

// =============================================================================
// Server Section
// =============================================================================

/// Application identity and endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Globally unique application URI.
    #[serde(default = "default_application_uri")]
    pub application_uri: String,

    /// Product URI.
    #[serde(default = "default_product_uri")]
    pub product_uri: String,

    /// Human readable application name.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Application kind advertised through discovery.
    #[serde(default)]
    pub application_type: ApplicationType,

    /// Namespace URIs registered after the standard namespace.
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Listening endpoints.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,

    /// Server clock.
    #[serde(default)]
    pub clock: ClockConfig,
}

fn default_application_uri() -> String {
    DEFAULT_APPLICATION_URI.to_string()
}

fn default_product_uri() -> String {
    DEFAULT_PRODUCT_URI.to_string()
}

fn default_server_name() -> String {
    DEFAULT_SERVER_NAME.to_string()
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![EndpointConfig::default()]
}

impl ServerSection {
    /// Validates the server section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.application_uri.trim().is_empty() {
            return Err(ConfigError::validation(
                "server.application_uri",
                "cannot be empty",
            ));
        }
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            endpoint.validate(i)?;
        }
        self.clock.validate()?;
        Ok(())
    }

    /// Returns the namespace array: the standard namespace first, then the
    /// configured ones.
    pub fn namespace_array(&self) -> Vec<String> {
        std::iter::once(STANDARD_NAMESPACE_URI.to_string())
            .chain(self.namespaces.iter().cloned())
            .collect()
    }

    /// Builds the application description advertised for `discovery_url`.
    pub fn application_description(&self, discovery_url: &str) -> ApplicationDescription {
        ApplicationDescription {
            application_uri: self.application_uri.clone(),
            product_uri: self.product_uri.clone(),
            application_name: LocalizedText::new(&self.name),
            application_type: self.application_type,
            gateway_server_uri: None,
            discovery_profile_uri: None,
            discovery_urls: vec![discovery_url.to_string()],
        }
    }

    /// Builds one endpoint description per configured endpoint.
    pub fn endpoint_descriptions(&self) -> Vec<EndpointDescription> {
        self.endpoints
            .iter()
            .map(|ep| EndpointDescription {
                endpoint_url: ep.url.clone(),
                server: self.application_description(&ep.url),
                security_mode: ep.security_mode,
                security_policy_uri: ep.security_policy_uri.clone(),
                user_identity_tokens: ep.user_token_policies(),
                transport_profile_uri: TRANSPORT_PROFILE_BINARY.to_string(),
                security_level: ep.security_level,
            })
            .collect()
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            application_uri: default_application_uri(),
            product_uri: default_product_uri(),
            name: default_server_name(),
            application_type: ApplicationType::Server,
            namespaces: Vec::new(),
            endpoints: default_endpoints(),
            clock: ClockConfig::default(),
        }
    }
}

/// A listening endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Endpoint URL, usually bound to a wildcard address.
    #[serde(default = "default_endpoint_url")]
    pub url: String,

    /// Message security mode.
    #[serde(default)]
    pub security_mode: MessageSecurityMode,

    /// Security policy URI.
    #[serde(default = "default_security_policy")]
    pub security_policy_uri: String,

    /// Accepted user token kinds.
    #[serde(default = "default_user_tokens")]
    pub user_tokens: Vec<UserTokenType>,

    /// Relative security level.
    #[serde(default)]
    pub security_level: u8,
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_security_policy() -> String {
    SECURITY_POLICY_NONE.to_string()
}

fn default_user_tokens() -> Vec<UserTokenType> {
    vec![UserTokenType::Anonymous, UserTokenType::UserName]
}

impl EndpointConfig {
    /// Validates the endpoint at position `index`.
    pub fn validate(&self, index: usize) -> ConfigResult<()> {
        let field = format!("server.endpoints[{}].url", index);
        let Some((scheme, rest)) = self.url.split_once("://") else {
            return Err(ConfigError::validation(field, "expected scheme://host:port"));
        };
        if scheme.is_empty() || rest.is_empty() {
            return Err(ConfigError::validation(field, "expected scheme://host:port"));
        }
        Ok(())
    }

    /// Maps the configured token kinds onto token policies.
    pub fn user_token_policies(&self) -> Vec<UserTokenPolicy> {
        self.user_tokens
            .iter()
            .map(|kind| match kind {
                UserTokenType::Anonymous => UserTokenPolicy::anonymous(),
                UserTokenType::UserName => UserTokenPolicy::user_name(),
                UserTokenType::Certificate => UserTokenPolicy {
                    policy_id: "certificate".to_string(),
                    token_type: UserTokenType::Certificate,
                },
            })
            .collect()
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            security_mode: MessageSecurityMode::None,
            security_policy_uri: default_security_policy(),
            user_tokens: default_user_tokens(),
            security_level: 0,
        }
    }
}

/// The periodic CurrentTime update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClockConfig {
    /// Whether the clock runs while the server is started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Tick period in milliseconds.
    #[serde(default = "default_clock_interval")]
    pub interval_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_clock_interval() -> u64 {
    DEFAULT_CLOCK_INTERVAL_MS
}

impl ClockConfig {
    /// Validates the clock configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.interval_ms == 0 {
            return Err(ConfigError::validation(
                "server.clock.interval_ms",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Returns the tick period as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_CLOCK_INTERVAL_MS,
        }
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Local discovery registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoveryConfig {
    /// Maximum number of live registrations.
    #[serde(default = "default_max_registrations")]
    pub max_registrations: usize,

    /// Seconds until an unrenewed registration expires.
    #[serde(default = "default_registration_timeout")]
    pub registration_timeout_secs: u64,

    /// Persist remote registrations in the store.
    #[serde(default)]
    pub persist: bool,
}

fn default_max_registrations() -> usize {
    DEFAULT_MAX_REGISTRATIONS
}

fn default_registration_timeout() -> u64 {
    DEFAULT_REGISTRATION_TIMEOUT_SECS
}

impl DiscoveryConfig {
    /// Validates the discovery configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_registrations == 0 {
            return Err(ConfigError::validation(
                "discovery.max_registrations",
                "cannot be zero",
            ));
        }
        if self.registration_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "discovery.registration_timeout_secs",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Returns the registration lifetime as a Duration.
    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_registrations: DEFAULT_MAX_REGISTRATIONS,
            registration_timeout_secs: DEFAULT_REGISTRATION_TIMEOUT_SECS,
            persist: false,
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Session parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Maximum request message size advertised to clients.
    #[serde(default = "default_max_request_message_size")]
    pub max_request_message_size: u32,

    /// Server nonce length in bytes.
    #[serde(default = "default_nonce_length")]
    pub nonce_length: usize,
}

fn default_max_request_message_size() -> u32 {
    DEFAULT_MAX_REQUEST_MESSAGE_SIZE
}

fn default_nonce_length() -> usize {
    DEFAULT_NONCE_LENGTH
}

impl SessionConfig {
    /// Validates the session configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.nonce_length < 32 {
            return Err(ConfigError::validation(
                "session.nonce_length",
                "must be at least 32 bytes",
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_request_message_size: DEFAULT_MAX_REQUEST_MESSAGE_SIZE,
            nonce_length: DEFAULT_NONCE_LENGTH,
        }
    }
}

// =============================================================================
// Store
// =============================================================================

/// Durable store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Database file path; relative paths resolve against the config file.
    pub path: PathBuf,

    /// Open as an immutable, query-only snapshot.
    #[serde(default)]
    pub read_only: bool,

    /// Minimum seconds between throttled checkpoints.
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval_secs: u64,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_checkpoint_interval() -> u64 {
    DEFAULT_CHECKPOINT_INTERVAL_SECS
}

fn default_busy_timeout() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl StoreConfig {
    /// Creates a writable store configuration for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Validates the store configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::validation("store.path", "cannot be empty"));
        }
        Ok(())
    }

    /// Returns the checkpoint interval as a Duration.
    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }

    /// Returns the busy timeout as a Duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

// =============================================================================
// History
// =============================================================================

/// Defaults applied when history is enabled without explicit retention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistoryConfig {
    /// Retention period in days.
    #[serde(default = "default_history_period")]
    pub default_period_days: u32,

    /// Maximum values kept per node (0 = unlimited).
    #[serde(default)]
    pub default_max_count: u32,
}

fn default_history_period() -> u32 {
    DEFAULT_HISTORY_PERIOD_DAYS
}

impl HistoryConfig {
    /// Validates the history configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_period_days == 0 {
            return Err(ConfigError::validation(
                "history.default_period_days",
                "cannot be zero",
            ));
        }
        Ok(())
    }

    /// Returns the retention period as a Duration.
    pub fn default_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.default_period_days) * 24 * 60 * 60)
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_period_days: DEFAULT_HISTORY_PERIOD_DAYS,
            default_max_count: 0,
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include span targets in logs.
    #[serde(default = "default_enabled")]
    pub with_target: bool,

    /// Include thread IDs in logs.
    #[serde(default)]
    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            with_target: true,
            with_thread_ids: false,
        }
    }
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable text.
    #[default]
    Text,
    /// Compact single-line text.
    Compact,
    /// JSON lines.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = ServerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.discovery.max_registrations, 32);
        assert_eq!(config.discovery.registration_timeout(), Duration::from_secs(600));
        assert_eq!(config.session.max_request_message_size, 65536);
        assert_eq!(config.session.nonce_length, 32);
        assert_eq!(config.server.clock.interval(), Duration::from_secs(1));
        assert_eq!(config.history.default_period(), Duration::from_secs(7 * 86400));
        assert!(config.store.is_none());
    }

    #[test]
    fn test_persist_requires_writable_store() {
        let mut config = ServerConfig::default();
        config.discovery.persist = true;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));

        config.store = Some(StoreConfig::new("uasrv.db"));
        config.validate().unwrap();

        config.store.as_mut().unwrap().read_only = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_values() {
        let mut config = ServerConfig::default();
        config.discovery.max_registrations = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.endpoints[0].url = "localhost:4840".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.endpoints[0].url"));

        let mut config = ServerConfig::default();
        config.session.nonce_length = 16;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_descriptions() {
        let mut section = ServerSection::default();
        section.endpoints[0].user_tokens = vec![UserTokenType::Anonymous];
        let endpoints = section.endpoint_descriptions();

        assert_eq!(endpoints.len(), 1);
        let ep = &endpoints[0];
        assert_eq!(ep.endpoint_url, DEFAULT_ENDPOINT_URL);
        assert_eq!(ep.server.application_uri, DEFAULT_APPLICATION_URI);
        assert_eq!(ep.server.discovery_urls, vec![DEFAULT_ENDPOINT_URL.to_string()]);
        assert_eq!(ep.user_identity_tokens, vec![UserTokenPolicy::anonymous()]);
    }

    #[test]
    fn test_namespace_array() {
        let mut section = ServerSection::default();
        section.namespaces.push("urn:plant:line1".to_string());
        assert_eq!(
            section.namespace_array(),
            vec![STANDARD_NAMESPACE_URI.to_string(), "urn:plant:line1".to_string()]
        );
    }
}
