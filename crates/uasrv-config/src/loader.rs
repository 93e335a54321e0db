// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! # Loading Pipeline
//!
//! 1. Read the file and resolve `${VAR}` / `${VAR:default}` placeholders
//! 2. Parse YAML, TOML or JSON (chosen by extension)
//! 3. Apply `UASRV_*` environment overrides
//! 4. Resolve a relative store path against the config file's directory
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! UASRV_APPLICATION_URI=urn:plant:server
//! UASRV_ENDPOINTS_0_URL=opc.tcp://0.0.0.0:4841
//! UASRV_CLOCK_ENABLED=false
//! UASRV_DISCOVERY_MAX_REGISTRATIONS=64
//! UASRV_DISCOVERY_REGISTRATION_TIMEOUT_SECS=300
//! UASRV_STORE_PATH=/var/lib/uasrv/store.db
//! UASRV_STORE_READ_ONLY=true
//! UASRV_LOG_LEVEL=debug
//! ```

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogLevel, ServerConfig, StoreConfig};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "UASRV";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads a [`ServerConfig`] from a file or string.
///
/// # Examples
///
/// ```no_run
/// use uasrv_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("server.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Base directory for resolving relative paths.
    base_path: Option<PathBuf>,

    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables.
    resolve_env_vars: bool,

    /// Whether to resolve relative paths.
    resolve_paths: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            base_path: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            resolve_paths: true,
        }
    }

    /// Sets the base path for resolving relative paths.
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Enables or disables relative path resolution.
    pub fn with_path_resolution(mut self, enabled: bool) -> Self {
        self.resolve_paths = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is chosen by extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<ServerConfig> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let base_path = self.base_path.clone().unwrap_or_else(|| {
            path.parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from("."))
        });

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(&content)
        } else {
            content
        };

        let mut config: ServerConfig = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            resolve_relative_paths(&mut config, &base_path);
        }

        config.validate()?;

        debug!(
            application_uri = %config.server.application_uri,
            endpoints = config.server.endpoints.len(),
            store = config.store.is_some(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<ServerConfig> {
        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(content)
        } else {
            content.to_string()
        };
        let mut config: ServerConfig = parse_str(&content, format)?;

        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        if self.resolve_paths {
            if let Some(ref base) = self.base_path {
                resolve_relative_paths(&mut config, base);
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    /// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
    ///
    /// Unset variables without a default are left in place.
    fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return result;
            };

            let inner = &after[..end];
            let (name, default) = match inner.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (inner, None),
            };

            match (env::var(name), default) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!(name, "Environment variable not found");
                    result.push_str(&rest[start..start + 2 + end + 1]);
                }
            }
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        result
    }

    fn env_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.env_prefix, suffix)
    }

    fn env_parse<T: FromStr>(&self, suffix: &str, expected: &str) -> ConfigResult<Option<T>> {
        let name = self.env_name(suffix);
        match env::var(&name) {
            Ok(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::invalid_env_var(name, format!("expected {}", expected))),
            Err(_) => Ok(None),
        }
    }

    fn env_bool(&self, suffix: &str) -> ConfigResult<Option<bool>> {
        let name = self.env_name(suffix);
        match env::var(&name) {
            Ok(value) => parse_bool(&value)
                .map(Some)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected boolean")),
            Err(_) => Ok(None),
        }
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut ServerConfig) -> ConfigResult<()> {
        if let Ok(value) = env::var(self.env_name("APPLICATION_URI")) {
            config.server.application_uri = value;
        }
        if let Ok(value) = env::var(self.env_name("SERVER_NAME")) {
            config.server.name = value;
        }
        for (i, endpoint) in config.server.endpoints.iter_mut().enumerate() {
            if let Ok(value) = env::var(self.env_name(&format!("ENDPOINTS_{}_URL", i))) {
                endpoint.url = value;
            }
        }
        if let Some(enabled) = self.env_bool("CLOCK_ENABLED")? {
            config.server.clock.enabled = enabled;
        }

        if let Some(max) = self.env_parse("DISCOVERY_MAX_REGISTRATIONS", "a positive integer")? {
            config.discovery.max_registrations = max;
        }
        if let Some(secs) = self.env_parse("DISCOVERY_REGISTRATION_TIMEOUT_SECS", "seconds")? {
            config.discovery.registration_timeout_secs = secs;
        }
        if let Some(persist) = self.env_bool("DISCOVERY_PERSIST")? {
            config.discovery.persist = persist;
        }

        if let Ok(value) = env::var(self.env_name("STORE_PATH")) {
            match config.store {
                Some(ref mut store) => store.path = PathBuf::from(value),
                None => config.store = Some(StoreConfig::new(value)),
            }
        }
        if let Some(read_only) = self.env_bool("STORE_READ_ONLY")? {
            if let Some(ref mut store) = config.store {
                store.read_only = read_only;
            }
        }

        if let Ok(value) = env::var(self.env_name("LOG_LEVEL")) {
            match parse_log_level(&value) {
                Some(level) => config.logging.level = level,
                None => warn!(value = %value, "Ignoring unknown log level override"),
            }
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves a relative store path against `base_path`.
fn resolve_relative_paths(config: &mut ServerConfig, base_path: &Path) {
    if let Some(ref mut store) = config.store {
        if store.path.is_relative() {
            store.path = base_path.join(&store.path);
        }
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str<T: DeserializeOwned>(content: &str, format: ConfigFormat) -> ConfigResult<T> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML parsing through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Some(true),
        "false" | "0" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn parse_log_level(value: &str) -> Option<LogLevel> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" | "warning" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ServerConfig> {
    ConfigLoader::new().load(path)
}

/// Loads configuration from a string with the specified format.
pub fn load_config_str(content: &str, format: ConfigFormat) -> ConfigResult<ServerConfig> {
    ConfigLoader::new().load_from_str(content, format)
}

// =============================================================================
// Tests
// =============================================================================
