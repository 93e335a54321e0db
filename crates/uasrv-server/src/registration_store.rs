// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Durable discovery registrations.
//!
//! Remote server registrations are kept in one SQLite table so a restarted
//! discovery server still knows who registered with it. Descriptions are
//! stored as JSON.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::debug;

use uasrv_core::error::{StoreError, StoreResult};
use uasrv_core::types::{ApplicationDescription, DiscoveryConfiguration};
use uasrv_store::SqliteBackend;

const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS discovery_registrations (
    application_uri TEXT PRIMARY KEY NOT NULL,
    description TEXT NOT NULL,
    discovery_configuration TEXT NOT NULL,
    registered_at INTEGER NOT NULL
);";

/// A registration as loaded from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRegistration {
    /// The advertised application.
    pub description: ApplicationDescription,
    /// Discovery configuration supplied with RegisterServer2.
    pub discovery_configuration: Vec<DiscoveryConfiguration>,
    /// Unix time of the last registration, in seconds.
    pub registered_at: i64,
}

/// Discovery registration table on top of a [`SqliteBackend`].
#[derive(Debug, Clone)]
pub struct RegistrationStore {
    backend: Arc<SqliteBackend>,
}

impl RegistrationStore {
    /// Wraps `backend`, creating the table when the backend is writable.
    pub fn new(backend: Arc<SqliteBackend>) -> StoreResult<Self> {
        if !backend.mode().is_read_only() {
            backend.write_batch(CREATE_TABLE)?;
        }
        Ok(Self { backend })
    }

    /// Returns the underlying backend.
    pub fn backend(&self) -> &Arc<SqliteBackend> {
        &self.backend
    }

    /// Inserts or replaces the registration of `description.application_uri`.
    pub fn upsert(
        &self,
        description: &ApplicationDescription,
        discovery_configuration: &[DiscoveryConfiguration],
    ) -> StoreResult<()> {
        let json = serde_json::to_string(description)
            .map_err(|e| StoreError::database("encode registration", e))?;
        let config = serde_json::to_string(discovery_configuration)
            .map_err(|e| StoreError::database("encode registration", e))?;

        self.backend.write(
            Some(
                "INSERT INTO discovery_registrations \
                 (application_uri, description, discovery_configuration, registered_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(application_uri) DO UPDATE SET \
                 description = excluded.description, \
                 discovery_configuration = excluded.discovery_configuration, \
                 registered_at = excluded.registered_at",
            ),
            params![
                description.application_uri,
                json,
                config,
                Utc::now().timestamp()
            ],
            true,
        )?;
        debug!(application_uri = %description.application_uri, "Registration persisted");
        Ok(())
    }

    /// Deletes a registration. Returns `true` if a row was removed.
    pub fn remove(&self, application_uri: &str) -> StoreResult<bool> {
        let changed = self.backend.write(
            Some("DELETE FROM discovery_registrations WHERE application_uri = ?1"),
            params![application_uri],
            true,
        )?;
        Ok(changed > 0)
    }

    /// Loads every stored registration, oldest first.
    pub fn load_all(&self) -> StoreResult<Vec<StoredRegistration>> {
        let rows = self.backend.read_rows(
            "SELECT description, discovery_configuration, registered_at \
             FROM discovery_registrations ORDER BY registered_at, application_uri",
            [],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )?;

        rows.into_iter()
            .map(|(description, config, registered_at)| {
                Ok(StoredRegistration {
                    description: serde_json::from_str(&description)
                        .map_err(|e| StoreError::database("decode registration", e))?,
                    discovery_configuration: serde_json::from_str(&config)
                        .map_err(|e| StoreError::database("decode registration", e))?,
                    registered_at,
                })
            })
            .collect()
    }

    /// Returns the number of stored registrations.
    pub fn len(&self) -> StoreResult<usize> {
        let counts = self.backend.read_rows(
            "SELECT COUNT(*) FROM discovery_registrations",
            [],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(counts.first().copied().unwrap_or(0) as usize)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use uasrv_core::types::{ApplicationType, LocalizedText};
    use uasrv_store::{BackendConfig, StoreMode};

    fn description(uri: &str) -> ApplicationDescription {
        ApplicationDescription {
            application_uri: uri.to_string(),
            product_uri: "urn:product".to_string(),
            application_name: LocalizedText::new("Remote"),
            application_type: ApplicationType::Server,
            discovery_urls: vec!["opc.tcp://0.0.0.0:4840".to_string()],
            ..Default::default()
        }
    }

    fn open(dir: &TempDir) -> RegistrationStore {
        let backend = SqliteBackend::open(
            dir.path().join("discovery.db"),
            StoreMode::ReadWrite,
            BackendConfig::default(),
        )
        .unwrap();
        RegistrationStore::new(Arc::new(backend)).unwrap()
    }

    #[test]
    fn test_upsert_load_remove() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.is_empty().unwrap());

        let config = DiscoveryConfiguration {
            mdns_server_name: "plc-01".to_string(),
            server_capabilities: vec!["DA".to_string()],
        };
        store.upsert(&description("urn:a"), &[config.clone()]).unwrap();
        store.upsert(&description("urn:b"), &[]).unwrap();
        store.upsert(&description("urn:a"), &[config.clone()]).unwrap();
        assert_eq!(store.len().unwrap(), 2);

        let loaded = store.load_all().unwrap();
        let a = loaded
            .iter()
            .find(|r| r.description.application_uri == "urn:a")
            .unwrap();
        assert_eq!(a.description, description("urn:a"));
        assert_eq!(a.discovery_configuration, vec![config]);

        assert!(store.remove("urn:a").unwrap());
        assert!(!store.remove("urn:a").unwrap());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.upsert(&description("urn:persisted"), &[]).unwrap();
            store.backend().close().unwrap();
        }
        let store = open(&dir);
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].description.application_uri, "urn:persisted");
    }
}
