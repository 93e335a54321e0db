// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Pre-built registrations, endpoints, requests and configuration documents.

use std::net::SocketAddr;

use uasrv_core::service::{
    ActivateSessionParameters, CreateMonitoredItemsParameters, IdentityToken,
    MonitoredItemCreateRequest, ReadParameters, ReadValueId, UserNameIdentityToken,
};
use uasrv_core::types::{
    ApplicationDescription, ApplicationType, AttributeId, DiscoveryConfiguration,
    EndpointDescription, LocalizedText, NodeId, RegisteredServer,
};

// =============================================================================
// Discovery Fixtures
// =============================================================================

/// Fixture providing registration payloads.
pub struct DiscoveryFixtures;

impl DiscoveryFixtures {
    /// A remote server registering itself.
    pub fn registered_server(uri: &str, discovery_url: &str) -> RegisteredServer {
        RegisteredServer {
            server_uri: uri.to_string(),
            product_uri: "urn:vendor:plc".to_string(),
            server_names: vec![LocalizedText::new(format!("Server {}", uri))],
            server_type: ApplicationType::Server,
            gateway_server_uri: None,
            discovery_urls: vec![discovery_url.to_string()],
            semaphore_file_path: None,
            is_online: true,
        }
    }

    /// `count` registrations with distinct URIs under `urn:plant:line`.
    pub fn registered_batch(count: usize) -> Vec<RegisteredServer> {
        (0..count)
            .map(|i| {
                Self::registered_server(
                    &format!("urn:plant:line:{}", i),
                    &format!("opc.tcp://0.0.0.0:{}", 4840 + i),
                )
            })
            .collect()
    }

    /// An mDNS discovery configuration.
    pub fn mdns_configuration(name: &str) -> DiscoveryConfiguration {
        DiscoveryConfiguration {
            mdns_server_name: name.to_string(),
            server_capabilities: vec!["DA".to_string()],
        }
    }

    /// The socket address a client connects from.
    pub fn client_address() -> SocketAddr {
        "192.168.10.20:4840".parse().unwrap()
    }
}

// =============================================================================
// Endpoint Fixtures
// =============================================================================

/// Fixture providing endpoint descriptions.
pub struct EndpointFixtures;

impl EndpointFixtures {
    /// An endpoint for `uri` at `url`.
    pub fn endpoint(uri: &str, url: &str) -> EndpointDescription {
        EndpointDescription {
            endpoint_url: url.to_string(),
            server: ApplicationDescription {
                application_uri: uri.to_string(),
                product_uri: "urn:uasrv".to_string(),
                application_name: LocalizedText::new("Local"),
                application_type: ApplicationType::Server,
                gateway_server_uri: None,
                discovery_profile_uri: None,
                discovery_urls: vec![url.to_string()],
            },
            ..Default::default()
        }
    }

    /// An endpoint bound to every interface.
    pub fn wildcard() -> EndpointDescription {
        Self::endpoint("urn:uasrv:local", "opc.tcp://0.0.0.0:4840/uasrv/server/")
    }
}

// =============================================================================
// Request Fixtures
// =============================================================================

/// Fixture providing service requests.
pub struct RequestFixtures;

impl RequestFixtures {
    /// Activation with a user name token.
    pub fn activate_as(user: &str, password: &str) -> ActivateSessionParameters {
        ActivateSessionParameters {
            client_software_certificates: Vec::new(),
            user_identity_token: IdentityToken::UserName(UserNameIdentityToken {
                policy_id: "username".to_string(),
                user_name: user.to_string(),
                password: password.as_bytes().to_vec(),
            }),
            locale_ids: Vec::new(),
        }
    }

    /// Anonymous activation.
    pub fn activate_anonymous() -> ActivateSessionParameters {
        ActivateSessionParameters::default()
    }

    /// Read of the Value attribute of `nodes`.
    pub fn read_values(nodes: &[NodeId]) -> ReadParameters {
        ReadParameters {
            max_age: 0.0,
            nodes_to_read: nodes
                .iter()
                .map(|node| ReadValueId {
                    node_id: node.clone(),
                    attribute_id: AttributeId::Value,
                })
                .collect(),
        }
    }

    /// Monitoring of the Value attribute of `nodes` in `subscription_id`.
    pub fn monitor_values(subscription_id: u32, nodes: &[NodeId]) -> CreateMonitoredItemsParameters {
        CreateMonitoredItemsParameters {
            subscription_id,
            items_to_create: nodes
                .iter()
                .enumerate()
                .map(|(i, node)| MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId {
                        node_id: node.clone(),
                        attribute_id: AttributeId::Value,
                    },
                    monitoring_mode: Default::default(),
                    client_handle: i as u32,
                    sampling_interval: 250.0,
                    queue_size: 1,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Config Fixtures
// =============================================================================

/// Fixture providing configuration documents.
pub struct ConfigFixtures;

impl ConfigFixtures {
    /// A complete YAML configuration.
    pub fn yaml() -> &'static str {
        r#"
server:
  application_uri: "urn:plant:gateway"
  product_uri: "urn:plant"
  name: "Plant Gateway"
  namespaces:
    - "urn:plant:devices"
  endpoints:
    - url: "opc.tcp://0.0.0.0:4840/plant/"
    - url: "opc.tcp://0.0.0.0:4843/plant/"
      security_level: 3
  clock:
    enabled: true
    interval_ms: 500

discovery:
  max_registrations: 8
  registration_timeout_secs: 120
  persist: true

session:
  max_request_message_size: 131072
  nonce_length: 32

store:
  path: "registry.db"

history:
  default_period_days: 3
  default_max_count: 1000

logging:
  level: debug
  format: json
"#
    }

    /// A minimal TOML configuration.
    pub fn toml() -> &'static str {
        r#"
[server]
application_uri = "urn:plant:toml"
name = "TOML Server"

[discovery]
max_registrations = 4
"#
    }

    /// A minimal JSON configuration.
    pub fn json() -> &'static str {
        r#"{
  "server": { "application_uri": "urn:plant:json" },
  "session": { "nonce_length": 64 }
}"#
    }
}
