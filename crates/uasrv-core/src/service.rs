// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Decoded request and response parameters of the services mediated by a
//! session.
//!
//! These are the shapes handed over by the transport layer after decoding.
//! Only the fields the server core reads or forwards are modelled here; wire
//! encoding lives elsewhere.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{
    AttributeId, DataValue, DiscoveryConfiguration, EndpointDescription, NodeId,
    RegisteredServer, StatusCode, Variant,
};

// =============================================================================
// Session Services
// =============================================================================

/// CreateSession request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CreateSessionParameters {
    /// Client-chosen session name.
    pub session_name: String,
    /// Endpoint URL the client connected to.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Requested session timeout in milliseconds.
    pub requested_session_timeout: f64,
    /// Client nonce.
    #[serde(default)]
    pub client_nonce: Vec<u8>,
}

/// CreateSession result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSessionResult {
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Secret authentication token.
    pub authentication_token: NodeId,
    /// Revised session timeout in milliseconds.
    pub revised_session_timeout: f64,
    /// Server nonce.
    pub server_nonce: Vec<u8>,
    /// Endpoints as seen from the client.
    pub server_endpoints: Vec<EndpointDescription>,
    /// Maximum request message size accepted.
    pub max_request_message_size: u32,
}

/// A user name / password identity token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNameIdentityToken {
    /// Token policy id.
    pub policy_id: String,
    /// User name.
    pub user_name: String,
    /// Password bytes (possibly encrypted).
    pub password: Vec<u8>,
}

impl std::fmt::Debug for UserNameIdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserNameIdentityToken")
            .field("policy_id", &self.policy_id)
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Identity presented on ActivateSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum IdentityToken {
    /// Anonymous identity.
    #[default]
    Anonymous,
    /// User name and password.
    UserName(UserNameIdentityToken),
    /// X.509 certificate (DER bytes).
    X509(Vec<u8>),
}

/// ActivateSession request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ActivateSessionParameters {
    /// Client software certificates.
    #[serde(default)]
    pub client_software_certificates: Vec<Vec<u8>>,
    /// User identity token.
    pub user_identity_token: IdentityToken,
    /// Preferred locales.
    #[serde(default)]
    pub locale_ids: Vec<String>,
}

/// ActivateSession result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivateSessionResult {
    /// Fresh server nonce.
    pub server_nonce: Vec<u8>,
    /// One status per client software certificate.
    pub results: Vec<StatusCode>,
}

// =============================================================================
// Discovery Services
// =============================================================================

/// FindServers request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FindServersParameters {
    /// Endpoint URL the client used to reach this server.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Preferred locales.
    #[serde(default)]
    pub locale_ids: Vec<String>,
    /// Server URI prefix filters; empty means all.
    #[serde(default)]
    pub server_uris: Vec<String>,
}

/// RegisterServer2 request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegisterServer2Parameters {
    /// The registering server.
    pub server: RegisteredServer,
    /// Discovery configurations.
    #[serde(default)]
    pub discovery_configuration: Vec<DiscoveryConfiguration>,
}

/// RegisterServer2 result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterServer2Result {
    /// One status per supplied discovery configuration.
    pub configuration_results: Vec<StatusCode>,
}

// =============================================================================
// Attribute Services
// =============================================================================

/// Identifies an attribute to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadValueId {
    /// Node to read.
    pub node_id: NodeId,
    /// Attribute to read.
    pub attribute_id: AttributeId,
}

/// Read request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReadParameters {
    /// Maximum acceptable value age in milliseconds.
    #[serde(default)]
    pub max_age: f64,
    /// Attributes to read.
    pub nodes_to_read: Vec<ReadValueId>,
}

/// A single attribute write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteValue {
    /// Target node.
    pub node_id: NodeId,
    /// Target attribute.
    pub attribute_id: AttributeId,
    /// New value.
    pub value: DataValue,
}

/// Write request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WriteParameters {
    /// Values to write.
    pub nodes_to_write: Vec<WriteValue>,
}

// =============================================================================
// View Services
// =============================================================================

/// Browse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BrowseDirection {
    /// Forward references.
    #[default]
    Forward,
    /// Inverse references.
    Inverse,
    /// Both directions.
    Both,
}

/// Describes one node to browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseDescription {
    /// Node to browse.
    pub node_id: NodeId,
    /// Direction.
    pub browse_direction: BrowseDirection,
    /// Reference type filter.
    #[serde(default)]
    pub reference_type_id: Option<NodeId>,
    /// Include reference subtypes.
    #[serde(default)]
    pub include_subtypes: bool,
}

/// Browse request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BrowseParameters {
    /// Maximum references per node (0 = no limit).
    #[serde(default)]
    pub requested_max_references_per_node: u32,
    /// Nodes to browse.
    pub nodes_to_browse: Vec<BrowseDescription>,
}

/// A reference returned by Browse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceDescription {
    /// Reference type.
    pub reference_type_id: NodeId,
    /// Whether the reference is forward.
    pub is_forward: bool,
    /// Target node.
    pub node_id: NodeId,
    /// Target browse name.
    pub browse_name: String,
}

/// Browse result for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseResult {
    /// Status of the browse.
    pub status_code: StatusCode,
    /// References found.
    pub references: Vec<ReferenceDescription>,
}

/// A relative path to translate into a node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowsePath {
    /// Starting node.
    pub starting_node: NodeId,
    /// Browse names along the path.
    pub relative_path: Vec<String>,
}

/// TranslateBrowsePathsToNodeIds result for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowsePathResult {
    /// Status of the translation.
    pub status_code: StatusCode,
    /// Resolved targets.
    pub targets: Vec<NodeId>,
}

// =============================================================================
// Node Management Services
// =============================================================================

/// A node to add.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNodesItem {
    /// Parent node.
    pub parent_node_id: NodeId,
    /// Reference type from the parent.
    pub reference_type_id: NodeId,
    /// Requested id (null lets the server choose).
    pub requested_new_node_id: NodeId,
    /// Browse name.
    pub browse_name: String,
    /// Initial value for variables.
    #[serde(default)]
    pub value: Option<Variant>,
}

/// Result of adding one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNodesResult {
    /// Status.
    pub status_code: StatusCode,
    /// The id of the added node.
    pub added_node_id: NodeId,
}

/// A node to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteNodesItem {
    /// Node to delete.
    pub node_id: NodeId,
    /// Also delete references pointing at the node.
    pub delete_target_references: bool,
}

/// A reference to add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddReferencesItem {
    /// Source node.
    pub source_node_id: NodeId,
    /// Reference type.
    pub reference_type_id: NodeId,
    /// Whether the reference is forward.
    pub is_forward: bool,
    /// Target node.
    pub target_node_id: NodeId,
}

/// A reference to delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReferencesItem {
    /// Source node.
    pub source_node_id: NodeId,
    /// Reference type.
    pub reference_type_id: NodeId,
    /// Whether the reference is forward.
    pub is_forward: bool,
    /// Target node.
    pub target_node_id: NodeId,
    /// Delete the inverse reference too.
    pub delete_bidirectional: bool,
}

// =============================================================================
// Method Service
// =============================================================================

/// A method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMethodRequest {
    /// Object the method is invoked on.
    pub object_id: NodeId,
    /// Method node.
    pub method_id: NodeId,
    /// Input arguments.
    pub input_arguments: Vec<Variant>,
}

/// Result of a method invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallMethodResult {
    /// Status.
    pub status_code: StatusCode,
    /// Output arguments.
    pub output_arguments: Vec<Variant>,
}

// =============================================================================
// Subscription Services
// =============================================================================

/// CreateSubscription request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionParameters {
    /// Requested publishing interval in milliseconds.
    pub requested_publishing_interval: f64,
    /// Requested lifetime count.
    pub requested_lifetime_count: u32,
    /// Requested max keep-alive count.
    pub requested_max_keep_alive_count: u32,
    /// Max notifications per publish (0 = no limit).
    #[serde(default)]
    pub max_notifications_per_publish: u32,
    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
    /// Relative priority.
    #[serde(default)]
    pub priority: u8,
}

impl Default for CreateSubscriptionParameters {
    fn default() -> Self {
        Self {
            requested_publishing_interval: 1000.0,
            requested_lifetime_count: 3000,
            requested_max_keep_alive_count: 10,
            max_notifications_per_publish: 0,
            publishing_enabled: true,
            priority: 0,
        }
    }
}

/// CreateSubscription result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateSubscriptionResult {
    /// Server-assigned subscription id.
    pub subscription_id: u32,
    /// Revised publishing interval in milliseconds.
    pub revised_publishing_interval: f64,
    /// Revised lifetime count.
    pub revised_lifetime_count: u32,
    /// Revised max keep-alive count.
    pub revised_max_keep_alive_count: u32,
}

/// ModifySubscription request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionParameters {
    /// Subscription to modify.
    pub subscription_id: u32,
    /// Requested publishing interval in milliseconds.
    pub requested_publishing_interval: f64,
    /// Requested lifetime count.
    pub requested_lifetime_count: u32,
    /// Requested max keep-alive count.
    pub requested_max_keep_alive_count: u32,
}

/// ModifySubscription result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifySubscriptionResult {
    /// Revised publishing interval in milliseconds.
    pub revised_publishing_interval: f64,
    /// Revised lifetime count.
    pub revised_lifetime_count: u32,
    /// Revised max keep-alive count.
    pub revised_max_keep_alive_count: u32,
}

/// Monitoring mode of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MonitoringMode {
    /// Not sampled.
    Disabled,
    /// Sampled but not reported.
    Sampling,
    /// Sampled and reported.
    #[default]
    Reporting,
}

/// One monitored item to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateRequest {
    /// Monitored attribute.
    pub item_to_monitor: ReadValueId,
    /// Monitoring mode.
    pub monitoring_mode: MonitoringMode,
    /// Client handle echoed in notifications.
    pub client_handle: u32,
    /// Sampling interval in milliseconds.
    pub sampling_interval: f64,
    /// Queue size.
    pub queue_size: u32,
}

/// CreateMonitoredItems request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMonitoredItemsParameters {
    /// Owning subscription.
    pub subscription_id: u32,
    /// Items to create.
    pub items_to_create: Vec<MonitoredItemCreateRequest>,
}

/// Result for one created monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemCreateResult {
    /// Status.
    pub status_code: StatusCode,
    /// Server-assigned item id.
    pub monitored_item_id: u32,
    /// Revised sampling interval in milliseconds.
    pub revised_sampling_interval: f64,
    /// Revised queue size.
    pub revised_queue_size: u32,
}

/// One monitored item to modify.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemModifyRequest {
    /// Item to modify.
    pub monitored_item_id: u32,
    /// New sampling interval in milliseconds.
    pub sampling_interval: f64,
    /// New queue size.
    pub queue_size: u32,
}

/// ModifyMonitoredItems request parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifyMonitoredItemsParameters {
    /// Owning subscription.
    pub subscription_id: u32,
    /// Items to modify.
    pub items_to_modify: Vec<MonitoredItemModifyRequest>,
}

/// Result for one modified monitored item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemModifyResult {
    /// Status.
    pub status_code: StatusCode,
    /// Revised sampling interval in milliseconds.
    pub revised_sampling_interval: f64,
    /// Revised queue size.
    pub revised_queue_size: u32,
}

/// DeleteMonitoredItems request parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteMonitoredItemsParameters {
    /// Owning subscription.
    pub subscription_id: u32,
    /// Items to delete.
    pub monitored_item_ids: Vec<u32>,
}

/// Acknowledges a received notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionAcknowledgement {
    /// Subscription id.
    pub subscription_id: u32,
    /// Acknowledged sequence number.
    pub sequence_number: u32,
}

/// A data change reported to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredItemNotification {
    /// Client handle of the item.
    pub client_handle: u32,
    /// New value.
    pub value: DataValue,
}

/// A notification message (data changes, or empty for keep-alive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Sequence number.
    pub sequence_number: u32,
    /// Publish time.
    pub publish_time: chrono::DateTime<chrono::Utc>,
    /// Data change notifications.
    pub notifications: Vec<MonitoredItemNotification>,
}

impl NotificationMessage {
    /// Returns `true` for keep-alive messages.
    pub fn is_keep_alive(&self) -> bool {
        self.notifications.is_empty()
    }
}

/// Publish result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishResult {
    /// Subscription the message belongs to.
    pub subscription_id: u32,
    /// Sequence numbers still available for republish.
    pub available_sequence_numbers: Vec<u32>,
    /// Whether more notifications are queued.
    pub more_notifications: bool,
    /// The message.
    pub notification_message: NotificationMessage,
    /// One status per acknowledgement.
    pub results: Vec<StatusCode>,
}

/// Republish request parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepublishParameters {
    /// Subscription id.
    pub subscription_id: u32,
    /// Sequence number to resend.
    pub retransmit_sequence_number: u32,
}

// =============================================================================
// History
// =============================================================================

/// HistoryRead request parameters (raw values).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReadParameters {
    /// Nodes to read history for.
    pub nodes_to_read: Vec<NodeId>,
    /// Start of the interval.
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// End of the interval.
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    /// Maximum values per node (0 = no limit).
    #[serde(default)]
    pub num_values_per_node: u32,
}

/// HistoryRead result for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReadResult {
    /// Status.
    pub status_code: StatusCode,
    /// Historical values.
    pub data_values: Vec<DataValue>,
}

/// Retention policy for a historized node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRetention {
    /// How long values are kept.
    pub period: Duration,
    /// Maximum number of values kept (0 = no limit).
    pub max_count: u32,
}

impl Default for HistoryRetention {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(7 * 24 * 60 * 60),
            max_count: 0,
        }
    }
}
