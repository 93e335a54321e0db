// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol value types shared by every server component.
//!
//! # Overview
//!
//! - [`NodeId`] / [`NodeIdentifier`]: node addressing
//! - [`StatusCode`]: protocol result codes
//! - [`Variant`] / [`DataValue`]: attribute values
//! - [`AttributeId`], [`AccessLevel`], [`EventNotifier`]: attribute metadata
//! - [`ApplicationDescription`], [`EndpointDescription`], [`RegisteredServer`]:
//!   discovery and endpoint descriptors
//! - [`User`]: the identity a session acts as

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// =============================================================================
// NodeId
// =============================================================================

/// Error returned when a node id string cannot be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Invalid node id '{input}': {reason}")]
pub struct NodeIdParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl NodeIdParseError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Identifies a node in the address space.
///
/// # Examples
///
/// ```
/// use uasrv_core::types::NodeId;
///
/// let numeric = NodeId::numeric(0, 2258);
/// let parsed: NodeId = "i=2258".parse().unwrap();
/// assert_eq!(numeric, parsed);
///
/// let string = NodeId::string(2, "Boiler.Temperature");
/// assert_eq!(string.to_string(), "ns=2;s=Boiler.Temperature");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node id.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque node id.
    #[inline]
    pub fn opaque(namespace_index: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value.into()),
        }
    }

    /// Returns the null node id (`i=0`).
    pub const fn null() -> Self {
        Self {
            namespace_index: 0,
            identifier: NodeIdentifier::Numeric(0),
        }
    }

    /// Returns `true` for the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && self.identifier == NodeIdentifier::Numeric(0)
    }

    /// Returns the numeric identifier, if any.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl FromStr for NodeId {
    type Err = NodeIdParseError;

    /// Parses `ns=<idx>;<t>=<value>` or `<t>=<value>` where `t` is one of
    /// `i`, `s`, `g`, `b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| NodeIdParseError::new(s, "missing identifier after namespace"))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| NodeIdParseError::new(s, "invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(
                id.parse()
                    .map_err(|_| NodeIdParseError::new(s, "invalid numeric identifier"))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(
                Uuid::parse_str(id)
                    .map_err(|e| NodeIdParseError::new(s, format!("invalid GUID: {}", e)))?,
            )
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(
                BASE64
                    .decode(id)
                    .map_err(|e| NodeIdParseError::new(s, format!("invalid base64: {}", e)))?,
            )
        } else {
            return Err(NodeIdParseError::new(
                s,
                "unknown identifier type, expected i=, s=, g= or b=",
            ));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

/// Node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque byte string identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

/// Well-known node ids of the standard server object.
pub mod object_ids {
    /// `Server_NamespaceArray`
    pub const SERVER_NAMESPACE_ARRAY: u32 = 2255;
    /// `Server_ServerStatus_StartTime`
    pub const SERVER_SERVER_STATUS_START_TIME: u32 = 2257;
    /// `Server_ServerStatus_CurrentTime`
    pub const SERVER_SERVER_STATUS_CURRENT_TIME: u32 = 2258;
    /// `Server_ServerStatus_State`
    pub const SERVER_SERVER_STATUS_STATE: u32 = 2259;
}

/// Standard namespace URI, always at index 0 of the namespace array.
pub const STANDARD_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

// =============================================================================
// StatusCode
// =============================================================================

/// A protocol status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: Self = Self(0x0000_0000);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: Self = Self(0x8001_0000);
    /// BadInternalError.
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    /// BadTooManyOperations.
    pub const BAD_TOO_MANY_OPERATIONS: Self = Self(0x8010_0000);
    /// BadServerHalted.
    pub const BAD_SERVER_HALTED: Self = Self(0x800E_0000);
    /// BadUserAccessDenied.
    pub const BAD_USER_ACCESS_DENIED: Self = Self(0x801F_0000);
    /// BadSessionIdInvalid.
    pub const BAD_SESSION_ID_INVALID: Self = Self(0x8025_0000);
    /// BadSubscriptionIdInvalid.
    pub const BAD_SUBSCRIPTION_ID_INVALID: Self = Self(0x8028_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    /// BadAttributeIdInvalid.
    pub const BAD_ATTRIBUTE_ID_INVALID: Self = Self(0x8035_0000);
    /// BadNotSupported.
    pub const BAD_NOT_SUPPORTED: Self = Self(0x803D_0000);
    /// BadTcpEndpointUrlInvalid.
    pub const BAD_TCP_ENDPOINT_URL_INVALID: Self = Self(0x8083_0000);
    /// BadTypeMismatch.
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);
    /// BadNothingToDo.
    pub const BAD_NOTHING_TO_DO: Self = Self(0x800F_0000);

    /// Returns `true` for good status codes.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for bad status codes.
    #[inline]
    pub fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name of the code.
    pub fn name(&self) -> &'static str {
        match *self {
            Self::GOOD => "Good",
            Self::BAD_UNEXPECTED_ERROR => "BadUnexpectedError",
            Self::BAD_INTERNAL_ERROR => "BadInternalError",
            Self::BAD_TOO_MANY_OPERATIONS => "BadTooManyOperations",
            Self::BAD_SERVER_HALTED => "BadServerHalted",
            Self::BAD_USER_ACCESS_DENIED => "BadUserAccessDenied",
            Self::BAD_SESSION_ID_INVALID => "BadSessionIdInvalid",
            Self::BAD_SUBSCRIPTION_ID_INVALID => "BadSubscriptionIdInvalid",
            Self::BAD_NODE_ID_UNKNOWN => "BadNodeIdUnknown",
            Self::BAD_ATTRIBUTE_ID_INVALID => "BadAttributeIdInvalid",
            Self::BAD_NOT_SUPPORTED => "BadNotSupported",
            Self::BAD_TCP_ENDPOINT_URL_INVALID => "BadTcpEndpointUrlInvalid",
            Self::BAD_TYPE_MISMATCH => "BadTypeMismatch",
            Self::BAD_NOTHING_TO_DO => "BadNothingToDo",
            _ if self.is_bad() => "Bad",
            _ if self.is_good() => "Good",
            _ => "Uncertain",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// Attributes
// =============================================================================

/// Node attribute identifiers used by the server core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttributeId {
    /// NodeId attribute.
    NodeId = 1,
    /// BrowseName attribute.
    BrowseName = 3,
    /// DisplayName attribute.
    DisplayName = 4,
    /// EventNotifier attribute.
    EventNotifier = 12,
    /// Value attribute.
    Value = 13,
    /// AccessLevel attribute.
    AccessLevel = 17,
    /// UserAccessLevel attribute.
    UserAccessLevel = 18,
    /// Historizing attribute.
    Historizing = 20,
}

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// AccessLevel / UserAccessLevel bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct AccessLevel(pub u8);

impl AccessLevel {
    /// Current value is readable.
    pub const CURRENT_READ: u8 = 0x01;
    /// Current value is writable.
    pub const CURRENT_WRITE: u8 = 0x02;
    /// History is readable.
    pub const HISTORY_READ: u8 = 0x04;
    /// History is writable.
    pub const HISTORY_WRITE: u8 = 0x08;
}

/// EventNotifier bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct EventNotifier(pub u8);

impl EventNotifier {
    /// Node can be subscribed to for events.
    pub const SUBSCRIBE_TO_EVENTS: u8 = 0x01;
    /// Event history is readable.
    pub const HISTORY_READ: u8 = 0x04;
    /// Event history is writable.
    pub const HISTORY_WRITE: u8 = 0x08;

    /// Returns `true` if every bit of `flag` is set.
    #[inline]
    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    /// Returns the set with `flag` added.
    #[inline]
    pub fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }
}

// =============================================================================
// Values
// =============================================================================

/// Localized text (locale is optional).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct LocalizedText {
    /// Locale, e.g. `en-US`.
    #[serde(default)]
    pub locale: Option<String>,
    /// The text.
    pub text: String,
}

impl LocalizedText {
    /// Creates a localized text without a locale.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            locale: None,
            text: text.into(),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// A protocol value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Variant {
    /// No value.
    #[default]
    Empty,
    /// Boolean.
    Boolean(bool),
    /// Unsigned byte.
    Byte(u8),
    /// Signed 32-bit integer.
    Int32(i32),
    /// Unsigned 32-bit integer.
    UInt32(u32),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Double precision float.
    Double(f64),
    /// String.
    String(String),
    /// UTC timestamp.
    DateTime(DateTime<Utc>),
    /// Byte string.
    ByteString(Vec<u8>),
    /// Node id.
    NodeId(NodeId),
    /// Array of strings.
    StringArray(Vec<String>),
}

impl Variant {
    /// Returns the value as a byte bit set, if it is integral and fits.
    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Variant::Byte(b) => Some(*b),
            Variant::Int32(i) => u8::try_from(*i).ok(),
            Variant::UInt32(u) => u8::try_from(*u).ok(),
            Variant::Int64(i) => u8::try_from(*i).ok(),
            _ => None,
        }
    }

    /// Returns the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Empty => "Empty",
            Variant::Boolean(_) => "Boolean",
            Variant::Byte(_) => "Byte",
            Variant::Int32(_) => "Int32",
            Variant::UInt32(_) => "UInt32",
            Variant::Int64(_) => "Int64",
            Variant::Double(_) => "Double",
            Variant::String(_) => "String",
            Variant::DateTime(_) => "DateTime",
            Variant::ByteString(_) => "ByteString",
            Variant::NodeId(_) => "NodeId",
            Variant::StringArray(_) => "StringArray",
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(v: DateTime<Utc>) -> Self {
        Variant::DateTime(v)
    }
}

/// A value with status and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DataValue {
    /// The value.
    pub value: Variant,
    /// Value status.
    pub status: StatusCode,
    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// Creates a good data value stamped with the current server time.
    pub fn new(value: impl Into<Variant>) -> Self {
        let now = Utc::now();
        Self {
            value: value.into(),
            status: StatusCode::GOOD,
            source_timestamp: Some(now),
            server_timestamp: Some(now),
        }
    }
}

impl From<Variant> for DataValue {
    fn from(value: Variant) -> Self {
        DataValue::new(value)
    }
}

// =============================================================================
// Users
// =============================================================================

/// The identity a session acts as.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum User {
    /// Server-internal administrator.
    Admin,
    /// Anonymous client.
    #[default]
    Anonymous,
    /// Authenticated named user.
    Named(String),
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            User::Admin => write!(f, "Admin"),
            User::Anonymous => write!(f, "Anonymous"),
            User::Named(name) => write!(f, "User({})", name),
        }
    }
}

// =============================================================================
// Application / Endpoint Descriptors
// =============================================================================

/// Kind of application advertised through discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ApplicationType {
    /// Server.
    #[default]
    Server,
    /// Client.
    Client,
    /// Both client and server.
    ClientAndServer,
    /// Discovery server.
    DiscoveryServer,
}

/// Identity of an application as returned by FindServers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApplicationDescription {
    /// Globally unique application URI.
    pub application_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Display name.
    pub application_name: LocalizedText,
    /// Application kind.
    pub application_type: ApplicationType,
    /// Gateway server URI, if reached through a gateway.
    #[serde(default)]
    pub gateway_server_uri: Option<String>,
    /// Discovery profile URI.
    #[serde(default)]
    pub discovery_profile_uri: Option<String>,
    /// Discovery URLs.
    #[serde(default)]
    pub discovery_urls: Vec<String>,
}

/// Registration payload sent by a remote server (RegisterServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegisteredServer {
    /// Application URI of the registering server.
    pub server_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Localized names; the first one is advertised.
    pub server_names: Vec<LocalizedText>,
    /// Application kind.
    pub server_type: ApplicationType,
    /// Gateway server URI.
    #[serde(default)]
    pub gateway_server_uri: Option<String>,
    /// Discovery URLs.
    pub discovery_urls: Vec<String>,
    /// Semaphore file path.
    #[serde(default)]
    pub semaphore_file_path: Option<String>,
    /// Whether the server is online.
    pub is_online: bool,
}

/// mDNS discovery configuration supplied with RegisterServer2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DiscoveryConfiguration {
    /// mDNS server name.
    pub mdns_server_name: String,
    /// Advertised server capabilities.
    #[serde(default)]
    pub server_capabilities: Vec<String>,
}

/// Message security mode of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MessageSecurityMode {
    /// No security.
    #[default]
    None,
    /// Signed messages.
    Sign,
    /// Signed and encrypted messages.
    SignAndEncrypt,
}

/// Kind of user token accepted by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserTokenType {
    /// Anonymous.
    Anonymous,
    /// User name and password.
    UserName,
    /// X.509 certificate.
    Certificate,
}

/// A user token policy of an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenPolicy {
    /// Policy identifier.
    pub policy_id: String,
    /// Token kind.
    pub token_type: UserTokenType,
}

impl UserTokenPolicy {
    /// Anonymous token policy.
    pub fn anonymous() -> Self {
        Self {
            policy_id: "anonymous".to_string(),
            token_type: UserTokenType::Anonymous,
        }
    }

    /// User name token policy.
    pub fn user_name() -> Self {
        Self {
            policy_id: "username".to_string(),
            token_type: UserTokenType::UserName,
        }
    }
}

/// A server endpoint as returned by GetEndpoints / CreateSession.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EndpointDescription {
    /// Endpoint URL, possibly with a wildcard bind address.
    pub endpoint_url: String,
    /// Owning application.
    pub server: ApplicationDescription,
    /// Message security mode.
    pub security_mode: MessageSecurityMode,
    /// Security policy URI.
    pub security_policy_uri: String,
    /// Accepted user token policies.
    #[serde(default)]
    pub user_identity_tokens: Vec<UserTokenPolicy>,
    /// Transport profile URI.
    #[serde(default)]
    pub transport_profile_uri: String,
    /// Relative security level.
    #[serde(default)]
    pub security_level: u8,
}

// =============================================================================
// Tests
// =============================================================================
