//! Status values, snapshots and identifiers exposed to the application
//!
//! The string forms of the enums (`sipStatus/REGISTERED`, `callStatus/ACTIVE`, ...)
//! are stable and shared with front-ends that render provider state, so they are
//! used both for `Display` and for serde.

use std::fmt;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static CONTACT_SIP_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9]+@[a-zA-Z0-9]+(\.[a-zA-Z0-9]+)*").unwrap());

/// Identifier assigned by the provider to every adopted call session
pub type CallId = uuid::Uuid;

/// Status of the signaling connection and registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SipStatus {
    /// No user agent, or the user agent is not connected
    #[serde(rename = "sipStatus/DISCONNECTED")]
    Disconnected,
    /// Transport connection in progress
    #[serde(rename = "sipStatus/CONNECTING")]
    Connecting,
    /// Transport connected, not registered
    #[serde(rename = "sipStatus/CONNECTED")]
    Connected,
    /// Registered with the registrar
    #[serde(rename = "sipStatus/REGISTERED")]
    Registered,
    /// Configuration, connection or registration failure
    #[serde(rename = "sipStatus/ERROR")]
    Error,
}

impl SipStatus {
    /// Stable string form of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            SipStatus::Disconnected => "sipStatus/DISCONNECTED",
            SipStatus::Connecting => "sipStatus/CONNECTING",
            SipStatus::Connected => "sipStatus/CONNECTED",
            SipStatus::Registered => "sipStatus/REGISTERED",
            SipStatus::Error => "sipStatus/ERROR",
        }
    }

    /// Whether calls may be placed in this status
    pub fn can_place_calls(&self) -> bool {
        matches!(self, SipStatus::Connected | SipStatus::Registered)
    }
}

impl fmt::Display for SipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of a connection-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SipErrorType {
    /// Malformed connection parameters, rejected while building the user agent
    #[serde(rename = "sipErrorType/CONFIGURATION")]
    Configuration,
    /// Transport dropped
    #[serde(rename = "sipErrorType/CONNECTION")]
    Connection,
    /// Registrar rejected the registration
    #[serde(rename = "sipErrorType/REGISTRATION")]
    Registration,
}

impl SipErrorType {
    /// Stable string form of the error type
    pub fn as_str(&self) -> &'static str {
        match self {
            SipErrorType::Configuration => "sipErrorType/CONFIGURATION",
            SipErrorType::Connection => "sipErrorType/CONNECTION",
            SipErrorType::Registration => "sipErrorType/REGISTRATION",
        }
    }
}

impl fmt::Display for SipErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection failure held while the status is [`SipStatus::Error`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipError {
    /// Failure category
    pub kind: SipErrorType,
    /// Engine- or registrar-supplied description
    pub message: String,
}

/// Status of the single call slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    /// No call
    #[serde(rename = "callStatus/IDLE")]
    Idle,
    /// Call requested or offered, not yet accepted
    #[serde(rename = "callStatus/STARTING")]
    Starting,
    /// Call accepted by both ends
    #[serde(rename = "callStatus/ACTIVE")]
    Active,
    /// Local hangup requested, waiting for the engine to end the session
    #[serde(rename = "callStatus/STOPPING")]
    Stopping,
}

impl CallStatus {
    /// Stable string form of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Idle => "callStatus/IDLE",
            CallStatus::Starting => "callStatus/STARTING",
            CallStatus::Active => "callStatus/ACTIVE",
            CallStatus::Stopping => "callStatus/STOPPING",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who placed the call, from the local user's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Offered by the remote party
    #[serde(rename = "callDirection/INCOMING")]
    Incoming,
    /// Placed by the local user
    #[serde(rename = "callDirection/OUTGOING")]
    Outgoing,
}

impl CallDirection {
    /// Stable string form of the direction
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Incoming => "callDirection/INCOMING",
            CallDirection::Outgoing => "callDirection/OUTGOING",
        }
    }
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side that created a session, as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Originator {
    /// This user agent sent the INVITE
    Local,
    /// The INVITE came from the network
    Remote,
}

impl Originator {
    /// Call direction implied by the originator
    pub fn direction(&self) -> CallDirection {
        match self {
            Originator::Local => CallDirection::Outgoing,
            Originator::Remote => CallDirection::Incoming,
        }
    }
}

/// Connection part of a [`ProviderSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SipSnapshot {
    pub status: SipStatus,
    pub error_type: Option<SipErrorType>,
    pub error_message: Option<String>,
}

impl Default for SipSnapshot {
    fn default() -> Self {
        Self {
            status: SipStatus::Disconnected,
            error_type: None,
            error_message: None,
        }
    }
}

/// Call part of a [`ProviderSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub id: Option<CallId>,
    pub status: CallStatus,
    pub direction: Option<CallDirection>,
    pub counterpart: Option<String>,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            id: None,
            status: CallStatus::Idle,
            direction: None,
            counterpart: None,
        }
    }
}

/// Read-only view of the provider state handed to the application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSnapshot {
    pub sip: SipSnapshot,
    pub call: CallSnapshot,
    /// `user@host` taken from the user agent's contact, empty when unknown
    pub sip_id: String,
    /// A session handle is currently held
    pub session_exists: bool,
    /// The held session has been accepted
    pub session_active: bool,
}

/// Entry of the bounded connection error log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub kind: SipErrorType,
    pub message: String,
    pub time: DateTime<Utc>,
}

/// Extract the remote party from a From/To header value.
///
/// Everything before the first `;` is kept. A value without `;`, or one that
/// starts with `;`, is returned unchanged.
pub fn parse_counterpart(address: &str) -> &str {
    match address.find(';') {
        Some(pos) if pos > 0 => &address[..pos],
        _ => address,
    }
}

/// Extract `user@host` from a contact URI.
///
/// Returns the leftmost run of the form `alnum+ '@' alnum+ ('.' alnum+)*`.
pub fn sip_id_from_contact(contact: &str) -> Option<&str> {
    CONTACT_SIP_ID.find(contact).map(|m| m.as_str())
}
