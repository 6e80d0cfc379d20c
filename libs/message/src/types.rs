//! Protocol message types and their payloads.

use std::collections::BTreeMap;

use pairwise_id::PairingId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Details, MessageError};

/// Type tags of the pairing protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Peer -> session root: this location is bound and ready.
    PeerReady,
    /// Session root -> every location of a pairing: barrier released.
    PeerStart,
    /// Peer -> peers: tear down.
    PeerStop,
    /// Session root -> non-originating locations: spawn a peer for a new pairing.
    PairingRequest,
    /// Session root -> itself and its parent: status changed.
    SessionInfo,
    /// Anyone -> session root: stop the session.
    SessionStop,
    /// Session root -> itself: a pending pairing timed out.
    PairingExpired,
}

impl MessageType {
    pub const ALL: [MessageType; 7] = [
        MessageType::PeerReady,
        MessageType::PeerStart,
        MessageType::PeerStop,
        MessageType::PairingRequest,
        MessageType::SessionInfo,
        MessageType::SessionStop,
        MessageType::PairingExpired,
    ];

    /// The wire tag.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageType::PeerReady => "peer_ready",
            MessageType::PeerStart => "peer_start",
            MessageType::PeerStop => "peer_stop",
            MessageType::PairingRequest => "pairing_request",
            MessageType::SessionInfo => "session_info",
            MessageType::SessionStop => "session_stop",
            MessageType::PairingExpired => "pairing_expired",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageType {
    type Err = MessageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| MessageError::UnknownType(s.to_string()))
    }
}

/// A typed message payload bound to one type tag.
pub trait Payload: Serialize + DeserializeOwned {
    const TYPE: MessageType;

    /// Converts the payload into envelope details.
    fn into_details(self) -> Result<Details, MessageError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(MessageError::InvalidDetails {
                msg_type: Self::TYPE.as_str(),
                reason: format!("payload serialized to non-object {other}"),
            }),
        }
    }

    /// Decodes the payload from envelope details.
    fn from_details(details: &Details) -> Result<Self, MessageError> {
        serde_json::from_value(Value::Object(details.clone())).map_err(|e| {
            MessageError::InvalidDetails {
                msg_type: Self::TYPE.as_str(),
                reason: e.to_string(),
            }
        })
    }
}

/// Life-cycle status of a session root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Created,
    Started,
    Active,
    Stopped,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Created => "created",
            SessionStatus::Started => "started",
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// `peer_ready{id, location, uri, role}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerReady {
    pub id: PairingId,
    pub location: String,
    pub uri: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl Payload for PeerReady {
    const TYPE: MessageType = MessageType::PeerReady;
}

/// What a location reported when it became ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub uri: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// `peer_start{locations, details}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerStart {
    pub locations: BTreeMap<String, LocationInfo>,
    #[serde(default)]
    pub details: Details,
}

impl PeerStart {
    /// The role map carried by this activation: `role -> uri`, skipping
    /// locations that advertised no role.
    pub fn peers(&self) -> BTreeMap<String, String> {
        self.locations
            .values()
            .filter_map(|info| info.role.clone().map(|role| (role, info.uri.clone())))
            .collect()
    }
}

impl Payload for PeerStart {
    const TYPE: MessageType = MessageType::PeerStart;
}

/// `peer_stop{role}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PeerStop {
    #[serde(default)]
    pub role: Option<String>,
}

impl Payload for PeerStop {
    const TYPE: MessageType = MessageType::PeerStop;
}

/// `pairing_request{id, info}`, forwarded to the locations that must spawn
/// a peer for a dynamic pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingRequestNotice {
    pub id: PairingId,
    #[serde(default)]
    pub info: Details,
}

impl Payload for PairingRequestNotice {
    const TYPE: MessageType = MessageType::PairingRequest;
}

/// `session_info{status}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub status: SessionStatus,
}

impl Payload for SessionInfo {
    const TYPE: MessageType = MessageType::SessionInfo;
}

/// `session_stop{}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionStop {}

impl Payload for SessionStop {
    const TYPE: MessageType = MessageType::SessionStop;
}

/// `pairing_expired{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingExpired {
    pub id: PairingId,
}

impl Payload for PairingExpired {
    const TYPE: MessageType = MessageType::PairingExpired;
}
