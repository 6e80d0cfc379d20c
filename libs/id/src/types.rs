//! Typed ID definitions.

use crate::error::parse_counter;
use crate::{define_allocator, define_id, IdError};

// =============================================================================
// Actors and Bindings
// =============================================================================

define_id!(ActorId, "act");
define_id!(LocationId, "loc");
define_id!(UserId, "usr");

// =============================================================================
// Session ID
// =============================================================================

/// Identifier of a session hosted by a session manager.
///
/// Session ids are small positive integers issued by the manager and are
/// exchanged as strings on the wire (`"1"`, `"2"`, ...). They also name the
/// session root inside the manager's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a SessionId from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parses the wire form of a session id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        parse_counter(s).map(Self)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for SessionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for SessionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

define_allocator!(SessionIdAllocator, SessionId);

// =============================================================================
// Pairing ID
// =============================================================================

/// Identifier of one rendezvous inside a session.
///
/// `0` is the implicit pairing created with the session; dynamic pairings
/// get strictly increasing positive ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairingId(u64);

impl PairingId {
    /// The session-wide pairing every session starts with.
    pub const SESSION: Self = Self(0);

    /// Creates a PairingId from its numeric value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// True for the session-wide pairing.
    #[must_use]
    pub const fn is_session(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for PairingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PairingId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<PairingId> for u64 {
    fn from(id: PairingId) -> Self {
        id.0
    }
}

impl serde::Serialize for PairingId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PairingId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let id = u64::deserialize(deserializer)?;
        Ok(Self(id))
    }
}

// Dynamic pairings only: the allocator never issues `PairingId::SESSION`.
define_allocator!(PairingIdAllocator, PairingId);

// =============================================================================
// Tests
// =============================================================================
