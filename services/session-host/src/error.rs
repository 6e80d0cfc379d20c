//! Error types for the session host.

use pairwise_id::{ActorId, IdError, PairingId};
use pairwise_message::MessageError;
use thiserror::Error;

/// Path parsing and resolution errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The path has no segments.
    #[error("empty path")]
    Empty,

    /// A segment is empty or contains reserved characters.
    #[error("invalid path segment {segment:?} in {path:?}")]
    InvalidSegment { path: String, segment: String },

    /// A base-relative query was resolved from a path without a base.
    #[error("cannot resolve {0:?}: path has no base")]
    NoBase(String),

    /// A symbolic query was resolved without a resolver that handles it.
    #[error("cannot resolve {0:?}: no resolver installed")]
    NoResolver(String),

    /// The role or binding is not known to the context.
    #[error("cannot resolve {query:?}: unknown name {key:?}")]
    UnknownName { query: String, key: String },

    /// The query ended on a nested mapping instead of a path.
    #[error("cannot resolve {query:?}: {key:?} is a mapping, not a path")]
    NotAPath { query: String, key: String },
}

/// Location registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The actor already owns a location.
    #[error("actor {0} is already registered")]
    AlreadyRegistered(ActorId),

    /// Another bound actor already sits at the path.
    #[error("path {0} is already bound")]
    PathInUse(String),

    /// The actor has no path to register under.
    #[error("actor {0} has no bound path")]
    NotBound(ActorId),

    /// The actor owns no location.
    #[error("actor {0} is not registered")]
    NotRegistered(ActorId),

    /// The location was unbound.
    #[error("location {0} is no longer active")]
    Inactive(String),
}

/// Pairing protocol errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PairingError {
    /// A message names a pairing that was never opened or already released.
    #[error("unknown pairing id {0}")]
    UnknownPairing(PairingId),

    /// The location is not part of the pairing.
    #[error("location {location:?} is not part of pairing {id}")]
    UnknownLocation { id: PairingId, location: String },

    /// A peer was bound without a location in its context.
    #[error("peer at {0} has no location")]
    MissingLocation(String),

    /// The session root answered a pairing request with garbage.
    #[error("invalid pairing id in reply: {0}")]
    InvalidReply(String),
}

/// Transport errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Nothing is bound at the destination.
    #[error("no actor bound at {0}")]
    NotFound(String),

    /// The envelope has no destination.
    #[error("message of type {0} has no destination")]
    NoDestination(String),

    /// The endpoint does not name a method.
    #[error("invalid endpoint {0}")]
    InvalidEndpoint(String),

    /// The destination stopped before it could answer.
    #[error("actor at {0} is closed")]
    Closed(String),

    /// No reply within the call timeout.
    #[error("call to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    /// The remote method failed.
    #[error("call to {endpoint} failed: {message}")]
    Remote { endpoint: String, message: String },
}

/// User record errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserError {
    /// An identified user must carry a login and a full name.
    #[error("user {id} is missing {field}")]
    MissingField { id: String, field: &'static str },

    /// The login is present but empty.
    #[error("user login must not be empty")]
    EmptyLogin,

    /// The record could not be decoded.
    #[error("invalid user record: {0}")]
    Invalid(String),
}

/// Errors that can occur in actors.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Permanent error: the actor unbinds.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Transient error: logged, the actor keeps processing mail.
    #[error("transient error: {0}")]
    Transient(String),

    /// The actor has stopped.
    #[error("actor stopped")]
    ActorStopped,

    /// An integration point was not implemented.
    #[error("{type_name} must handle {what}")]
    MissingOverride {
        type_name: String,
        what: &'static str,
    },

    /// The actor exposes no such RPC method.
    #[error("unknown method {method} on {uri}")]
    UnknownMethod { uri: String, method: String },

    /// RPC arguments could not be decoded.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    User(#[from] UserError),

    #[error(transparent)]
    Id(#[from] IdError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ActorError {
    /// Permanent errors stop the actor that raised them.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ActorError::Permanent(_)
                | ActorError::MissingOverride { .. }
                | ActorError::Registry(RegistryError::Inactive(_))
        )
    }

    /// Protocol invariant violations: a peer or session is out of sync, or
    /// an integration point is missing. Logged at error level.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            ActorError::MissingOverride { .. }
                | ActorError::Pairing(PairingError::UnknownPairing(_))
                | ActorError::Registry(RegistryError::Inactive(_))
        )
    }

    pub(crate) fn invalid_args(err: impl std::fmt::Display) -> Self {
        ActorError::InvalidArguments(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let missing = ActorError::MissingOverride {
            type_name: "EchoMember".to_string(),
            what: "pairing_request",
        };
        assert!(missing.is_permanent());
        assert!(missing.is_protocol_violation());

        let unknown: ActorError = PairingError::UnknownPairing(PairingId::new(4)).into();
        assert!(!unknown.is_permanent());
        assert!(unknown.is_protocol_violation());

        let unreachable: ActorError = TransportError::NotFound("app.1.client".into()).into();
        assert!(!unreachable.is_permanent());
        assert!(!unreachable.is_protocol_violation());

        let inactive: ActorError = RegistryError::Inactive("app.1.client".into()).into();
        assert!(inactive.is_permanent());
    }

    #[test]
    fn test_error_messages_name_the_key() {
        let err = PathError::UnknownName {
            query: "#other.foo".to_string(),
            key: "other".to_string(),
        };
        assert!(err.to_string().contains("\"other\""));
    }
}
