//! Message envelope - the common wrapper for all protocol traffic.

use pairwise_id::LocationId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{MessageError, MessageType, Payload};

/// Free-form key/value payload carried by an envelope.
pub type Details = Map<String, Value>;

/// Identity of the process a message originates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// System name; doubles as the local location name.
    pub name: String,

    /// Implementation language tag.
    pub lang: String,
}

impl SystemInfo {
    /// Creates the info record for a Rust process named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: "rust".to_string(),
        }
    }
}

/// Registry section of a source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    pub system: SystemInfo,

    /// Generation tag of the sender's binding. Absent for senders that are
    /// not bound into a registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationId>,
}

/// Descriptive record of the actor that sent a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Absolute path of the sender at send time.
    pub uri: String,

    /// Actor type name.
    #[serde(rename = "type")]
    pub actor_type: String,

    pub registry: RegistryInfo,
}

impl SourceInfo {
    /// Location id of the sender's binding, if known.
    pub fn location(&self) -> Option<LocationId> {
        self.registry.location
    }
}

/// An addressed protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub source: SourceInfo,

    /// Message type tag (e.g. `peer_ready`).
    #[serde(rename = "type")]
    pub msg_type: String,

    /// Resolved absolute destination, or `None` when left for later.
    pub dest: Option<String>,

    #[serde(default)]
    pub details: Details,
}

impl Envelope {
    /// Creates a new envelope builder.
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::new()
    }

    /// Reconstructs an envelope from its serialized form.
    pub fn read(value: Value) -> Result<Self, MessageError> {
        if !value.is_object() {
            return Err(MessageError::InvalidEnvelope(format!(
                "expected an object, got {value}"
            )));
        }
        serde_json::from_value(value).map_err(|e| MessageError::InvalidEnvelope(e.to_string()))
    }

    /// Serializes the envelope into its flat wire mapping.
    pub fn to_value(&self) -> Result<Value, MessageError> {
        Ok(serde_json::to_value(self)?)
    }

    /// The protocol type tag, if the message type is a protocol message.
    pub fn kind(&self) -> Option<MessageType> {
        self.msg_type.parse().ok()
    }

    /// Decodes the details as payload `P`, checking the type tag first.
    pub fn payload<P: Payload>(&self) -> Result<P, MessageError> {
        if self.msg_type != P::TYPE.as_str() {
            return Err(MessageError::UnexpectedType {
                expected: P::TYPE.as_str(),
                actual: self.msg_type.clone(),
            });
        }
        P::from_details(&self.details)
    }

    /// Returns a copy of this envelope readdressed to `dest`.
    pub fn redirect(&self, dest: impl Into<String>) -> Self {
        Self {
            dest: Some(dest.into()),
            ..self.clone()
        }
    }
}

/// Builder for constructing envelopes.
#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    source: Option<SourceInfo>,
    msg_type: Option<String>,
    dest: Option<String>,
    details: Details,
}

impl EnvelopeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    pub fn msg_type(mut self, msg_type: impl Into<String>) -> Self {
        self.msg_type = Some(msg_type.into());
        self
    }

    pub fn dest(mut self, dest: impl Into<String>) -> Self {
        self.dest = Some(dest.into());
        self
    }

    pub fn details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Sets both the type tag and the details from a typed payload.
    pub fn payload<P: Payload>(mut self, payload: P) -> Result<Self, MessageError> {
        self.msg_type = Some(P::TYPE.as_str().to_string());
        self.details = payload.into_details()?;
        Ok(self)
    }

    /// Builds the envelope.
    pub fn build(self) -> Result<Envelope, MessageError> {
        Ok(Envelope {
            source: self.source.ok_or(MessageError::MissingField("source"))?,
            msg_type: self.msg_type.ok_or(MessageError::MissingField("type"))?,
            dest: self.dest,
            details: self.details,
        })
    }
}
