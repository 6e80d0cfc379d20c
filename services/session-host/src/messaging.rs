//! Building and sending protocol messages.
//!
//! The destination of a message is resolved exactly once, when the envelope
//! is built, using the sender's current path and context. A role query
//! therefore targets whatever peer held the role at send time.

use pairwise_message::{Details, Envelope, Payload};
use tracing::{debug, warn};

use crate::actors::{ActorContext, ActorHandle};
use crate::error::ActorError;
use crate::path::ActorPath;

/// Where a message goes.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Left for later; the envelope cannot be sent as-is.
    Unset,
    /// An already resolved path.
    Path(ActorPath),
    /// A query resolved through the sender's context (`#view`, `@`, `.x`).
    Query(String),
}

impl From<ActorPath> for Destination {
    fn from(path: ActorPath) -> Self {
        Destination::Path(path)
    }
}

impl From<&ActorPath> for Destination {
    fn from(path: &ActorPath) -> Self {
        Destination::Path(path.clone())
    }
}

impl From<&ActorHandle> for Destination {
    fn from(handle: &ActorHandle) -> Self {
        Destination::Path(handle.path().clone())
    }
}

impl From<&str> for Destination {
    fn from(query: &str) -> Self {
        Destination::Query(query.to_string())
    }
}

impl From<String> for Destination {
    fn from(query: String) -> Self {
        Destination::Query(query)
    }
}

impl ActorContext {
    fn resolve_destination(&self, dest: Destination) -> Result<Option<String>, ActorError> {
        Ok(match dest {
            Destination::Unset => None,
            Destination::Path(path) => Some(path.to_string()),
            Destination::Query(query) => Some(self.resolve(&query)?.to_string()),
        })
    }

    /// Builds an envelope of arbitrary type sourced at this actor.
    pub fn message(
        &self,
        msg_type: &str,
        dest: impl Into<Destination>,
        details: Details,
    ) -> Result<Envelope, ActorError> {
        let mut builder = Envelope::builder()
            .source(self.source_info())
            .msg_type(msg_type)
            .details(details);
        if let Some(dest) = self.resolve_destination(dest.into())? {
            builder = builder.dest(dest);
        }
        Ok(builder.build()?)
    }

    /// Builds a typed protocol envelope sourced at this actor.
    pub fn envelope<P: Payload>(
        &self,
        dest: impl Into<Destination>,
        payload: P,
    ) -> Result<Envelope, ActorError> {
        let mut builder = Envelope::builder()
            .source(self.source_info())
            .payload(payload)?;
        if let Some(dest) = self.resolve_destination(dest.into())? {
            builder = builder.dest(dest);
        }
        Ok(builder.build()?)
    }

    /// Sends a built envelope. One-way: nothing is awaited beyond delivery
    /// into the destination mailbox.
    pub async fn send(&self, envelope: Envelope) -> Result<(), ActorError> {
        debug!(
            uri = %self.path(),
            msg_type = %envelope.msg_type,
            dest = envelope.dest.as_deref().unwrap_or("-"),
            "Sending message"
        );
        self.system().transport().notify(envelope).await?;
        Ok(())
    }

    /// Builds and sends a typed message.
    pub async fn notify<P: Payload>(
        &self,
        dest: impl Into<Destination>,
        payload: P,
    ) -> Result<(), ActorError> {
        let envelope = self.envelope(dest, payload)?;
        self.send(envelope).await
    }

    /// Sends a copy of `payload` to every destination. Failures are logged
    /// and do not stop the broadcast; returns how many deliveries succeeded.
    pub async fn broadcast<P, I, D>(&self, dests: I, payload: &P) -> usize
    where
        P: Payload + Clone,
        I: IntoIterator<Item = D>,
        D: Into<Destination>,
    {
        let mut delivered = 0;
        for dest in dests {
            match self.notify(dest, payload.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(
                    uri = %self.path(),
                    msg_type = %P::TYPE,
                    error = %e,
                    "Broadcast delivery failed"
                ),
            }
        }
        delivered
    }
}
