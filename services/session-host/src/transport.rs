//! Remote invocation and one-way delivery.
//!
//! An endpoint is an actor path followed by a method name:
//! `pairwise.appservice.1.pairing_request` invokes `pairing_request` on the
//! actor bound at `pairwise.appservice.1`.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pairwise_message::Envelope;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use crate::actors::Mail;
use crate::error::TransportError;
use crate::path::ActorPath;
use crate::registry::Registry;

/// Default reply timeout for RPC calls.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// The remote-invocation collaborator.
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Invokes `endpoint` and awaits its reply.
    async fn call(&self, endpoint: &ActorPath, args: Value) -> Result<Value, TransportError>;

    /// Delivers `envelope` to `envelope.dest` without waiting for it to be
    /// processed.
    async fn notify(&self, envelope: Envelope) -> Result<(), TransportError>;
}

/// Routes through the location registry of this process.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    registry: Registry,
    call_timeout: Duration,
}

impl LocalTransport {
    pub fn new(registry: Registry, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn call(&self, endpoint: &ActorPath, args: Value) -> Result<Value, TransportError> {
        let target = endpoint
            .parent()
            .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;
        let method = endpoint.name().to_string();
        let (mailbox, _) = self
            .registry
            .mailbox(&target.to_string())
            .ok_or_else(|| TransportError::NotFound(target.to_string()))?;

        debug!(endpoint = %endpoint, "Calling remote method");
        let (reply, rx) = oneshot::channel();
        mailbox
            .send(Mail::Call {
                method,
                args,
                reply,
            })
            .map_err(|_| TransportError::Closed(target.to_string()))?;

        match tokio::time::timeout(self.call_timeout, rx).await {
            Err(_) => Err(TransportError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: u64::try_from(self.call_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(_)) => Err(TransportError::Closed(target.to_string())),
            Ok(Ok(result)) => result.map_err(|e| TransportError::Remote {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn notify(&self, envelope: Envelope) -> Result<(), TransportError> {
        let dest = envelope
            .dest
            .clone()
            .ok_or_else(|| TransportError::NoDestination(envelope.msg_type.clone()))?;
        let (mailbox, _) = self
            .registry
            .mailbox(&dest)
            .ok_or_else(|| TransportError::NotFound(dest.clone()))?;
        mailbox
            .send(Mail::Notify(envelope))
            .map_err(|_| TransportError::Closed(dest))
    }
}

/// Proxy to an actor reachable through a transport.
#[derive(Debug, Clone)]
pub struct Remote {
    transport: Arc<dyn Transport>,
    path: ActorPath,
}

impl Remote {
    pub fn new(transport: Arc<dyn Transport>, path: ActorPath) -> Self {
        Self { transport, path }
    }

    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    /// Invokes `method` on the proxied actor.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, TransportError> {
        let endpoint = self
            .path
            .child(method)
            .map_err(|_| TransportError::InvalidEndpoint(format!("{}.{method}", self.path)))?;
        self.transport.call(&endpoint, args).await
    }

    /// Invokes the proxied path itself as an endpoint.
    pub async fn invoke(&self, args: Value) -> Result<Value, TransportError> {
        self.transport.call(&self.path, args).await
    }

    /// Delivers `envelope` to the proxied actor.
    pub async fn notify(&self, envelope: Envelope) -> Result<(), TransportError> {
        self.transport
            .notify(envelope.redirect(self.path.to_string()))
            .await
    }
}
