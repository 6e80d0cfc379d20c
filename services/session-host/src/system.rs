//! The root of an actor tree.
//!
//! A [`System`] owns the location registry and the transport. Every actor
//! bound through it (directly or as a descendant) shares both. Several
//! systems with different names can share one registry through
//! [`System::sibling`]; that is how an in-process client and server talk.

use std::sync::Arc;
use std::time::Duration;

use pairwise_id::ActorId;
use pairwise_message::SystemInfo;

use crate::actors::{bind_actor, Actor, ActorHandle, Spawn};
use crate::config::HostConfig;
use crate::context::NodeContext;
use crate::error::ActorError;
use crate::path::ActorPath;
use crate::registry::Registry;
use crate::transport::{LocalTransport, Remote, Transport, DEFAULT_CALL_TIMEOUT};

#[derive(Debug)]
struct SystemInner {
    info: SystemInfo,
    registry: Registry,
    transport: Arc<dyn Transport>,
}

/// Registry, transport and identity of one process.
#[derive(Debug, Clone)]
pub struct System {
    inner: Arc<SystemInner>,
}

impl System {
    /// A system with its own registry and the default call timeout.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_call_timeout(name, DEFAULT_CALL_TIMEOUT)
    }

    /// A system with its own registry.
    pub fn with_call_timeout(name: impl Into<String>, call_timeout: Duration) -> Self {
        let registry = Registry::new();
        let transport = Arc::new(LocalTransport::new(registry.clone(), call_timeout));
        Self::with_transport(SystemInfo::new(name), registry, transport)
    }

    /// A system configured from the host configuration.
    pub fn from_config(config: &HostConfig) -> Self {
        Self::with_call_timeout(config.system_name.clone(), config.call_timeout())
    }

    pub fn with_transport(
        info: SystemInfo,
        registry: Registry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(SystemInner {
                info,
                registry,
                transport,
            }),
        }
    }

    /// Another system sharing this one's registry and transport.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::with_transport(
            SystemInfo::new(name),
            self.inner.registry.clone(),
            Arc::clone(&self.inner.transport),
        )
    }

    pub fn info(&self) -> &SystemInfo {
        &self.inner.info
    }

    pub fn name(&self) -> &str {
        &self.inner.info.name
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.transport)
    }

    /// Binds a root-level actor at `path`.
    pub fn bind<A: Actor>(
        &self,
        path: ActorPath,
        actor: A,
        node: NodeContext,
    ) -> Result<ActorHandle, ActorError> {
        bind_actor(actor, self, path, node, None)
    }

    /// Binds a type-erased root-level actor at `path`.
    pub fn bind_boxed(
        &self,
        path: ActorPath,
        actor: Box<dyn Spawn>,
        node: NodeContext,
    ) -> Result<ActorHandle, ActorError> {
        actor.spawn(self, path, node, None)
    }

    /// The actor currently bound at `uri`.
    pub fn resolve(&self, uri: &str) -> Option<ActorId> {
        self.inner.registry.resolve(uri)
    }

    /// A proxy to `path`.
    pub fn remote(&self, path: ActorPath) -> Remote {
        Remote::new(self.transport(), path)
    }
}
