//! Typed per-actor configuration.
//!
//! Every bound actor owns a [`NodeContext`]. Children receive a context
//! derived from their parent's with [`NodeContext::derive`], which copies the
//! shared, session-wide fields and drops the node-local ones.

use std::collections::BTreeMap;
use std::sync::Arc;

use pairwise_id::{PairingId, SessionId};
use pairwise_message::Details;
use serde_json::{json, Value};

use crate::path::{ActorPath, PathResolver};
use crate::resolver::RoleResolver;
use crate::user::User;

/// How a freshly bound peer takes part in pairing.
#[derive(Debug, Clone, PartialEq)]
pub enum PairingTicket {
    /// Join a pairing that was already opened; the id was handed over by
    /// whoever spawned the peer.
    Join { id: PairingId, info: Details },

    /// Ask the session root to open a new pairing.
    Initiate { info: Details },
}

impl PairingTicket {
    /// Ticket for the session-wide pairing.
    pub fn session() -> Self {
        PairingTicket::Join {
            id: PairingId::SESSION,
            info: Details::new(),
        }
    }

    pub fn join(id: PairingId) -> Self {
        PairingTicket::Join {
            id,
            info: Details::new(),
        }
    }

    pub fn initiate(info: Details) -> Self {
        PairingTicket::Initiate { info }
    }

    pub fn id(&self) -> Option<PairingId> {
        match self {
            PairingTicket::Join { id, .. } => Some(*id),
            PairingTicket::Initiate { .. } => None,
        }
    }

    pub fn info(&self) -> &Details {
        match self {
            PairingTicket::Join { info, .. } | PairingTicket::Initiate { info } => info,
        }
    }
}

/// A named entry addressable through `#name`.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Path(ActorPath),
    Map(BTreeMap<String, Binding>),
}

impl Binding {
    fn describe(&self) -> Value {
        match self {
            Binding::Path(path) => json!(path.to_string()),
            Binding::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.describe()))
                    .collect(),
            ),
        }
    }
}

impl From<ActorPath> for Binding {
    fn from(path: ActorPath) -> Self {
        Binding::Path(path)
    }
}

/// Configuration of one bound actor.
#[derive(Debug, Clone, Default)]
pub struct NodeContext {
    /// Location name inside the session (e.g. `server`).
    pub location: Option<String>,

    /// Role advertised to the other peers. Node-local.
    pub role: Option<String>,

    pub session_id: Option<SessionId>,

    /// Pairing participation. Node-local.
    pub pairing_request: Option<PairingTicket>,

    /// Role map installed by `peer_start`: role -> peer path.
    pub peers: BTreeMap<String, ActorPath>,

    /// Named entries for `#name` resolution; `context` is what `#` means.
    pub bindings: BTreeMap<String, Binding>,

    pub user: Option<User>,

    /// Tried in order before the built-in path rules.
    pub resolvers: Vec<Arc<dyn PathResolver>>,
}

impl NodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a child: everything is inherited except `role` and
    /// `pairing_request`.
    pub fn derive(&self) -> Self {
        Self {
            role: None,
            pairing_request: None,
            ..self.clone()
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_session_id(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }

    pub fn with_pairing_request(mut self, ticket: PairingTicket) -> Self {
        self.pairing_request = Some(ticket);
        self
    }

    pub fn with_binding(mut self, name: impl Into<String>, binding: impl Into<Binding>) -> Self {
        self.bindings.insert(name.into(), binding.into());
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.install_resolver(resolver);
        self
    }

    /// Installs `resolver` unless one with the same name is present.
    pub fn install_resolver(&mut self, resolver: Arc<dyn PathResolver>) {
        if !self.resolvers.iter().any(|r| r.name() == resolver.name()) {
            self.resolvers.push(resolver);
        }
    }

    pub fn ensure_role_resolver(&mut self) {
        self.install_resolver(Arc::new(RoleResolver));
    }

    pub fn describe(&self) -> Value {
        json!({
            "location": self.location,
            "role": self.role,
            "session_id": self.session_id,
            "pairing_id": self.pairing_request.as_ref().and_then(PairingTicket::id),
            "peers": self.peers.iter()
                .map(|(role, path)| (role.clone(), json!(path.to_string())))
                .collect::<serde_json::Map<_, _>>(),
            "bindings": self.bindings.iter()
                .map(|(name, b)| (name.clone(), b.describe()))
                .collect::<serde_json::Map<_, _>>(),
            "user": self.user.as_ref().map(User::describe),
            "resolvers": self.resolvers.iter().map(|r| r.name()).collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_drops_node_local_fields() {
        let session = ActorPath::parse("pairwise.appservice.1").unwrap();
        let parent = NodeContext::new()
            .with_location("server")
            .with_role("controller")
            .with_session_id(SessionId::new(1))
            .with_pairing_request(PairingTicket::session())
            .with_binding("context", session.clone());

        let child = parent.derive();
        assert_eq!(child.location.as_deref(), Some("server"));
        assert_eq!(child.session_id, Some(SessionId::new(1)));
        assert_eq!(child.bindings.get("context"), Some(&Binding::Path(session)));
        assert!(child.role.is_none());
        assert!(child.pairing_request.is_none());
    }

    #[test]
    fn test_role_resolver_installed_once() {
        let mut context = NodeContext::new();
        context.ensure_role_resolver();
        context.ensure_role_resolver();
        assert_eq!(context.resolvers.len(), 1);

        let child = context.derive();
        assert_eq!(child.resolvers.len(), 1);
    }

    #[test]
    fn test_ticket_accessors() {
        assert_eq!(PairingTicket::session().id(), Some(PairingId::SESSION));
        let mut info = Details::new();
        info.insert("role".into(), json!("extra"));
        let ticket = PairingTicket::initiate(info);
        assert_eq!(ticket.id(), None);
        assert_eq!(ticket.info()["role"], "extra");
    }
}
