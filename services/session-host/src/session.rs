//! Session roots: the coordinator side of the pairing protocol.
//!
//! A [`SessionRoot`] is bound once per session at `<service>.<id>`, with
//! that path as the base of everything inside the session. On bind it
//! creates the member for its local location, then aggregates `peer_ready`
//! messages and releases every pairing whose locations all reported.
//!
//! Status transitions (`created -> started -> active -> stopped`) are
//! reported with `session_info` to the root itself and to its parent.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pairwise_id::SessionId;
use pairwise_message::{
    Details, Envelope, MessageType, PairingExpired, PairingRequestNotice, PeerReady,
    SessionInfo, SessionStatus,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::actors::{Actor, ActorContext, ActorHandle, HandlerFuture, HandlerTable, Spawn};
use crate::context::{Binding, NodeContext, PairingTicket};
use crate::error::ActorError;
use crate::pairing::{PairingRequest, PairingTable};
use crate::path::ActorPath;
use crate::service::SessionStarted;
use crate::system::System;
use crate::user::User;

/// Builds the member for a location from its context.
pub type MemberFactory = Arc<dyn Fn(&NodeContext) -> Box<dyn Spawn> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct PairingRequestArgs {
    #[serde(alias = "src_location")]
    location: String,
    #[serde(default)]
    info: Details,
}

/// Coordinator of one session.
pub struct SessionRoot {
    id: SessionId,
    local_location: String,
    factory: MemberFactory,
    pairings: PairingTable,
    status: SessionStatus,
    pairing_timeout: Option<Duration>,
}

impl SessionRoot {
    /// A session spanning `locations`, hosting the member of
    /// `local_location` itself.
    pub fn new(
        id: SessionId,
        locations: Vec<String>,
        local_location: impl Into<String>,
        factory: MemberFactory,
    ) -> Self {
        Self {
            id,
            local_location: local_location.into(),
            factory,
            pairings: PairingTable::new(locations),
            status: SessionStatus::Created,
            pairing_timeout: None,
        }
    }

    /// Drops dynamic pairings still pending after `timeout`.
    pub fn with_pairing_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pairing_timeout = timeout;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    async fn set_status(&mut self, status: SessionStatus, ctx: &mut ActorContext) {
        if self.status == status {
            return;
        }
        info!(uri = %ctx.path(), session_id = %self.id, from = %self.status, to = %status, "Session status changed");
        self.status = status;

        let info = SessionInfo { status };
        match ctx.envelope(ctx.path().clone(), info) {
            Ok(envelope) => {
                // Fails only while unbinding, when nobody is listening.
                if let Err(e) = ctx.notify_self(envelope) {
                    debug!(uri = %ctx.path(), error = %e, "Session info not queued");
                }
            }
            Err(e) => warn!(uri = %ctx.path(), error = %e, "Failed to build session info"),
        }
        if let Some(parent) = ctx.parent().cloned() {
            if let Err(e) = ctx.notify(parent, info).await {
                debug!(uri = %ctx.path(), error = %e, "Parent not notified of session status");
            }
        }
    }

    /// Broadcasts `peer_start` for a released pairing.
    async fn release(
        &mut self,
        request: PairingRequest,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        let start = request.serialize();
        let dests = request
            .locations()
            .iter()
            .filter_map(|location| request.location_info(location))
            .map(|info| ActorPath::parse(&info.uri))
            .collect::<Result<Vec<_>, _>>()?;
        let delivered = ctx.broadcast(dests, &start).await;
        info!(
            uri = %ctx.path(),
            pairing_id = %request.id(),
            delivered,
            "Pairing released"
        );

        if request.id().is_session() {
            self.activate(&request, ctx).await?;
        }
        Ok(())
    }

    /// Binds every remote location name to its member, then goes active.
    /// Members install the same names from `peer_start`.
    async fn activate(
        &mut self,
        request: &PairingRequest,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        for location in request.locations() {
            if *location == self.local_location {
                continue;
            }
            if let Some(info) = request.location_info(location) {
                let path = ActorPath::parse(&info.uri)?;
                ctx.node_mut()
                    .bindings
                    .insert(location.clone(), Binding::Path(path));
            }
        }
        info!(uri = %ctx.path(), session_id = %self.id, "Session is now active");
        self.set_status(SessionStatus::Active, ctx).await;
        Ok(())
    }

    async fn pairing_request(
        &mut self,
        args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        let args: PairingRequestArgs =
            serde_json::from_value(args).map_err(ActorError::invalid_args)?;
        let id = self.pairings.open(args.info.clone());

        let dests = self
            .pairings
            .locations()
            .iter()
            .filter(|location| **location != args.location)
            .map(|location| ctx.path().child(location))
            .collect::<Result<Vec<_>, _>>()?;
        let notice = PairingRequestNotice {
            id,
            info: args.info,
        };
        ctx.broadcast(dests, &notice).await;

        if let Some(timeout) = self.pairing_timeout {
            let expiry = ctx.envelope(ctx.path().clone(), PairingExpired { id })?;
            ctx.schedule(timeout, expiry);
        }
        debug!(uri = %ctx.path(), pairing_id = %id, from = %args.location, "Pairing opened");
        Ok(json!(id))
    }

    fn on_peer_ready<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let ready: PeerReady = envelope.payload()?;
            debug!(
                uri = %ctx.path(),
                pairing_id = %ready.id,
                location = %ready.location,
                "Peer ready"
            );
            self.pairings
                .set_ready(ready.id, &ready.location, ready.uri, ready.role)?;
            Ok(())
        })
    }

    fn on_session_stop<'a>(
        &'a mut self,
        _envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.set_status(SessionStatus::Stopped, ctx).await;
            ctx.request_unbind();
            Ok(())
        })
    }

    fn on_pairing_expired<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let expired: PairingExpired = envelope.payload()?;
            if let Some(request) = self.pairings.cancel(expired.id) {
                warn!(
                    uri = %ctx.path(),
                    pairing_id = %expired.id,
                    pending = ?request.pending(),
                    "Pairing expired before every location was ready"
                );
            }
            Ok(())
        })
    }

    fn on_session_info<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let info: SessionInfo = envelope.payload()?;
            debug!(uri = %ctx.path(), status = %info.status, "Session info");
            Ok(())
        })
    }
}

#[async_trait]
impl Actor for SessionRoot {
    fn type_name(&self) -> &str {
        "SessionRoot"
    }

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(MessageType::PeerReady, Self::on_peer_ready)
            .on(MessageType::SessionStop, Self::on_session_stop)
            .on(MessageType::PairingExpired, Self::on_pairing_expired)
            .on(MessageType::SessionInfo, Self::on_session_info)
    }

    async fn on_bind(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        self.pairings.open_session();
        ctx.node_mut().ensure_role_resolver();

        let node = ctx
            .node()
            .derive()
            .with_location(self.local_location.clone())
            .with_session_id(self.id)
            .with_pairing_request(PairingTicket::session())
            .with_binding("context", ctx.path().clone());
        let path = ctx.path().child(&self.local_location)?;
        let member = (self.factory)(&node);
        ctx.spawn_child(path, member, node)?;

        self.set_status(SessionStatus::Started, ctx).await;
        Ok(())
    }

    async fn on_unbind(&mut self, ctx: &mut ActorContext) {
        let pending = self.pairings.pending_ids();
        if !pending.is_empty() {
            warn!(uri = %ctx.path(), ?pending, "Session unbound with pending pairings");
        }
        self.pairings.close();
        self.set_status(SessionStatus::Stopped, ctx).await;
    }

    async fn call(
        &mut self,
        method: &str,
        args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        match method {
            "pairing_request" => self.pairing_request(args, ctx).await,
            "status" => Ok(json!({
                "id": self.id,
                "status": self.status,
                "pending": self.pairings.pending_ids(),
            })),
            "set_user" => {
                let user = User::from_value(args)?;
                let description = user.describe();
                info!(uri = %ctx.path(), login = ?user.login(), "Session user set");
                ctx.node_mut().user = Some(user);
                Ok(description)
            }
            _ => Err(ActorError::UnknownMethod {
                uri: ctx.path().to_string(),
                method: method.to_string(),
            }),
        }
    }

    async fn flush(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        if !self.pairings.is_dirty() {
            return Ok(());
        }
        for request in self.pairings.evaluate() {
            self.release(request, ctx).await?;
        }
        Ok(())
    }

    fn describe(&self) -> Value {
        json!({
            "id": self.id,
            "status": self.status,
            "locations": self.pairings.locations(),
            "local_location": self.local_location,
            "pending": self.pairings.pending_ids(),
        })
    }
}

/// Starts (or rejoins) a session on the manager at `service` and binds the
/// member for `location` (default `client`) at `<base>.<location>`.
pub async fn bootstrap_session(
    system: &System,
    service: &ActorPath,
    location: Option<&str>,
    factory: &MemberFactory,
    session_id: Option<SessionId>,
    details: Details,
) -> Result<(ActorHandle, SessionStarted), ActorError> {
    let location = location.unwrap_or("client");
    let reply = system
        .remote(service.clone())
        .call(
            "start_session",
            json!({
                "from_location": location,
                "session_id": session_id,
                "details": details,
            }),
        )
        .await?;
    let started: SessionStarted = serde_json::from_value(reply)
        .map_err(|e| ActorError::Transient(format!("invalid start_session reply: {e}")))?;

    let base = started.base.as_base();
    let mut node = NodeContext::new()
        .with_location(started.location.clone())
        .with_session_id(started.id)
        .with_pairing_request(PairingTicket::session())
        .with_binding("context", base.clone());
    node.ensure_role_resolver();

    let path = base.child(&started.location)?;
    let member = factory(&node);
    let handle = system.bind_boxed(path, member, node)?;
    info!(uri = %handle.path(), session_id = %started.id, "Session member bootstrapped");
    Ok((handle, started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairwise_message::PeerStart;
    use pairwise_testing::Events;

    use crate::peer::{Peer, PeerBehavior};

    const WAIT: Duration = Duration::from_secs(2);

    struct Member {
        events: Events,
    }

    #[async_trait]
    impl PeerBehavior for Member {
        fn type_name(&self) -> &str {
            "Member"
        }

        async fn peer_start(
            &mut self,
            start: &PeerStart,
            ctx: &mut ActorContext,
        ) -> Result<(), ActorError> {
            let location = ctx.node().location.clone().unwrap_or_default();
            self.events.set(&format!("{location}:started"));
            self.events
                .set(&format!("{location}:saw:{}", start.locations.len()));
            Ok(())
        }

        async fn call(
            &mut self,
            method: &str,
            args: Value,
            ctx: &mut ActorContext,
        ) -> Result<Value, ActorError> {
            match method {
                "resolve" => {
                    let query = args.as_str().unwrap_or_default();
                    Ok(json!(ctx.resolve(query)?.to_string()))
                }
                _ => Err(ActorError::UnknownMethod {
                    uri: ctx.path().to_string(),
                    method: method.to_string(),
                }),
            }
        }
    }

    fn factory(events: &Events) -> MemberFactory {
        let events = events.clone();
        Arc::new(move |_node: &NodeContext| {
            Box::new(Peer::new(Member {
                events: events.clone(),
            })) as Box<dyn Spawn>
        })
    }

    fn session_path() -> ActorPath {
        ActorPath::parse("app.1").unwrap().as_base()
    }

    #[tokio::test]
    async fn test_single_location_session_activates() {
        let system = System::new("server");
        let events = Events::new();
        let root = SessionRoot::new(
            SessionId::new(1),
            vec!["server".to_string()],
            "server",
            factory(&events),
        );
        let handle = system
            .bind(session_path(), root, NodeContext::new())
            .unwrap();

        assert!(events.wait_for("server:started", WAIT).await);
        assert!(events.is_set("server:saw:1"));
        let status = handle.call("status", Value::Null).await.unwrap();
        assert_eq!(status["status"], "active");
        assert_eq!(status["pending"], json!([]));

        handle.unbind().await;
        assert!(system.registry().is_empty());
    }

    #[tokio::test]
    async fn test_remote_member_completes_pairing() {
        let system = System::new("server");
        let events = Events::new();
        let root = SessionRoot::new(
            SessionId::new(1),
            vec!["client".to_string(), "server".to_string()],
            "server",
            factory(&events),
        );
        let handle = system
            .bind(session_path(), root, NodeContext::new())
            .unwrap();

        let status = handle.call("status", Value::Null).await.unwrap();
        assert_eq!(status["status"], "started");
        assert_eq!(status["pending"], json!([0]));

        let node = NodeContext::new()
            .with_location("client")
            .with_pairing_request(PairingTicket::session());
        let client = system
            .sibling("client")
            .bind(
                session_path().child("client").unwrap(),
                Peer::new(Member {
                    events: events.clone(),
                }),
                node,
            )
            .unwrap();

        let missing = events
            .wait_all(&["server:started", "client:started"], WAIT)
            .await;
        assert!(missing.is_empty(), "missing {missing:?}");
        assert!(events.is_set("client:saw:2"));

        let description = handle.call("describe", Value::Null).await.unwrap();
        assert_eq!(description["description"]["status"], "active");
        assert_eq!(
            description["context"]["bindings"]["client"],
            "app.1.client"
        );
        assert_eq!(description["context"]["resolvers"], json!(["role"]));

        // Both members address each other by location name.
        let server = system.remote(session_path().child("server").unwrap());
        assert_eq!(
            server.call("resolve", json!("#client")).await.unwrap(),
            "app.1.client"
        );
        assert_eq!(
            server.call("resolve", json!("#client.pair1")).await.unwrap(),
            "app.1.client.pair1"
        );
        assert_eq!(
            client.call("resolve", json!("#server")).await.unwrap(),
            "app.1.server"
        );
        assert_eq!(server.call("resolve", json!("#")).await.unwrap(), "app.1");

        client.unbind().await;
        handle.unbind().await;
    }

    #[tokio::test]
    async fn test_set_user_validates() {
        let system = System::new("server");
        let events = Events::new();
        let root = SessionRoot::new(
            SessionId::new(1),
            vec!["server".to_string()],
            "server",
            factory(&events),
        );
        let handle = system
            .bind(session_path(), root, NodeContext::new())
            .unwrap();

        let user = handle
            .call("set_user", json!({"login": "guest"}))
            .await
            .unwrap();
        assert_eq!(user["login"], "guest");
        assert_eq!(user["anonymous"], true);

        let err = handle
            .call(
                "set_user",
                json!({"id": pairwise_id::UserId::new().to_string()}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ActorError::User(_)));

        let description = handle.call("describe", Value::Null).await.unwrap();
        assert_eq!(description["context"]["user"]["login"], "guest");

        handle.unbind().await;
    }

    #[tokio::test]
    async fn test_session_stop_unbinds_tree() {
        let system = System::new("server");
        let events = Events::new();
        let root = SessionRoot::new(
            SessionId::new(1),
            vec!["server".to_string()],
            "server",
            factory(&events),
        );
        let handle = system
            .bind(session_path(), root, NodeContext::new())
            .unwrap();
        assert!(events.wait_for("server:started", WAIT).await);

        let stop = Envelope::builder()
            .source(pairwise_message::SourceInfo {
                uri: "test".into(),
                actor_type: "Test".into(),
                registry: pairwise_message::RegistryInfo {
                    system: system.info().clone(),
                    location: None,
                },
            })
            .payload(pairwise_message::SessionStop {})
            .unwrap()
            .dest("app.1")
            .build()
            .unwrap();
        handle.notify(stop).unwrap();

        tokio::time::timeout(WAIT, handle.stopped()).await.unwrap();
        assert!(system.resolve("app.1.server").is_none());
        assert!(system.registry().is_empty());
    }
}
