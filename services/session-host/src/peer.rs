//! Pairable peers: the member side of the pairing protocol.
//!
//! A [`Peer`] wraps a [`PeerBehavior`] and drives its life-cycle:
//!
//! ```text
//! initializing -> ready_sent -> active -> stopping -> stopped
//! ```
//!
//! On bind the peer either joins the pairing named by its ticket or asks the
//! session root for a new one, then reports `peer_ready` to the session root.
//! `peer_start` installs the role map used by `#role` resolution; `peer_stop`
//! tears the pairing down and tells every other known peer to do the same.

use std::collections::BTreeMap;

use async_trait::async_trait;
use pairwise_id::PairingId;
use pairwise_message::{Envelope, MessageType, PairingRequestNotice, PeerReady, PeerStart, PeerStop};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::actors::{Actor, ActorContext, HandlerFuture, HandlerTable};
use crate::context::{Binding, PairingTicket};
use crate::error::{ActorError, PairingError, PathError};
use crate::path::ActorPath;

/// What the default teardown should do after the `peer_stop` hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopDisposition {
    /// Notify the other peers, forget them and unbind.
    #[default]
    Teardown,
    /// Stay bound; the behavior handled the stop itself.
    Keep,
}

/// Extension points of a pairable peer. Every hook has a default.
#[async_trait]
pub trait PeerBehavior: Send + 'static {
    fn type_name(&self) -> &str;

    /// Runs on bind, before pairing starts.
    async fn peer_init(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        debug!(uri = %ctx.path(), "Paired object initialized");
        Ok(())
    }

    /// Runs once the pairing is complete and the role map is installed.
    async fn peer_start(
        &mut self,
        _start: &PeerStart,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        debug!(uri = %ctx.path(), "Paired object started");
        Ok(())
    }

    /// Runs when the pairing stops.
    async fn peer_stop(&mut self, ctx: &mut ActorContext) -> Result<StopDisposition, ActorError> {
        debug!(uri = %ctx.path(), "Paired object stopped");
        Ok(StopDisposition::Teardown)
    }

    /// Handles a `pairing_request` forwarded by the session root, usually by
    /// binding a child peer that joins `request.id`. Peers that can be asked
    /// to pair must override this.
    async fn create_new_peer(
        &mut self,
        _request: PairingRequestNotice,
        _ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        Err(ActorError::MissingOverride {
            type_name: self.type_name().to_string(),
            what: "pairing_request",
        })
    }

    /// RPC methods of the concrete peer.
    async fn call(
        &mut self,
        method: &str,
        _args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        Err(ActorError::UnknownMethod {
            uri: ctx.path().to_string(),
            method: method.to_string(),
        })
    }

    /// Messages outside the pairing protocol.
    async fn on_message(
        &mut self,
        envelope: Envelope,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        debug!(uri = %ctx.path(), msg_type = %envelope.msg_type, "No handler for message");
        Ok(())
    }

    fn describe(&self) -> Value {
        Value::Null
    }
}

/// Life-cycle phase of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerPhase {
    Initializing,
    ReadySent,
    Active,
    Stopping,
    Stopped,
}

/// A bound member of a pairing.
pub struct Peer<B> {
    behavior: B,
    phase: PeerPhase,
    pairing_active: bool,
    pairing_id: Option<PairingId>,
}

impl<B: PeerBehavior> Peer<B> {
    pub fn new(behavior: B) -> Self {
        Self {
            behavior,
            phase: PeerPhase::Initializing,
            pairing_active: false,
            pairing_id: None,
        }
    }

    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    pub fn phase(&self) -> PeerPhase {
        self.phase
    }

    /// True while the peer holds a live role map.
    pub fn is_pairing_active(&self) -> bool {
        self.pairing_active
    }

    /// Joins or initiates a pairing and reports readiness to the session root.
    async fn announce(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        let location = ctx
            .node()
            .location
            .clone()
            .ok_or_else(|| PairingError::MissingLocation(ctx.path().to_string()))?;

        let id = match ctx.node().pairing_request.clone() {
            Some(PairingTicket::Join { id, .. }) => id,
            ticket => {
                let info = ticket.map(|t| t.info().clone()).unwrap_or_default();
                let reply = ctx
                    .remote("@pairing_request")?
                    .invoke(json!({ "location": location, "info": info }))
                    .await?;
                serde_json::from_value::<PairingId>(reply.clone())
                    .map_err(|_| PairingError::InvalidReply(reply.to_string()))?
            }
        };

        let ready = PeerReady {
            id,
            location: location.clone(),
            uri: ctx.path().to_string(),
            role: ctx.node().role.clone(),
        };
        ctx.notify("@", ready).await?;
        self.pairing_id = Some(id);
        self.phase = PeerPhase::ReadySent;
        debug!(uri = %ctx.path(), pairing_id = %id, location = %location, "Peer ready sent");
        Ok(())
    }

    /// Binds every `name -> path` of the ticket's `info.context` so the peer
    /// can address it as `#name`. Both sides of a pairing see the same info,
    /// so base-relative paths land on the same actors.
    fn expand_context(ctx: &mut ActorContext) -> Result<(), ActorError> {
        let Some(entries) = ctx
            .node()
            .pairing_request
            .as_ref()
            .and_then(|ticket| ticket.info().get("context"))
            .cloned()
        else {
            return Ok(());
        };
        let Value::Object(entries) = entries else {
            return Err(ActorError::invalid_args(
                "pairing context must map names to paths",
            ));
        };
        for (name, query) in entries {
            let query = query.as_str().ok_or_else(|| {
                ActorError::invalid_args(format!("pairing context entry {name:?} is not a path"))
            })?;
            let path = ctx.resolve(query)?;
            debug!(uri = %ctx.path(), name = %name, target = %path, "Pairing context bound");
            ctx.node_mut().bindings.insert(name, Binding::Path(path));
        }
        Ok(())
    }

    /// Runs the stop hook and, unless the behavior keeps the peer, the
    /// default teardown.
    async fn stop(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        if self.behavior.peer_stop(ctx).await? == StopDisposition::Keep {
            return Ok(());
        }
        self.teardown(ctx).await
    }

    async fn teardown(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        let role = ctx.node().role.clone();
        let was_active = self.pairing_active;
        if was_active {
            let others: Vec<ActorPath> = ctx
                .node()
                .peers
                .iter()
                .filter(|(peer_role, _)| Some(peer_role.as_str()) != role.as_deref())
                .map(|(_, path)| path.clone())
                .collect();
            let delivered = ctx.broadcast(others, &PeerStop { role }).await;
            debug!(uri = %ctx.path(), delivered, "Peer stop flooded");
        }
        self.pairing_active = false;
        self.phase = PeerPhase::Stopping;
        ctx.node_mut().peers.clear();
        if was_active {
            ctx.location().changed()?;
        }
        ctx.request_unbind();
        Ok(())
    }

    fn on_peer_start<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let start: PeerStart = envelope.payload()?;
            let peers = start
                .peers()
                .into_iter()
                .map(|(role, uri)| Ok((role, ActorPath::parse(&uri)?)))
                .collect::<Result<BTreeMap<_, _>, PathError>>()?;
            if !peers.is_empty() {
                ctx.node_mut().peers = peers;
            }
            // The session-wide pairing also names every other location.
            if self.pairing_id.is_some_and(|id| id.is_session()) {
                let own = ctx.node().location.clone();
                for (location, info) in &start.locations {
                    if own.as_deref() == Some(location.as_str()) {
                        continue;
                    }
                    let path = ActorPath::parse(&info.uri)?;
                    ctx.node_mut()
                        .bindings
                        .insert(location.clone(), Binding::Path(path));
                }
            }
            self.pairing_active = true;
            self.phase = PeerPhase::Active;
            ctx.location().changed()?;
            info!(
                uri = %ctx.path(),
                peers = ?ctx.node().peers.keys().collect::<Vec<_>>(),
                "Pairing completed"
            );
            self.behavior.peer_start(&start, ctx).await
        })
    }

    fn on_peer_stop<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            // Location ids are never reused, so a stop sent by an earlier
            // binding at this same path is not mistaken for our own.
            let own = match envelope.source.location() {
                Some(location) => location == ctx.location().id(),
                None => envelope.source.uri == ctx.path().to_string(),
            };
            if own {
                debug!(uri = %ctx.path(), "Ignoring own peer stop");
                return Ok(());
            }
            debug!(uri = %ctx.path(), source = %envelope.source.uri, "Peer stop received");
            self.pairing_active = false;
            ctx.location().changed()?;
            self.stop(ctx).await
        })
    }

    fn on_pairing_request<'a>(
        &'a mut self,
        envelope: Envelope,
        ctx: &'a mut ActorContext,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let request: PairingRequestNotice = envelope.payload()?;
            debug!(uri = %ctx.path(), pairing_id = %request.id, "Pairing request received");
            self.behavior.create_new_peer(request, ctx).await
        })
    }
}

#[async_trait]
impl<B: PeerBehavior> Actor for Peer<B> {
    fn type_name(&self) -> &str {
        self.behavior.type_name()
    }

    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
            .on(MessageType::PeerStart, Self::on_peer_start)
            .on(MessageType::PeerStop, Self::on_peer_stop)
            .on(MessageType::PairingRequest, Self::on_pairing_request)
    }

    async fn on_bind(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        ctx.node_mut().ensure_role_resolver();
        Self::expand_context(ctx)?;
        self.behavior.peer_init(ctx).await?;
        self.announce(ctx).await
    }

    async fn on_unbind(&mut self, ctx: &mut ActorContext) {
        self.phase = PeerPhase::Stopped;
        debug!(uri = %ctx.path(), "Paired object unbound");
    }

    async fn on_unhandled(
        &mut self,
        envelope: Envelope,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        self.behavior.on_message(envelope, ctx).await
    }

    async fn call(
        &mut self,
        method: &str,
        args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        match method {
            // Self-initiated stop: the pairing is still active, so the
            // other peers are told.
            "peer_stop" => {
                self.stop(ctx).await?;
                Ok(Value::Null)
            }
            _ => self.behavior.call(method, args, ctx).await,
        }
    }

    fn describe(&self) -> Value {
        json!({
            "phase": self.phase,
            "pairing_active": self.pairing_active,
            "pairing_id": self.pairing_id,
            "behavior": self.behavior.describe(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairwise_message::{Details, LocationInfo};
    use pairwise_testing::Events;
    use std::time::Duration;

    use crate::context::NodeContext;
    use crate::system::System;

    const WAIT: Duration = Duration::from_secs(2);

    /// Stands in for a session root: answers `pairing_request` with a fixed
    /// id and records every `peer_ready`.
    struct FakeRoot {
        events: Events,
        ready: Vec<PeerReady>,
    }

    impl FakeRoot {
        fn on_ready<'a>(
            &'a mut self,
            envelope: Envelope,
            _ctx: &'a mut ActorContext,
        ) -> HandlerFuture<'a> {
            Box::pin(async move {
                let ready: PeerReady = envelope.payload()?;
                self.events.set(&format!("ready:{}", ready.location));
                self.ready.push(ready);
                Ok(())
            })
        }
    }

    #[async_trait]
    impl Actor for FakeRoot {
        fn type_name(&self) -> &str {
            "FakeRoot"
        }

        fn handlers() -> HandlerTable<Self> {
            HandlerTable::new().on(MessageType::PeerReady, Self::on_ready)
        }

        async fn call(
            &mut self,
            method: &str,
            args: Value,
            _ctx: &mut ActorContext,
        ) -> Result<Value, ActorError> {
            match method {
                "pairing_request" => {
                    let location = args["location"].as_str().unwrap_or_default();
                    self.events.set(&format!("pairing_request:{location}"));
                    Ok(json!(7))
                }
                "ready" => Ok(json!(self
                    .ready
                    .iter()
                    .map(|r| json!({"id": r.id, "location": r.location, "role": r.role}))
                    .collect::<Vec<_>>())),
                _ => Err(ActorError::Transient(method.to_string())),
            }
        }
    }

    /// Records hook invocations.
    struct Hooks {
        events: Events,
        keep: bool,
    }

    #[async_trait]
    impl PeerBehavior for Hooks {
        fn type_name(&self) -> &str {
            "Hooks"
        }

        async fn peer_start(
            &mut self,
            _start: &PeerStart,
            _ctx: &mut ActorContext,
        ) -> Result<(), ActorError> {
            self.events.set("peer_start");
            Ok(())
        }

        async fn peer_stop(
            &mut self,
            _ctx: &mut ActorContext,
        ) -> Result<StopDisposition, ActorError> {
            self.events.set("peer_stop");
            Ok(if self.keep {
                StopDisposition::Keep
            } else {
                StopDisposition::Teardown
            })
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

    fn session() -> ActorPath {
        ActorPath::parse("app.1").unwrap().as_base()
    }

    fn hooked(events: &Events) -> Peer<Hooks> {
        Peer::new(Hooks {
            events: events.clone(),
            keep: false,
        })
    }

    fn bind_root(system: &System, events: &Events) -> crate::actors::ActorHandle {
        let root = FakeRoot {
            events: events.clone(),
            ready: Vec::new(),
        };
        system.bind(session(), root, NodeContext::new()).unwrap()
    }

    fn start_payload() -> PeerStart {
        let mut locations = BTreeMap::new();
        locations.insert(
            "server".to_string(),
            LocationInfo {
                uri: "app.1.server".to_string(),
                role: Some("controller".to_string()),
            },
        );
        locations.insert(
            "client".to_string(),
            LocationInfo {
                uri: "app.1.client".to_string(),
                role: Some("view".to_string()),
            },
        );
        PeerStart {
            locations,
            details: Details::new(),
        }
    }

    fn from_root(system: &System, dest: &str, start: PeerStart) -> Envelope {
        Envelope::builder()
            .source(pairwise_message::SourceInfo {
                uri: "app.1".into(),
                actor_type: "FakeRoot".into(),
                registry: pairwise_message::RegistryInfo {
                    system: system.info().clone(),
                    location: None,
                },
            })
            .payload(start)
            .unwrap()
            .dest(dest)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_joining_peer_reports_ready() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);

        let node = NodeContext::new()
            .with_location("server")
            .with_role("controller")
            .with_pairing_request(PairingTicket::session());
        let peer = system
            .bind(session().child("server").unwrap(), hooked(&events), node)
            .unwrap();

        assert!(events.wait_for("ready:server", WAIT).await);
        assert!(!events.is_set("pairing_request:server"));
        let ready = root.call("ready", Value::Null).await.unwrap();
        assert_eq!(ready, json!([{"id": 0, "location": "server", "role": "controller"}]));

        peer.unbind().await;
        root.unbind().await;
    }

    #[tokio::test]
    async fn test_initiating_peer_asks_for_pairing_id() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);

        let node = NodeContext::new()
            .with_location("client")
            .with_pairing_request(PairingTicket::initiate(Details::new()));
        let peer = system
            .bind(session().child("client").unwrap(), hooked(&events), node)
            .unwrap();

        assert!(events.wait_for("ready:client", WAIT).await);
        assert!(events.is_set("pairing_request:client"));
        let ready = root.call("ready", Value::Null).await.unwrap();
        assert_eq!(ready[0]["id"], 7);

        let description = peer.call("describe", Value::Null).await.unwrap();
        assert_eq!(description["description"]["pairing_id"], 7);
        assert_eq!(description["description"]["phase"], "ready_sent");

        peer.unbind().await;
        root.unbind().await;
    }

    #[tokio::test]
    async fn test_peer_start_installs_role_map() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);
        let node = NodeContext::new()
            .with_location("server")
            .with_role("controller")
            .with_pairing_request(PairingTicket::session());
        let peer = system
            .bind(session().child("server").unwrap(), hooked(&events), node)
            .unwrap();
        assert!(events.wait_for("ready:server", WAIT).await);

        peer.notify(from_root(&system, "app.1.server", start_payload()))
            .unwrap();
        assert!(events.wait_for("peer_start", WAIT).await);

        let view = peer.call("resolve", json!("#view.grid")).await.unwrap();
        assert_eq!(view, json!("app.1.client.grid"));
        let err = peer.call("resolve", json!("#other")).await.unwrap_err();
        assert!(err.to_string().contains("other"));
        // Session-wide pairing: the other location is bound by name.
        let client = peer.call("resolve", json!("#client")).await.unwrap();
        assert_eq!(client, json!("app.1.client"));
        assert!(peer.call("resolve", json!("#server")).await.is_err());

        let description = peer.call("describe", Value::Null).await.unwrap();
        assert_eq!(description["description"]["pairing_active"], true);
        assert_eq!(description["description"]["phase"], "active");

        peer.unbind().await;
        root.unbind().await;
    }

    #[tokio::test]
    async fn test_pairing_context_is_expanded() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);

        let mut info = Details::new();
        info.insert(
            "context".to_string(),
            json!({"board": "@board", "log": "app.log"}),
        );
        let node = NodeContext::new()
            .with_location("client")
            .with_pairing_request(PairingTicket::initiate(info));
        let peer = system
            .bind(session().child("client").unwrap(), hooked(&events), node)
            .unwrap();
        assert!(events.wait_for("ready:client", WAIT).await);

        let board = peer.call("resolve", json!("#board.cells")).await.unwrap();
        assert_eq!(board, json!("app.1.board.cells"));
        assert_eq!(peer.call("resolve", json!("#log")).await.unwrap(), json!("app.log"));

        peer.unbind().await;
        root.unbind().await;
    }

    #[tokio::test]
    async fn test_malformed_pairing_context_is_not_announced() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);

        let mut info = Details::new();
        info.insert("context".to_string(), json!({"board": 3}));
        let node = NodeContext::new()
            .with_location("client")
            .with_pairing_request(PairingTicket::initiate(info));
        let peer = system
            .bind(session().child("client").unwrap(), hooked(&events), node)
            .unwrap();

        let description = peer.call("describe", Value::Null).await.unwrap();
        assert_eq!(description["description"]["phase"], "initializing");
        assert!(!events.is_set("pairing_request:client"));
        assert_eq!(root.call("ready", Value::Null).await.unwrap(), json!([]));

        peer.unbind().await;
        root.unbind().await;
    }

    #[tokio::test]
    async fn test_stop_from_other_peer_tears_down() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);
        let node = NodeContext::new()
            .with_location("server")
            .with_role("controller")
            .with_pairing_request(PairingTicket::session());
        let peer = system
            .bind(session().child("server").unwrap(), hooked(&events), node)
            .unwrap();
        assert!(events.wait_for("ready:server", WAIT).await);
        peer.notify(from_root(&system, "app.1.server", start_payload()))
            .unwrap();
        assert!(events.wait_for("peer_start", WAIT).await);

        let stop = Envelope::builder()
            .source(pairwise_message::SourceInfo {
                uri: "app.1.client".into(),
                actor_type: "Hooks".into(),
                registry: pairwise_message::RegistryInfo {
                    system: system.info().clone(),
                    location: Some(pairwise_id::LocationId::new()),
                },
            })
            .payload(PeerStop {
                role: Some("view".into()),
            })
            .unwrap()
            .dest("app.1.server")
            .build()
            .unwrap();
        peer.notify(stop).unwrap();

        assert!(events.wait_for("peer_stop", WAIT).await);
        peer.stopped().await;
        assert!(system.resolve("app.1.server").is_none());

        root.unbind().await;
    }

    #[tokio::test]
    async fn test_missing_pairing_override_is_fatal() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);
        let node = NodeContext::new()
            .with_location("server")
            .with_pairing_request(PairingTicket::session());
        let peer = system
            .bind(session().child("server").unwrap(), hooked(&events), node)
            .unwrap();
        assert!(events.wait_for("ready:server", WAIT).await);

        let notice = Envelope::builder()
            .source(from_root(&system, "app.1.server", start_payload()).source)
            .payload(PairingRequestNotice {
                id: PairingId::new(1),
                info: Details::new(),
            })
            .unwrap()
            .dest("app.1.server")
            .build()
            .unwrap();
        peer.notify(notice).unwrap();

        tokio::time::timeout(WAIT, peer.stopped()).await.unwrap();
        root.unbind().await;
    }

    #[tokio::test]
    async fn test_kept_peer_stays_bound() {
        let system = System::new("server");
        let events = Events::new();
        let root = bind_root(&system, &events);
        let node = NodeContext::new()
            .with_location("server")
            .with_pairing_request(PairingTicket::session());
        let behavior = Hooks {
            events: events.clone(),
            keep: true,
        };
        let peer = system
            .bind(session().child("server").unwrap(), Peer::new(behavior), node)
            .unwrap();
        assert!(events.wait_for("ready:server", WAIT).await);

        peer.call("peer_stop", Value::Null).await.unwrap();
        assert!(events.is_set("peer_stop"));
        assert!(!peer.is_closed());
        assert!(system.resolve("app.1.server").is_some());

        peer.unbind().await;
        root.unbind().await;
    }
}
