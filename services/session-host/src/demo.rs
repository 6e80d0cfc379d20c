//! A demo member served by the `session-host` binary.
//!
//! `EchoMember` answers `echo` and keeps a counter, joins every pairing the
//! session forwards to it and can initiate new pairings with `pair`.

use std::sync::Arc;

use async_trait::async_trait;
use pairwise_message::{Details, PairingRequestNotice, PeerStart};
use serde_json::{json, Value};
use tracing::info;

use crate::actors::{ActorContext, Spawn};
use crate::context::{NodeContext, PairingTicket};
use crate::error::ActorError;
use crate::peer::{Peer, PeerBehavior};
use crate::session::MemberFactory;

#[derive(Debug, Default)]
pub struct EchoMember {
    counter: u64,
    spawned: u64,
    started: bool,
}

impl EchoMember {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory handing out a fresh `EchoMember` peer per session.
    pub fn factory() -> MemberFactory {
        Arc::new(|_node: &NodeContext| Box::new(Peer::new(EchoMember::new())) as Box<dyn Spawn>)
    }

    /// Binds a child that initiates a pairing. `peer_role` is forwarded to
    /// the other locations as the role their new peer should take.
    fn pair(&mut self, args: &Value, ctx: &mut ActorContext) -> Result<Value, ActorError> {
        self.spawned += 1;
        let name = format!("pair{}", self.spawned);

        let mut info = Details::new();
        if let Some(peer_role) = args.get("peer_role").and_then(Value::as_str) {
            info.insert("role".to_string(), json!(peer_role));
        }
        let mut node = ctx
            .node()
            .derive()
            .with_pairing_request(PairingTicket::initiate(info));
        if let Some(role) = args.get("role").and_then(Value::as_str) {
            node = node.with_role(role);
        }
        let child = ctx.add_child(&name, Peer::new(EchoMember::new()), node)?;
        Ok(json!(child.path().to_string()))
    }
}

#[async_trait]
impl PeerBehavior for EchoMember {
    fn type_name(&self) -> &str {
        "EchoMember"
    }

    async fn peer_start(
        &mut self,
        start: &PeerStart,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        self.started = true;
        info!(
            uri = %ctx.path(),
            locations = ?start.locations.keys().collect::<Vec<_>>(),
            "Echo member started"
        );
        Ok(())
    }

    async fn create_new_peer(
        &mut self,
        request: PairingRequestNotice,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        let role = request
            .info
            .get("role")
            .and_then(Value::as_str)
            .map(str::to_string);
        let mut node = ctx.node().derive().with_pairing_request(PairingTicket::Join {
            id: request.id,
            info: request.info,
        });
        if let Some(role) = role {
            node = node.with_role(role);
        }
        ctx.add_child(&format!("peer{}", request.id), Peer::new(EchoMember::new()), node)?;
        Ok(())
    }

    async fn call(
        &mut self,
        method: &str,
        args: Value,
        ctx: &mut ActorContext,
    ) -> Result<Value, ActorError> {
        match method {
            "echo" => Ok(args),
            "inc_counter" => {
                self.counter += 1;
                Ok(json!(self.counter))
            }
            "counter" => Ok(json!(self.counter)),
            "pair" => self.pair(&args, ctx),
            _ => Err(ActorError::UnknownMethod {
                uri: ctx.path().to_string(),
                method: method.to_string(),
            }),
        }
    }

    fn describe(&self) -> Value {
        json!({
            "counter": self.counter,
            "spawned": self.spawned,
            "started": self.started,
        })
    }
}
