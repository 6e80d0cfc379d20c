//! Core actor framework types and traits.
//!
//! Provides the fundamental building blocks for the actor tree:
//! - `Actor` trait for defining actor behavior
//! - `HandlerTable` mapping message type tags to handler functions
//! - `ActorHandle` for sending mail to a bound actor
//! - `ActorContext` carrying the path, configuration and location of an actor
//! - Binding and unbinding life-cycle

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use pairwise_id::ActorId;
use pairwise_message::{Envelope, MessageType, RegistryInfo, SourceInfo};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::context::NodeContext;
use crate::error::{ActorError, PathError};
use crate::path::ActorPath;
use crate::registry::Location;
use crate::system::System;
use crate::transport::Remote;

// =============================================================================
// Mail
// =============================================================================

/// Everything an actor's mailbox can carry.
#[derive(Debug)]
pub enum Mail {
    /// One-way protocol message.
    Notify(Envelope),

    /// RPC invocation; the result goes back through `reply`.
    Call {
        method: String,
        args: Value,
        reply: oneshot::Sender<Result<Value, ActorError>>,
    },

    /// Unbind request; `ack` fires once the actor is unregistered.
    Unbind { ack: oneshot::Sender<()> },
}

/// Sending side of a mailbox. Unbounded: delivering mail never suspends.
pub type Mailbox = mpsc::UnboundedSender<Mail>;

// =============================================================================
// Dispatch
// =============================================================================

/// Future returned by message handlers.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<(), ActorError>>;

/// A message handler of actor type `A`.
pub type HandlerFn<A> =
    for<'a> fn(&'a mut A, Envelope, &'a mut ActorContext) -> HandlerFuture<'a>;

/// Dispatch table: message type tag -> handler.
///
/// Built once per binding from [`Actor::handlers`]; messages without an
/// entry go to [`Actor::on_unhandled`].
pub struct HandlerTable<A> {
    handlers: HashMap<String, HandlerFn<A>>,
}

impl<A> HandlerTable<A> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for a protocol message type.
    pub fn on(self, msg_type: MessageType, handler: HandlerFn<A>) -> Self {
        self.on_tag(msg_type.as_str(), handler)
    }

    /// Registers the handler for an arbitrary type tag.
    pub fn on_tag(mut self, tag: impl Into<String>, handler: HandlerFn<A>) -> Self {
        self.handlers.insert(tag.into(), handler);
        self
    }

    pub fn get(&self, tag: &str) -> Option<HandlerFn<A>> {
        self.handlers.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<A> Default for HandlerTable<A> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Core Traits
// =============================================================================

/// The Actor trait defines behavior for an actor.
///
/// Actors:
/// - Process mail one item at a time (no internal concurrency)
/// - Own mutable state not shared with other actors
/// - Communicate only via messages and RPC calls
#[async_trait]
pub trait Actor: Send + Sized + 'static {
    /// Actor type name, reported in source records.
    fn type_name(&self) -> &str;

    /// The dispatch table for incoming messages.
    fn handlers() -> HandlerTable<Self> {
        HandlerTable::new()
    }

    /// Called once, before any mail is processed.
    async fn on_bind(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called after the children are unbound, before unregistering.
    async fn on_unbind(&mut self, _ctx: &mut ActorContext) {}

    /// Called for messages without a handler.
    async fn on_unhandled(
        &mut self,
        envelope: Envelope,
        ctx: &mut ActorContext,
    ) -> Result<(), ActorError> {
        debug!(uri = %ctx.path(), msg_type = %envelope.msg_type, "No handler for message");
        Ok(())
    }

    /// Handles an RPC invocation.
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

    /// Called after every mail item to re-run dirty computations.
    async fn flush(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Actor-specific part of the `describe` RPC.
    fn describe(&self) -> Value {
        Value::Null
    }
}

/// Type-erased binding, so factories can hand out any actor.
pub trait Spawn: Send {
    fn spawn(
        self: Box<Self>,
        system: &System,
        path: ActorPath,
        node: NodeContext,
        parent: Option<ActorPath>,
    ) -> Result<ActorHandle, ActorError>;
}

impl<A: Actor> Spawn for A {
    fn spawn(
        self: Box<Self>,
        system: &System,
        path: ActorPath,
        node: NodeContext,
        parent: Option<ActorPath>,
    ) -> Result<ActorHandle, ActorError> {
        bind_actor(*self, system, path, node, parent)
    }
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle to a bound actor.
#[derive(Debug, Clone)]
pub struct ActorHandle {
    path: ActorPath,
    actor_id: ActorId,
    tx: Mailbox,
    stopped: watch::Receiver<bool>,
}

impl ActorHandle {
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// Delivers a message without waiting for it to be processed.
    pub fn notify(&self, envelope: Envelope) -> Result<(), ActorError> {
        self.tx
            .send(Mail::Notify(envelope))
            .map_err(|_| ActorError::ActorStopped)
    }

    /// Invokes an RPC method and waits for the result.
    pub async fn call(&self, method: &str, args: Value) -> Result<Value, ActorError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Call {
                method: method.to_string(),
                args,
                reply,
            })
            .map_err(|_| ActorError::ActorStopped)?;
        rx.await.map_err(|_| ActorError::ActorStopped)?
    }

    /// Unbinds the actor and waits until it is unregistered.
    pub async fn unbind(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(Mail::Unbind { ack }).is_ok() {
            let _ = rx.await;
        }
        self.stopped().await;
    }

    /// Waits until the actor is unregistered.
    pub async fn stopped(&self) {
        let mut stopped = self.stopped.clone();
        let _ = stopped.wait_for(|s| *s).await;
    }

    /// True once the actor no longer accepts mail.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Actor Context
// =============================================================================

/// Actor lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorState {
    /// `on_bind` is running.
    Binding,
    /// Processing mail.
    Running,
    /// Unbinding children and cleaning up.
    Unbinding,
    /// Unregistered.
    Unbound,
    /// Stopped by a permanent error.
    Failed,
}

/// Context provided to actors during mail handling.
pub struct ActorContext {
    path: ActorPath,
    actor_id: ActorId,
    type_name: String,
    node: NodeContext,
    location: Location,
    parent: Option<ActorPath>,
    children: BTreeMap<String, ActorHandle>,
    system: System,
    mailbox: Mailbox,
    unbind_requested: bool,
    state: ActorState,
    messages_processed: u64,
}

impl ActorContext {
    pub fn path(&self) -> &ActorPath {
        &self.path
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn node(&self) -> &NodeContext {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut NodeContext {
        &mut self.node
    }

    /// The registry location of this binding.
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn parent(&self) -> Option<&ActorPath> {
        self.parent.as_ref()
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed
    }

    /// Resolves a query with this actor's path and context.
    pub fn resolve(&self, query: &str) -> Result<ActorPath, PathError> {
        self.path.resolve(query, Some(&self.node))
    }

    /// A proxy to whatever `query` resolves to.
    pub fn remote(&self, query: &str) -> Result<Remote, PathError> {
        Ok(self.system.remote(self.resolve(query)?))
    }

    /// The record identifying this actor as a message source.
    pub fn source_info(&self) -> SourceInfo {
        SourceInfo {
            uri: self.path.to_string(),
            actor_type: self.type_name.clone(),
            registry: RegistryInfo {
                system: self.system.info().clone(),
                location: Some(self.location.id()),
            },
        }
    }

    /// Binds `actor` as the child `name` of this actor.
    pub fn add_child<A: Actor>(
        &mut self,
        name: &str,
        actor: A,
        node: NodeContext,
    ) -> Result<ActorHandle, ActorError> {
        let path = self.path.child(name)?;
        self.spawn_child(path, Box::new(actor), node)
    }

    /// Binds a type-erased actor at `path`, which must be a direct child of
    /// this actor's path. The path keeps whatever base it carries.
    pub fn spawn_child(
        &mut self,
        path: ActorPath,
        actor: Box<dyn Spawn>,
        node: NodeContext,
    ) -> Result<ActorHandle, ActorError> {
        if path.parent().as_ref() != Some(&self.path) {
            return Err(ActorError::Permanent(format!(
                "{path} is not a child of {}",
                self.path
            )));
        }
        let name = path.name().to_string();
        let handle = actor.spawn(&self.system, path, node, Some(self.path.clone()))?;
        self.children.insert(name, handle.clone());
        Ok(handle)
    }

    /// The live child called `name`.
    pub fn child(&self, name: &str) -> Option<&ActorHandle> {
        self.children.get(name).filter(|h| !h.is_closed())
    }

    /// Names of the live children.
    pub fn child_names(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|(_, h)| !h.is_closed())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Unbinds this actor once the current mail item is handled.
    pub fn request_unbind(&mut self) {
        self.unbind_requested = true;
    }

    pub fn unbind_requested(&self) -> bool {
        self.unbind_requested
    }

    /// Queues `envelope` in this actor's own mailbox.
    pub fn notify_self(&self, envelope: Envelope) -> Result<(), ActorError> {
        self.mailbox
            .send(Mail::Notify(envelope))
            .map_err(|_| ActorError::ActorStopped)
    }

    /// Queues `envelope` in this actor's own mailbox after `delay`.
    pub fn schedule(&self, delay: Duration, envelope: Envelope) {
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The actor may be gone by now; that is fine.
            let _ = mailbox.send(Mail::Notify(envelope));
        });
    }

    async fn unbind_children(&mut self) {
        let children = std::mem::take(&mut self.children);
        for (name, child) in children {
            debug!(uri = %self.path, child = %name, "Unbinding child");
            child.unbind().await;
        }
    }

    fn describe<A: Actor>(&self, actor: &A) -> Value {
        json!({
            "info": self.source_info(),
            "description": actor.describe(),
            "context": self.node.describe(),
            "children": self.child_names(),
        })
    }
}

// =============================================================================
// Binding
// =============================================================================

/// Registers `actor` at `path` and starts its task.
///
/// Mail can be delivered as soon as this returns; it is processed after
/// `on_bind` completes.
pub(crate) fn bind_actor<A: Actor>(
    actor: A,
    system: &System,
    path: ActorPath,
    node: NodeContext,
    parent: Option<ActorPath>,
) -> Result<ActorHandle, ActorError> {
    let actor_id = ActorId::new();
    let type_name = actor.type_name().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    let location = system
        .registry()
        .register(actor_id, &path, &type_name, tx.clone())?;
    let (stopped_tx, stopped_rx) = watch::channel(false);

    let ctx = ActorContext {
        path: path.clone(),
        actor_id,
        type_name,
        node,
        location,
        parent,
        children: BTreeMap::new(),
        system: system.clone(),
        mailbox: tx.clone(),
        unbind_requested: false,
        state: ActorState::Binding,
        messages_processed: 0,
    };

    tokio::spawn(run_actor_loop(actor, rx, ctx, stopped_tx));

    Ok(ActorHandle {
        path,
        actor_id,
        tx,
        stopped: stopped_rx,
    })
}

// =============================================================================
// Actor Loop
// =============================================================================

fn report(ctx: &mut ActorContext, during: &str, err: &ActorError) {
    if err.is_protocol_violation() {
        error!(uri = %ctx.path, during, error = %err, "Protocol violation");
    } else {
        warn!(uri = %ctx.path, during, error = %err, "Actor error");
    }
    if err.is_permanent() {
        ctx.state = ActorState::Failed;
        ctx.request_unbind();
    }
}

/// Run the main actor loop.
async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::UnboundedReceiver<Mail>,
    mut ctx: ActorContext,
    stopped: watch::Sender<bool>,
) {
    let handlers = A::handlers();
    let mut acks = Vec::new();

    info!(uri = %ctx.path, actor_type = %ctx.type_name, location = %ctx.location.id(), "Actor bound");

    if let Err(e) = actor.on_bind(&mut ctx).await {
        report(&mut ctx, "on_bind", &e);
    }
    if ctx.state == ActorState::Binding {
        ctx.state = ActorState::Running;
    }
    if let Err(e) = actor.flush(&mut ctx).await {
        report(&mut ctx, "flush", &e);
    }

    while !ctx.unbind_requested {
        let Some(mail) = rx.recv().await else {
            break;
        };
        ctx.messages_processed += 1;

        match mail {
            Mail::Notify(envelope) => {
                debug!(
                    uri = %ctx.path,
                    msg_type = %envelope.msg_type,
                    source = %envelope.source.uri,
                    "Message received"
                );
                let result = match handlers.get(&envelope.msg_type) {
                    Some(handler) => handler(&mut actor, envelope, &mut ctx).await,
                    None => actor.on_unhandled(envelope, &mut ctx).await,
                };
                if let Err(e) = result {
                    report(&mut ctx, "message", &e);
                }
            }
            Mail::Call {
                method,
                args,
                reply,
            } => {
                let result = if method == "describe" {
                    Ok(ctx.describe(&actor))
                } else {
                    actor.call(&method, args, &mut ctx).await
                };
                if let Err(e) = &result {
                    report(&mut ctx, "call", e);
                }
                let _ = reply.send(result);
            }
            Mail::Unbind { ack } => {
                acks.push(ack);
                ctx.request_unbind();
            }
        }

        if let Err(e) = actor.flush(&mut ctx).await {
            report(&mut ctx, "flush", &e);
        }
    }

    if ctx.state != ActorState::Failed {
        ctx.state = ActorState::Unbinding;
    }

    // No more mail: pending calls fail fast instead of timing out.
    rx.close();
    while let Ok(mail) = rx.try_recv() {
        match mail {
            Mail::Unbind { ack } => acks.push(ack),
            Mail::Call { reply, .. } => {
                let _ = reply.send(Err(ActorError::ActorStopped));
            }
            Mail::Notify(envelope) => {
                debug!(uri = %ctx.path, msg_type = %envelope.msg_type, "Dropping message for unbinding actor");
            }
        }
    }

    ctx.unbind_children().await;
    actor.on_unbind(&mut ctx).await;

    if let Err(e) = ctx.system.registry().unregister(ctx.actor_id) {
        warn!(uri = %ctx.path, error = %e, "Failed to unregister actor");
    }
    if ctx.state != ActorState::Failed {
        ctx.state = ActorState::Unbound;
    }
    stopped.send_replace(true);
    for ack in acks {
        let _ = ack.send(());
    }

    info!(
        uri = %ctx.path,
        messages_processed = ctx.messages_processed,
        state = ?ctx.state,
        "Actor unbound"
    );
}

// =============================================================================
// Tests
// =============================================================================
