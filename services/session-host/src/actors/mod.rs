//! Actor framework for the session host.
//!
//! A lightweight actor tree: every actor is bound at a dotted path, owns its
//! state and a typed configuration, and runs as one tokio task draining an
//! unbounded mailbox.
//!
//! ## Design Principles
//!
//! - **One mail item at a time**: a handler runs to completion before the
//!   next message is looked at, so multi-step protocol updates are atomic
//!   with respect to every other actor
//! - **Explicit dispatch**: message type tags map to handler functions in a
//!   table built once per binding
//! - **Tree life-cycle**: unbinding an actor unbinds its children first
//! - **Permanent errors stop the actor**: anything else is logged and the
//!   actor keeps going

mod framework;

pub use framework::{
    Actor, ActorContext, ActorHandle, ActorState, HandlerFn, HandlerFuture, HandlerTable, Mail,
    Mailbox, Spawn,
};
pub(crate) use framework::bind_actor;
