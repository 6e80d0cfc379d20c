//! pairwise Session Host Library
//!
//! Hosts sessions of paired distributed objects: sets of peer actors living
//! at different locations (usually `server` and `client`) that discover each
//! other, become addressable by role and start only once every peer is
//! ready.
//!
//! ## Architecture
//!
//! ```text
//! System (registry + transport)
//! └── SessionManager                  (start_session, sessions)
//!     └── SessionRoot(id)             (pairing barrier, status)
//!         ├── <server member>         (Peer<B>, local location)
//!         │   └── nested peers        (dynamic pairings)
//!         └── <client member>         (bound by the client, same session base)
//! ```
//!
//! Every actor runs as one tokio task that processes its mail one item at a
//! time; protocol steps never interleave inside an actor.
//!
//! ## Modules
//!
//! - `actors`: Actor framework (binding, mailboxes, dispatch tables)
//! - `path`: Dotted actor paths and base path resolution
//! - `resolver`: `#role` resolution against peers and context bindings
//! - `registry`: Location registry with change notification
//! - `transport`: In-process RPC and one-way delivery
//! - `pairing`: Pairing requests and the readiness barrier
//! - `peer`: The slave side of the protocol
//! - `session`: The master side of the protocol
//! - `service`: The session manager
//! - `context`: Chained node context, pairing tickets and bindings
//! - `user`: Users attached to a session

pub mod actors;
pub mod config;
pub mod context;
pub mod demo;
pub mod error;
pub mod messaging;
pub mod pairing;
pub mod path;
pub mod peer;
pub mod registry;
pub mod resolver;
pub mod service;
pub mod session;
pub mod system;
pub mod transport;
pub mod user;

// Re-export commonly used types
pub use actors::{Actor, ActorContext, ActorHandle, HandlerTable, Spawn};
pub use context::{Binding, NodeContext, PairingTicket};
pub use error::{ActorError, PairingError, PathError, RegistryError, TransportError, UserError};
pub use path::ActorPath;
pub use peer::{Peer, PeerBehavior, StopDisposition};
pub use service::{SessionManager, SessionStarted};
pub use session::{bootstrap_session, MemberFactory, SessionRoot};
pub use system::System;
