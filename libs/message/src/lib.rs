//! # pairwise-message
//!
//! The addressed, serializable unit every pairing-protocol exchange travels in.
//!
//! ## Wire shape
//!
//! ```text
//! { source:  { uri, type, registry: { system: { name, lang }, location } },
//!   type:    "peer_ready" | "peer_start" | ...,
//!   dest:    "absolute.path" | null,
//!   details: { ...payload fields... } }
//! ```
//!
//! The destination is resolved by the sender before the envelope is built;
//! reading an envelope back never re-resolves anything.
//!
//! ## Payloads
//!
//! Each protocol message has a typed payload implementing [`Payload`], which
//! ties it to its [`MessageType`] tag and converts to and from `details`.

mod envelope;
mod error;
mod types;

pub use envelope::*;
pub use error::MessageError;
pub use types::*;
