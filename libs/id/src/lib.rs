//! # pairwise-id
//!
//! Identifier types shared by every pairwise crate.
//!
//! ## Two families
//!
//! - **Numeric, allocator-issued ids** (`SessionId`, `PairingId`): small
//!   integers handed out by a single owner in strictly increasing order and
//!   never reused. Pairing id `0` is reserved for the session-wide pairing.
//! - **Prefixed ULIDs** (`ActorId`, `LocationId`, `UserId`): generated
//!   anywhere, unique per process lifetime. A `LocationId` doubles as the
//!   generation tag of one binding: re-binding an actor at the same path
//!   yields a different `LocationId`.
//!
//! ## ULID format
//!
//! `{prefix}_{ulid}`, for example `loc_01HV4Z2WQXKJNM8GPQY6VBKC3D`.

mod error;
mod macros;
mod types;

pub use error::IdError;
#[doc(hidden)]
pub use error::parse_prefixed;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
