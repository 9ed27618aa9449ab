//! # Cipherpost Core
//!
//! Types shared by the relay and its clients.
//!
//! This crate provides:
//! - Server-assigned identifiers and timestamps
//! - Directory entries ([`IdentitySummary`]) and auth sessions
//! - The [`Envelope`] wire/storage format and its shape validation
//! - Realtime channel events

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod envelope;
pub mod error;
pub mod event;
pub mod identity;
pub mod types;

pub use envelope::{Envelope, StoredEnvelope};
pub use error::{CoreError, Result};
pub use event::{ClientEvent, ServerEvent};
pub use identity::{usernames_match, AuthSession, IdentitySummary, PresenceStatus};
pub use types::{EnvelopeId, Timestamp, UserId};

/// Protocol version reported by services
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum ciphertext size accepted by the relay (64 KB)
pub const MAX_MESSAGE_SIZE: usize = 65536;

/// Maximum username length in characters
pub const MAX_USERNAME_LEN: usize = 64;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::envelope::{Envelope, StoredEnvelope};
    pub use crate::error::{CoreError, Result};
    pub use crate::event::{ClientEvent, ServerEvent};
    pub use crate::identity::{usernames_match, AuthSession, IdentitySummary, PresenceStatus};
    pub use crate::types::{EnvelopeId, Timestamp, UserId};
}
