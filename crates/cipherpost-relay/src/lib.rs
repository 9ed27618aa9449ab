//! # Cipherpost Relay
//!
//! Server side of Cipherpost. The relay stores envelopes durably and
//! redistributes them to connected sessions; it never holds a private key or
//! a session key.
//!
//! ## Features
//!
//! - **Persist then publish**: an envelope is broadcast only after its durable
//!   write completes
//! - **Pluggable delivery**: broadcast to every connection (default) or only
//!   to the two participants
//! - **Presence**: online/offline tracking on join and disconnect
//! - **Directory**: registration, login and public key lookup

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod directory;
pub mod error;
pub mod hub;
pub mod password;
pub mod presence;
pub mod relay;
pub mod server;
pub mod storage;
pub mod token;

pub use config::{RelayServerConfig, StorageBackend};
pub use directory::Directory;
pub use error::{AuthError, RelayError, Result};
pub use hub::{ConnectionHub, ConnectionId, DeliveryPolicy, Subscription};
pub use presence::PresenceTracker;
pub use relay::MessageRelay;
pub use server::RelayServer;
pub use storage::{MemoryRelayStorage, RelayStorage, SledRelayStorage, StorageStats};
