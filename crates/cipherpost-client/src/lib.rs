//! # Cipherpost Client
//!
//! Client side of Cipherpost: local key storage and the chat session that
//! encrypts outgoing messages and renders incoming ones.
//!
//! ## Overview
//!
//! - **Key store**: private keys by username with a three-tier lookup
//! - **Local state**: auth session, key store and the sent-message cache,
//!   cleared together by `reset`
//! - **Chat session**: register, login, send, history and a lazy stream of
//!   incoming messages, over pluggable directory and transport clients
//!
//! ## Usage
//!
//! ```ignore
//! use cipherpost_client::{ChatSession, SledLocalState};
//!
//! let state = Arc::new(SledLocalState::open(path)?);
//! let mut session = ChatSession::new(directory, transport, state);
//!
//! session.login("alice", "password").await?;
//! session.resolve_partner("bob").await?;
//! session.send("hello").await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod keystore;
pub mod local_state;
pub mod remote;
pub mod session;

pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use keystore::{KeyStore, LookupTier, MemoryKeyStore, SledKeyStore};
pub use local_state::{LocalState, MemoryLocalState, SledLocalState};
pub use remote::{DirectoryClient, MessageTransport};
pub use session::{ChatSession, MessageBody, RenderedMessage};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{ClientError, Result};
    pub use crate::local_state::LocalState;
    pub use crate::remote::{DirectoryClient, MessageTransport};
    pub use crate::session::{ChatSession, MessageBody, RenderedMessage};
}
