//! Relay server: wires storage, hub, directory, relay and presence together

use std::sync::Arc;

use tracing::info;

use crate::config::{RelayServerConfig, StorageBackend};
use crate::directory::Directory;
use crate::error::{RelayError, Result};
use crate::hub::ConnectionHub;
use crate::presence::PresenceTracker;
use crate::relay::MessageRelay;
use crate::storage::{MemoryRelayStorage, RelayStorage, SledRelayStorage, StorageStats};
use crate::token::TokenIssuer;

/// Relay server state shared by the network surfaces
pub struct RelayServer {
    config: RelayServerConfig,
    storage: Arc<dyn RelayStorage>,
    hub: Arc<ConnectionHub>,
    directory: Directory,
    relay: MessageRelay,
    presence: PresenceTracker,
}

impl RelayServer {
    /// Create a relay server, opening the configured storage
    pub fn new(config: RelayServerConfig) -> Result<Self> {
        config.validate().map_err(RelayError::Config)?;

        let storage: Arc<dyn RelayStorage> = match &config.storage {
            StorageBackend::Memory => Arc::new(MemoryRelayStorage::new()),
            StorageBackend::Sled { path } => Arc::new(SledRelayStorage::open(path)?),
        };
        Ok(Self::with_storage(config, storage))
    }

    /// Create with custom storage
    pub fn with_storage(config: RelayServerConfig, storage: Arc<dyn RelayStorage>) -> Self {
        let hub = ConnectionHub::new(config.delivery_policy, config.connection_buffer);
        let tokens = TokenIssuer::new(config.token_secret.as_bytes(), config.token_ttl());

        info!(
            policy = ?config.delivery_policy,
            storage = ?config.storage,
            "Relay server initialized"
        );

        Self {
            directory: Directory::new(Arc::clone(&storage), tokens),
            relay: MessageRelay::new(Arc::clone(&storage), Arc::clone(&hub)),
            presence: PresenceTracker::new(Arc::clone(&storage), Arc::clone(&hub)),
            config,
            storage,
            hub,
        }
    }

    /// Configuration
    pub fn config(&self) -> &RelayServerConfig {
        &self.config
    }

    /// Connection hub
    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    /// Directory and auth
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Envelope relay
    pub fn relay(&self) -> &MessageRelay {
        &self.relay
    }

    /// Presence tracker
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }

    /// Delete every identity and envelope
    pub fn purge(&self) -> Result<()> {
        self.storage.purge()
    }

    /// Flush storage before shutdown
    pub fn shutdown(&self) -> Result<()> {
        self.storage.flush()?;
        info!(connections = self.hub.connection_count(), "Relay server stopped");
        Ok(())
    }
}
