//! Presence tracking
//!
//! There is no heartbeat: a connection that vanishes without a disconnect
//! leaves its identity marked online.

use std::sync::Arc;

use cipherpost_core::{PresenceStatus, ServerEvent, Timestamp, UserId};
use tracing::{error, info, instrument, warn};

use crate::hub::{ConnectionHub, ConnectionId};
use crate::storage::RelayStorage;

/// Tracks online/offline status and broadcasts changes
pub struct PresenceTracker {
    storage: Arc<dyn RelayStorage>,
    hub: Arc<ConnectionHub>,
}

impl PresenceTracker {
    /// Create a tracker
    pub fn new(storage: Arc<dyn RelayStorage>, hub: Arc<ConnectionHub>) -> Self {
        Self { storage, hub }
    }

    /// Bind `connection` to `user`, mark the user online and broadcast
    #[instrument(skip(self))]
    pub fn join(&self, connection: ConnectionId, user: UserId) {
        if let Some(previous) = self.hub.bind(connection, user) {
            if previous != user {
                warn!(%previous, "Connection rebound to a different identity");
            }
        }
        self.set(user, PresenceStatus::Online);
    }

    /// Remove `connection`; if it was bound, mark its user offline and broadcast.
    ///
    /// Returns the identity that went offline.
    #[instrument(skip(self))]
    pub fn disconnect(&self, connection: ConnectionId) -> Option<UserId> {
        let user = self.hub.disconnect(connection)?;
        self.set(user, PresenceStatus::Offline);
        Some(user)
    }

    fn set(&self, user: UserId, status: PresenceStatus) {
        // The broadcast still happens if the status write fails
        if let Err(e) = self.storage.set_status(user, status, Timestamp::now()) {
            error!(%user, error = %e, "Failed to persist presence");
        }
        let delivered = self.hub.broadcast(&ServerEvent::PresenceChanged { id: user, status });
        info!(%user, %status, delivered, "Presence changed");
    }
}
