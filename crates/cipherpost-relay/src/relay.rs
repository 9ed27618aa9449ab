//! Message relay: validate, persist, then redistribute

use std::sync::Arc;

use cipherpost_core::{Envelope, StoredEnvelope, UserId};
use tracing::{debug, error, instrument};

use crate::error::{RelayError, Result};
use crate::hub::ConnectionHub;
use crate::storage::RelayStorage;

/// Server-side envelope relay
///
/// The durable write completes before an envelope is published, so any
/// client that fetches history afterwards sees what was broadcast.
pub struct MessageRelay {
    storage: Arc<dyn RelayStorage>,
    hub: Arc<ConnectionHub>,
}

impl MessageRelay {
    /// Create a relay
    pub fn new(storage: Arc<dyn RelayStorage>, hub: Arc<ConnectionHub>) -> Self {
        Self { storage, hub }
    }

    /// Validate, persist and publish an envelope.
    ///
    /// A persistence failure drops the envelope: it is logged and never
    /// published. There is no retry.
    #[instrument(skip(self, envelope), fields(sender = %envelope.sender_id, receiver = %envelope.receiver_id))]
    pub fn submit(&self, envelope: Envelope) -> Result<StoredEnvelope> {
        envelope.validate()?;

        let stored = match self.storage.append_envelope(&envelope) {
            Ok(stored) => stored,
            Err(RelayError::UnknownIdentity(who)) => {
                error!(%who, "Dropping envelope for unknown identity");
                return Err(RelayError::UnknownIdentity(who));
            }
            Err(e) => {
                error!(error = %e, "Failed to persist envelope, dropping");
                return Err(RelayError::Persist(e.to_string()));
            }
        };

        let delivered = self.hub.publish_envelope(&stored);
        debug!(id = %stored.id, delivered, "Envelope relayed");
        Ok(stored)
    }

    /// Persisted envelopes between two identities, ascending by timestamp
    pub fn history(&self, a: UserId, b: UserId) -> Result<Vec<StoredEnvelope>> {
        self.storage.envelopes_between(a, b)
    }
}
