//! Connection hub: publish/subscribe over live realtime connections
//!
//! Each connection owns a bounded channel. Publishing never waits: when a
//! connection's buffer is full the notification is dropped for that
//! connection only, and history remains the authoritative record.

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use cipherpost_core::{ServerEvent, StoredEnvelope, UserId};
use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Who receives a published envelope
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Every live connection receives every envelope.
    ///
    /// Content stays confidential, but sender, receiver, timing and size are
    /// visible to all connected sessions.
    #[default]
    Broadcast,
    /// Only connections bound to the sender or receiver
    Participants,
}

/// Identifier of one live connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

struct Connection {
    tx: mpsc::Sender<ServerEvent>,
    user: Option<UserId>,
}

/// Registry of live connections
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, Connection>,
    next_id: AtomicU64,
    policy: DeliveryPolicy,
    buffer: usize,
}

impl ConnectionHub {
    /// Create a hub with the given policy and per-connection buffer size
    pub fn new(policy: DeliveryPolicy, buffer: usize) -> Arc<Self> {
        Arc::new(Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            policy,
            buffer: buffer.max(1),
        })
    }

    /// Delivery policy for envelopes
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Register a new connection
    pub fn connect(self: &Arc<Self>) -> Subscription {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(id, Connection { tx, user: None });
        debug!(%id, "Connection registered");

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Bind a connection to an identity. Returns the previously bound identity.
    ///
    /// Returns `None` without binding if the connection is gone.
    pub fn bind(&self, id: ConnectionId, user: UserId) -> Option<UserId> {
        self.connections
            .get_mut(&id)
            .and_then(|mut conn| conn.user.replace(user))
    }

    /// Identity bound to a connection, if any
    pub fn bound_user(&self, id: ConnectionId) -> Option<UserId> {
        self.connections.get(&id).and_then(|conn| conn.user)
    }

    /// Remove a connection. Returns the identity it was bound to.
    pub fn disconnect(&self, id: ConnectionId) -> Option<UserId> {
        let (_, conn) = self.connections.remove(&id)?;
        debug!(%id, "Connection removed");
        conn.user
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Publish an envelope under the hub's delivery policy.
    /// Returns the number of connections it was queued for.
    pub fn publish_envelope(&self, stored: &StoredEnvelope) -> usize {
        let event = ServerEvent::Receive {
            envelope: stored.clone(),
        };
        match self.policy {
            DeliveryPolicy::Broadcast => self.deliver(&event, |_| true),
            DeliveryPolicy::Participants => {
                let (from, to) = (stored.envelope.sender_id, stored.envelope.receiver_id);
                self.deliver(&event, |user| user == Some(from) || user == Some(to))
            }
        }
    }

    /// Publish an event to every live connection
    pub fn broadcast(&self, event: &ServerEvent) -> usize {
        self.deliver(event, |_| true)
    }

    fn deliver(&self, event: &ServerEvent, wants: impl Fn(Option<UserId>) -> bool) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.connections.iter() {
            if !wants(entry.user) {
                continue;
            }
            match entry.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(id = %entry.key(), "Connection buffer full, dropping notification");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // Removal must wait until the iterator's shard locks are released
        for id in closed {
            self.connections.remove(&id);
        }
        delivered
    }
}

/// Inbound event stream for one connection
///
/// Dropping the subscription removes the connection from the hub without a
/// presence change; callers that track presence disconnect explicitly first.
pub struct Subscription {
    id: ConnectionId,
    rx: mpsc::Receiver<ServerEvent>,
    hub: Weak<ConnectionHub>,
}

impl Subscription {
    /// This connection's id
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Receive the next event; `None` once the connection is removed
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.rx.recv().await
    }

    /// Take an already-queued event without waiting
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = ServerEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.connections.remove(&self.id);
        }
    }
}
