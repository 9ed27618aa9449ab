//! Chat session
//!
//! Orchestrates sending and receiving for one logged-in identity talking to
//! one active partner.
//!
//! Sending always fetches the partner's current public key from the
//! directory first, so a partner who rotated keys is encrypted for correctly.
//! The sender cannot unwrap a session key wrapped for the receiver, so the
//! plaintext of every sent message is kept in the local cache keyed by IV and
//! used to rebuild the sender's side of the history.
//!
//! Cryptographic failures never escape the message they affect: they are
//! rendered as a placeholder [`MessageBody`].

use std::sync::Arc;

use cipherpost_core::{
    usernames_match, AuthSession, Envelope, EnvelopeId, IdentitySummary, ServerEvent,
    StoredEnvelope, Timestamp, UserId,
};
use cipherpost_crypto::hybrid;
use cipherpost_crypto::keys::{generate_key_pair_blocking_task, PrivateKeyPem, PublicKeyPem};
use futures::{future, Stream, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::error::{ClientError, Result};
use crate::local_state::LocalState;
use crate::remote::{DirectoryClient, MessageTransport};

/// Rendered content of one message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageBody {
    /// Decrypted (or locally retained) text
    Plaintext(String),
    /// Unwrapping or decryption failed
    DecryptionFailed,
    /// No private key is stored for the local identity
    PrivateKeyUnavailable,
    /// Sent by the local identity but its plaintext was not retained
    NotRetained,
}

impl MessageBody {
    /// Text to display
    pub fn display_text(&self) -> &str {
        match self {
            Self::Plaintext(text) => text,
            Self::DecryptionFailed => "[decryption failed]",
            Self::PrivateKeyUnavailable => "[cannot decrypt: private key not available]",
            Self::NotRetained => "[sent by you: content not retained]",
        }
    }
}

/// One message as shown to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Server-assigned id; `None` for an optimistic local render
    pub id: Option<EnvelopeId>,
    /// Sender
    pub sender_id: UserId,
    /// Receiver
    pub receiver_id: UserId,
    /// Sender's clock at send time
    pub timestamp: Timestamp,
    /// Sent by the local identity
    pub outgoing: bool,
    /// Content
    pub body: MessageBody,
}

/// Client session for one identity
pub struct ChatSession<D, T> {
    directory: D,
    transport: T,
    state: Arc<dyn LocalState>,
    session: Option<AuthSession>,
    private_key: Option<PrivateKeyPem>,
    partner: Option<IdentitySummary>,
}

impl<D, T> ChatSession<D, T>
where
    D: DirectoryClient,
    T: MessageTransport,
{
    /// Create a logged-out session
    pub fn new(directory: D, transport: T, state: Arc<dyn LocalState>) -> Self {
        Self {
            directory,
            transport,
            state,
            session: None,
            private_key: None,
            partner: None,
        }
    }

    /// Current auth session
    pub fn auth(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    /// Active conversation partner
    pub fn partner(&self) -> Option<&IdentitySummary> {
        self.partner.as_ref()
    }

    /// Whether a private key was found for the local identity
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Local state backing this session
    pub fn local_state(&self) -> &Arc<dyn LocalState> {
        &self.state
    }

    fn require_auth(&self) -> Result<&AuthSession> {
        self.session.as_ref().ok_or(ClientError::NotLoggedIn)
    }

    fn adopt(&mut self, session: AuthSession) -> Result<AuthSession> {
        self.private_key = self.state.keys().get(&session.username)?;
        if self.private_key.is_none() {
            warn!(
                user_id = %session.user_id,
                "No private key stored for this identity; incoming messages cannot be decrypted"
            );
        }
        self.state.set_session(&session)?;
        self.session = Some(session.clone());
        self.partner = None;
        Ok(session)
    }

    /// Register a new identity.
    ///
    /// The key pair is generated on a blocking worker; the private key is
    /// stored locally under the username the directory returns.
    #[instrument(skip(self, password))]
    pub async fn register(&mut self, username: &str, password: &str) -> Result<AuthSession> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(ClientError::Auth(
                "username and password are required".to_string(),
            ));
        }

        let pair = generate_key_pair_blocking_task().await?;
        let public_key = pair.public_key_pem()?;
        let private_key = pair.private_key_pem()?;

        let mut session = self
            .directory
            .register(username, password, &public_key)
            .await?;
        session.public_key = Some(public_key);

        self.state.keys().put(&session.username, private_key)?;
        let session = self.adopt(session)?;

        info!(user_id = %session.user_id, "Registered");
        Ok(session)
    }

    /// Log in and restore the private key from the local key store
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<AuthSession> {
        let session = self.directory.login(username.trim(), password).await?;
        let session = self.adopt(session)?;

        info!(user_id = %session.user_id, "Logged in");
        Ok(session)
    }

    /// Resume the session cached in local state, if any
    pub fn resume(&mut self) -> Result<Option<AuthSession>> {
        match self.state.session()? {
            Some(session) => self.adopt(session).map(Some),
            None => Ok(None),
        }
    }

    /// Every other identity in the directory
    pub async fn users(&self) -> Result<Vec<IdentitySummary>> {
        let auth = self.require_auth()?;
        self.directory.list_identities(&auth.token).await
    }

    /// Select the conversation partner by username (case-insensitive)
    #[instrument(skip(self))]
    pub async fn resolve_partner(&mut self, username: &str) -> Result<IdentitySummary> {
        let wanted = username.trim();
        let partner = self
            .users()
            .await?
            .into_iter()
            .find(|identity| usernames_match(&identity.username, wanted))
            .ok_or_else(|| ClientError::UnknownUser(wanted.to_string()))?;

        debug!(partner_id = %partner.id, "Partner selected");
        self.partner = Some(partner.clone());
        Ok(partner)
    }

    /// Encrypt `text` for the active partner and submit it.
    ///
    /// Returns the optimistic local rendering. A failed key lookup aborts
    /// before any envelope is built.
    #[instrument(skip(self, text))]
    pub async fn send(&self, text: &str) -> Result<RenderedMessage> {
        if text.trim().is_empty() {
            return Err(ClientError::EmptyMessage);
        }
        let auth = self.require_auth()?;
        let partner = self.partner.as_ref().ok_or(ClientError::NoPartner)?;

        let public_key = self
            .directory
            .public_key(&auth.token, &partner.username)
            .await
            .map_err(|e| match e {
                ClientError::DirectoryLookup(_) => e,
                other => ClientError::DirectoryLookup(other.to_string()),
            })?;

        let sealed = hybrid::seal(text, public_key.as_str())?;
        let envelope = Envelope::from_sealed(auth.user_id, partner.id, sealed, Timestamp::now());

        self.state.remember_sent(&envelope.iv, text)?;
        self.transport.submit(envelope.clone()).await?;

        debug!(receiver_id = %partner.id, "Envelope submitted");
        Ok(RenderedMessage {
            id: None,
            sender_id: envelope.sender_id,
            receiver_id: envelope.receiver_id,
            timestamp: envelope.timestamp,
            outgoing: true,
            body: MessageBody::Plaintext(text.to_string()),
        })
    }

    /// Render one envelope from the local identity's point of view.
    ///
    /// Returns `None` when the envelope is not part of the conversation with
    /// the active partner.
    pub fn render(&self, stored: &StoredEnvelope) -> Option<RenderedMessage> {
        let me = self.session.as_ref()?.user_id;
        let partner = self.partner.as_ref()?.id;
        let envelope = &stored.envelope;
        if !envelope.involves(me, partner) {
            return None;
        }

        let outgoing = envelope.sender_id == me;
        let body = if outgoing {
            self.retained_body(envelope)
        } else {
            self.decrypted_body(stored)
        };

        Some(RenderedMessage {
            id: Some(stored.id),
            sender_id: envelope.sender_id,
            receiver_id: envelope.receiver_id,
            timestamp: envelope.timestamp,
            outgoing,
            body,
        })
    }

    fn retained_body(&self, envelope: &Envelope) -> MessageBody {
        match self.state.sent_plaintext(&envelope.iv) {
            Ok(Some(text)) => MessageBody::Plaintext(text),
            Ok(None) => MessageBody::NotRetained,
            Err(e) => {
                warn!(error = %e, "Sent-message cache unavailable");
                MessageBody::NotRetained
            }
        }
    }

    fn decrypted_body(&self, stored: &StoredEnvelope) -> MessageBody {
        let Some(private_key) = &self.private_key else {
            return MessageBody::PrivateKeyUnavailable;
        };
        match hybrid::open(&stored.envelope.sealed(), private_key.expose()) {
            Ok(text) => MessageBody::Plaintext(text),
            Err(e) => {
                debug!(envelope_id = %stored.id, error = %e, "Envelope could not be opened");
                MessageBody::DecryptionFailed
            }
        }
    }

    /// Conversation history with the active partner, each entry rendered
    /// independently
    #[instrument(skip(self))]
    pub async fn history(&self) -> Result<Vec<RenderedMessage>> {
        let auth = self.require_auth()?;
        let partner = self.partner.as_ref().ok_or(ClientError::NoPartner)?;

        let envelopes = self.transport.history(&auth.token, partner.id).await?;
        debug!(count = envelopes.len(), "History fetched");
        Ok(envelopes.iter().filter_map(|e| self.render(e)).collect())
    }

    /// Adapt a stream of server events into rendered messages for the active
    /// conversation. Presence changes and unrelated envelopes are skipped.
    ///
    /// The returned stream is lazy; a new one can be created from a fresh
    /// event stream at any time.
    pub fn incoming<'a, S>(&'a self, events: S) -> impl Stream<Item = RenderedMessage> + 'a
    where
        S: Stream<Item = ServerEvent> + 'a,
    {
        events.filter_map(move |event| {
            let rendered = match event {
                ServerEvent::Receive { envelope } => self.render(&envelope),
                ServerEvent::PresenceChanged { .. } => None,
            };
            future::ready(rendered)
        })
    }

    /// Generate a new key pair and register its public key, replacing the
    /// stored private key. Messages wrapped for the old key become
    /// undecryptable.
    #[instrument(skip(self))]
    pub async fn rotate_keys(&mut self) -> Result<PublicKeyPem> {
        let mut session = self.require_auth()?.clone();

        let pair = generate_key_pair_blocking_task().await?;
        let public_key = pair.public_key_pem()?;
        let private_key = pair.private_key_pem()?;

        // Save the new private key before the directory can hand out its
        // public half; put the old entry back if publishing fails
        let previous = self
            .state
            .keys()
            .entries()?
            .into_iter()
            .find(|(identity, _)| *identity == session.username)
            .map(|(_, key)| key);
        self.state.keys().put(&session.username, private_key.clone())?;

        if let Err(e) = self.directory.rotate_key(&session.token, &public_key).await {
            let restored = match previous {
                Some(old) => self.state.keys().put(&session.username, old),
                None => self.state.keys().remove(&session.username),
            };
            if let Err(restore) = restored {
                warn!(error = %restore, "Failed to restore the previous private key");
            }
            return Err(e);
        }

        session.public_key = Some(public_key.clone());
        self.state.set_session(&session)?;
        self.session = Some(session);
        self.private_key = Some(private_key);

        info!("Key pair rotated");
        Ok(public_key)
    }

    /// Forget everything stored locally and log out
    pub fn reset(&mut self) -> Result<()> {
        self.state.reset()?;
        self.session = None;
        self.private_key = None;
        self.partner = None;
        Ok(())
    }
}
