//! End-to-end messaging through an in-process relay

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cipherpost_client::prelude::*;
use cipherpost_client::MemoryLocalState;
use cipherpost_core::{AuthSession, Envelope, IdentitySummary, ServerEvent, StoredEnvelope, Timestamp, UserId};
use cipherpost_crypto::hybrid;
use cipherpost_crypto::keys::PublicKeyPem;
use cipherpost_crypto::CryptoError;
use cipherpost_relay::{DeliveryPolicy, RelayError, RelayServer, RelayServerConfig};
use futures::StreamExt;

fn to_client(err: RelayError) -> ClientError {
    match err {
        RelayError::Auth(e) => ClientError::Auth(e.to_string()),
        other => ClientError::Transport(other.to_string()),
    }
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

struct InProcessDirectory(Arc<RelayServer>);

#[async_trait]
impl DirectoryClient for InProcessDirectory {
    async fn register(
        &self,
        username: &str,
        password: &str,
        public_key: &PublicKeyPem,
    ) -> Result<AuthSession> {
        self.0
            .directory()
            .register(username, password, public_key.clone())
            .map_err(to_client)
    }

    async fn login(&self, username: &str, password: &str) -> Result<AuthSession> {
        self.0.directory().login(username, password).map_err(to_client)
    }

    async fn list_identities(&self, token: &str) -> Result<Vec<IdentitySummary>> {
        let directory = self.0.directory();
        let caller = directory.authenticate(Some(&bearer(token))).map_err(to_client)?;
        directory.list_others(caller).map_err(to_client)
    }

    async fn public_key(&self, token: &str, username: &str) -> Result<PublicKeyPem> {
        let directory = self.0.directory();
        directory.authenticate(Some(&bearer(token))).map_err(to_client)?;
        directory.public_key_for(username).map_err(to_client)
    }

    async fn rotate_key(&self, token: &str, public_key: &PublicKeyPem) -> Result<()> {
        let directory = self.0.directory();
        let caller = directory.authenticate(Some(&bearer(token))).map_err(to_client)?;
        directory.rotate_key(caller, public_key.clone()).map_err(to_client)
    }
}

struct InProcessTransport(Arc<RelayServer>);

#[async_trait]
impl MessageTransport for InProcessTransport {
    async fn submit(&self, envelope: Envelope) -> Result<()> {
        self.0.relay().submit(envelope).map(|_| ()).map_err(to_client)
    }

    async fn history(&self, token: &str, partner: UserId) -> Result<Vec<StoredEnvelope>> {
        let caller = self
            .0
            .directory()
            .authenticate(Some(&bearer(token)))
            .map_err(to_client)?;
        self.0.relay().history(caller, partner).map_err(to_client)
    }
}

type Session = ChatSession<InProcessDirectory, InProcessTransport>;

fn server(policy: DeliveryPolicy) -> Arc<RelayServer> {
    let mut config = RelayServerConfig::in_memory("e2e-test-secret-0123456789");
    config.delivery_policy = policy;
    Arc::new(RelayServer::new(config).unwrap())
}

async fn registered(server: &Arc<RelayServer>, username: &str) -> (Session, UserId) {
    let mut session = ChatSession::new(
        InProcessDirectory(server.clone()),
        InProcessTransport(server.clone()),
        Arc::new(MemoryLocalState::new()),
    );
    let auth = session.register(username, "correct horse").await.unwrap();
    (session, auth.user_id)
}

async fn next_rendered<S>(session: &Session, events: S) -> RenderedMessage
where
    S: futures::Stream<Item = ServerEvent> + Unpin,
{
    let mut incoming = Box::pin(session.incoming(events));
    tokio::time::timeout(Duration::from_secs(5), incoming.next())
        .await
        .expect("no message within timeout")
        .expect("event stream ended")
}

#[tokio::test]
async fn test_alice_sends_hello_to_bob() {
    let server = server(DeliveryPolicy::Broadcast);
    let (mut alice, alice_id) = registered(&server, "alice").await;
    let (mut bob, bob_id) = registered(&server, "bob").await;

    let mut bob_events = server.hub().connect();
    server.presence().join(bob_events.id(), bob_id);

    alice.resolve_partner("Bob").await.unwrap();
    bob.resolve_partner("alice").await.unwrap();

    let optimistic = alice.send("hello").await.unwrap();
    assert!(optimistic.outgoing);
    assert_eq!(optimistic.body, MessageBody::Plaintext("hello".into()));

    // Bob unwraps with his own key
    let received = next_rendered(&bob, &mut bob_events).await;
    assert!(!received.outgoing);
    assert_eq!(received.sender_id, alice_id);
    assert_eq!(received.body, MessageBody::Plaintext("hello".into()));

    // Alice's history comes from her plaintext cache
    let history = alice.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].outgoing);
    assert_eq!(history[0].body, MessageBody::Plaintext("hello".into()));

    // ... because her own key cannot unwrap a key wrapped for Bob
    let stored = server.relay().history(alice_id, bob_id).unwrap();
    let alice_key = alice.local_state().keys().get("alice").unwrap().unwrap();
    let err = hybrid::open(&stored[0].envelope.sealed(), alice_key.expose()).unwrap_err();
    assert!(matches!(err, CryptoError::Unwrap(_)));

    // Bob's history decrypts the same envelope
    let bob_history = bob.history().await.unwrap();
    assert_eq!(bob_history[0].body, MessageBody::Plaintext("hello".into()));
}

#[tokio::test]
async fn test_history_is_ordered_both_directions() {
    let server = server(DeliveryPolicy::Broadcast);
    let (mut alice, _) = registered(&server, "alice").await;
    let (mut bob, _) = registered(&server, "bob").await;
    alice.resolve_partner("bob").await.unwrap();
    bob.resolve_partner("alice").await.unwrap();

    alice.send("one").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    bob.send("two").await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    alice.send("three").await.unwrap();

    let texts: Vec<String> = bob
        .history()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.body.display_text().to_string())
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);
}

#[tokio::test]
async fn test_stale_key_fails_after_rotation() {
    let server = server(DeliveryPolicy::Broadcast);
    let (mut alice, alice_id) = registered(&server, "alice").await;
    let (mut bob, bob_id) = registered(&server, "bob").await;
    alice.resolve_partner("bob").await.unwrap();
    bob.resolve_partner("alice").await.unwrap();

    let stale = server.directory().public_key_for("bob").unwrap();
    let fresh = bob.rotate_keys().await.unwrap();
    assert_ne!(stale, fresh);
    assert_eq!(server.directory().public_key_for("bob").unwrap(), fresh);

    // A message wrapped under Bob's old key
    let sealed = hybrid::seal("for the old key", stale.as_str()).unwrap();
    let bob_key = bob.local_state().keys().get("bob").unwrap().unwrap();
    assert!(matches!(
        hybrid::open(&sealed, bob_key.expose()),
        Err(CryptoError::Unwrap(_))
    ));
    server
        .relay()
        .submit(Envelope::from_sealed(alice_id, bob_id, sealed, Timestamp::now()))
        .unwrap();

    // Sending through the session fetches the fresh key
    tokio::time::sleep(Duration::from_millis(5)).await;
    alice.send("after rotation").await.unwrap();

    let bodies: Vec<MessageBody> = bob
        .history()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.body)
        .collect();
    assert_eq!(
        bodies,
        vec![
            MessageBody::DecryptionFailed,
            MessageBody::Plaintext("after rotation".into()),
        ]
    );
}

#[tokio::test]
async fn test_broadcast_exposes_metadata_to_bystanders() {
    let server = server(DeliveryPolicy::Broadcast);
    let (mut alice, alice_id) = registered(&server, "alice").await;
    let (_bob, bob_id) = registered(&server, "bob").await;
    let (mut carol, carol_id) = registered(&server, "carol").await;

    let mut carol_events = server.hub().connect();
    server.presence().join(carol_events.id(), carol_id);

    alice.resolve_partner("bob").await.unwrap();
    alice.send("private").await.unwrap();

    let mut seen = None;
    while let Some(event) = carol_events.try_recv() {
        if let ServerEvent::Receive { envelope } = event {
            seen = Some(envelope);
        }
    }
    let seen = seen.expect("bystander should receive the envelope");
    assert_eq!(seen.envelope.sender_id, alice_id);
    assert_eq!(seen.envelope.receiver_id, bob_id);

    // ... but cannot read it, and her session does not render it
    carol.resolve_partner("alice").await.unwrap();
    assert!(carol.render(&seen).is_none());
    let carol_key = carol.local_state().keys().get("carol").unwrap().unwrap();
    assert!(hybrid::open(&seen.envelope.sealed(), carol_key.expose()).is_err());
}

#[tokio::test]
async fn test_participants_policy_hides_envelopes_from_bystanders() {
    let server = server(DeliveryPolicy::Participants);
    let (mut alice, _) = registered(&server, "alice").await;
    let (mut bob, bob_id) = registered(&server, "bob").await;
    let (_carol, carol_id) = registered(&server, "carol").await;

    let mut bob_events = server.hub().connect();
    server.presence().join(bob_events.id(), bob_id);
    let mut carol_events = server.hub().connect();
    server.presence().join(carol_events.id(), carol_id);

    alice.resolve_partner("bob").await.unwrap();
    bob.resolve_partner("alice").await.unwrap();
    alice.send("just us").await.unwrap();

    let received = next_rendered(&bob, &mut bob_events).await;
    assert_eq!(received.body, MessageBody::Plaintext("just us".into()));

    while let Some(event) = carol_events.try_recv() {
        assert!(matches!(event, ServerEvent::PresenceChanged { .. }));
    }
}

#[tokio::test]
async fn test_relogin_on_fresh_device_cannot_decrypt() {
    let server = server(DeliveryPolicy::Broadcast);
    let (mut alice, _) = registered(&server, "alice").await;
    registered(&server, "bob").await;
    alice.resolve_partner("bob").await.unwrap();
    alice.send("sent from the first device").await.unwrap();

    let mut elsewhere = ChatSession::new(
        InProcessDirectory(server.clone()),
        InProcessTransport(server.clone()),
        Arc::new(MemoryLocalState::new()),
    );
    elsewhere.login("alice", "correct horse").await.unwrap();
    assert!(!elsewhere.has_private_key());

    elsewhere.resolve_partner("bob").await.unwrap();
    let history = elsewhere.history().await.unwrap();
    assert_eq!(history[0].body, MessageBody::NotRetained);
}
