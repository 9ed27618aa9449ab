//! Realtime WebSocket channel
//!
//! Each connection runs one loop multiplexing inbound JSON frames and its hub
//! subscription. Closing the socket (cleanly or not) disconnects presence.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cipherpost_core::ClientEvent;
use cipherpost_relay::{ConnectionId, RelayServer};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Retry `accept` until it yields a connection
async fn accept_with_retry<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept realtime connection");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Accept realtime connections; per-connection accept errors are retried
pub async fn serve(listener: TcpListener, server: Arc<RelayServer>) -> anyhow::Result<()> {
    info!(address = %listener.local_addr()?, "Realtime channel listening");

    loop {
        let (stream, peer) = accept_with_retry(|| listener.accept()).await;

        if server.hub().connection_count() >= server.config().max_connections {
            warn!(%peer, "Connection limit reached, rejecting");
            continue;
        }

        let server = server.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, server).await {
                debug!(%peer, error = %e, "Realtime connection failed");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    server: Arc<RelayServer>,
) -> anyhow::Result<()> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut write, mut read) = ws.split();

    let mut subscription = server.hub().connect();
    let id = subscription.id();
    debug!(%peer, connection = %id, "Realtime connection opened");

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => handle_frame(&server, id, &text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection = %id, error = %e, "Realtime connection error");
                        break;
                    }
                }
            }
            event = subscription.recv() => {
                let Some(event) = event else { break };
                match event.to_json() {
                    Ok(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(connection = %id, error = %e, "Failed to encode event"),
                }
            }
        }
    }

    server.presence().disconnect(id);
    debug!(connection = %id, "Realtime connection closed");
    Ok(())
}

fn handle_frame(server: &RelayServer, id: ConnectionId, text: &str) {
    match ClientEvent::from_json(text) {
        Ok(ClientEvent::Join { user_id }) => server.presence().join(id, user_id),
        Ok(ClientEvent::Send { envelope }) => {
            if let Err(e) = server.relay().submit(envelope) {
                warn!(connection = %id, error = %e, "Envelope rejected");
            }
        }
        Err(e) => warn!(connection = %id, error = %e, "Skipping malformed frame"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherpost_core::{Envelope, PresenceStatus, ServerEvent, Timestamp, UserId};
    use cipherpost_crypto::hybrid;
    use cipherpost_crypto::keys::KeyPair;
    use cipherpost_relay::RelayServerConfig;
    use std::time::Duration;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start() -> (Arc<RelayServer>, String) {
        let config = RelayServerConfig::in_memory("realtime-test-secret-0123");
        let server = Arc::new(RelayServer::new(config).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(serve(listener, server.clone()));
        (server, url)
    }

    async fn send(client: &mut Client, event: &ClientEvent) {
        client
            .send(Message::Text(event.to_json().unwrap()))
            .await
            .unwrap();
    }

    async fn next_event(client: &mut Client) -> ServerEvent {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("connection closed")
                .unwrap();
            if let Message::Text(text) = frame {
                return ServerEvent::from_json(&text).unwrap();
            }
        }
    }

    fn status_of(server: &RelayServer, user: UserId) -> PresenceStatus {
        server
            .directory()
            .list_others(UserId::new(0))
            .unwrap()
            .into_iter()
            .find(|i| i.id == user)
            .map(|i| i.status)
            .unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn test_accept_errors_are_retried() {
        let mut attempts = 0;
        let accepted = accept_with_retry(|| {
            attempts += 1;
            let result = match attempts {
                1 => Err(io::Error::from_raw_os_error(24)),
                2 => Err(io::Error::from(io::ErrorKind::ConnectionAborted)),
                n => Ok(n),
            };
            futures::future::ready(result)
        })
        .await;
        assert_eq!(accepted, 3);
    }

    #[tokio::test]
    async fn test_join_send_and_disconnect() {
        let (server, url) = start().await;
        let bob_key = KeyPair::generate().unwrap();
        let alice = server
            .directory()
            .register("alice", "pw", KeyPair::generate().unwrap().public_key_pem().unwrap())
            .unwrap();
        let bob = server
            .directory()
            .register("bob", "pw", bob_key.public_key_pem().unwrap())
            .unwrap();

        let (mut alice_ws, _) = connect_async(url.as_str()).await.unwrap();
        let (mut bob_ws, _) = connect_async(url.as_str()).await.unwrap();

        send(&mut bob_ws, &ClientEvent::Join { user_id: bob.user_id }).await;
        assert_eq!(
            next_event(&mut bob_ws).await,
            ServerEvent::PresenceChanged {
                id: bob.user_id,
                status: PresenceStatus::Online
            }
        );

        // Malformed frames are skipped without closing the connection
        alice_ws
            .send(Message::Text("{not json".to_string()))
            .await
            .unwrap();

        let bob_public = bob_key.public_key_pem().unwrap();
        let sealed = hybrid::seal("over the wire", bob_public.as_str()).unwrap();
        let envelope = Envelope::from_sealed(alice.user_id, bob.user_id, sealed, Timestamp::now());
        send(&mut alice_ws, &ClientEvent::Send { envelope: envelope.clone() }).await;

        let stored = loop {
            if let ServerEvent::Receive { envelope } = next_event(&mut bob_ws).await {
                break envelope;
            }
        };
        assert_eq!(stored.envelope, envelope);
        let private = bob_key.private_key_pem().unwrap();
        assert_eq!(
            hybrid::open(&stored.envelope.sealed(), private.expose()).unwrap(),
            "over the wire"
        );

        // Closing the socket marks Bob offline
        bob_ws.close(None).await.unwrap();
        let mut status = status_of(&server, bob.user_id);
        for _ in 0..100 {
            if status == PresenceStatus::Offline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = status_of(&server, bob.user_id);
        }
        assert_eq!(status, PresenceStatus::Offline);
    }
}
