//! Network clients for the relay: HTTP directory and WebSocket transport

use async_trait::async_trait;
use cipherpost_client::{ClientConfig, ClientError, DirectoryClient, MessageTransport, Result};
use cipherpost_core::{
    AuthSession, ClientEvent, Envelope, IdentitySummary, ServerEvent, StoredEnvelope, UserId,
};
use cipherpost_crypto::keys::PublicKeyPem;
use futures::{SinkExt, Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

fn transport(err: impl std::fmt::Display) -> ClientError {
    ClientError::Transport(err.to_string())
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyBody {
    public_key: PublicKeyPem,
}

/// Map a non-success response to a client error
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Auth(message),
        StatusCode::BAD_REQUEST => ClientError::Auth(message),
        StatusCode::NOT_FOUND => ClientError::UnknownUser(message),
        _ => ClientError::Transport(message),
    })
}

/// Directory over the relay's HTTP API
#[derive(Clone)]
pub struct HttpDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl HttpDirectory {
    /// Create a client for `config.server_url`
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            base_url: config.server_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn history(&self, token: &str, partner: UserId) -> Result<Vec<StoredEnvelope>> {
        let response = self
            .http
            .get(self.url(&format!("/messages/{partner}")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectory {
    async fn register(
        &self,
        username: &str,
        password: &str,
        public_key: &PublicKeyPem,
    ) -> Result<AuthSession> {
        let response = self
            .http
            .post(self.url("/auth/register"))
            .json(&json!({ "username": username, "password": password, "publicKey": public_key }))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }

    async fn login(&self, username: &str, password: &str) -> Result<AuthSession> {
        let response = self
            .http
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }

    async fn list_identities(&self, token: &str) -> Result<Vec<IdentitySummary>> {
        let response = self
            .http
            .get(self.url("/users"))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        check(response).await?.json().await.map_err(transport)
    }

    async fn public_key(&self, token: &str, username: &str) -> Result<PublicKeyPem> {
        let response = self
            .http
            .get(self.url(&format!("/users/{username}/key")))
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport)?;
        let body: PublicKeyBody = check(response).await?.json().await.map_err(transport)?;
        Ok(body.public_key)
    }

    async fn rotate_key(&self, token: &str, public_key: &PublicKeyPem) -> Result<()> {
        let response = self
            .http
            .put(self.url("/users/me/key"))
            .bearer_auth(token)
            .json(&PublicKeyBody {
                public_key: public_key.clone(),
            })
            .send()
            .await
            .map_err(transport)?;
        check(response).await?;
        Ok(())
    }
}

/// Submits envelopes over the realtime channel and reads history over HTTP
pub struct RelayTransport {
    directory: HttpDirectory,
    realtime_url: String,
}

impl RelayTransport {
    /// Create a transport
    pub fn new(directory: HttpDirectory, realtime_url: impl Into<String>) -> Self {
        Self {
            directory,
            realtime_url: realtime_url.into(),
        }
    }
}

#[async_trait]
impl MessageTransport for RelayTransport {
    async fn submit(&self, envelope: Envelope) -> Result<()> {
        let (mut ws, _) = connect_async(self.realtime_url.as_str())
            .await
            .map_err(transport)?;
        let frame = ClientEvent::Send { envelope }.to_json()?;
        ws.send(Message::Text(frame)).await.map_err(transport)?;
        ws.close(None).await.map_err(transport)?;
        debug!("Envelope handed to relay");
        Ok(())
    }

    async fn history(&self, token: &str, partner: UserId) -> Result<Vec<StoredEnvelope>> {
        self.directory.history(token, partner).await
    }
}

/// Join the realtime channel as `user` and stream its events.
///
/// The stream ends when the connection closes.
pub async fn subscribe(
    realtime_url: &str,
    user: UserId,
) -> Result<impl Stream<Item = ServerEvent>> {
    let (ws, _) = connect_async(realtime_url).await.map_err(transport)?;
    let (mut write, read) = ws.split();

    let join = ClientEvent::Join { user_id: user }.to_json()?;
    write.send(Message::Text(join)).await.map_err(transport)?;

    Ok(read
        .take_while(|frame| futures::future::ready(frame.is_ok()))
        .filter_map(move |frame| {
            // Keep the sink alive for the lifetime of the stream
            let _ = &write;
            futures::future::ready(match frame {
                Ok(Message::Text(text)) => match ServerEvent::from_json(&text) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!(error = %e, "Skipping malformed event");
                        None
                    }
                },
                _ => None,
            })
        }))
}
