//! Client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the relay's HTTP API
    pub server_url: String,
    /// URL of the relay's realtime channel
    pub realtime_url: String,
    /// Directory of the local state database; platform default when unset
    pub data_dir: Option<PathBuf>,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3000".to_string(),
            realtime_url: "ws://localhost:3001".to_string(),
            data_dir: None,
            request_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err("server_url must be an http(s) URL".to_string());
        }
        if !(self.realtime_url.starts_with("ws://") || self.realtime_url.starts_with("wss://")) {
            return Err("realtime_url must be a ws(s) URL".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_urls() {
        let config = ClientConfig {
            server_url: "localhost:3000".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            realtime_url: "http://localhost:3001".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"server_url":"https://relay.example"}"#).unwrap();
        assert_eq!(config.server_url, "https://relay.example");
        assert_eq!(config.realtime_url, ClientConfig::default().realtime_url);
    }
}
