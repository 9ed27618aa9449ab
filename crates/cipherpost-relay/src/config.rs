//! Relay configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::hub::DeliveryPolicy;

/// Where the relay keeps its tables
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Lost on restart
    Memory,
    /// Sled database at the given path
    Sled {
        /// Database directory
        path: String,
    },
}

/// Server configuration for running a relay
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayServerConfig {
    /// HTTP listen address
    pub http_address: String,
    /// Realtime (WebSocket) listen address
    pub realtime_address: String,
    /// Storage backend
    pub storage: StorageBackend,
    /// HMAC secret for bearer tokens
    #[serde(skip_serializing)]
    pub token_secret: String,
    /// Token lifetime in seconds
    pub token_ttl_secs: u64,
    /// Envelope delivery policy
    pub delivery_policy: DeliveryPolicy,
    /// Per-connection outbound buffer (events)
    pub connection_buffer: usize,
    /// Maximum concurrent realtime connections
    pub max_connections: usize,
}

impl Default for RelayServerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:3000".to_string(),
            realtime_address: "0.0.0.0:3001".to_string(),
            storage: StorageBackend::Sled {
                path: "./relay-data".to_string(),
            },
            token_secret: String::new(),
            token_ttl_secs: 24 * 3600,
            delivery_policy: DeliveryPolicy::Broadcast,
            connection_buffer: 256,
            max_connections: 1000,
        }
    }
}

impl RelayServerConfig {
    /// In-memory configuration with the given secret
    pub fn in_memory(token_secret: impl Into<String>) -> Self {
        Self {
            storage: StorageBackend::Memory,
            token_secret: token_secret.into(),
            ..Default::default()
        }
    }

    /// Get token lifetime as Duration
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.token_secret.len() < 16 {
            return Err("token_secret must be at least 16 bytes".to_string());
        }
        if self.token_ttl_secs == 0 {
            return Err("token_ttl_secs must be > 0".to_string());
        }
        if self.connection_buffer == 0 {
            return Err("connection_buffer must be > 0".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }
        if let StorageBackend::Sled { path } = &self.storage {
            if path.is_empty() {
                return Err("storage path must not be empty".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_needs_secret() {
        let config = RelayServerConfig::default();
        assert!(config.validate().is_err());

        let config = RelayServerConfig {
            token_secret: "0123456789abcdef".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.delivery_policy, DeliveryPolicy::Broadcast);
    }

    #[test]
    fn test_in_memory() {
        let config = RelayServerConfig::in_memory("0123456789abcdef");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(config.validate().is_ok());
        assert_eq!(config.token_ttl(), Duration::from_secs(86400));
    }

    #[test]
    fn test_secret_not_serialized() {
        let config = RelayServerConfig::in_memory("super-secret-value");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("super-secret-value"));
    }
}
