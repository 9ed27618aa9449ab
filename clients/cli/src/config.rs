//! CLI configuration

use cipherpost_client::ClientConfig;
use std::path::{Path, PathBuf};

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("cipherpost");
    path.push("config.toml");
    path
}

/// Directory of the local state database
pub fn data_dir(config: &ClientConfig) -> PathBuf {
    config.data_dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cipherpost")
    })
}

/// Load config from file or create default
pub fn load_or_default(path: &Path) -> anyhow::Result<ClientConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    } else {
        let config = ClientConfig::default();
        save(&config, path)?;
        Ok(config)
    }
}

/// Save config to file
pub fn save(config: &ClientConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = load_or_default(&path).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn test_round_trips_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = ClientConfig {
            server_url: "https://relay.example".into(),
            data_dir: Some(dir.path().join("state")),
            ..Default::default()
        };
        save(&config, &path).unwrap();

        let loaded = load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(data_dir(&loaded), dir.path().join("state"));
    }

    #[test]
    fn test_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_url = \"relay.example\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
