//! Configuration management

use crate::hub::SendPolicy;
use crate::protocol::DEFAULT_MAX_MESSAGE_SIZE;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the store endpoint
pub const STORE_URL_ENV: &str = "SUPABASE_URL";

/// Environment variable holding the store credential
pub const STORE_KEY_ENV: &str = "SUPABASE_KEY";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub hub: HubConfig,
    pub store: StoreConfig,
}

/// Listening socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Relay behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Frames buffered per connection
    pub send_buffer: usize,

    /// How long a send may wait for buffer space; 0 fails immediately
    pub send_timeout_ms: u64,

    /// Largest inbound frame accepted
    pub max_message_bytes: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_buffer: 64,
            send_timeout_ms: 1000,
            max_message_bytes: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl HubConfig {
    pub fn send_policy(&self) -> SendPolicy {
        SendPolicy {
            queue_capacity: self.send_buffer.max(1),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
        }
    }
}

/// Which persistence backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Remote REST table API
    #[default]
    Rest,
    /// Process-local tables, lost on exit
    Memory,
}

/// Persistence store settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub url: Option<String>,

    /// Never logged; `Debug` prints it redacted
    pub key: Option<SecretString>,

    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Rest,
            url: None,
            key: None,
            request_timeout_secs: 10,
        }
    }
}

impl StoreConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fill `url`/`key` from the environment where set
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(STORE_URL_ENV).ok(),
            std::env::var(STORE_KEY_ENV).ok(),
        );
    }

    pub fn apply_overrides(&mut self, url: Option<String>, key: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.url = Some(url);
        }
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.key = Some(SecretString::from(key));
        }
    }

    /// Names of required settings that are unset, empty when usable
    pub fn missing(&self) -> Vec<&'static str> {
        if self.backend == StoreBackend::Memory {
            return Vec::new();
        }
        let mut missing = Vec::new();
        if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
            missing.push(STORE_URL_ENV);
        }
        if self.key.is_none() {
            missing.push(STORE_KEY_ENV);
        }
        missing
    }
}

impl Config {
    /// Load config from the default path, or return defaults if not found
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load config from `path`, or return defaults if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("switchboard")
            .join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr().to_string(), "127.0.0.1:8000");
        assert_eq!(config.hub.send_policy().queue_capacity, 64);
        assert_eq!(config.store.backend, StoreBackend::Rest);
        assert_eq!(config.store.missing(), vec![STORE_URL_ENV, STORE_KEY_ENV]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [hub]
            send_timeout_ms = 0

            [store]
            url = "https://db.example.com"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.hub.send_buffer, 64);
        assert!(config.hub.send_policy().send_timeout.is_zero());
        assert_eq!(config.store.missing(), vec![STORE_KEY_ENV]);
    }

    #[test]
    fn test_overrides_fill_store_settings() {
        let mut store = StoreConfig::default();
        store.apply_overrides(Some("https://db.example.com".into()), Some("secret".into()));
        assert!(store.missing().is_empty());

        let mut store = StoreConfig::default();
        store.apply_overrides(Some("  ".into()), None);
        assert!(store.url.is_none());
    }

    #[test]
    fn test_memory_backend_needs_nothing() {
        let config = Config::parse("[store]\nbackend = \"memory\"\n").unwrap();
        assert!(config.store.missing().is_empty());
    }

    #[test]
    fn test_key_is_redacted_in_debug() {
        let mut store = StoreConfig::default();
        store.apply_overrides(None, Some("hunter2".into()));
        assert!(!format!("{:?}", store).contains("hunter2"));
    }
}
