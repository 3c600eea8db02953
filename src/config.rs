//! Cache connection configuration
//!
//! Handles transport connection settings with environment variable support,
//! mirroring the deployment convention of the trading bots this crate backs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Connection settings for the key-value transport.
///
/// Timeouts here are the only timeout layer: the repository above adds none
/// of its own, so every cache call returns or fails within these bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub use_tls: bool,
    pub max_connections: u32,
    /// Per-command response timeout in seconds
    pub socket_timeout_secs: u64,
    /// Initial connection timeout in seconds
    pub connect_timeout_secs: u64,
    /// Retry a command once when it fails with a timeout
    pub retry_on_timeout: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            use_tls: false,
            max_connections: 10,
            socket_timeout_secs: 5,
            connect_timeout_secs: 5,
            retry_on_timeout: true,
        }
    }
}

impl CacheConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads `CACHE_ADDRESS`, `CACHE_PORT`, `CACHE_PASSWORD` and
    /// `CACHE_USE_TLS`, falling back to defaults for anything unset. A
    /// `.env` file is honored when present.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = CacheConfig::default();

        if let Ok(host) = std::env::var("CACHE_ADDRESS") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("CACHE_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("Invalid CACHE_PORT value: {}", port))?;
        }
        if let Ok(password) = std::env::var("CACHE_PASSWORD") {
            if !password.is_empty() {
                config.password = Some(password);
            }
        }
        if let Ok(use_tls) = std::env::var("CACHE_USE_TLS") {
            config.use_tls = use_tls
                .parse()
                .with_context(|| format!("Invalid CACHE_USE_TLS value: {}", use_tls))?;
        }

        Ok(config)
    }

    /// Connection URL for the backing client.
    pub fn connection_url(&self) -> String {
        let scheme = if self.use_tls { "rediss" } else { "redis" };
        match &self.password {
            Some(password) => format!(
                "{}://:{}@{}:{}/{}",
                scheme, password, self.host, self.port, self.db
            ),
            None => format!("{}://{}:{}/{}", scheme, self.host, self.port, self.db),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CacheConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert!(config.retry_on_timeout);
    }

    #[test]
    fn test_connection_url_without_password() {
        let config = CacheConfig::default();
        assert_eq!(config.connection_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn test_connection_url_with_password_and_tls() {
        let config = CacheConfig {
            password: Some("hunter2".to_string()),
            use_tls: true,
            ..CacheConfig::default()
        };
        assert_eq!(config.connection_url(), "rediss://:hunter2@localhost:6379/0");
    }
}
