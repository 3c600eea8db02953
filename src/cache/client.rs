//! Remote key-value transport over Redis
//!
//! Wraps the async connection manager with lazy initialization, per-command
//! error translation and logging, and an explicit open/closed lifecycle.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cache::transport::CacheTransport;
use crate::config::CacheConfig;
use crate::types::CacheError;

enum ClientState {
    /// Not yet connected; the manager is built on first use.
    Idle,
    Open(ConnectionManager),
    /// Explicitly closed. Operations fail with `CacheError::Closed` instead
    /// of reconnecting, so a shut-down repository cannot silently come back.
    Closed,
}

/// `CacheTransport` backed by a remote Redis-compatible store.
///
/// The connection manager multiplexes all commands over one connection and
/// reconnects on its own after drops; this wrapper only decides *whether*
/// a connection may exist (open vs closed) and translates errors.
pub struct RedisTransport {
    config: CacheConfig,
    state: Mutex<ClientState>,
}

impl RedisTransport {
    pub fn new(config: CacheConfig) -> Self {
        RedisTransport {
            config,
            state: Mutex::new(ClientState::Idle),
        }
    }

    /// Get the live connection manager, connecting on first use.
    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let mut state = self.state.lock().await;
        match &*state {
            ClientState::Open(manager) => Ok(manager.clone()),
            ClientState::Closed => Err(CacheError::Closed),
            ClientState::Idle => {
                let client = redis::Client::open(self.config.connection_url())?;
                let manager_config = ConnectionManagerConfig::new()
                    .set_connection_timeout(Duration::from_secs(self.config.connect_timeout_secs))
                    .set_response_timeout(Duration::from_secs(self.config.socket_timeout_secs));
                let manager = client
                    .get_connection_manager_with_config(manager_config)
                    .await
                    .map_err(|e| {
                        error!(
                            "Cache connection failed - {}:{}, error: {}",
                            self.config.host, self.config.port, e
                        );
                        CacheError::from(e)
                    })?;
                info!(
                    "Connected to cache at {}:{} (connection limit {})",
                    self.config.host, self.config.port, self.config.max_connections
                );
                *state = ClientState::Open(manager.clone());
                Ok(manager)
            }
        }
    }

    /// Run one command, retrying once on timeout when configured.
    async fn run<T, F, Fut>(&self, op: &str, key: &str, command: F) -> Result<T, CacheError>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let manager = self.connection().await?;
        match command(manager.clone()).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_timeout() && self.config.retry_on_timeout => {
                warn!("Cache {} timed out - key: {}, retrying once", op, key);
                command(manager).await.map_err(|e| {
                    error!("Cache {} failed after retry - key: {}, error: {}", op, key, e);
                    CacheError::from(e)
                })
            }
            Err(e) => {
                error!("Cache {} failed - key: {}, error: {}", op, key, e);
                Err(CacheError::from(e))
            }
        }
    }
}

#[async_trait]
impl CacheTransport for RedisTransport {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.run("GET", key, |mut con| async move {
            con.get::<_, Option<String>>(key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        self.run("SET", key, |mut con| async move {
            match ttl_secs {
                Some(ttl) => con.set_ex::<_, _, ()>(key, value, ttl).await,
                None => con.set::<_, _, ()>(key, value).await,
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.run("DEL", key, |mut con| async move {
            con.del::<_, i64>(key).await.map(|removed| removed > 0)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.run("EXISTS", key, |mut con| async move {
            con.exists::<_, bool>(key).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        self.run("EXPIRE", key, |mut con| async move {
            con.expire::<_, bool>(key, ttl_secs as i64).await
        })
        .await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.run("PING", "-", |mut con| async move {
            let _: String = redis::cmd("PING").query_async(&mut con).await?;
            Ok(())
        })
        .await
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.run("HGET", key, |mut con| async move {
            con.hget::<_, _, Option<String>>(key, field).await
        })
        .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.run("HSET", key, |mut con| async move {
            con.hset::<_, _, _, ()>(key, field, value).await
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, CacheError> {
        self.run("HGETALL", key, |mut con| async move {
            con.hgetall::<_, BTreeMap<String, String>>(key).await
        })
        .await
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        self.run("HDEL", key, |mut con| async move {
            con.hdel::<_, _, i64>(key, field).await.map(|removed| removed > 0)
        })
        .await
    }

    async fn close(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        match &*state {
            ClientState::Closed => {}
            _ => {
                *state = ClientState::Closed;
                info!("Cache client closed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let transport = RedisTransport::new(CacheConfig::default());
        transport.close().await.unwrap();

        let result = transport.get("ticker:KRW-BTC").await;
        assert!(matches!(result, Err(CacheError::Closed)));

        let result = transport.hash_set("dca:config", "KRW-BTC", "{}").await;
        assert!(matches!(result, Err(CacheError::Closed)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let transport = RedisTransport::new(CacheConfig::default());
        transport.close().await.unwrap();
        transport.close().await.unwrap();
    }
}
