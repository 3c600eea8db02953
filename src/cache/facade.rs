//! Scalar cache facade
//!
//! Generic get/set/delete/ping over scalar cache keys, used for short-lived
//! snapshots (tickers, account balances) that are independent of the
//! hash-based market state store.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::transport::CacheTransport;
use crate::types::{CacheError, Market};

/// Default TTL for cached ticker snapshots (seconds).
const TICKER_TTL_SECS: u64 = 300;
/// Default TTL for cached account snapshots (seconds).
const ACCOUNT_TTL_SECS: u64 = 60;

/// A value going into or coming out of the scalar cache.
///
/// The caller declares the wire representation up front instead of the cache
/// inspecting runtime types: structured data is stored as JSON, literals are
/// stored as-is. On read, anything that parses as JSON comes back as `Json`
/// and everything else falls back to `Text`. A read never surfaces a
/// deserialization error, since the original writer may have stored a plain
/// string.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Json(serde_json::Value),
    Text(String),
}

impl CacheValue {
    fn to_wire(&self) -> Result<String, CacheError> {
        match self {
            CacheValue::Json(value) => Ok(serde_json::to_string(value)?),
            CacheValue::Text(text) => Ok(text.clone()),
        }
    }

    fn from_wire(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => CacheValue::Json(value),
            Err(_) => CacheValue::Text(raw),
        }
    }

    /// The structured form, if this value holds one.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Json(value) => Some(value),
            CacheValue::Text(_) => None,
        }
    }
}

/// Generic scalar caching over an injected transport.
pub struct CacheFacade {
    transport: Arc<dyn CacheTransport>,
}

impl CacheFacade {
    pub fn new(transport: Arc<dyn CacheTransport>) -> Self {
        CacheFacade { transport }
    }

    /// Store a value, optionally with a TTL in seconds.
    pub async fn set(&self, key: &str, value: &CacheValue, ttl_secs: Option<u64>) -> bool {
        let wire = match value.to_wire() {
            Ok(wire) => wire,
            Err(e) => {
                error!("Cache value encoding failed - key: {}, error: {}", key, e);
                return false;
            }
        };
        match self.transport.set(key, &wire, ttl_secs).await {
            Ok(()) => true,
            // Transport already logged the failure with command context.
            Err(_) => false,
        }
    }

    /// Fetch a value; absent keys and unreachable transport both read as `None`.
    pub async fn get(&self, key: &str) -> Option<CacheValue> {
        match self.transport.get(key).await {
            Ok(Some(raw)) => Some(CacheValue::from_wire(raw)),
            Ok(None) => None,
            Err(_) => None,
        }
    }

    /// Delete a key. True when the delete command was applied, whether or
    /// not the key existed.
    pub async fn delete(&self, key: &str) -> bool {
        self.transport.delete(key).await.is_ok()
    }

    /// Liveness probe against the backing store.
    pub async fn ping(&self) -> bool {
        self.transport.ping().await.is_ok()
    }

    /// Cache a ticker snapshot under `ticker:{market}`.
    pub async fn cache_ticker(&self, market: &Market, ticker: &serde_json::Value) -> bool {
        let key = ticker_key(market);
        let stored = self
            .set(&key, &CacheValue::Json(ticker.clone()), Some(TICKER_TTL_SECS))
            .await;
        if stored {
            info!("Ticker snapshot cached - market: {}", market);
        } else {
            warn!("Ticker snapshot cache failed - market: {}", market);
        }
        stored
    }

    /// Cached ticker snapshot for a market, if present and fresh.
    pub async fn cached_ticker(&self, market: &Market) -> Option<CacheValue> {
        let value = self.get(&ticker_key(market)).await;
        match &value {
            Some(_) => debug!("Ticker cache hit - market: {}", market),
            None => debug!("Ticker cache miss - market: {}", market),
        }
        value
    }

    /// Cache an account snapshot under `account:{user_id}`.
    pub async fn cache_account(&self, user_id: &str, account: &serde_json::Value) -> bool {
        let key = account_key(user_id);
        let stored = self
            .set(&key, &CacheValue::Json(account.clone()), Some(ACCOUNT_TTL_SECS))
            .await;
        if stored {
            info!("Account snapshot cached - user: {}", user_id);
        } else {
            warn!("Account snapshot cache failed - user: {}", user_id);
        }
        stored
    }

    /// Cached account snapshot for a user, if present and fresh.
    pub async fn cached_account(&self, user_id: &str) -> Option<CacheValue> {
        self.get(&account_key(user_id)).await
    }

    /// Drop a user's cached account snapshot.
    pub async fn clear_account(&self, user_id: &str) -> bool {
        let cleared = self.delete(&account_key(user_id)).await;
        if cleared {
            info!("Account cache cleared - user: {}", user_id);
        }
        cleared
    }

    /// Whether the backing store answers a ping.
    pub async fn health_check(&self) -> bool {
        self.ping().await
    }
}

fn ticker_key(market: &Market) -> String {
    format!("ticker:{}", market)
}

fn account_key(user_id: &str) -> String {
    format!("account:{}", user_id)
}
