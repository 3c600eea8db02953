//! Core types shared across the cache layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by the cache layer.
///
/// Transport-class failures (timeout, connection lost, protocol error) are
/// translated from the backing client and logged at the call site; the
/// repository surfaces them as boolean failures or absent values rather than
/// propagating them. `Corrupted` is different: a stored blob that exists but
/// no longer parses is a data-integrity signal and always propagates.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache transport error: {0}")]
    Transport(#[from] redis::RedisError),

    #[error("cache client is closed")]
    Closed,

    #[error("corrupted {record} record for market {market}: {detail}")]
    Corrupted {
        record: &'static str,
        market: String,
        detail: String,
    },

    #[error("failed to encode value for cache: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Whether this error is a transport timeout (retry candidate).
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::Transport(e) if e.is_timeout())
    }

    /// Whether this error came from the transport (as opposed to stored data).
    pub fn is_transport(&self) -> bool {
        matches!(self, CacheError::Transport(_) | CacheError::Closed)
    }
}

/// Market identifier (e.g. "KRW-BTC") using Arc<str> for cheap cloning
///
/// Every per-market cache entry is scoped by one of these. Markets are
/// cloned into log contexts, backup payloads, and state records, so the
/// cheap-clone representation matters more than it looks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Market(std::sync::Arc<str>);

/// Rejected market identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidMarket {
    #[error("market identifier must be non-empty")]
    Empty,
}

impl Market {
    /// Create a market identifier. Empty strings are rejected; uniqueness is
    /// enforced by the hash field space, not here.
    pub fn new(s: impl AsRef<str>) -> Result<Self, InvalidMarket> {
        let s = s.as_ref();
        if s.is_empty() {
            return Err(InvalidMarket::Empty);
        }
        Ok(Market(std::sync::Arc::from(s)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Market {
    type Error = InvalidMarket;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Market::new(s)
    }
}

impl From<Market> for String {
    fn from(m: Market) -> String {
        m.0.to_string()
    }
}

impl std::str::FromStr for Market {
    type Err = InvalidMarket;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Market::new(s)
    }
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_rejects_empty() {
        assert_eq!(Market::new("").unwrap_err(), InvalidMarket::Empty);
    }

    #[test]
    fn test_market_round_trips_through_serde() {
        let market = Market::new("KRW-BTC").unwrap();
        let json = serde_json::to_string(&market).unwrap();
        assert_eq!(json, "\"KRW-BTC\"");
        let parsed: Market = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, market);
    }

    #[test]
    fn test_market_deserialization_validates() {
        let result: Result<Market, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_timeout_classification() {
        let corrupted = CacheError::Corrupted {
            record: "config",
            market: "KRW-BTC".to_string(),
            detail: "EOF while parsing an object".to_string(),
        };
        assert!(!corrupted.is_timeout());
        assert!(!corrupted.is_transport());
        assert!(CacheError::Closed.is_transport());
    }
}
