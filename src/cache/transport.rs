//! Key-value transport capability
//!
//! The repository and facade layers are written against this trait rather
//! than a concrete client, so tests run against an in-memory transport and
//! production runs against the remote store with no code change above the
//! seam.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::types::CacheError;

/// Abstract key-value store with scalar and hash-map operations.
///
/// Implementations own all connection management and timeouts. Every method
/// returns within the transport's own deadline; callers add no timeout layer
/// of their own. After `close()` has been called, every operation must fail
/// with [`CacheError::Closed`]; there is no implicit reconnect.
#[async_trait]
pub trait CacheTransport: Send + Sync {
    /// Get a scalar value, `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Set a scalar value, optionally with a time-to-live in seconds.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError>;

    /// Delete a key. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Whether a key exists.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Set a time-to-live on an existing key. Returns whether the key existed.
    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), CacheError>;

    /// Get one field of a hash key, `None` when the field does not exist.
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    /// Set one field of a hash key (created on first write, overwritten after).
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    /// All field/value pairs of a hash key, ordered by field name.
    /// An absent key reads as an empty map.
    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, CacheError>;

    /// Delete one field of a hash key. Returns whether the field existed.
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CacheError>;

    /// Release the underlying connection. Idempotent; all later operations
    /// fail with [`CacheError::Closed`].
    async fn close(&self) -> Result<(), CacheError>;
}
