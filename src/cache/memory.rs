//! In-process key-value transport
//!
//! Drop-in `CacheTransport` for tests and for running a bot without a cache
//! server. Behaves like the remote store where the repository can observe
//! it: TTL expiry, absent-vs-empty hashes, and the closed-state contract.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::cache::transport::CacheTransport;
use crate::types::CacheError;

struct ScalarEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ScalarEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
struct Store {
    scalars: HashMap<String, ScalarEntry>,
    hashes: HashMap<String, BTreeMap<String, String>>,
    closed: bool,
}

/// In-memory `CacheTransport` with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryTransport {
    store: Mutex<Store>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut Store) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        if store.closed {
            return Err(CacheError::Closed);
        }
        f(&mut store)
    }
}

#[async_trait]
impl CacheTransport for MemoryTransport {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_store(|store| {
            let now = Instant::now();
            if store.scalars.get(key).is_some_and(|e| e.is_expired(now)) {
                store.scalars.remove(key);
            }
            Ok(store.scalars.get(key).map(|e| e.value.clone()))
        })
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), CacheError> {
        self.with_store(|store| {
            let entry = ScalarEntry {
                value: value.to_string(),
                expires_at: ttl_secs.map(|ttl| Instant::now() + Duration::from_secs(ttl)),
            };
            store.scalars.insert(key.to_string(), entry);
            Ok(())
        })
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        // DEL is type-agnostic in the remote store: it removes scalar and
        // hash keys alike.
        self.with_store(|store| {
            let scalar = store.scalars.remove(key).is_some();
            let hash = store.hashes.remove(key).is_some();
            Ok(scalar || hash)
        })
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.with_store(|store| {
            let now = Instant::now();
            let scalar = store.scalars.get(key).is_some_and(|e| !e.is_expired(now));
            Ok(scalar || store.hashes.contains_key(key))
        })
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, CacheError> {
        self.with_store(|store| match store.scalars.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.with_store(|_| Ok(()))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.with_store(|store| {
            Ok(store
                .hashes
                .get(key)
                .and_then(|fields| fields.get(field))
                .cloned())
        })
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.with_store(|store| {
            store
                .hashes
                .entry(key.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
            Ok(())
        })
    }

    async fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, String>, CacheError> {
        self.with_store(|store| Ok(store.hashes.get(key).cloned().unwrap_or_default()))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, CacheError> {
        self.with_store(|store| match store.hashes.get_mut(key) {
            Some(fields) => {
                let removed = fields.remove(field).is_some();
                // The remote store drops a hash key once its last field goes.
                if fields.is_empty() {
                    store.hashes.remove(key);
                }
                Ok(removed)
            }
            None => Ok(false),
        })
    }

    async fn close(&self) -> Result<(), CacheError> {
        let mut store = self.store.lock().expect("memory store lock poisoned");
        store.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scalar_set_get_delete() {
        let transport = MemoryTransport::new();
        transport.set("ticker:KRW-BTC", "42000", None).await.unwrap();
        assert_eq!(
            transport.get("ticker:KRW-BTC").await.unwrap(),
            Some("42000".to_string())
        );
        assert!(transport.delete("ticker:KRW-BTC").await.unwrap());
        assert_eq!(transport.get("ticker:KRW-BTC").await.unwrap(), None);
        assert!(!transport.delete("ticker:KRW-BTC").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_reads_as_absent() {
        let transport = MemoryTransport::new();
        transport.set("account:123", "{}", Some(0)).await.unwrap();
        assert_eq!(transport.get("account:123").await.unwrap(), None);
        assert!(!transport.exists("account:123").await.unwrap());
    }

    #[tokio::test]
    async fn test_hash_fields_are_independent() {
        let transport = MemoryTransport::new();
        transport.hash_set("dca:config", "KRW-BTC", "a").await.unwrap();
        transport.hash_set("dca:config", "KRW-ETH", "b").await.unwrap();

        assert!(transport.hash_delete("dca:config", "KRW-BTC").await.unwrap());
        assert_eq!(
            transport.hash_get("dca:config", "KRW-ETH").await.unwrap(),
            Some("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_hash_get_all_is_ordered() {
        let transport = MemoryTransport::new();
        transport.hash_set("dca:config", "KRW-XRP", "x").await.unwrap();
        transport.hash_set("dca:config", "KRW-BTC", "b").await.unwrap();
        transport.hash_set("dca:config", "KRW-ETH", "e").await.unwrap();

        let fields: Vec<String> = transport
            .hash_get_all("dca:config")
            .await
            .unwrap()
            .into_keys()
            .collect();
        assert_eq!(fields, vec!["KRW-BTC", "KRW-ETH", "KRW-XRP"]);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_everything() {
        let transport = MemoryTransport::new();
        transport.set("k", "v", None).await.unwrap();
        transport.close().await.unwrap();

        assert!(matches!(transport.get("k").await, Err(CacheError::Closed)));
        assert!(matches!(transport.ping().await, Err(CacheError::Closed)));
        assert!(matches!(
            transport.hash_get_all("dca:config").await,
            Err(CacheError::Closed)
        ));
    }
}
