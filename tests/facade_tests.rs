//! Integration tests for the scalar cache facade
//!
//! The facade and the market state store are independent consumers of the
//! same transport; these tests exercise them side by side.

use std::sync::Arc;

use rust_decimal_macros::dec;
use serde_json::json;

use trading_cache::cache::{CacheFacade, CacheTransport, CacheValue, MemoryTransport};
use trading_cache::dca::{DcaConfig, MarketStateStore};
use trading_cache::types::Market;

fn market(symbol: &str) -> Market {
    Market::new(symbol).unwrap()
}

#[tokio::test]
async fn test_facade_and_store_share_one_transport() {
    let transport = Arc::new(MemoryTransport::new());
    let facade = CacheFacade::new(transport.clone());
    let store = MarketStateStore::new(transport.clone());
    let btc = market("KRW-BTC");

    assert!(store.save_config(&btc, &DcaConfig::new(dec!(100000))).await);
    assert!(facade.cache_ticker(&btc, &json!({"last": 42000})).await);

    // The scalar ticker key and the config hash live in different key
    // spaces: clearing the market leaves the ticker snapshot alone.
    assert!(store.clear_market_data(&btc).await);
    assert!(facade.cached_ticker(&btc).await.is_some());
    assert_eq!(store.get_config(&btc).await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_value_reads_absent() {
    let transport = Arc::new(MemoryTransport::new());
    let facade = CacheFacade::new(transport.clone());

    assert!(
        facade
            .set("ticker:KRW-BTC", &CacheValue::Text("stale".into()), Some(0))
            .await
    );
    assert_eq!(facade.get("ticker:KRW-BTC").await, None);
}

#[tokio::test]
async fn test_expire_applies_to_existing_key() {
    let transport = Arc::new(MemoryTransport::new());
    transport.set("account:user-1", "{}", None).await.unwrap();

    assert!(transport.expire("account:user-1", 0).await.unwrap());
    assert!(!transport.exists("account:user-1").await.unwrap());
    // Expiring an absent key reports false.
    assert!(!transport.expire("account:missing", 60).await.unwrap());
}

#[tokio::test]
async fn test_delete_is_success_even_when_absent() {
    let facade = CacheFacade::new(Arc::new(MemoryTransport::new()));
    // The delete command applied cleanly; whether the key existed is not
    // part of the facade contract.
    assert!(facade.delete("account:never-written").await);
}

#[tokio::test]
async fn test_health_check_goes_false_after_close() {
    let transport = Arc::new(MemoryTransport::new());
    let facade = CacheFacade::new(transport.clone());

    assert!(facade.health_check().await);
    transport.close().await.unwrap();
    assert!(!facade.health_check().await);

    // Reads and writes degrade to miss/failure, never a panic.
    assert_eq!(facade.get("ticker:KRW-BTC").await, None);
    assert!(!facade.set("ticker:KRW-BTC", &CacheValue::Text("x".into()), None).await);
}
