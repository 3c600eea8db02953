//! Trading Cache
//!
//! Cache-backed persistence layer for automated DCA trading: a per-market
//! configuration and state store with backup/restore semantics, plus a
//! generic scalar cache facade, both over a pluggable key-value transport.

pub mod cache;
pub mod config;
pub mod dca;
pub mod types;

pub use cache::{CacheFacade, CacheTransport, CacheValue, MemoryTransport, RedisTransport};
pub use config::CacheConfig;
pub use dca::{DcaConfig, DcaState, MarketBackup, MarketStateStore};
pub use types::{CacheError, InvalidMarket, Market};
