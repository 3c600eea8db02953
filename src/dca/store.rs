//! Per-market DCA state persistence
//!
//! All markets' records live as fields of two well-known hash keys (one for
//! config, one for state), plus one price-history hash per market. Writes
//! overwrite the whole serialized blob for a market; the backing store's
//! last-write-wins is the only concurrency guarantee. Multi-key operations
//! (clear, restore) are best-effort sequential: each sub-operation is
//! evaluated on its own and nothing is rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::transport::CacheTransport;
use crate::dca::models::{DcaConfig, DcaState, PriceHistory, PricePoint};
use crate::types::{CacheError, Market};

/// Hash key holding every market's serialized config, field = market.
pub const KEY_CONFIG: &str = "dca:config";
/// Hash key holding every market's serialized state, field = market.
pub const KEY_STATE: &str = "dca:state";
/// Prefix of the per-market price-history hash, field = RFC 3339 timestamp.
pub const KEY_PRICE_HISTORY: &str = "dca:price_history";

fn price_history_key(market: &Market) -> String {
    format!("{}:{}", KEY_PRICE_HISTORY, market)
}

/// Point-in-time snapshot of one market's cache records.
///
/// Only fields that held data at backup time are populated; empty fields are
/// omitted from the serialized payload entirely. Unknown fields in a payload
/// written by a newer version are ignored on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketBackup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_history: Option<BTreeMap<String, String>>,
}

impl MarketBackup {
    pub fn is_empty(&self) -> bool {
        self.config.is_none() && self.state.is_none() && self.price_history.is_none()
    }
}

/// Durable per-market store for DCA configuration and cycle state.
///
/// Write operations report success as a boolean and never propagate
/// transport failures; read operations report transport failures as absent
/// (the transport logs them) and only propagate
/// [`CacheError::Corrupted`]: a blob that exists but does not parse is a
/// data-integrity problem, not a cache miss, and must not masquerade as a
/// fresh empty record.
pub struct MarketStateStore {
    transport: Arc<dyn CacheTransport>,
}

impl MarketStateStore {
    pub fn new(transport: Arc<dyn CacheTransport>) -> Self {
        MarketStateStore { transport }
    }

    /// Persist a market's configuration.
    pub async fn save_config(&self, market: &Market, config: &DcaConfig) -> bool {
        let blob = match config.to_cache_json() {
            Ok(blob) => blob,
            Err(e) => {
                error!("DCA config encoding failed - market: {}, error: {}", market, e);
                return false;
            }
        };
        match self.transport.hash_set(KEY_CONFIG, market.as_str(), &blob).await {
            Ok(()) => {
                debug!("DCA config saved - market: {}", market);
                true
            }
            Err(_) => false,
        }
    }

    /// Fetch a market's configuration, `None` when never saved.
    pub async fn get_config(&self, market: &Market) -> Result<Option<DcaConfig>, CacheError> {
        let Some(blob) = self.read_field(KEY_CONFIG, market).await else {
            return Ok(None);
        };
        DcaConfig::from_cache_json(&blob)
            .map(Some)
            .map_err(|e| CacheError::Corrupted {
                record: "config",
                market: market.to_string(),
                detail: e.to_string(),
            })
    }

    /// Persist a market's cycle state, overwriting the whole blob.
    pub async fn save_state(&self, market: &Market, state: &DcaState) -> bool {
        let blob = match state.to_cache_json() {
            Ok(blob) => blob,
            Err(e) => {
                error!("DCA state encoding failed - market: {}, error: {}", market, e);
                return false;
            }
        };
        match self.transport.hash_set(KEY_STATE, market.as_str(), &blob).await {
            Ok(()) => {
                debug!("DCA state saved - market: {}", market);
                true
            }
            Err(_) => false,
        }
    }

    /// Fetch a market's cycle state, `None` when never saved.
    pub async fn get_state(&self, market: &Market) -> Result<Option<DcaState>, CacheError> {
        let Some(blob) = self.read_field(KEY_STATE, market).await else {
            return Ok(None);
        };
        DcaState::from_cache_json(&blob)
            .map(Some)
            .map_err(|e| CacheError::Corrupted {
                record: "state",
                market: market.to_string(),
                detail: e.to_string(),
            })
    }

    /// Record one price sample under its timestamp.
    pub async fn save_price_point(&self, market: &Market, point: &PricePoint) -> bool {
        let key = price_history_key(market);
        let field = point.timestamp.to_rfc3339();
        self.transport
            .hash_set(&key, &field, &point.to_cache_string())
            .await
            .is_ok()
    }

    /// The newest `max_periods` price samples in chronological order,
    /// `None` when no samples exist.
    pub async fn price_history(
        &self,
        market: &Market,
        max_periods: usize,
    ) -> Result<Option<PriceHistory>, CacheError> {
        let key = price_history_key(market);
        let fields = match self.transport.hash_get_all(&key).await {
            Ok(fields) => fields,
            Err(e) => {
                error!("Price history read failed - market: {}, error: {}", market, e);
                return Ok(None);
            }
        };
        if fields.is_empty() {
            return Ok(None);
        }

        let mut points = Vec::with_capacity(fields.len());
        for (timestamp, raw) in &fields {
            let timestamp = DateTime::parse_from_rfc3339(timestamp)
                .map_err(|e| CacheError::Corrupted {
                    record: "price_history",
                    market: market.to_string(),
                    detail: format!("bad timestamp field {:?}: {}", timestamp, e),
                })?
                .with_timezone(&Utc);
            let point = PricePoint::from_cache_string(timestamp, raw).map_err(|e| {
                CacheError::Corrupted {
                    record: "price_history",
                    market: market.to_string(),
                    detail: e.to_string(),
                }
            })?;
            points.push(point);
        }

        points.sort_by_key(|point| point.timestamp);
        if points.len() > max_periods {
            let excess = points.len() - max_periods;
            points.drain(..excess);
        }
        Ok(Some(PriceHistory::from_points(market.clone(), points)))
    }

    /// Drop the oldest samples beyond `max_periods`. True when nothing had
    /// to be dropped or every drop succeeded.
    pub async fn cleanup_price_history(&self, market: &Market, max_periods: usize) -> bool {
        let key = price_history_key(market);
        let fields = match self.transport.hash_get_all(&key).await {
            Ok(fields) => fields,
            Err(_) => return false,
        };
        if fields.len() <= max_periods {
            return true;
        }

        // RFC 3339 UTC timestamps sort chronologically as strings, so the
        // map's first fields are the oldest samples.
        let excess = fields.len() - max_periods;
        let mut success = true;
        for field in fields.keys().take(excess) {
            if self.transport.hash_delete(&key, field).await.is_err() {
                success = false;
            }
        }
        if success {
            debug!(
                "Price history trimmed - market: {}, dropped: {}",
                market, excess
            );
        }
        success
    }

    /// Remove every record for a market: its config and state fields, then
    /// its price-history key. Each delete is attempted regardless of the
    /// others' outcome; true only when all of them succeeded. Already
    /// applied deletes are not rolled back on a later failure.
    pub async fn clear_market_data(&self, market: &Market) -> bool {
        let mut success = true;

        for key in [KEY_CONFIG, KEY_STATE] {
            if let Err(e) = self.transport.hash_delete(key, market.as_str()).await {
                error!(
                    "Market data delete failed - key: {}, market: {}, error: {}",
                    key, market, e
                );
                success = false;
            }
        }

        if let Err(e) = self.transport.delete(&price_history_key(market)).await {
            error!(
                "Price history delete failed - market: {}, error: {}",
                market, e
            );
            success = false;
        }

        if success {
            info!("Market data cleared - market: {}", market);
        }
        success
    }

    /// Snapshot a market's records. Fields holding no data are omitted;
    /// unreadable fields are logged and omitted as well, so a backup taken
    /// against a flaky transport is partial rather than failed.
    pub async fn backup_state(&self, market: &Market) -> MarketBackup {
        let config = self.read_field(KEY_CONFIG, market).await;
        let state = self.read_field(KEY_STATE, market).await;
        let price_history = match self.transport.hash_get_all(&price_history_key(market)).await {
            Ok(fields) if !fields.is_empty() => Some(fields),
            Ok(_) => None,
            Err(e) => {
                error!(
                    "Backup read failed - record: price_history, market: {}, error: {}",
                    market, e
                );
                None
            }
        };
        let backup = MarketBackup {
            config,
            state,
            price_history,
        };

        info!(
            "Market backup taken - market: {}, config: {}, state: {}, price points: {}",
            market,
            backup.config.is_some(),
            backup.state.is_some(),
            backup.price_history.as_ref().map_or(0, BTreeMap::len)
        );
        backup
    }

    /// Write back a snapshot. Only fields present in the payload are
    /// written; existing records for absent fields stay untouched. True only
    /// when every attempted write succeeded.
    pub async fn restore_state(&self, market: &Market, backup: &MarketBackup) -> bool {
        let mut success = true;

        if let Some(blob) = &backup.config {
            if self
                .transport
                .hash_set(KEY_CONFIG, market.as_str(), blob)
                .await
                .is_err()
            {
                success = false;
            }
        }

        if let Some(blob) = &backup.state {
            if self
                .transport
                .hash_set(KEY_STATE, market.as_str(), blob)
                .await
                .is_err()
            {
                success = false;
            }
        }

        if let Some(fields) = &backup.price_history {
            let key = price_history_key(market);
            for (timestamp, value) in fields {
                if self.transport.hash_set(&key, timestamp, value).await.is_err() {
                    success = false;
                }
            }
        }

        if success {
            info!("Market backup restored - market: {}", market);
        } else {
            warn!("Market backup restore incomplete - market: {}", market);
        }
        success
    }

    /// Every market with a stored configuration, sorted. State-only markets
    /// do not count as active.
    pub async fn get_active_markets(&self) -> Vec<Market> {
        let fields = match self.transport.hash_get_all(KEY_CONFIG).await {
            Ok(fields) => fields,
            Err(e) => {
                error!("Active market listing failed - error: {}", e);
                return Vec::new();
            }
        };
        fields
            .into_keys()
            .filter_map(|field| match Market::new(&field) {
                Ok(market) => Some(market),
                Err(e) => {
                    warn!("Skipping invalid market field {:?}: {}", field, e);
                    None
                }
            })
            .collect()
    }

    /// Release the transport. Later calls on this store fail clearly
    /// (writes report false, reads report absent) instead of reconnecting.
    pub async fn close(&self) {
        if let Err(e) = self.transport.close().await {
            error!("Cache client close failed - error: {}", e);
        }
    }

    /// One hash field, with transport failures logged and reported as
    /// absent. Empty blobs read as absent too.
    async fn read_field(&self, key: &'static str, market: &Market) -> Option<String> {
        match self.transport.hash_get(key, market.as_str()).await {
            Ok(value) => value.filter(|blob| !blob.is_empty()),
            Err(e) => {
                error!(
                    "Cache read failed - key: {}, market: {}, error: {}",
                    key, market, e
                );
                None
            }
        }
    }
}
