//! DCA domain records and their cache-backed store

pub mod models;
pub mod store;

pub use models::{
    BuyBlocked, BuyType, BuyingRound, ConfigValidationError, DcaConfig, DcaPhase, DcaState,
    InvalidPricePoint, PriceHistory, PricePoint,
};
pub use store::{MarketBackup, MarketStateStore, KEY_CONFIG, KEY_PRICE_HISTORY, KEY_STATE};
