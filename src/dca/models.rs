//! DCA domain records
//!
//! Per-market configuration and cycle state for the dollar-cost-averaging
//! strategy: buy in fixed steps while the price falls, sell the whole
//! position once the average entry price clears the target profit rate.
//!
//! Every record serializes to a single JSON blob for cache storage; the
//! round trip through `to_cache_json`/`from_cache_json` is the persistence
//! contract the store relies on.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Market;

/// Phase of a DCA cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DcaPhase {
    /// No cycle running
    #[default]
    Inactive,
    /// First buy of a fresh cycle
    InitialBuy,
    /// Averaging down on price drops
    Accumulating,
    /// Waiting for the target sell price
    ProfitTaking,
    /// Stop-loss triggered, unwinding
    ForceSelling,
}

/// What triggered a buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyType {
    Initial,
    #[default]
    PriceDrop,
    TimeBased,
}

/// Validation errors for DCA configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("target_profit_rate ({0}) must be positive")]
    NonPositiveProfitRate(Decimal),

    #[error("price_drop_threshold ({0}) must be negative")]
    NonNegativeDropThreshold(Decimal),

    #[error("force_stop_loss_rate ({0}) must be negative")]
    NonNegativeStopLoss(Decimal),

    #[error("max_investment_ratio ({0}) must be in (0, 1]")]
    InvestmentRatioOutOfRange(Decimal),
}

fn default_add_buy_multiplier() -> Decimal {
    dec!(1.5)
}
fn default_target_profit_rate() -> Decimal {
    dec!(0.10)
}
fn default_price_drop_threshold() -> Decimal {
    dec!(-0.025)
}
fn default_force_stop_loss_rate() -> Decimal {
    dec!(-0.25)
}
fn default_max_buy_rounds() -> u32 {
    8
}
fn default_max_investment_ratio() -> Decimal {
    dec!(0.30)
}
fn default_min_buy_interval_minutes() -> u32 {
    30
}
fn default_max_cycle_days() -> u32 {
    45
}
fn default_time_based_buy_interval_days() -> u32 {
    3
}
fn default_enable_time_based_buying() -> bool {
    true
}

/// Per-market DCA trading configuration.
///
/// Only `initial_buy_amount` is mandatory in the cache blob; every other
/// field falls back to its default on deserialization, so configs written
/// by older bot versions keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaConfig {
    /// First-buy size in quote currency (e.g. KRW)
    pub initial_buy_amount: Decimal,
    /// Growth factor applied to each subsequent buy
    #[serde(default = "default_add_buy_multiplier")]
    pub add_buy_multiplier: Decimal,
    /// Cycle completes when profit reaches this rate
    #[serde(default = "default_target_profit_rate")]
    pub target_profit_rate: Decimal,
    /// Additional buy triggers below this drop rate (negative)
    #[serde(default = "default_price_drop_threshold")]
    pub price_drop_threshold: Decimal,
    /// Cycle force-sells below this loss rate (negative)
    #[serde(default = "default_force_stop_loss_rate")]
    pub force_stop_loss_rate: Decimal,
    #[serde(default = "default_max_buy_rounds")]
    pub max_buy_rounds: u32,
    /// Cap on invested quote currency relative to total assets
    #[serde(default = "default_max_investment_ratio")]
    pub max_investment_ratio: Decimal,
    #[serde(default = "default_min_buy_interval_minutes")]
    pub min_buy_interval_minutes: u32,
    #[serde(default = "default_max_cycle_days")]
    pub max_cycle_days: u32,
    #[serde(default = "default_time_based_buy_interval_days")]
    pub time_based_buy_interval_days: u32,
    #[serde(default = "default_enable_time_based_buying")]
    pub enable_time_based_buying: bool,
}

impl DcaConfig {
    /// Config with the given initial buy amount and stock defaults elsewhere.
    pub fn new(initial_buy_amount: Decimal) -> Self {
        DcaConfig {
            initial_buy_amount,
            add_buy_multiplier: default_add_buy_multiplier(),
            target_profit_rate: default_target_profit_rate(),
            price_drop_threshold: default_price_drop_threshold(),
            force_stop_loss_rate: default_force_stop_loss_rate(),
            max_buy_rounds: default_max_buy_rounds(),
            max_investment_ratio: default_max_investment_ratio(),
            min_buy_interval_minutes: default_min_buy_interval_minutes(),
            max_cycle_days: default_max_cycle_days(),
            time_based_buy_interval_days: default_time_based_buy_interval_days(),
            enable_time_based_buying: default_enable_time_based_buying(),
        }
    }

    /// Validate sign and range constraints.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.target_profit_rate <= Decimal::ZERO {
            return Err(ConfigValidationError::NonPositiveProfitRate(
                self.target_profit_rate,
            ));
        }
        if self.price_drop_threshold >= Decimal::ZERO {
            return Err(ConfigValidationError::NonNegativeDropThreshold(
                self.price_drop_threshold,
            ));
        }
        if self.force_stop_loss_rate >= Decimal::ZERO {
            return Err(ConfigValidationError::NonNegativeStopLoss(
                self.force_stop_loss_rate,
            ));
        }
        if self.max_investment_ratio <= Decimal::ZERO || self.max_investment_ratio > Decimal::ONE {
            return Err(ConfigValidationError::InvestmentRatioOutOfRange(
                self.max_investment_ratio,
            ));
        }
        Ok(())
    }

    /// Buy amount for the round after `completed_rounds` executed buys:
    /// `initial * multiplier^completed_rounds`.
    pub fn next_buy_amount(&self, completed_rounds: u32) -> Decimal {
        let mut amount = self.initial_buy_amount;
        for _ in 0..completed_rounds {
            amount *= self.add_buy_multiplier;
        }
        amount
    }

    pub fn from_cache_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_cache_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// One executed buy within a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyingRound {
    /// 1-based round number
    pub round_number: u32,
    pub buy_price: Decimal,
    /// Spent quote currency
    pub buy_amount: Decimal,
    /// Acquired base currency
    pub buy_volume: Decimal,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub buy_type: BuyType,
}

impl BuyingRound {
    /// Quote currency paid per unit acquired.
    pub fn unit_cost(&self) -> Decimal {
        if self.buy_volume.is_zero() {
            return Decimal::ZERO;
        }
        self.buy_amount / self.buy_volume
    }
}

/// Why another buy is currently not allowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuyBlocked {
    #[error("maximum buy rounds ({0}) reached")]
    MaxRoundsReached(u32),

    #[error("minimum buy interval not elapsed, {remaining_minutes} minutes remaining")]
    IntervalNotElapsed { remaining_minutes: i64 },
}

/// Mutable per-market cycle state.
///
/// Mutations happen in memory; nothing is persisted until the caller hands
/// the state to the store, which overwrites the whole blob (no
/// partial-field updates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DcaState {
    pub market: Market,
    #[serde(default)]
    pub phase: DcaPhase,
    #[serde(default = "default_cycle_id")]
    pub cycle_id: String,
    #[serde(default)]
    pub current_round: u32,
    #[serde(default)]
    pub total_investment: Decimal,
    #[serde(default)]
    pub total_volume: Decimal,
    #[serde(default)]
    pub average_price: Decimal,
    #[serde(default)]
    pub last_buy_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_buy_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_time_based_buy_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cycle_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub target_sell_price: Decimal,
    #[serde(default)]
    pub buying_rounds: Vec<BuyingRound>,
}

fn new_cycle_id(now: DateTime<Utc>) -> String {
    format!("{:x}", now.timestamp_millis())
}

fn default_cycle_id() -> String {
    new_cycle_id(Utc::now())
}

impl DcaState {
    /// Fresh inactive state for a market.
    pub fn new(market: Market) -> Self {
        DcaState {
            market,
            phase: DcaPhase::Inactive,
            cycle_id: new_cycle_id(Utc::now()),
            current_round: 0,
            total_investment: Decimal::ZERO,
            total_volume: Decimal::ZERO,
            average_price: Decimal::ZERO,
            last_buy_price: Decimal::ZERO,
            last_buy_time: None,
            last_time_based_buy_time: None,
            cycle_start_time: None,
            target_sell_price: Decimal::ZERO,
            buying_rounds: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.phase != DcaPhase::Inactive
    }

    /// Profit rate of the position at `current_price`, 0 with no position.
    pub fn profit_rate(&self, current_price: Decimal) -> Decimal {
        if self.average_price.is_zero() {
            return Decimal::ZERO;
        }
        (current_price - self.average_price) / self.average_price
    }

    /// Worst drawdown among executed buys relative to the first entry.
    pub fn max_loss_rate(&self) -> Decimal {
        let Some(first) = self.buying_rounds.first() else {
            return Decimal::ZERO;
        };
        let lowest = self
            .buying_rounds
            .iter()
            .map(|round| round.buy_price)
            .min()
            .unwrap_or(first.buy_price);
        (lowest - first.buy_price) / first.buy_price
    }

    /// Begin a new cycle at `now`: fresh cycle id, initial-buy phase.
    pub fn start_cycle(&mut self, now: DateTime<Utc>) {
        self.reset_cycle();
        self.cycle_id = new_cycle_id(now);
        self.phase = DcaPhase::InitialBuy;
        self.cycle_start_time = Some(now);
    }

    /// Fold an executed buy into the position.
    ///
    /// Recomputes the round counter, invested totals, average entry price
    /// and the target sell price derived from `config.target_profit_rate`.
    pub fn record_buy(&mut self, round: BuyingRound, config: &DcaConfig) {
        self.last_buy_price = round.buy_price;
        self.last_buy_time = Some(round.timestamp);
        if round.buy_type == BuyType::TimeBased {
            self.last_time_based_buy_time = Some(round.timestamp);
        }

        self.total_investment += round.buy_amount;
        self.total_volume += round.buy_volume;
        self.buying_rounds.push(round);
        self.current_round = self.buying_rounds.len() as u32;

        if self.total_volume > Decimal::ZERO {
            self.average_price = self.total_investment / self.total_volume;
        }
        self.target_sell_price = self.average_price * (Decimal::ONE + config.target_profit_rate);
    }

    /// Whether another buy is allowed at `now`.
    pub fn can_buy_more(&self, config: &DcaConfig, now: DateTime<Utc>) -> Result<(), BuyBlocked> {
        if self.current_round >= config.max_buy_rounds {
            return Err(BuyBlocked::MaxRoundsReached(config.max_buy_rounds));
        }
        if let Some(last_buy) = self.last_buy_time {
            let elapsed_minutes = (now - last_buy).num_minutes();
            let min_interval = i64::from(config.min_buy_interval_minutes);
            if elapsed_minutes < min_interval {
                return Err(BuyBlocked::IntervalNotElapsed {
                    remaining_minutes: min_interval - elapsed_minutes,
                });
            }
        }
        Ok(())
    }

    /// Whether the stop-loss threshold is breached at `current_price`.
    pub fn should_force_sell(&self, current_price: Decimal, config: &DcaConfig) -> bool {
        if self.average_price.is_zero() {
            return false;
        }
        self.profit_rate(current_price) <= config.force_stop_loss_rate
    }

    /// Whether the target sell price is reached at `current_price`.
    pub fn should_take_profit(&self, current_price: Decimal) -> bool {
        if self.target_sell_price.is_zero() {
            return false;
        }
        current_price >= self.target_sell_price
    }

    /// Wipe the cycle back to inactive, keeping the market.
    pub fn reset_cycle(&mut self) {
        self.phase = DcaPhase::Inactive;
        self.cycle_id = new_cycle_id(Utc::now());
        self.current_round = 0;
        self.total_investment = Decimal::ZERO;
        self.total_volume = Decimal::ZERO;
        self.average_price = Decimal::ZERO;
        self.last_buy_price = Decimal::ZERO;
        self.last_buy_time = None;
        self.last_time_based_buy_time = None;
        self.cycle_start_time = None;
        self.target_sell_price = Decimal::ZERO;
        self.buying_rounds.clear();
    }

    /// Close the cycle with a full sell and return the realized profit.
    pub fn complete_cycle(&mut self, sell_price: Decimal, sell_volume: Decimal) -> Decimal {
        let profit = sell_price * sell_volume - self.total_investment;
        self.reset_cycle();
        profit
    }

    pub fn from_cache_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_cache_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Malformed price-history entries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidPricePoint {
    #[error("empty price entry")]
    Empty,

    #[error("invalid price value: {0}")]
    BadPrice(String),

    #[error("invalid volume value: {0}")]
    BadVolume(String),
}

/// One sampled market price, stored in a compact comma-separated form
/// (`"price"` or `"price,volume"`) under its RFC 3339 timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        PricePoint {
            timestamp,
            price,
            volume: None,
        }
    }

    /// Compact cache form, without the timestamp (the field name carries it).
    pub fn to_cache_string(&self) -> String {
        match self.volume {
            Some(volume) => format!("{},{}", self.price, volume),
            None => self.price.to_string(),
        }
    }

    /// Parse the compact cache form. A single value reads as price-only.
    pub fn from_cache_string(
        timestamp: DateTime<Utc>,
        raw: &str,
    ) -> Result<Self, InvalidPricePoint> {
        let mut parts = raw.split(',');
        let price_part = parts.next().filter(|p| !p.is_empty()).ok_or(InvalidPricePoint::Empty)?;
        let price = price_part
            .trim()
            .parse()
            .map_err(|_| InvalidPricePoint::BadPrice(price_part.to_string()))?;
        let volume = match parts.next() {
            Some(volume_part) => Some(
                volume_part
                    .trim()
                    .parse()
                    .map_err(|_| InvalidPricePoint::BadVolume(volume_part.to_string()))?,
            ),
            None => None,
        };
        Ok(PricePoint {
            timestamp,
            price,
            volume,
        })
    }
}

/// Chronologically ordered price samples for one market.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceHistory {
    pub market: Market,
    points: Vec<PricePoint>,
}

impl PriceHistory {
    /// Build a history from unordered samples.
    pub fn from_points(market: Market, mut points: Vec<PricePoint>) -> Self {
        points.sort_by_key(|point| point.timestamp);
        PriceHistory { market, points }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn latest(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
