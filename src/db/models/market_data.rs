use serde::{Deserialize, Serialize};

/// Token-wide market figures, independent of any pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    /// Never decreases across consecutive snapshots.
    pub all_time_high: f64,
    /// Never increases across consecutive snapshots.
    pub all_time_low: f64,
    pub circulating_supply: f64,
    pub day_volume: f64,
    pub market_cap: f64,
    pub price: f64,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
}
