use serde::{Deserialize, Serialize};

use super::{Chain, SnapshotKey};

/// Liquidity and market metrics of one pool at one block.
///
/// Written at most once per refresh window (see `indexer.pool_refresh_secs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    // Identifiers
    pub chain: Chain,
    pub exchange: String,
    pub pool_address: String,
    pub token_address: String,
    pub block_number: i64,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,

    // Token state
    pub price: f64,
    pub circulating_supply: f64,
    pub holders: i64,
    pub market_cap: f64,

    // Pool state
    pub tvl_usd: f64,
    pub volume_usd: f64,
    /// `volume_usd / tvl_usd`
    pub volatility: f64,
}

impl PoolSnapshot {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(
            self.pool_address.clone(),
            self.token_address.clone(),
            self.chain,
            self.exchange.clone(),
        )
    }
}
