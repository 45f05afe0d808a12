use serde::{Deserialize, Serialize};

use super::{Chain, SnapshotKey};

/// USD price of the tracked token in one pool at one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub chain: Chain,
    pub exchange: String,
    pub pool_address: String,
    pub token_address: String,
    /// Block number, or slot on Solana.
    pub block_number: i64,
    pub price: f64,
    /// Milliseconds since the unix epoch.
    pub timestamp: i64,
}

impl PriceSnapshot {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(
            self.pool_address.clone(),
            self.token_address.clone(),
            self.chain,
            self.exchange.clone(),
        )
    }
}
