use super::Chain;

/// Identity of a time series: one token in one pool on one exchange and chain.
///
/// Used to look up the last stored record when deciding whether a new
/// observation is worth writing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub pool_address: String,
    pub token_address: String,
    pub chain: Chain,
    pub exchange: String,
}

impl SnapshotKey {
    pub fn new(
        pool_address: impl Into<String>,
        token_address: impl Into<String>,
        chain: Chain,
        exchange: impl Into<String>,
    ) -> Self {
        Self {
            pool_address: pool_address.into(),
            token_address: token_address.into(),
            chain,
            exchange: exchange.into(),
        }
    }

    /// Key of the pool tracked on `chain`.
    pub fn tracked(chain: Chain) -> Self {
        let pool = chain.tracked_pool();
        Self::new(pool.pool_address, pool.token_address, chain, pool.exchange)
    }
}
