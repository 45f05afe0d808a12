//! Storage seams of the pipeline.
//!
//! The indexer writes through [`MetricsStore`], the read API queries through
//! [`MetricsReader`]. Both are implemented by
//! [`PostgresClient`](crate::db::PostgresClient); tests substitute in-memory
//! versions.

use async_trait::async_trait;

use crate::api::Interval;
use crate::db::models::{
    BucketedPrice, Heartbeat, MarketDataSnapshot, PoolSnapshot, PriceSnapshot, SnapshotKey,
    TokenPriceStats,
};

/// Time-series tables subject to retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotTable {
    PriceSnapshots,
    PoolSnapshots,
    MarketData,
}

impl SnapshotTable {
    pub const ALL: [SnapshotTable; 3] = [
        SnapshotTable::PriceSnapshots,
        SnapshotTable::PoolSnapshots,
        SnapshotTable::MarketData,
    ];

    /// Fully qualified table name.
    pub fn table_name(&self) -> &'static str {
        match self {
            SnapshotTable::PriceSnapshots => "indexer.price_snapshots",
            SnapshotTable::PoolSnapshots => "indexer.pool_snapshots",
            SnapshotTable::MarketData => "indexer.market_data",
        }
    }
}

#[async_trait]
pub trait MetricsStore: Send + Sync {
    // Dedup lookups
    async fn latest_price_snapshot(&self, key: &SnapshotKey)
        -> anyhow::Result<Option<PriceSnapshot>>;
    async fn latest_pool_snapshot(&self, key: &SnapshotKey) -> anyhow::Result<Option<PoolSnapshot>>;

    /// Timestamp in ms of the newest pool snapshot across all pools.
    async fn latest_pool_snapshot_timestamp(&self) -> anyhow::Result<Option<i64>>;
    async fn latest_market_data(&self) -> anyhow::Result<Option<MarketDataSnapshot>>;

    // Inserts return the number of rows written
    async fn insert_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> anyhow::Result<u64>;
    async fn insert_pool_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<u64>;
    async fn insert_market_data(&self, records: &[MarketDataSnapshot]) -> anyhow::Result<u64>;

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> anyhow::Result<()>;
    async fn last_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>>;

    /// Delete rows with `timestamp < cutoff_ms`.
    async fn prune_before(&self, table: SnapshotTable, cutoff_ms: i64) -> anyhow::Result<u64>;
    async fn oldest_timestamp(&self, table: SnapshotTable) -> anyhow::Result<Option<i64>>;
}

#[async_trait]
pub trait MetricsReader: Send + Sync {
    /// Average price per bucket for every token, at most `limit` most recent
    /// buckets per token. A bucket averages every stored row it covers.
    async fn bucketed_prices(
        &self,
        tokens: &[String],
        interval: Interval,
        limit: u32,
    ) -> anyhow::Result<Vec<BucketedPrice>>;

    /// Most recent pool snapshots of one token, newest first.
    async fn recent_pool_snapshots(
        &self,
        token_address: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<PoolSnapshot>>;

    /// Average, high and low price per token since `since_ms`. Tokens without
    /// rows in the window are absent from the result.
    async fn price_window_stats(
        &self,
        tokens: &[String],
        since_ms: i64,
    ) -> anyhow::Result<Vec<TokenPriceStats>>;

    async fn current_market_data(&self) -> anyhow::Result<Option<MarketDataSnapshot>>;

    async fn last_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>>;
}
