//! The write side: per-chain adapters, derivation, and the index run.

pub mod adapters;
pub mod derivation;
pub mod health;
pub mod market;
pub mod run;
pub mod writer;

pub use adapters::{build_adapters, ChainAdapter, ChainHead, PoolAdapter};
pub use derivation::{
    day_ago_seconds, derive_pool_metrics, derive_price, market_cap, normalize_supply, volatility,
    PoolMetrics, PoolStats,
};
pub use health::{AlertState, HealthMonitor, HealthStatus};
pub use market::{next_market_snapshot, MarketSeeds};
pub use run::{pool_refresh_due, IndexRun, RunReport, RunSettings, RunState, INDEX_RUN_JOB};
pub use writer::{StorageWriter, WriteSummary};
