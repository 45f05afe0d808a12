//! The read side: bucketing, result caching and the query surface.

pub mod aggregator;
pub mod cache;
pub mod service;

pub use aggregator::{bucket_snapshots, round_timestamp_to_interval, Interval};
pub use cache::ResultCache;
pub use service::{MarketView, MetricsApi, PerChain, PoolView, PricePoint, DEFAULT_POOL_LIMIT};
