mod aggregates;
mod chain;
mod heartbeat;
mod market_data;
mod pool_snapshot;
mod price_snapshot;
mod snapshot_key;

pub use aggregates::{BucketedPrice, TokenPriceStats};
pub use chain::{Chain, TrackedPool};
pub use heartbeat::{Heartbeat, RunStatus};
pub use market_data::MarketDataSnapshot;
pub use pool_snapshot::PoolSnapshot;
pub use price_snapshot::PriceSnapshot;
pub use snapshot_key::SnapshotKey;
