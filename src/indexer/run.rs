//! One indexing pass over every configured chain.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{error, info, warn};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex;

use crate::config::IndexerSettings;
use crate::db::models::{Chain, Heartbeat, PoolSnapshot, PriceSnapshot, RunStatus};
use crate::db::MetricsStore;
use crate::error::IndexerError;
use crate::indexer::adapters::{ChainAdapter, ChainHead};
use crate::indexer::market::{next_market_snapshot, MarketSeeds};
use crate::indexer::writer::{StorageWriter, WriteSummary};
use crate::sources::ReferencePriceSource;
use crate::utils::{ChangeDeduplicator, RetryExecutor};

/// Heartbeat job name of the indexing run.
pub const INDEX_RUN_JOB: &str = "index_run";

/// Steps of a run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    FetchReferencePrices,
    FetchPerChainSnapshots,
    ValidateAndDedup,
    WriteMarketData,
    DecideIfPoolRefreshNeeded,
    WritePoolSnapshots,
    SkipPoolSnapshots,
    Heartbeat,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    /// Minimum age in ms of the newest pool snapshot before pools are fetched again.
    pub pool_refresh_ms: i64,
    pub seeds: MarketSeeds,
}

impl From<&IndexerSettings> for RunSettings {
    fn from(settings: &IndexerSettings) -> Self {
        Self {
            // Out of range values are rejected by `Settings::validate`
            pool_refresh_ms: settings.pool_refresh_ms().unwrap_or(i64::MAX),
            seeds: MarketSeeds {
                all_time_high: settings.initial_all_time_high,
                all_time_low: settings.initial_all_time_low,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// States visited, ending in `Done`.
    pub states: Vec<RunState>,
    pub failed_chains: Vec<Chain>,
    pub prices: WriteSummary,
    /// `None` when the market quote or the previous row could not be read.
    pub market: Option<WriteSummary>,
    /// `None` when pools were not due for a refresh.
    pub pools: Option<WriteSummary>,
    pub status: RunStatus,
}

/// `true` when no pool snapshot exists or the newest one is older than
/// `refresh_ms`.
pub fn pool_refresh_due(latest_pool_timestamp: Option<i64>, now_ms: i64, refresh_ms: i64) -> bool {
    match latest_pool_timestamp {
        None => true,
        Some(latest) => latest < now_ms.saturating_sub(refresh_ms),
    }
}

pub struct IndexRun {
    adapters: Vec<Arc<dyn ChainAdapter>>,
    reference: Arc<dyn ReferencePriceSource>,
    store: Arc<dyn MetricsStore>,
    writer: StorageWriter,
    retry: RetryExecutor,
    settings: RunSettings,
    running: Mutex<()>,
}

impl IndexRun {
    pub fn new(
        adapters: Vec<Arc<dyn ChainAdapter>>,
        reference: Arc<dyn ReferencePriceSource>,
        store: Arc<dyn MetricsStore>,
        retry: RetryExecutor,
        dedup: ChangeDeduplicator,
        settings: RunSettings,
    ) -> Self {
        Self {
            writer: StorageWriter::new(store.clone(), dedup),
            adapters,
            reference,
            store,
            retry,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Run once. Returns `Ok(None)` without doing anything when another run
    /// is still in progress.
    ///
    /// Errors are unrecoverable for this run only; rows already written stay.
    pub async fn execute(&self, now: DateTime<Utc>) -> Result<Option<RunReport>, IndexerError> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Previous index run still in progress, skipping this tick");
            return Ok(None);
        };

        info!("Starting index run for {} chains...", self.adapters.len());
        let start = Instant::now();
        let mut states = Vec::with_capacity(8);

        match self.run(now, &mut states).await {
            Ok(report) => {
                info!(
                    "Completed index run in {:?} ({}, {} prices written, failed chains: {:?})",
                    start.elapsed(),
                    report.status,
                    report.prices.written,
                    report.failed_chains
                );
                Ok(Some(report))
            },
            Err(e) => {
                let failed_in = states.last().copied().unwrap_or(RunState::FetchReferencePrices);
                states.push(RunState::Failed);
                error!("Index run failed during {:?}: {:#}", failed_in, e);
                Err(e)
            },
        }
    }

    async fn run(
        &self,
        now: DateTime<Utc>,
        states: &mut Vec<RunState>,
    ) -> Result<RunReport, IndexerError> {
        let now_ms = now.timestamp_millis();
        let mut failed: BTreeSet<Chain> = BTreeSet::new();

        states.push(RunState::FetchReferencePrices);
        let native_prices = self.fetch_native_prices().await?;

        states.push(RunState::FetchPerChainSnapshots);
        let results = join_all(self.adapters.iter().map(|adapter| {
            let native_price = native_price_for(&native_prices, adapter.chain());
            async move { fetch_price(&**adapter, native_price).await }
        }))
        .await;

        let mut heads: Vec<(&Arc<dyn ChainAdapter>, ChainHead)> = Vec::new();
        let mut price_snapshots: Vec<PriceSnapshot> = Vec::new();

        for (adapter, (head, result)) in self.adapters.iter().zip(results) {
            let chain = adapter.chain();
            if let Some(head) = head {
                heads.push((adapter, head));
            }
            match result {
                Ok(snapshot) => price_snapshots.push(snapshot),
                Err(e) => {
                    error!("[{}] Price snapshot failed: {:#}", chain, e);
                    failed.insert(chain);
                },
            }
        }

        states.push(RunState::ValidateAndDedup);
        let prices = self.writer.write_price_snapshots(&price_snapshots).await;
        let produced_data = prices.usable() > 0;
        if !produced_data {
            warn!("No chain produced a usable price snapshot this run");
        }

        states.push(RunState::WriteMarketData);
        let market = self.write_market_data(now_ms).await;

        states.push(RunState::DecideIfPoolRefreshNeeded);
        let refresh = match self.store.latest_pool_snapshot_timestamp().await {
            Ok(latest) => pool_refresh_due(latest, now_ms, self.settings.pool_refresh_ms),
            Err(e) => {
                warn!("Pool snapshot age lookup failed, refreshing pools: {:#}", e);
                true
            },
        };

        let pools = if refresh {
            states.push(RunState::WritePoolSnapshots);
            let results = join_all(heads.iter().map(|&(adapter, head)| {
                let native_price = native_price_for(&native_prices, adapter.chain());
                async move { fetch_pool(&**adapter, native_price, head).await }
            }))
            .await;

            let mut pool_snapshots: Vec<PoolSnapshot> = Vec::with_capacity(results.len());
            for ((adapter, _), result) in heads.iter().zip(results) {
                match result {
                    Ok(snapshot) => pool_snapshots.push(snapshot),
                    Err(e) => {
                        error!("[{}] Pool snapshot failed: {:#}", adapter.chain(), e);
                        failed.insert(adapter.chain());
                    },
                }
            }

            Some(self.writer.write_pool_snapshots(&pool_snapshots).await)
        } else {
            states.push(RunState::SkipPoolSnapshots);
            info!("Pool snapshots are recent, skipping pool refresh");
            None
        };

        states.push(RunState::Heartbeat);
        let failed_chains: Vec<Chain> = failed.into_iter().collect();
        let heartbeat = Heartbeat::new(INDEX_RUN_JOB, failed_chains.clone(), produced_data, now);
        if let Err(e) = self.store.record_heartbeat(&heartbeat).await {
            error!("Failed to record index run heartbeat: {:#}", e);
        }

        states.push(RunState::Done);

        Ok(RunReport {
            states: states.clone(),
            failed_chains,
            prices,
            market,
            pools,
            status: heartbeat.status,
        })
    }

    /// USD price of every native asset the adapters need.
    async fn fetch_native_prices(&self) -> Result<FxHashMap<&'static str, f64>, IndexerError> {
        let mut prices = FxHashMap::default();

        for adapter in &self.adapters {
            let symbol = adapter.chain().native_symbol();
            if prices.contains_key(symbol) {
                continue;
            }

            let price = self
                .retry
                .execute(&format!("{} reference price", symbol), || {
                    self.reference.native_price_usd(symbol)
                })
                .await?;

            info!("{} reference price: ${}", symbol, price);
            prices.insert(symbol, price);
        }

        Ok(prices)
    }

    async fn write_market_data(&self, now_ms: i64) -> Option<WriteSummary> {
        let quote = match self
            .retry
            .execute("market quote", || self.reference.market_quote())
            .await
        {
            Ok(quote) => quote,
            Err(e) => {
                warn!("Market quote unavailable, skipping market data: {:#}", e);
                return None;
            },
        };

        let previous = match self.store.latest_market_data().await {
            Ok(previous) => previous,
            Err(e) => {
                warn!("Previous market data unreadable, skipping market data: {:#}", e);
                return None;
            },
        };

        let snapshot = next_market_snapshot(&quote, previous.as_ref(), self.settings.seeds, now_ms);
        Some(self.writer.write_market_data(&[snapshot]).await)
    }
}

fn native_price_for(prices: &FxHashMap<&'static str, f64>, chain: Chain) -> Result<f64, IndexerError> {
    prices.get(chain.native_symbol()).copied().ok_or_else(|| {
        IndexerError::Config(format!("no reference price for {}", chain.native_symbol()))
    })
}

async fn fetch_price(
    adapter: &dyn ChainAdapter,
    native_price: Result<f64, IndexerError>,
) -> (Option<ChainHead>, Result<PriceSnapshot, IndexerError>) {
    let head = match adapter.chain_head().await {
        Ok(head) => head,
        Err(e) => return (None, Err(e)),
    };

    let snapshot = match native_price {
        Ok(native_price) => {
            adapter
                .fetch_price_snapshot(native_price, head.block_or_slot, head.timestamp_ms)
                .await
        },
        Err(e) => Err(e),
    };

    (Some(head), snapshot)
}

async fn fetch_pool(
    adapter: &dyn ChainAdapter,
    native_price: Result<f64, IndexerError>,
    head: ChainHead,
) -> Result<PoolSnapshot, IndexerError> {
    let native_price = native_price?;
    let total_supply = adapter.total_supply().await?;

    adapter
        .fetch_pool_snapshot(native_price, head.block_or_slot, head.timestamp_ms, total_supply)
        .await
}
