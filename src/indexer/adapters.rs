use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use log::info;

use crate::config::Settings;
use crate::db::models::{Chain, PoolSnapshot, PriceSnapshot};
use crate::error::IndexerError;
use crate::indexer::derivation::{
    day_ago_seconds, derive_pool_metrics, derive_price, market_cap, normalize_supply,
    PoolMetrics, PoolStats,
};
use crate::sources::{
    http_client, ChainRpc, EvmRpc, HolderClient, HolderSource, OrcaClient, PoolStatsSource,
    SolanaRpc, SubgraphClient, SubgraphFlavor,
};
use crate::utils::RetryExecutor;

/// Block (or slot) the run reads at, with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainHead {
    pub block_or_slot: u64,
    pub timestamp_ms: i64,
}

/// Per-chain access to the tracked pool.
///
/// Implementations retry their own network calls; an `Err` means the chain
/// produced nothing usable for this run.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> Chain;

    async fn chain_head(&self) -> Result<ChainHead, IndexerError>;

    /// Raw total supply of the tracked token, in base units.
    async fn total_supply(&self) -> Result<u128, IndexerError>;

    async fn fetch_pool_snapshot(
        &self,
        native_price: f64,
        block_or_slot: u64,
        timestamp_ms: i64,
        total_supply: u128,
    ) -> Result<PoolSnapshot, IndexerError>;

    async fn fetch_price_snapshot(
        &self,
        native_price: f64,
        block_or_slot: u64,
        timestamp_ms: i64,
    ) -> Result<PriceSnapshot, IndexerError>;
}

// ==================== Adapter ====================

/// Adapter over one chain's upstreams.
///
/// Ethereum and Base read pool state from a subgraph, Solana from the
/// Whirlpool REST API. The [`PoolStats`] variant the source returns selects
/// the derivation rules, so the adapter itself is chain agnostic.
pub struct PoolAdapter {
    chain: Chain,
    rpc: Arc<dyn ChainRpc>,
    pools: Arc<dyn PoolStatsSource>,
    holders: Arc<dyn HolderSource>,
    retry: RetryExecutor,
    token_decimals: u8,
}

impl PoolAdapter {
    pub fn new(
        chain: Chain,
        rpc: Arc<dyn ChainRpc>,
        pools: Arc<dyn PoolStatsSource>,
        holders: Arc<dyn HolderSource>,
        retry: RetryExecutor,
        token_decimals: u8,
    ) -> Self {
        Self {
            chain,
            rpc,
            pools,
            holders,
            retry,
            token_decimals,
        }
    }

    async fn pool_stats(&self, block_or_slot: u64, timestamp_ms: i64) -> Result<PoolStats, IndexerError> {
        let pool = self.chain.tracked_pool();
        let lt_date = day_ago_seconds(timestamp_ms);

        self.retry
            .execute(&format!("[{}] pool stats", self.chain), || {
                self.pools.pool_stats(pool.pool_address, block_or_slot, lt_date)
            })
            .await
    }

    async fn holder_count(&self) -> Result<i64, IndexerError> {
        let token_address = self.chain.tracked_pool().token_address;
        self.retry
            .execute(&format!("[{}] holder count", self.chain), || {
                self.holders.total_holders(self.chain, token_address)
            })
            .await
    }
}

#[async_trait]
impl ChainAdapter for PoolAdapter {
    fn chain(&self) -> Chain {
        self.chain
    }

    async fn chain_head(&self) -> Result<ChainHead, IndexerError> {
        let lag = self.chain.block_lag();
        self.retry
            .execute(&format!("[{}] chain head", self.chain), || self.rpc.head(lag))
            .await
    }

    async fn total_supply(&self) -> Result<u128, IndexerError> {
        self.retry
            .execute(&format!("[{}] total supply", self.chain), || self.rpc.total_supply())
            .await
    }

    async fn fetch_pool_snapshot(
        &self,
        native_price: f64,
        block_or_slot: u64,
        timestamp_ms: i64,
        total_supply: u128,
    ) -> Result<PoolSnapshot, IndexerError> {
        let stats = self.pool_stats(block_or_slot, timestamp_ms).await?;
        let holders = self.holder_count().await?;
        let metrics = derive_pool_metrics(&stats, native_price)?;
        let circulating_supply = normalize_supply(total_supply, self.token_decimals)?;

        Ok(build_pool_snapshot(
            self.chain,
            block_or_slot,
            timestamp_ms,
            metrics,
            circulating_supply,
            holders,
        ))
    }

    async fn fetch_price_snapshot(
        &self,
        native_price: f64,
        block_or_slot: u64,
        timestamp_ms: i64,
    ) -> Result<PriceSnapshot, IndexerError> {
        let stats = self.pool_stats(block_or_slot, timestamp_ms).await?;
        let price = derive_price(&stats, native_price)?;

        Ok(build_price_snapshot(self.chain, block_or_slot, timestamp_ms, price))
    }
}

// ==================== Shared ====================

pub fn build_price_snapshot(
    chain: Chain,
    block_or_slot: u64,
    timestamp_ms: i64,
    price: f64,
) -> PriceSnapshot {
    let pool = chain.tracked_pool();
    PriceSnapshot {
        chain,
        exchange: pool.exchange.to_string(),
        pool_address: pool.pool_address.to_string(),
        token_address: pool.token_address.to_string(),
        block_number: block_or_slot as i64,
        price,
        timestamp: timestamp_ms,
    }
}

pub fn build_pool_snapshot(
    chain: Chain,
    block_or_slot: u64,
    timestamp_ms: i64,
    metrics: PoolMetrics,
    circulating_supply: f64,
    holders: i64,
) -> PoolSnapshot {
    let pool = chain.tracked_pool();
    PoolSnapshot {
        chain,
        exchange: pool.exchange.to_string(),
        pool_address: pool.pool_address.to_string(),
        token_address: pool.token_address.to_string(),
        block_number: block_or_slot as i64,
        timestamp: timestamp_ms,
        price: metrics.price,
        circulating_supply,
        holders,
        market_cap: market_cap(metrics.price, circulating_supply),
        tvl_usd: metrics.tvl_usd,
        volume_usd: metrics.volume_usd,
        volatility: metrics.volatility,
    }
}

/// One adapter per configured chain.
pub fn build_adapters(
    settings: &Settings,
    retry: &RetryExecutor,
) -> anyhow::Result<Vec<Arc<dyn ChainAdapter>>> {
    let sources = &settings.sources;
    let http = http_client(sources.request_timeout())?;
    let holders: Arc<dyn HolderSource> = Arc::new(HolderClient::new(
        http.clone(),
        sources.moralis_evm_url.clone(),
        sources.moralis_solana_url.clone(),
        sources.moralis_api_key.clone(),
    ));

    let mut adapters: Vec<Arc<dyn ChainAdapter>> = Vec::with_capacity(Chain::ALL.len());

    for chain in Chain::ALL {
        let rpc_url = settings.chains.rpc_url(chain);
        let token_address = chain.tracked_pool().token_address;

        let subgraph = |flavor: SubgraphFlavor| -> anyhow::Result<Arc<dyn PoolStatsSource>> {
            let url = sources
                .subgraph_url(chain)
                .ok_or_else(|| anyhow!("no subgraph configured for {}", chain))?;
            Ok(Arc::new(SubgraphClient::new(
                http.clone(),
                url,
                sources.the_graph_api_key.clone(),
                flavor,
            )))
        };

        let rpc: Arc<dyn ChainRpc> = match chain {
            Chain::Ethereum | Chain::Base => Arc::new(EvmRpc::new(rpc_url, token_address)?),
            Chain::Solana => Arc::new(SolanaRpc::new(
                http.clone(),
                rpc_url.to_string(),
                token_address.to_string(),
            )),
        };
        let pools: Arc<dyn PoolStatsSource> = match chain {
            Chain::Ethereum => subgraph(SubgraphFlavor::UniswapV2)?,
            Chain::Base => subgraph(SubgraphFlavor::Concentrated)?,
            Chain::Solana => Arc::new(OrcaClient::new(http.clone(), sources.orca_url.clone())),
        };

        adapters.push(Arc::new(PoolAdapter::new(
            chain,
            rpc,
            pools,
            holders.clone(),
            retry.clone(),
            settings.indexer.token_decimals,
        )));
        info!("Configured {} adapter", chain);
    }

    Ok(adapters)
}
