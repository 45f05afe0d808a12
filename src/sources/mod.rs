//! HTTP and RPC clients for upstream data providers.
//!
//! Every client performs exactly one attempt per call. Retrying is left to
//! the caller's [`RetryExecutor`](crate::utils::RetryExecutor) so that each
//! call site picks its own label.
//!
//! Chain adapters only see the traits below, so each upstream can be swapped
//! for an in-memory double.

use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::db::models::Chain;
use crate::indexer::{ChainHead, PoolStats};

pub mod coinmarketcap;
pub mod holders;
pub mod orca;
pub mod rpc;
pub mod subgraph;

pub use coinmarketcap::{CoinMarketCapClient, MarketQuote, ReferencePriceSource};
pub use holders::HolderClient;
pub use orca::OrcaClient;
pub use rpc::{EvmRpc, SolanaRpc};
pub use subgraph::{SubgraphClient, SubgraphFlavor};

/// Node access for one chain.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Block (or slot) `lag` behind the tip, with its timestamp.
    async fn head(&self, lag: u64) -> anyhow::Result<ChainHead>;

    /// Raw total supply of the tracked token, in base units.
    async fn total_supply(&self) -> anyhow::Result<u128>;
}

/// Raw pool figures from an analytics upstream.
#[async_trait]
pub trait PoolStatsSource: Send + Sync {
    /// Pool state at `block_or_slot`. `lt_date` bounds the day-volume row in
    /// unix seconds; upstreams that only report a rolling 24h ignore both.
    async fn pool_stats(
        &self,
        pool_address: &str,
        block_or_slot: u64,
        lt_date: i64,
    ) -> anyhow::Result<PoolStats>;
}

#[async_trait]
pub trait HolderSource: Send + Sync {
    async fn total_holders(&self, chain: Chain, token_address: &str) -> anyhow::Result<i64>;
}

/// Shared HTTP client with a request timeout.
pub fn http_client(timeout: Duration) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to create HTTP client")
}

/// Send a request and decode a JSON body. Non-2xx statuses are errors that
/// carry the response body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    what: &str,
) -> anyhow::Result<T> {
    let response = request
        .send()
        .await
        .with_context(|| format!("{} request failed", what))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!("{} responded with {}: {}", what, status, body.trim()));
    }

    response
        .json::<T>()
        .await
        .with_context(|| format!("{} returned an unreadable body", what))
}
