use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::IndexerError;
use crate::indexer::PoolStats;
use crate::sources::{fetch_json, PoolStatsSource};
use crate::utils::value_to_f64;

#[derive(Deserialize)]
struct PoolResponse {
    data: Option<Value>,
}

/// Public Orca REST API for Whirlpool statistics.
#[derive(Clone)]
pub struct OrcaClient {
    http: Client,
    base_url: String,
}

impl OrcaClient {
    pub fn new(http: Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    pub async fn whirlpool_stats(&self, pool_address: &str) -> anyhow::Result<PoolStats> {
        let url = format!(
            "{}/pools/{}",
            self.base_url.trim_end_matches('/'),
            pool_address
        );
        let response: PoolResponse = fetch_json(self.http.get(url), "orca pool stats").await?;
        Ok(whirlpool_stats(response, pool_address)?)
    }
}

/// The REST endpoint only reports the current pool and a rolling 24h window.
#[async_trait]
impl PoolStatsSource for OrcaClient {
    async fn pool_stats(
        &self,
        pool_address: &str,
        _block_or_slot: u64,
        _lt_date: i64,
    ) -> anyhow::Result<PoolStats> {
        self.whirlpool_stats(pool_address).await
    }
}

fn whirlpool_stats(response: PoolResponse, pool_address: &str) -> Result<PoolStats, IndexerError> {
    let data = response.data.ok_or_else(|| {
        IndexerError::derivation("whirlpool pool stats", format!("pool {} not found", pool_address))
    })?;
    Ok(parse_whirlpool(&data))
}

fn parse_whirlpool(data: &Value) -> PoolStats {
    PoolStats::Whirlpool {
        reciprocal_price: data.get("price").and_then(value_to_f64),
        tvl_usdc: data.get("tvlUsdc").and_then(value_to_f64),
        volume_24h_usd: data.pointer("/stats/24h/volume").and_then(value_to_f64),
    }
}
