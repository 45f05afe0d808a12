use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::IndexerError;
use crate::indexer::PoolStats;
use crate::sources::{fetch_json, PoolStatsSource};
use crate::utils::value_to_f64;

const UNISWAP_V2_POOL_STATS: &str = r#"
    query GetPoolStats($poolAddress: String!, $blockNumber: Int!, $ltDate: Int!) {
        pair(id: $poolAddress, block: { number: $blockNumber }) {
            reserveETH
            reserveUSD
            token1Price
        }
        pairDayDatas(
            first: 1
            orderBy: date
            orderDirection: desc
            where: { pairAddress: $poolAddress, date_lt: $ltDate }
        ) {
            dailyVolumeToken1
        }
    }
"#;

const CONCENTRATED_POOL_STATS: &str = r#"
    query GetPoolStats($poolAddress: String!, $blockNumber: Int!, $ltDate: Int!) {
        pool(id: $poolAddress, block: { number: $blockNumber }) {
            token0Price
            totalValueLockedToken0
            volumeUSD
        }
        poolDayDatas(
            first: 1
            orderBy: date
            orderDirection: desc
            where: { pool: $poolAddress, date_lt: $ltDate }
        ) {
            volumeToken0
        }
    }
"#;

#[derive(Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UniswapV2Response {
    pair: Option<Value>,
    #[serde(default)]
    pair_day_datas: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConcentratedResponse {
    pool: Option<Value>,
    #[serde(default)]
    pool_day_datas: Vec<Value>,
}

/// Pool model exposed by a subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphFlavor {
    UniswapV2,
    Concentrated,
}

/// Client for one subgraph behind the gateway.
#[derive(Clone)]
pub struct SubgraphClient {
    http: Client,
    url: String,
    api_key: String,
    flavor: SubgraphFlavor,
}

impl SubgraphClient {
    pub fn new(http: Client, url: String, api_key: String, flavor: SubgraphFlavor) -> Self {
        Self {
            http,
            url,
            api_key,
            flavor,
        }
    }

    /// Run a GraphQL query. GraphQL-level errors fail the call.
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Value,
    ) -> anyhow::Result<T> {
        let request = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&GraphQlRequest { query, variables });

        let response: GraphQlResponse<T> = fetch_json(request, "subgraph").await?;

        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow!("subgraph query failed: {}", messages.join("; ")));
        }

        response
            .data
            .ok_or_else(|| anyhow!("subgraph response carries no data"))
    }

    /// Pair state at `block_number` and the last full day of volume before `lt_date`.
    pub async fn uniswap_v2_pool_stats(
        &self,
        pool_address: &str,
        block_number: u64,
        lt_date: i64,
    ) -> anyhow::Result<PoolStats> {
        let data: UniswapV2Response = self
            .query(UNISWAP_V2_POOL_STATS, variables(pool_address, block_number, lt_date))
            .await?;
        Ok(uniswap_v2_stats(data, pool_address, block_number)?)
    }

    /// Pool state at `block_number` and the last full day of volume before `lt_date`.
    pub async fn concentrated_pool_stats(
        &self,
        pool_address: &str,
        block_number: u64,
        lt_date: i64,
    ) -> anyhow::Result<PoolStats> {
        let data: ConcentratedResponse = self
            .query(CONCENTRATED_POOL_STATS, variables(pool_address, block_number, lt_date))
            .await?;
        Ok(concentrated_stats(data, pool_address, block_number)?)
    }
}

#[async_trait]
impl PoolStatsSource for SubgraphClient {
    async fn pool_stats(
        &self,
        pool_address: &str,
        block_or_slot: u64,
        lt_date: i64,
    ) -> anyhow::Result<PoolStats> {
        match self.flavor {
            SubgraphFlavor::UniswapV2 => {
                self.uniswap_v2_pool_stats(pool_address, block_or_slot, lt_date)
                    .await
            },
            SubgraphFlavor::Concentrated => {
                self.concentrated_pool_stats(pool_address, block_or_slot, lt_date)
                    .await
            },
        }
    }
}

fn uniswap_v2_stats(
    data: UniswapV2Response,
    pool_address: &str,
    block_number: u64,
) -> Result<PoolStats, IndexerError> {
    let pair = data.pair.ok_or_else(|| {
        IndexerError::derivation(
            "uniswap_v2 pool stats",
            format!("pair {} not found at block {}", pool_address, block_number),
        )
    })?;

    Ok(PoolStats::UniswapV2 {
        reserve_usd: field(&pair, "reserveUSD"),
        token1_price: field(&pair, "token1Price"),
        daily_volume_token1: day_volume(&data.pair_day_datas, "dailyVolumeToken1"),
    })
}

fn concentrated_stats(
    data: ConcentratedResponse,
    pool_address: &str,
    block_number: u64,
) -> Result<PoolStats, IndexerError> {
    let pool = data.pool.ok_or_else(|| {
        IndexerError::derivation(
            "concentrated pool stats",
            format!("pool {} not found at block {}", pool_address, block_number),
        )
    })?;

    Ok(PoolStats::Concentrated {
        token0_price: field(&pool, "token0Price"),
        total_value_locked_token0: field(&pool, "totalValueLockedToken0"),
        daily_volume_token0: day_volume(&data.pool_day_datas, "volumeToken0"),
    })
}

fn variables(pool_address: &str, block_number: u64, lt_date: i64) -> Value {
    json!({
        "poolAddress": pool_address.to_lowercase(),
        "blockNumber": block_number,
        "ltDate": lt_date,
    })
}

fn field(entity: &Value, name: &str) -> Option<f64> {
    entity.get(name).and_then(value_to_f64)
}

/// No day-data row means no recorded volume.
fn day_volume(rows: &[Value], name: &str) -> Option<f64> {
    match rows.first() {
        Some(row) => field(row, name),
        None => Some(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode<T: DeserializeOwned>(body: Value) -> T {
        let response: GraphQlResponse<T> = serde_json::from_value(body).unwrap();
        assert!(response.errors.is_empty());
        response.data.unwrap()
    }

    #[test]
    fn test_uniswap_v2_response_decodes_to_stats() {
        let data: UniswapV2Response = decode(json!({
            "data": {
                "pair": { "reserveETH": "40.1", "reserveUSD": "200000.5", "token1Price": "0.00002" },
                "pairDayDatas": [{ "dailyVolumeToken1": "5.25" }]
            }
        }));

        assert_eq!(
            uniswap_v2_stats(data, "0xpair", 10).unwrap(),
            PoolStats::UniswapV2 {
                reserve_usd: Some(200000.5),
                token1_price: Some(0.00002),
                daily_volume_token1: Some(5.25),
            }
        );
    }

    #[test]
    fn test_concentrated_response_decodes_to_stats() {
        let data: ConcentratedResponse = decode(json!({
            "data": {
                "pool": {
                    "token0Price": "0.000021",
                    "totalValueLockedToken0": 31.5,
                    "volumeUSD": "999"
                },
                "poolDayDatas": [{ "volumeToken0": "2.5" }]
            }
        }));

        assert_eq!(
            concentrated_stats(data, "0xpool", 10).unwrap(),
            PoolStats::Concentrated {
                token0_price: Some(0.000021),
                total_value_locked_token0: Some(31.5),
                daily_volume_token0: Some(2.5),
            }
        );
    }

    #[test]
    fn test_missing_day_data_is_zero_volume() {
        let data: ConcentratedResponse = decode(json!({
            "data": { "pool": { "token0Price": "0.1" }, "poolDayDatas": [] }
        }));

        let stats = concentrated_stats(data, "0xpool", 10).unwrap();
        assert!(matches!(
            stats,
            PoolStats::Concentrated {
                total_value_locked_token0: None,
                daily_volume_token0: Some(v),
                ..
            } if v == 0.0
        ));
    }

    #[test]
    fn test_missing_pair_is_a_derivation_error() {
        let data: UniswapV2Response = decode(json!({
            "data": { "pair": null, "pairDayDatas": [] }
        }));

        let err = uniswap_v2_stats(data, "0xpair", 77).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("0xpair"));
    }

    #[test]
    fn test_graphql_errors_are_kept() {
        let response: GraphQlResponse<UniswapV2Response> = serde_json::from_value(json!({
            "errors": [{ "message": "indexing_error" }]
        }))
        .unwrap();
        assert!(response.data.is_none());
        assert_eq!(response.errors[0].message, "indexing_error");
    }

    #[test]
    fn test_variables_lowercase_the_pool() {
        let vars = variables("0xABC", 10, 1_700_000_000);
        assert_eq!(vars["poolAddress"], "0xabc");
        assert_eq!(vars["blockNumber"], 10);
        assert_eq!(vars["ltDate"], 1_700_000_000);
    }
}
