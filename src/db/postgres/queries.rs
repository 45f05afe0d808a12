use anyhow::Context;
use async_trait::async_trait;
use log::{debug, warn};

use crate::api::Interval;
use crate::db::models::{
    BucketedPrice, Heartbeat, MarketDataSnapshot, PoolSnapshot, TokenPriceStats,
};
use crate::db::postgres::ops::{row_to_market_data, row_to_pool_snapshot, LATEST_MARKET_DATA_QUERY};
use crate::db::postgres::PostgresClient;
use crate::db::store::MetricsReader;

/// One statement for every token: bucket, average, then keep the newest
/// `$3` buckets per token.
const BUCKETED_PRICES_QUERY: &str = r#"
    WITH buckets AS (
        SELECT
            token_address,
            date_bin(
                ($2::text)::interval,
                to_timestamp(timestamp / 1000.0),
                TIMESTAMPTZ '1970-01-01 00:00:00+00'
            ) AS bucket,
            AVG(price) AS price,
            MIN(timestamp) AS first_timestamp
        FROM indexer.price_snapshots
        WHERE token_address = ANY($1)
        GROUP BY token_address, bucket
    ),
    ranked AS (
        SELECT
            token_address, bucket, price, first_timestamp,
            ROW_NUMBER() OVER (PARTITION BY token_address ORDER BY bucket DESC) AS rn
        FROM buckets
    )
    SELECT
        token_address,
        (EXTRACT(EPOCH FROM bucket) * 1000)::BIGINT AS bucket_start_ms,
        first_timestamp,
        price
    FROM ranked
    WHERE rn <= $3
    ORDER BY token_address, bucket DESC
"#;

const RECENT_POOL_SNAPSHOTS_QUERY: &str = r#"
    SELECT
        chain, exchange, pool_address, token_address, block_number, timestamp,
        price, circulating_supply, holders, market_cap, tvl_usd, volume_usd, volatility
    FROM indexer.pool_snapshots
    WHERE token_address = $1
    ORDER BY timestamp DESC
    LIMIT $2
"#;

const PRICE_WINDOW_STATS_QUERY: &str = r#"
    SELECT
        token_address,
        AVG(price) AS average_price,
        MAX(price) AS high,
        MIN(price) AS low
    FROM indexer.price_snapshots
    WHERE token_address = ANY($1)
      AND timestamp >= $2
    GROUP BY token_address
"#;

#[async_trait]
impl MetricsReader for PostgresClient {
    async fn bucketed_prices(
        &self,
        tokens: &[String],
        interval: Interval,
        limit: u32,
    ) -> anyhow::Result<Vec<BucketedPrice>> {
        if tokens.is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let limit = i64::from(limit);

        // Parallel workers are disabled for this transaction only
        let result = async {
            tx.batch_execute("SET LOCAL max_parallel_workers_per_gather = 0")
                .await?;
            tx.query(
                BUCKETED_PRICES_QUERY,
                &[&tokens, &interval.pg_interval(), &limit],
            )
            .await
        }
        .await;

        let rows = match result {
            Ok(rows) => {
                tx.commit().await.context("Failed to commit bucketed price query")?;
                rows
            },
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("Rollback after failed bucketed price query failed: {:?}", rollback_error);
                }
                return Err(e).context("Bucketed price query failed");
            },
        };

        debug!(
            "Bucketed {} rows for {} tokens at {}",
            rows.len(),
            tokens.len(),
            interval
        );

        rows.iter()
            .map(|row| {
                Ok::<_, anyhow::Error>(BucketedPrice {
                    token_address: row.try_get("token_address")?,
                    bucket_start_ms: row.try_get("bucket_start_ms")?,
                    first_timestamp_ms: row.try_get("first_timestamp")?,
                    price: row.try_get("price")?,
                })
            })
            .collect()
    }

    async fn recent_pool_snapshots(
        &self,
        token_address: &str,
        limit: u32,
    ) -> anyhow::Result<Vec<PoolSnapshot>> {
        let client = self.pool.get().await?;
        let limit = i64::from(limit);
        let rows = client
            .query(RECENT_POOL_SNAPSHOTS_QUERY, &[&token_address, &limit])
            .await?;

        rows.iter().map(row_to_pool_snapshot).collect()
    }

    async fn price_window_stats(
        &self,
        tokens: &[String],
        since_ms: i64,
    ) -> anyhow::Result<Vec<TokenPriceStats>> {
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let rows = client
            .query(PRICE_WINDOW_STATS_QUERY, &[&tokens, &since_ms])
            .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, anyhow::Error>(TokenPriceStats {
                    token_address: row.try_get("token_address")?,
                    average_price: row.try_get("average_price")?,
                    high: row.try_get("high")?,
                    low: row.try_get("low")?,
                })
            })
            .collect()
    }

    async fn current_market_data(&self) -> anyhow::Result<Option<MarketDataSnapshot>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(LATEST_MARKET_DATA_QUERY, &[]).await?;
        row.as_ref().map(row_to_market_data).transpose()
    }

    async fn last_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>> {
        self.fetch_heartbeat(job).await
    }
}
