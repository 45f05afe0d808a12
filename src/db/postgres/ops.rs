use anyhow::Context;
use async_trait::async_trait;
use log::{error, warn};
use tokio_postgres::types::ToSql;

use crate::db::models::{
    Chain, Heartbeat, MarketDataSnapshot, PoolSnapshot, PriceSnapshot, SnapshotKey,
};
use crate::db::postgres::PostgresClient;
use crate::db::store::{MetricsStore, SnapshotTable};

/// Rows per INSERT statement. Postgres caps bind parameters at 65535.
const BATCH_SIZE: usize = 500;

/// Build `($1, $2, ...), ($n+1, ...)` for a multi-row VALUES clause.
pub(super) fn values_placeholders(rows: usize, cols_per_row: usize) -> String {
    (0..rows)
        .map(|i| {
            let start = i * cols_per_row + 1;
            let placeholders: Vec<String> = (start..start + cols_per_row)
                .map(|n| format!("${}", n))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl MetricsStore for PostgresClient {
    // ==================== PRICE SNAPSHOTS ====================

    async fn latest_price_snapshot(
        &self,
        key: &SnapshotKey,
    ) -> anyhow::Result<Option<PriceSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT chain, exchange, pool_address, token_address, block_number, price, timestamp
            FROM indexer.price_snapshots
            WHERE pool_address = $1 AND token_address = $2 AND chain = $3 AND exchange = $4
            ORDER BY timestamp DESC
            LIMIT 1
        "#;

        let row = client
            .query_opt(
                query,
                &[&key.pool_address, &key.token_address, &key.chain.as_str(), &key.exchange],
            )
            .await?;

        row.as_ref().map(row_to_price_snapshot).transpose()
    }

    async fn insert_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> anyhow::Result<u64> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        const COLS_PER_ROW: usize = 7;

        // Chunks share one transaction so a batch lands whole or not at all
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let mut written = 0;

        for chunk in snapshots.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO indexer.price_snapshots (
                    chain, exchange, pool_address, token_address, block_number, price, timestamp
                ) VALUES {}
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let chains: Vec<&str> = chunk.iter().map(|s| s.chain.as_str()).collect();
            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, snapshot) in chunk.iter().enumerate() {
                params.push(&chains[i]);
                params.push(&snapshot.exchange);
                params.push(&snapshot.pool_address);
                params.push(&snapshot.token_address);
                params.push(&snapshot.block_number);
                params.push(&snapshot.price);
                params.push(&snapshot.timestamp);
            }

            match tx.execute(&query, &params).await {
                Ok(rows) => written += rows,
                Err(e) => {
                    error!("Failed to batch insert {} price snapshots: {:?}", chunk.len(), e);
                    if let Err(rollback_error) = tx.rollback().await {
                        warn!("Rollback of price snapshot batch failed: {:?}", rollback_error);
                    }
                    return Err(e.into());
                },
            }
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit {} price snapshots", snapshots.len()))?;
        Ok(written)
    }

    // ==================== POOL SNAPSHOTS ====================

    async fn latest_pool_snapshot(&self, key: &SnapshotKey) -> anyhow::Result<Option<PoolSnapshot>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                chain, exchange, pool_address, token_address, block_number, timestamp,
                price, circulating_supply, holders, market_cap, tvl_usd, volume_usd, volatility
            FROM indexer.pool_snapshots
            WHERE pool_address = $1 AND token_address = $2 AND chain = $3 AND exchange = $4
            ORDER BY timestamp DESC
            LIMIT 1
        "#;

        let row = client
            .query_opt(
                query,
                &[&key.pool_address, &key.token_address, &key.chain.as_str(), &key.exchange],
            )
            .await?;

        row.as_ref().map(row_to_pool_snapshot).transpose()
    }

    async fn latest_pool_snapshot_timestamp(&self) -> anyhow::Result<Option<i64>> {
        let client = self.pool.get().await?;
        let row = client
            .query_one("SELECT MAX(timestamp) FROM indexer.pool_snapshots", &[])
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn insert_pool_snapshots(&self, snapshots: &[PoolSnapshot]) -> anyhow::Result<u64> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        const COLS_PER_ROW: usize = 13;

        // Chunks share one transaction so a batch lands whole or not at all
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let mut written = 0;

        for chunk in snapshots.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO indexer.pool_snapshots (
                    chain, exchange, pool_address, token_address, block_number, timestamp,
                    price, circulating_supply, holders, market_cap, tvl_usd, volume_usd, volatility
                ) VALUES {}
                "#,
                values_placeholders(chunk.len(), COLS_PER_ROW)
            );

            let chains: Vec<&str> = chunk.iter().map(|s| s.chain.as_str()).collect();
            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, snapshot) in chunk.iter().enumerate() {
                params.push(&chains[i]);
                params.push(&snapshot.exchange);
                params.push(&snapshot.pool_address);
                params.push(&snapshot.token_address);
                params.push(&snapshot.block_number);
                params.push(&snapshot.timestamp);
                params.push(&snapshot.price);
                params.push(&snapshot.circulating_supply);
                params.push(&snapshot.holders);
                params.push(&snapshot.market_cap);
                params.push(&snapshot.tvl_usd);
                params.push(&snapshot.volume_usd);
                params.push(&snapshot.volatility);
            }

            match tx.execute(&query, &params).await {
                Ok(rows) => written += rows,
                Err(e) => {
                    error!("Failed to batch insert {} pool snapshots: {:?}", chunk.len(), e);
                    if let Err(rollback_error) = tx.rollback().await {
                        warn!("Rollback of pool snapshot batch failed: {:?}", rollback_error);
                    }
                    return Err(e.into());
                },
            }
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit {} pool snapshots", snapshots.len()))?;
        Ok(written)
    }

    // ==================== MARKET DATA ====================

    async fn latest_market_data(&self) -> anyhow::Result<Option<MarketDataSnapshot>> {
        let client = self.pool.get().await?;
        let row = client.query_opt(LATEST_MARKET_DATA_QUERY, &[]).await?;
        row.as_ref().map(row_to_market_data).transpose()
    }

    async fn insert_market_data(&self, records: &[MarketDataSnapshot]) -> anyhow::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        const COLS_PER_ROW: usize = 7;

        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO indexer.market_data (
                all_time_high, all_time_low, circulating_supply, day_volume,
                market_cap, price, timestamp
            ) VALUES {}
            "#,
            values_placeholders(records.len(), COLS_PER_ROW)
        );

        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(records.len() * COLS_PER_ROW);
        for record in records {
            params.push(&record.all_time_high);
            params.push(&record.all_time_low);
            params.push(&record.circulating_supply);
            params.push(&record.day_volume);
            params.push(&record.market_cap);
            params.push(&record.price);
            params.push(&record.timestamp);
        }

        let written = client.execute(&query, &params).await.map_err(|e| {
            error!("Failed to insert {} market data rows: {:?}", records.len(), e);
            e
        })?;

        Ok(written)
    }

    // ==================== HEARTBEATS ====================

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO indexer.heartbeats (job, status, failed_chains, recorded_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (job) DO UPDATE SET
                status = EXCLUDED.status,
                failed_chains = EXCLUDED.failed_chains,
                recorded_at = EXCLUDED.recorded_at
        "#;

        let failed_chains: Vec<String> = heartbeat
            .failed_chains
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();

        client
            .execute(
                query,
                &[
                    &heartbeat.job,
                    &heartbeat.status.as_str(),
                    &failed_chains,
                    &heartbeat.recorded_at,
                ],
            )
            .await
            .with_context(|| format!("Failed to record heartbeat for {}", heartbeat.job))?;

        Ok(())
    }

    async fn last_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>> {
        self.fetch_heartbeat(job).await
    }

    // ==================== RETENTION ====================

    async fn prune_before(&self, table: SnapshotTable, cutoff_ms: i64) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let query = format!("DELETE FROM {} WHERE timestamp < $1", table.table_name());
        let deleted = client
            .execute(&query, &[&cutoff_ms])
            .await
            .with_context(|| format!("Failed to prune {}", table.table_name()))?;
        Ok(deleted)
    }

    async fn oldest_timestamp(&self, table: SnapshotTable) -> anyhow::Result<Option<i64>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT MIN(timestamp) FROM {}", table.table_name());
        let row = client.query_one(&query, &[]).await?;
        Ok(row.try_get(0)?)
    }
}

impl PostgresClient {
    pub(super) async fn fetch_heartbeat(&self, job: &str) -> anyhow::Result<Option<Heartbeat>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT job, status, failed_chains, recorded_at FROM indexer.heartbeats WHERE job = $1",
                &[&job],
            )
            .await?;

        row.as_ref().map(row_to_heartbeat).transpose()
    }
}

pub(super) const LATEST_MARKET_DATA_QUERY: &str = r#"
    SELECT
        all_time_high, all_time_low, circulating_supply, day_volume,
        market_cap, price, timestamp
    FROM indexer.market_data
    ORDER BY timestamp DESC
    LIMIT 1
"#;

// ==================== HELPER FUNCTIONS ====================

fn row_chain(row: &tokio_postgres::Row) -> anyhow::Result<Chain> {
    let chain: String = row.try_get("chain")?;
    chain.parse()
}

fn row_to_price_snapshot(row: &tokio_postgres::Row) -> anyhow::Result<PriceSnapshot> {
    Ok(PriceSnapshot {
        chain: row_chain(row)?,
        exchange: row.try_get("exchange")?,
        pool_address: row.try_get("pool_address")?,
        token_address: row.try_get("token_address")?,
        block_number: row.try_get("block_number")?,
        price: row.try_get("price")?,
        timestamp: row.try_get("timestamp")?,
    })
}

pub(super) fn row_to_pool_snapshot(row: &tokio_postgres::Row) -> anyhow::Result<PoolSnapshot> {
    Ok(PoolSnapshot {
        chain: row_chain(row)?,
        exchange: row.try_get("exchange")?,
        pool_address: row.try_get("pool_address")?,
        token_address: row.try_get("token_address")?,
        block_number: row.try_get("block_number")?,
        timestamp: row.try_get("timestamp")?,
        price: row.try_get("price")?,
        circulating_supply: row.try_get("circulating_supply")?,
        holders: row.try_get("holders")?,
        market_cap: row.try_get("market_cap")?,
        tvl_usd: row.try_get("tvl_usd")?,
        volume_usd: row.try_get("volume_usd")?,
        volatility: row.try_get("volatility")?,
    })
}

pub(super) fn row_to_market_data(row: &tokio_postgres::Row) -> anyhow::Result<MarketDataSnapshot> {
    Ok(MarketDataSnapshot {
        all_time_high: row.try_get("all_time_high")?,
        all_time_low: row.try_get("all_time_low")?,
        circulating_supply: row.try_get("circulating_supply")?,
        day_volume: row.try_get("day_volume")?,
        market_cap: row.try_get("market_cap")?,
        price: row.try_get("price")?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn row_to_heartbeat(row: &tokio_postgres::Row) -> anyhow::Result<Heartbeat> {
    let status: String = row.try_get("status")?;
    let failed_chains: Vec<String> = row.try_get("failed_chains")?;

    Ok(Heartbeat {
        job: row.try_get("job")?,
        status: status.parse()?,
        failed_chains: failed_chains
            .iter()
            .map(|c| c.parse())
            .collect::<anyhow::Result<Vec<Chain>>>()?,
        recorded_at: row.try_get("recorded_at")?,
    })
}
