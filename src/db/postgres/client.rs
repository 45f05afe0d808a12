use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::info;
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;
use crate::utils::RetryExecutor;

const SCHEMA: &str = include_str!("../../../schema/postgres.sql");

/// Statements of a migration script, with `--` comment lines dropped.
///
/// The schema holds no string literals or function bodies, so `;` always ends
/// a statement.
fn migration_statements(sql: &str) -> Vec<String> {
    let uncommented: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    uncommented
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(str::to_string)
        .collect()
}

/// PostgreSQL client with connection pooling.
///
/// Backs both the write side ([`MetricsStore`](crate::db::MetricsStore)) and
/// the read side ([`MetricsReader`](crate::db::MetricsReader)). Connections are
/// handed out by `deadpool-postgres` and go back to the pool on drop.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
}

impl PostgresClient {
    /// Build the pool and wait until a first connection succeeds.
    pub async fn new(settings: PostgresSettings, retry: &RetryExecutor) -> anyhow::Result<Self> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{}",
            settings.host, settings.port, settings.database
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&settings.host)
            .port(settings.port)
            .user(&settings.user)
            .password(&settings.password)
            .dbname(&settings.database);

        let mgr = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(mgr)
            .max_size(settings.pool_size)
            .build()
            .context("Failed to create PostgreSQL connection pool")?;

        retry
            .execute("PostgreSQL connect", || async {
                pool.get()
                    .await
                    .map(drop)
                    .context("Failed to connect to PostgreSQL")
            })
            .await?;

        info!("Connected to PostgreSQL (pool size {})", settings.pool_size);
        Ok(Self { pool })
    }

    /// Apply the bundled schema. Every statement is idempotent.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let statements = migration_statements(SCHEMA);
        info!("Applying {} schema statements", statements.len());

        for stmt in &statements {
            client
                .batch_execute(stmt)
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL schema is up to date");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_statements_skip_comments_and_blanks() {
        let sql = "-- header; with a semicolon\nCREATE SCHEMA a;\n\n;CREATE TABLE a.b (x INT);";
        assert_eq!(
            migration_statements(sql),
            vec!["CREATE SCHEMA a", "CREATE TABLE a.b (x INT)"]
        );
    }

    #[test]
    fn test_bundled_schema_creates_every_table() {
        let statements = migration_statements(SCHEMA);
        for table in ["price_snapshots", "pool_snapshots", "market_data", "heartbeats"] {
            assert!(
                statements
                    .iter()
                    .any(|stmt| stmt.starts_with("CREATE TABLE") && stmt.contains(table)),
                "missing {}",
                table
            );
        }
    }
}
