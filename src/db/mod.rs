use std::sync::Arc;

use crate::config::PostgresSettings;
use crate::utils::RetryExecutor;

pub mod models;
pub mod postgres;
pub mod store;

pub use postgres::PostgresClient;
pub use store::{MetricsReader, MetricsStore, SnapshotTable};

/// Shared database handle.
///
/// PostgreSQL holds every time series (price, pool, market) and the job
/// heartbeats.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    pub async fn new(settings: PostgresSettings, retry: &RetryExecutor) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings, retry).await?;

        // Run migrations
        postgres.migrate().await?;

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }

    pub fn store(&self) -> Arc<dyn MetricsStore> {
        self.postgres.clone()
    }

    pub fn reader(&self) -> Arc<dyn MetricsReader> {
        self.postgres.clone()
    }
}
