//! Cron scheduler for the periodic jobs.
//!
//! Runs:
//! - The index run, once at startup and then every `indexer.interval_secs`
//! - Retention pruning, checked on the same cadence and run once per
//!   `retention.interval_secs`
//! - The heartbeat staleness check, which logs an alert when indexing stops

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::api::MetricsApi;
use crate::config::Settings;
use crate::db::MetricsStore;
use crate::indexer::IndexRun;

use super::jobs::{self, RetentionPolicy, RetentionState};

/// Cron scheduler that manages the periodic jobs.
pub struct CronScheduler {
    index_run: Arc<IndexRun>,
    store: Arc<dyn MetricsStore>,
    api: Arc<MetricsApi>,
    settings: CronSettings,
    retention_state: Arc<Mutex<RetentionState>>,
}

/// Configuration for cron job intervals
#[derive(Debug, Clone, Copy)]
pub struct CronSettings {
    /// Interval between index runs - default 15 minutes
    pub index_interval_secs: u64,
    pub retention: RetentionPolicy,
    /// Interval between heartbeat staleness checks - default 5 minutes
    pub health_check_interval_secs: u64,
}

impl From<&Settings> for CronSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            index_interval_secs: settings.indexer.interval_secs,
            retention: RetentionPolicy::from(&settings.retention),
            health_check_interval_secs: 300,
        }
    }
}

impl CronScheduler {
    pub fn new(
        index_run: Arc<IndexRun>,
        store: Arc<dyn MetricsStore>,
        api: Arc<MetricsApi>,
        settings: CronSettings,
    ) -> Self {
        Self {
            index_run,
            store,
            api,
            settings,
            retention_state: Arc::new(Mutex::new(RetentionState::default())),
        }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        // Register all jobs
        self.register_initial_index_run(&scheduler).await?;
        self.register_index_run_job(&scheduler).await?;
        self.register_prune_old_data_job(&scheduler).await?;
        self.register_health_check_job(&scheduler).await?;

        // Start the scheduler
        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 4);

        // Wait for cancellation
        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_initial_index_run(&self, scheduler: &JobScheduler) -> Result<()> {
        let index_run = self.index_run.clone();

        let job = Job::new_one_shot_async(Duration::from_secs(0), move |_uuid, _lock| {
            let index_run = index_run.clone();
            Box::pin(async move {
                if let Err(e) = jobs::index_run::run(&index_run).await {
                    error!("Initial index run failed: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        Ok(())
    }

    async fn register_index_run_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let index_run = self.index_run.clone();
        let interval = self.settings.index_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let index_run = index_run.clone();
            Box::pin(async move {
                if let Err(e) = jobs::index_run::run(&index_run).await {
                    error!("Index run failed: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered index_run job (every {}s)", interval);
        Ok(())
    }

    async fn register_prune_old_data_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let store = self.store.clone();
        let state = self.retention_state.clone();
        let policy = self.settings.retention;
        let interval = self.settings.index_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let store = store.clone();
            let state = state.clone();
            Box::pin(async move {
                let mut state = state.lock().await;
                if let Err(e) =
                    jobs::prune_old_data::run(&*store, &policy, &mut state, Utc::now()).await
                {
                    error!("Failed to prune old data: {:#}", e);
                }
            })
        })?;

        scheduler.add(job).await?;
        info!(
            "Registered prune_old_data job (checked every {}s, runs every {}s)",
            interval,
            self.settings.retention.interval.num_seconds()
        );
        Ok(())
    }

    async fn register_health_check_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let api = self.api.clone();
        let interval = self.settings.health_check_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let api = api.clone();
            Box::pin(async move {
                match api.health(Utc::now()).await {
                    Ok(status) if status.is_ok() => {},
                    Ok(status) => warn!(
                        "Indexer heartbeat is stale (last run: {:?})",
                        status.last_run.map(|at| at.to_rfc3339())
                    ),
                    Err(e) => error!("Failed to check indexer health: {:#}", e),
                }
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered health_check job (every {}s)", interval);
        Ok(())
    }
}
