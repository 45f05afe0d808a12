use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use poolwatch::{
    indexer::build_adapters,
    sources::{http_client, CoinMarketCapClient},
    utils::{ChangeDeduplicator, RetryExecutor},
    CronScheduler, CronSettings, Database, IndexRun, MetricsApi, RunSettings, Settings,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .context("Failed to initialize logger")?;

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );
    settings.validate().context("Invalid configuration")?;

    let retry = RetryExecutor::new(settings.indexer.retry.policy())
        .context("Invalid retry configuration")?;

    let db = Database::new(settings.postgres.clone(), &retry)
        .await
        .context("Failed to initialize database connection")?;

    return run_indexer(settings, db, retry).await;
}

async fn run_indexer(
    settings: Arc<Settings>,
    db: Database,
    retry: RetryExecutor,
) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let adapters = build_adapters(&settings, &retry).context("Failed to build chain adapters")?;

    let http = http_client(settings.sources.request_timeout())?;
    let reference = Arc::new(CoinMarketCapClient::new(
        http,
        settings.sources.coinmarketcap_url.clone(),
        settings.sources.coinmarketcap_api_key.clone(),
        settings.sources.market_token_id,
    ));

    let index_run = Arc::new(IndexRun::new(
        adapters,
        reference,
        db.store(),
        retry,
        ChangeDeduplicator::new(settings.indexer.dedup_epsilon),
        RunSettings::from(&settings.indexer),
    ));

    let api = Arc::new(MetricsApi::new(db.reader(), settings.api.clone()));

    // Create and spawn cron scheduler for the index run, retention and health checks
    let cron_scheduler = CronScheduler::new(
        index_run,
        db.store(),
        api,
        CronSettings::from(settings.as_ref()),
    );

    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - indexing every {}s", settings.indexer.interval_secs);

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    // Set up graceful shutdown signal handler
    info!("Indexer running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    // Wait for cron scheduler to stop
    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Indexer stopped");
    Ok(())
}
