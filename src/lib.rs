pub mod abis;
pub mod api;
pub mod config;
pub mod cron;
pub mod db;
pub mod error;
pub mod indexer;
pub mod sources;
pub mod utils;

pub use api::MetricsApi;
pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use db::Database;
pub use error::IndexerError;
pub use indexer::{IndexRun, RunSettings};
