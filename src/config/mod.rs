#[allow(clippy::module_inception)]
mod config;

pub use config::{
    ApiSettings, ChainSettings, IndexerSettings, PostgresSettings, RetentionSettings,
    RetrySettings, Settings, SourcesSettings,
};
