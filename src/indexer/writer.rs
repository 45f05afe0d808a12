//! Validation, change filtering and batched persistence of snapshots.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::db::models::{MarketDataSnapshot, PoolSnapshot, PriceSnapshot};
use crate::db::MetricsStore;
use crate::utils::{
    validate_market_data, validate_pool_snapshot, validate_price_snapshot, ChangeDeduplicator,
    Observation,
};

/// Outcome of one write call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub received: usize,
    /// Dropped by validation.
    pub rejected: usize,
    /// Dropped by the change filter.
    pub unchanged: usize,
    pub written: u64,
    /// The INSERT failed and the batch was dropped.
    pub failed: bool,
}

impl WriteSummary {
    fn received(count: usize) -> Self {
        Self {
            received: count,
            ..Default::default()
        }
    }

    /// Records that passed validation, whether or not they were new.
    pub fn usable(&self) -> usize {
        self.received - self.rejected
    }
}

pub struct StorageWriter {
    store: Arc<dyn MetricsStore>,
    dedup: ChangeDeduplicator,
}

impl StorageWriter {
    pub fn new(store: Arc<dyn MetricsStore>, dedup: ChangeDeduplicator) -> Self {
        Self { store, dedup }
    }

    pub async fn write_price_snapshots(&self, snapshots: &[PriceSnapshot]) -> WriteSummary {
        let mut summary = WriteSummary::received(snapshots.len());
        let mut batch = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            if !validate_price_snapshot(snapshot) {
                summary.rejected += 1;
                continue;
            }

            let last = match self.store.latest_price_snapshot(&snapshot.key()).await {
                Ok(last) => last,
                Err(e) => {
                    warn!(
                        "[{}] Price snapshot lookup failed, writing without change check: {:#}",
                        snapshot.chain, e
                    );
                    None
                },
            };

            let last = last.as_ref().map(Observation::from);
            if !self.dedup.should_write(&Observation::from(snapshot), last.as_ref()) {
                debug!("[{}] Price unchanged at {}, skipping", snapshot.chain, snapshot.price);
                summary.unchanged += 1;
                continue;
            }

            batch.push(snapshot.clone());
        }

        if batch.is_empty() {
            return summary;
        }

        match self.store.insert_price_snapshots(&batch).await {
            Ok(written) => {
                summary.written = written;
                info!("Stored {} price snapshots", written);
            },
            Err(e) => {
                summary.failed = true;
                error!("Failed to store {} price snapshots, dropping batch: {:#}", batch.len(), e);
            },
        }

        summary
    }

    pub async fn write_pool_snapshots(&self, snapshots: &[PoolSnapshot]) -> WriteSummary {
        let mut summary = WriteSummary::received(snapshots.len());
        let mut batch = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            if !validate_pool_snapshot(snapshot) {
                summary.rejected += 1;
                continue;
            }

            let last = match self.store.latest_pool_snapshot(&snapshot.key()).await {
                Ok(last) => last,
                Err(e) => {
                    warn!(
                        "[{}] Pool snapshot lookup failed, writing without change check: {:#}",
                        snapshot.chain, e
                    );
                    None
                },
            };

            let last = last.as_ref().map(Observation::from);
            if !self.dedup.should_write(&Observation::from(snapshot), last.as_ref()) {
                debug!("[{}] Pool metrics unchanged, skipping", snapshot.chain);
                summary.unchanged += 1;
                continue;
            }

            batch.push(snapshot.clone());
        }

        if batch.is_empty() {
            return summary;
        }

        match self.store.insert_pool_snapshots(&batch).await {
            Ok(written) => {
                summary.written = written;
                info!("Stored {} pool snapshots", written);
            },
            Err(e) => {
                summary.failed = true;
                error!("Failed to store {} pool snapshots, dropping batch: {:#}", batch.len(), e);
            },
        }

        summary
    }

    /// Market data has no pool key and is written on every call.
    pub async fn write_market_data(&self, records: &[MarketDataSnapshot]) -> WriteSummary {
        let mut summary = WriteSummary::received(records.len());
        let batch: Vec<MarketDataSnapshot> = records
            .iter()
            .filter(|record| validate_market_data(record))
            .cloned()
            .collect();
        summary.rejected = records.len() - batch.len();

        if batch.is_empty() {
            return summary;
        }

        match self.store.insert_market_data(&batch).await {
            Ok(written) => {
                summary.written = written;
                info!("Stored {} market data rows", written);
            },
            Err(e) => {
                summary.failed = true;
                error!("Failed to store market data, dropping batch: {:#}", e);
            },
        }

        summary
    }
}
