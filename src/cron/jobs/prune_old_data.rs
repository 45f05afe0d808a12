//! Job to delete time-series rows past the retention horizon.
//!
//! Checked on every tick, but prunes at most once per
//! [`RetentionPolicy::interval`]. After pruning each table, the oldest
//! remaining row is logged.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{error, info};

use crate::config::RetentionSettings;
use crate::db::{MetricsStore, SnapshotTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub horizon: Duration,
    pub interval: Duration,
}

impl From<&RetentionSettings> for RetentionPolicy {
    fn from(settings: &RetentionSettings) -> Self {
        Self {
            horizon: Duration::days(i64::from(settings.horizon_days)),
            interval: Duration::seconds(settings.interval_secs as i64),
        }
    }
}

/// When the job last pruned. Owned by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionState {
    pub last_pruned_at: Option<DateTime<Utc>>,
}

impl RetentionState {
    pub fn is_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        self.last_pruned_at.map_or(true, |at| now - at >= interval)
    }
}

/// Returns the number of deleted rows, or `None` when pruning was not due.
///
/// A failing table is logged and the remaining tables are still pruned.
pub async fn run(
    store: &dyn MetricsStore,
    policy: &RetentionPolicy,
    state: &mut RetentionState,
    now: DateTime<Utc>,
) -> Result<Option<u64>> {
    if !state.is_due(now, policy.interval) {
        return Ok(None);
    }
    state.last_pruned_at = Some(now);

    let cutoff = now - policy.horizon;
    let cutoff_ms = cutoff.timestamp_millis();
    info!("Pruning rows older than {}", cutoff.to_rfc3339());

    let start = std::time::Instant::now();
    let mut deleted = 0;

    for table in SnapshotTable::ALL {
        match store.prune_before(table, cutoff_ms).await {
            Ok(count) => {
                deleted += count;
                info!("Deleted {} rows from {}", count, table.table_name());
            },
            Err(e) => {
                error!("Failed to prune {}: {:#}", table.table_name(), e);
                continue;
            },
        }

        match store.oldest_timestamp(table).await {
            Ok(Some(oldest)) => match DateTime::<Utc>::from_timestamp_millis(oldest) {
                Some(oldest) => info!("Oldest row in {}: {}", table.table_name(), oldest.to_rfc3339()),
                None => info!("Oldest row in {}: {} ms", table.table_name(), oldest),
            },
            Ok(None) => info!("Oldest row in {}: unknown (table is empty)", table.table_name()),
            Err(e) => error!("Failed to read oldest row of {}: {:#}", table.table_name(), e),
        }
    }

    info!("Completed prune_old_data job in {:?} ({} rows)", start.elapsed(), deleted);
    Ok(Some(deleted))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_policy_from_settings() {
        let policy = RetentionPolicy::from(&RetentionSettings::default());
        assert_eq!(policy.horizon, Duration::days(30));
        assert_eq!(policy.interval, Duration::days(1));
    }

    #[test]
    fn test_prune_due_once_per_interval() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut state = RetentionState::default();
        assert!(state.is_due(now, Duration::days(1)));

        state.last_pruned_at = Some(now);
        assert!(!state.is_due(now + Duration::hours(23), Duration::days(1)));
        assert!(state.is_due(now + Duration::hours(24), Duration::days(1)));
    }
}
