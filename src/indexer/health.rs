use chrono::{DateTime, Duration, Utc};
use log::{error, info};

use crate::db::models::{Heartbeat, RunStatus};

/// When the alert was last raised. Owned by the caller of
/// [`HealthMonitor::evaluate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertState {
    pub last_alert_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_status: Option<RunStatus>,
    pub stale: bool,
    /// An alert was raised by this evaluation.
    pub alerted: bool,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        !self.stale
    }
}

/// Staleness check of the indexing heartbeat with a cooldown between alerts.
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitor {
    stale_after: Duration,
    alert_cooldown: Duration,
}

impl HealthMonitor {
    pub fn new(stale_after: Duration, alert_cooldown: Duration) -> Self {
        Self {
            stale_after,
            alert_cooldown,
        }
    }

    pub fn from_secs(stale_after_secs: u64, alert_cooldown_secs: u64) -> Self {
        Self::new(
            Duration::seconds(stale_after_secs as i64),
            Duration::seconds(alert_cooldown_secs as i64),
        )
    }

    /// A missing heartbeat counts as stale. A fresh heartbeat clears the
    /// cooldown so the next outage alerts immediately.
    pub fn evaluate(
        &self,
        last: Option<&Heartbeat>,
        now: DateTime<Utc>,
        alerts: &mut AlertState,
    ) -> HealthStatus {
        let last_run = last.map(|heartbeat| heartbeat.recorded_at);
        let stale = match last_run {
            None => true,
            Some(at) => now - at > self.stale_after,
        };

        if !stale {
            if alerts.last_alert_at.take().is_some() {
                info!("Indexer heartbeat is fresh again");
            }
            return HealthStatus {
                last_run,
                last_status: last.map(|heartbeat| heartbeat.status),
                stale,
                alerted: false,
            };
        }

        let cooled_down = alerts
            .last_alert_at
            .map_or(true, |at| now - at >= self.alert_cooldown);

        if cooled_down {
            alerts.last_alert_at = Some(now);
            match last_run {
                Some(at) => error!(
                    "ALERT: indexer is stale, last run at {} ({} min ago)",
                    at.to_rfc3339(),
                    (now - at).num_minutes()
                ),
                None => error!("ALERT: indexer has never recorded a run"),
            }
        }

        HealthStatus {
            last_run,
            last_status: last.map(|heartbeat| heartbeat.status),
            stale,
            alerted: cooled_down,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::from_secs(1_200, 3_600)
    }

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::minutes(minutes)
    }

    fn heartbeat(minutes: i64) -> Heartbeat {
        Heartbeat::new("index_run", vec![], true, at(minutes))
    }

    #[test]
    fn test_fresh_heartbeat_is_healthy() {
        let mut alerts = AlertState::default();
        let status = monitor().evaluate(Some(&heartbeat(0)), at(20), &mut alerts);
        assert!(status.is_ok());
        assert!(!status.alerted);
        assert_eq!(status.last_status, Some(RunStatus::Healthy));
    }

    #[test]
    fn test_stale_heartbeat_alerts_once_per_cooldown() {
        let mut alerts = AlertState::default();
        let last = heartbeat(0);

        let first = monitor().evaluate(Some(&last), at(21), &mut alerts);
        assert!(first.stale);
        assert!(first.alerted);

        let second = monitor().evaluate(Some(&last), at(50), &mut alerts);
        assert!(second.stale);
        assert!(!second.alerted);

        let third = monitor().evaluate(Some(&last), at(81), &mut alerts);
        assert!(third.alerted);
    }

    #[test]
    fn test_missing_heartbeat_is_stale() {
        let mut alerts = AlertState::default();
        let status = monitor().evaluate(None, at(0), &mut alerts);
        assert!(status.stale);
        assert!(status.alerted);
        assert_eq!(status.last_run, None);
    }

    #[test]
    fn test_recovery_resets_cooldown() {
        let mut alerts = AlertState::default();
        monitor().evaluate(Some(&heartbeat(0)), at(30), &mut alerts);
        assert!(alerts.last_alert_at.is_some());

        monitor().evaluate(Some(&heartbeat(35)), at(36), &mut alerts);
        assert_eq!(alerts.last_alert_at, None);

        let status = monitor().evaluate(Some(&heartbeat(35)), at(60), &mut alerts);
        assert!(status.alerted);
    }
}
