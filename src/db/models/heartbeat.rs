use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Healthy,
    /// At least one chain failed, or no chain produced data.
    Degraded,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Healthy => "healthy",
            RunStatus::Degraded => "degraded",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(RunStatus::Healthy),
            "degraded" => Ok(RunStatus::Degraded),
            other => Err(anyhow::anyhow!("Unknown run status: {}", other)),
        }
    }
}

/// Completion marker of a scheduled job, used by the health signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub job: String,
    pub status: RunStatus,
    pub failed_chains: Vec<Chain>,
    pub recorded_at: DateTime<Utc>,
}

impl Heartbeat {
    pub fn new(
        job: impl Into<String>,
        failed_chains: Vec<Chain>,
        produced_data: bool,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        let status = if failed_chains.is_empty() && produced_data {
            RunStatus::Healthy
        } else {
            RunStatus::Degraded
        };

        Self {
            job: job.into(),
            status,
            failed_chains,
            recorded_at,
        }
    }
}
