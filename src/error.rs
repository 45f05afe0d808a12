use thiserror::Error;

/// Failure taxonomy of the indexing pipeline.
///
/// Plumbing code keeps using `anyhow::Result` with context; these variants exist
/// so callers can tell a transient upstream outage apart from a malformed
/// response or a broken configuration.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Missing or invalid settings. Fatal, never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// A retried operation failed on every attempt. Carries the last error.
    #[error("{operation} failed after {attempts} attempt(s): {last:#}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        last: anyhow::Error,
    },

    /// Upstream data was well-formed transport-wise but unusable
    /// (missing field, zero divisor, non-finite value). Not retried.
    #[error("derivation failed for {context}: {reason}")]
    Derivation { context: String, reason: String },

    /// Non-retryable upstream failure outside of the retry executor.
    #[error("upstream error: {0:#}")]
    Upstream(anyhow::Error),

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl IndexerError {
    pub fn derivation(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Derivation {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether the retry executor may try the failed operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Storage(_))
    }
}
