//! Change-significance filter in front of the storage writer.

use crate::db::models::{PoolSnapshot, PriceSnapshot};

/// The values compared between a candidate and the last stored record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub price: f64,
    pub tvl_usd: f64,
    pub volume_usd: f64,
}

impl Observation {
    /// Observation of a price-only record. TVL and volume compare equal.
    pub fn price_only(price: f64) -> Self {
        Self {
            price,
            tvl_usd: 0.0,
            volume_usd: 0.0,
        }
    }
}

impl From<&PriceSnapshot> for Observation {
    fn from(snapshot: &PriceSnapshot) -> Self {
        Observation::price_only(snapshot.price)
    }
}

impl From<&PoolSnapshot> for Observation {
    fn from(snapshot: &PoolSnapshot) -> Self {
        Self {
            price: snapshot.price,
            tvl_usd: snapshot.tvl_usd,
            volume_usd: snapshot.volume_usd,
        }
    }
}

/// Decides whether a new observation differs enough from the last stored one.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDeduplicator {
    epsilon: f64,
}

impl ChangeDeduplicator {
    pub const DEFAULT_EPSILON: f64 = 1e-6;

    /// Negative or non-finite tolerances are treated as zero.
    pub fn new(epsilon: f64) -> Self {
        let epsilon = if epsilon.is_finite() && epsilon > 0.0 {
            epsilon
        } else {
            0.0
        };
        Self { epsilon }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// `true` when nothing is stored yet or any compared value moved by more
    /// than epsilon.
    pub fn should_write(&self, candidate: &Observation, last_stored: Option<&Observation>) -> bool {
        let Some(last) = last_stored else {
            return true;
        };

        self.differs(candidate.price, last.price)
            || self.differs(candidate.tvl_usd, last.tvl_usd)
            || self.differs(candidate.volume_usd, last.volume_usd)
    }

    #[inline]
    fn differs(&self, a: f64, b: f64) -> bool {
        (a - b).abs() > self.epsilon
    }
}

impl Default for ChangeDeduplicator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_EPSILON)
    }
}
