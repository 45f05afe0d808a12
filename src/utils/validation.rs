//! Record validation before storage.
//!
//! Every record the pipeline produces passes through one of the `validate_*`
//! functions before it reaches the writer. A record that fails is logged and
//! dropped. It is never retried, since re-fetching would only reproduce it.
//!
//! The `check_*` variants return the [`Rejection`] reason instead of a flag.

use log::warn;
use thiserror::Error;

use crate::db::models::{MarketDataSnapshot, PoolSnapshot, PriceSnapshot};

/// Why a record was refused.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("{field} is empty")]
    EmptyIdentifier { field: &'static str },

    #[error("{field} is not finite ({value})")]
    NonFinite { field: &'static str, value: f64 },

    #[error("{field} is negative ({value})")]
    Negative { field: &'static str, value: f64 },

    #[error("timestamp must be positive, got {0}")]
    NonPositiveTimestamp(i64),
}

// ============================================
// Field Checks
// ============================================

#[inline]
pub fn check_identifier(field: &'static str, value: &str) -> Result<(), Rejection> {
    if value.trim().is_empty() {
        return Err(Rejection::EmptyIdentifier { field });
    }
    Ok(())
}

/// Numerics must be finite and non-negative.
#[inline]
pub fn check_amount(field: &'static str, value: f64) -> Result<(), Rejection> {
    if !value.is_finite() {
        return Err(Rejection::NonFinite { field, value });
    }
    if value < 0.0 {
        return Err(Rejection::Negative { field, value });
    }
    Ok(())
}

#[inline]
pub fn check_count(field: &'static str, value: i64) -> Result<(), Rejection> {
    if value < 0 {
        return Err(Rejection::Negative {
            field,
            value: value as f64,
        });
    }
    Ok(())
}

#[inline]
pub fn check_timestamp(timestamp: i64) -> Result<(), Rejection> {
    if timestamp <= 0 {
        return Err(Rejection::NonPositiveTimestamp(timestamp));
    }
    Ok(())
}

// ============================================
// Record Checks
// ============================================

pub fn check_price_snapshot(snapshot: &PriceSnapshot) -> Result<(), Rejection> {
    check_identifier("exchange", &snapshot.exchange)?;
    check_identifier("pool_address", &snapshot.pool_address)?;
    check_identifier("token_address", &snapshot.token_address)?;
    check_count("block_number", snapshot.block_number)?;
    check_amount("price", snapshot.price)?;
    check_timestamp(snapshot.timestamp)
}

pub fn check_pool_snapshot(snapshot: &PoolSnapshot) -> Result<(), Rejection> {
    check_identifier("exchange", &snapshot.exchange)?;
    check_identifier("pool_address", &snapshot.pool_address)?;
    check_identifier("token_address", &snapshot.token_address)?;
    check_count("block_number", snapshot.block_number)?;
    check_count("holders", snapshot.holders)?;
    check_amount("price", snapshot.price)?;
    check_amount("circulating_supply", snapshot.circulating_supply)?;
    check_amount("market_cap", snapshot.market_cap)?;
    check_amount("tvl_usd", snapshot.tvl_usd)?;
    check_amount("volume_usd", snapshot.volume_usd)?;
    check_amount("volatility", snapshot.volatility)?;
    check_timestamp(snapshot.timestamp)
}

pub fn check_market_data(data: &MarketDataSnapshot) -> Result<(), Rejection> {
    check_amount("all_time_high", data.all_time_high)?;
    check_amount("all_time_low", data.all_time_low)?;
    check_amount("circulating_supply", data.circulating_supply)?;
    check_amount("day_volume", data.day_volume)?;
    check_amount("market_cap", data.market_cap)?;
    check_amount("price", data.price)?;
    check_timestamp(data.timestamp)
}

// ============================================
// Logging Validators
// ============================================

pub fn validate_price_snapshot(snapshot: &PriceSnapshot) -> bool {
    match check_price_snapshot(snapshot) {
        Ok(()) => true,
        Err(reason) => {
            warn!(
                "Rejected price snapshot [{}] pool={} token={} block={}: {}",
                snapshot.chain, snapshot.pool_address, snapshot.token_address,
                snapshot.block_number, reason
            );
            false
        },
    }
}

pub fn validate_pool_snapshot(snapshot: &PoolSnapshot) -> bool {
    match check_pool_snapshot(snapshot) {
        Ok(()) => true,
        Err(reason) => {
            warn!(
                "Rejected pool snapshot [{}] pool={} token={} block={}: {}",
                snapshot.chain, snapshot.pool_address, snapshot.token_address,
                snapshot.block_number, reason
            );
            false
        },
    }
}

pub fn validate_market_data(data: &MarketDataSnapshot) -> bool {
    match check_market_data(data) {
        Ok(()) => true,
        Err(reason) => {
            warn!(
                "Rejected market data at {} (price={}): {}",
                data.timestamp, data.price, reason
            );
            false
        },
    }
}
