//! Pure numeric derivation of prices and pool metrics.
//!
//! Each upstream shape has its own [`PoolStats`] variant, so the rules below
//! are selected by type rather than by chain name. Every function fails with
//! [`IndexerError::Derivation`] when an input is missing, non-finite, or zero
//! where it would be divided by.

use crate::error::IndexerError;
use crate::utils::units_to_f64;

const SECONDS_PER_DAY: i64 = 86_400;

/// Raw pool figures as reported upstream, before USD conversion.
///
/// Fields are optional because upstream responses routinely omit them; the
/// derivation decides which absences are fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolStats {
    /// Constant-product pair from a subgraph (`pair` + `pairDayDatas`).
    UniswapV2 {
        reserve_usd: Option<f64>,
        /// Tracked token priced in the native asset.
        token1_price: Option<f64>,
        /// Previous full day's volume, in native units.
        daily_volume_token1: Option<f64>,
    },
    /// Concentrated-liquidity pool from a subgraph (`pool` + `poolDayDatas`).
    Concentrated {
        token0_price: Option<f64>,
        total_value_locked_token0: Option<f64>,
        daily_volume_token0: Option<f64>,
    },
    /// Whirlpool stats from the REST pool endpoint.
    Whirlpool {
        /// Native asset priced in the tracked token.
        reciprocal_price: Option<f64>,
        tvl_usdc: Option<f64>,
        volume_24h_usd: Option<f64>,
    },
}

impl PoolStats {
    pub fn label(&self) -> &'static str {
        match self {
            PoolStats::UniswapV2 { .. } => "uniswap_v2 pool stats",
            PoolStats::Concentrated { .. } => "concentrated pool stats",
            PoolStats::Whirlpool { .. } => "whirlpool pool stats",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolMetrics {
    pub price: f64,
    pub tvl_usd: f64,
    pub volume_usd: f64,
    pub volatility: f64,
}

/// USD price of the tracked token.
pub fn derive_price(stats: &PoolStats, native_price: f64) -> Result<f64, IndexerError> {
    let context = stats.label();
    let native_price = require_positive(context, "native price", Some(native_price))?;

    let price = match stats {
        PoolStats::UniswapV2 { token1_price, .. } => {
            require_non_negative(context, "token1Price", *token1_price)? * native_price
        },
        PoolStats::Concentrated { token0_price, .. } => {
            require_non_negative(context, "token0Price", *token0_price)? * native_price
        },
        PoolStats::Whirlpool {
            reciprocal_price, ..
        } => native_price / require_positive(context, "price", *reciprocal_price)?,
    };

    ensure_finite(context, "price", price)
}

/// Price, TVL, 24h volume and volatility of the pool, all in USD.
pub fn derive_pool_metrics(
    stats: &PoolStats,
    native_price: f64,
) -> Result<PoolMetrics, IndexerError> {
    let context = stats.label();
    let price = derive_price(stats, native_price)?;

    let (tvl_usd, volume_usd) = match stats {
        PoolStats::UniswapV2 {
            reserve_usd,
            daily_volume_token1,
            ..
        } => (
            require_non_negative(context, "reserveUSD", *reserve_usd)?,
            require_non_negative(context, "dailyVolumeToken1", *daily_volume_token1)?
                * native_price,
        ),
        PoolStats::Concentrated {
            total_value_locked_token0,
            daily_volume_token0,
            ..
        } => (
            // Only one side is reported; the pool is assumed balanced
            require_non_negative(context, "totalValueLockedToken0", *total_value_locked_token0)?
                * native_price
                * 2.0,
            require_non_negative(context, "volumeToken0", *daily_volume_token0)? * native_price,
        ),
        PoolStats::Whirlpool {
            tvl_usdc,
            volume_24h_usd,
            ..
        } => (
            require_non_negative(context, "tvlUsdc", *tvl_usdc)?,
            require_non_negative(context, "stats.24h.volume", *volume_24h_usd)?,
        ),
    };

    let tvl_usd = ensure_finite(context, "tvl_usd", tvl_usd)?;
    let volume_usd = ensure_finite(context, "volume_usd", volume_usd)?;

    Ok(PoolMetrics {
        price,
        tvl_usd,
        volume_usd,
        volatility: volatility(volume_usd, tvl_usd)?,
    })
}

/// `volume_usd / tvl_usd`. TVL must be strictly positive.
pub fn volatility(volume_usd: f64, tvl_usd: f64) -> Result<f64, IndexerError> {
    if !tvl_usd.is_finite() || tvl_usd <= 0.0 {
        return Err(IndexerError::derivation(
            "volatility",
            format!("tvl_usd must be positive, got {}", tvl_usd),
        ));
    }
    ensure_finite("volatility", "volume_usd", volume_usd / tvl_usd)
}

pub fn market_cap(price: f64, circulating_supply: f64) -> f64 {
    price * circulating_supply
}

/// Scale a raw token supply down by the token's decimals.
pub fn normalize_supply(raw_supply: u128, decimals: u8) -> Result<f64, IndexerError> {
    units_to_f64(raw_supply, decimals).ok_or_else(|| {
        IndexerError::derivation(
            "circulating supply",
            format!("{} does not fit an f64 at {} decimals", raw_supply, decimals),
        )
    })
}

/// Upper bound (exclusive, unix seconds) for the previous day's volume row.
pub fn day_ago_seconds(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(1000) - SECONDS_PER_DAY
}

fn require_non_negative(
    context: &str,
    field: &str,
    value: Option<f64>,
) -> Result<f64, IndexerError> {
    let value = value.ok_or_else(|| IndexerError::derivation(context, format!("{} is missing", field)))?;
    if !value.is_finite() || value < 0.0 {
        return Err(IndexerError::derivation(
            context,
            format!("{} is invalid: {}", field, value),
        ));
    }
    Ok(value)
}

fn require_positive(context: &str, field: &str, value: Option<f64>) -> Result<f64, IndexerError> {
    let value = require_non_negative(context, field, value)?;
    if value == 0.0 {
        return Err(IndexerError::derivation(context, format!("{} is zero", field)));
    }
    Ok(value)
}

fn ensure_finite(context: &str, field: &str, value: f64) -> Result<f64, IndexerError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(IndexerError::derivation(
            context,
            format!("{} is not finite", field),
        ))
    }
}
