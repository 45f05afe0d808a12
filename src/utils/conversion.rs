//! Numeric conversions for upstream payloads.
//!
//! Raw token amounts are scaled through BigDecimal so that supplies above 2^53
//! keep their precision until the final f64 conversion. Subgraph and REST
//! payloads carry numbers as strings or JSON numbers, both are accepted.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::str::FromStr;

// ============================================
// Raw Amounts
// ============================================

/// Scale a raw token amount down by `decimals`.
///
/// Returns None if the result is not a finite f64.
pub fn units_to_f64(amount: u128, decimals: u8) -> Option<f64> {
    let value = BigDecimal::from(BigInt::from(amount));
    let adjusted = if decimals == 0 {
        value
    } else {
        value / big_pow10(decimals)
    };

    adjusted.to_f64().filter(|v| v.is_finite())
}

// ============================================
// Payload Decimals
// ============================================

/// Read a JSON number or numeric string. `null` and absent values yield None.
pub fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => f64::from_str(s.trim()).ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_units_to_f64_applies_decimals() {
        let scaled = units_to_f64(1_234_567_890, 6).unwrap();
        assert!((scaled - 1234.56789).abs() < 1e-9);
        assert_eq!(units_to_f64(42, 0), Some(42.0));
    }

    #[test]
    fn test_units_to_f64_keeps_precision_beyond_f64_mantissa() {
        let supply: u128 = 123_456_789_012_345_678_901_234_567;
        let scaled = units_to_f64(supply, 18).unwrap();
        assert!((scaled - 123_456_789.012_345_678).abs() < 1e-6);
    }

    #[test]
    fn test_value_to_f64_accepts_numbers_and_strings() {
        assert_eq!(value_to_f64(&json!(1.25)), Some(1.25));
        assert_eq!(value_to_f64(&json!("2.5")), Some(2.5));
        assert_eq!(value_to_f64(&json!(null)), None);
        assert_eq!(value_to_f64(&json!({"a": 1})), None);
    }
}
