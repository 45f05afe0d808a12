//! Time bucketing of price snapshots.
//!
//! Buckets are aligned to the unix epoch, the same origin the SQL `date_bin`
//! query uses, so [`bucket_snapshots`] and
//! [`MetricsReader::bucketed_prices`](crate::db::MetricsReader::bucketed_prices)
//! agree on bucket boundaries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::db::models::{BucketedPrice, PriceSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "_15m")]
    FifteenMinutes,
    #[serde(rename = "_30m")]
    ThirtyMinutes,
    #[serde(rename = "_1h")]
    OneHour,
}

impl Interval {
    pub const ALL: [Interval; 3] = [
        Interval::FifteenMinutes,
        Interval::ThirtyMinutes,
        Interval::OneHour,
    ];

    pub fn width_secs(&self) -> i64 {
        match self {
            Interval::FifteenMinutes => 15 * 60,
            Interval::ThirtyMinutes => 30 * 60,
            Interval::OneHour => 60 * 60,
        }
    }

    pub fn width_ms(&self) -> i64 {
        self.width_secs() * 1000
    }

    /// PostgreSQL interval literal.
    pub fn pg_interval(&self) -> &'static str {
        match self {
            Interval::FifteenMinutes => "15 minutes",
            Interval::ThirtyMinutes => "30 minutes",
            Interval::OneHour => "1 hour",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::FifteenMinutes => "_15m",
            Interval::ThirtyMinutes => "_30m",
            Interval::OneHour => "_1h",
        }
    }

    /// Start (ms) of the bucket containing `timestamp_ms`.
    pub fn bucket_start(&self, timestamp_ms: i64) -> i64 {
        timestamp_ms.div_euclid(self.width_ms()) * self.width_ms()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim_start_matches('_') {
            "15m" => Ok(Interval::FifteenMinutes),
            "30m" => Ok(Interval::ThirtyMinutes),
            "1h" => Ok(Interval::OneHour),
            _ => Err(anyhow::anyhow!("Unknown interval: {}", s)),
        }
    }
}

/// Display timestamp in whole seconds: `timestamp_ms` rounded half up to the
/// nearest interval boundary.
pub fn round_timestamp_to_interval(timestamp_ms: i64, interval: Interval) -> i64 {
    let width_ms = interval.width_ms();
    (timestamp_ms + width_ms / 2).div_euclid(width_ms) * interval.width_secs()
}

#[derive(Default)]
struct Bucket {
    sum: f64,
    count: u32,
    first_timestamp_ms: i64,
}

/// Average price per `(token, bucket)`, keeping the `limit` most recent
/// buckets of each requested token.
///
/// Ordered by token address, then newest bucket first. Tokens without rows
/// are absent from the output.
pub fn bucket_snapshots(
    snapshots: &[PriceSnapshot],
    tokens: &[String],
    interval: Interval,
    limit: u32,
) -> Vec<BucketedPrice> {
    let mut buckets: BTreeMap<(&str, i64), Bucket> = BTreeMap::new();

    for snapshot in snapshots {
        if !tokens.iter().any(|token| *token == snapshot.token_address) {
            continue;
        }

        let bucket = buckets
            .entry((snapshot.token_address.as_str(), interval.bucket_start(snapshot.timestamp)))
            .or_insert_with(|| Bucket {
                first_timestamp_ms: snapshot.timestamp,
                ..Default::default()
            });
        bucket.sum += snapshot.price;
        bucket.count += 1;
        bucket.first_timestamp_ms = bucket.first_timestamp_ms.min(snapshot.timestamp);
    }

    let mut result = Vec::with_capacity(buckets.len());
    let mut current_token: Option<&str> = None;
    let mut kept = 0;

    // Reverse BTreeMap order is newest bucket first within each token
    for ((token, bucket_start_ms), bucket) in buckets.into_iter().rev() {
        if current_token != Some(token) {
            current_token = Some(token);
            kept = 0;
        }
        if kept >= limit {
            continue;
        }
        kept += 1;

        result.push(BucketedPrice {
            token_address: token.to_string(),
            bucket_start_ms,
            first_timestamp_ms: bucket.first_timestamp_ms,
            price: bucket.sum / f64::from(bucket.count),
        });
    }

    result.sort_by(|a, b| {
        a.token_address
            .cmp(&b.token_address)
            .then(b.bucket_start_ms.cmp(&a.bucket_start_ms))
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Chain;

    const MINUTE_MS: i64 = 60_000;

    fn snapshot(chain: Chain, timestamp: i64, price: f64) -> PriceSnapshot {
        let pool = chain.tracked_pool();
        PriceSnapshot {
            chain,
            exchange: pool.exchange.to_string(),
            pool_address: pool.pool_address.to_string(),
            token_address: pool.token_address.to_string(),
            block_number: 1,
            price,
            timestamp,
        }
    }

    fn token(chain: Chain) -> String {
        chain.tracked_pool().token_address.to_string()
    }

    #[test]
    fn test_interval_widths_and_names() {
        assert_eq!(Interval::FifteenMinutes.width_secs(), 900);
        assert_eq!(Interval::OneHour.width_ms(), 3_600_000);
        assert_eq!(Interval::ThirtyMinutes.pg_interval(), "30 minutes");
        assert_eq!("_1h".parse::<Interval>().unwrap(), Interval::OneHour);
        assert_eq!("15m".parse::<Interval>().unwrap(), Interval::FifteenMinutes);
        assert!("_5m".parse::<Interval>().is_err());
        assert_eq!(Interval::ThirtyMinutes.to_string(), "_30m");
    }

    #[test]
    fn test_round_timestamp_half_up() {
        let interval = Interval::FifteenMinutes;
        // 7.49 minutes into the bucket rounds down, 7.5 rounds up
        assert_eq!(round_timestamp_to_interval(7 * MINUTE_MS + 29_999, interval), 0);
        assert_eq!(round_timestamp_to_interval(7 * MINUTE_MS + 30_000, interval), 900);
        assert_eq!(round_timestamp_to_interval(1_700_000_100_000, interval), 1_700_000_100);
        assert_eq!(round_timestamp_to_interval(1_700_000_549_999, interval), 1_700_000_100);
    }

    #[test]
    fn test_bucket_snapshots_averages_and_limits() {
        let t0 = 1_699_999_200_000; // aligned to 15 minutes
        let snapshots = vec![
            snapshot(Chain::Ethereum, t0 + MINUTE_MS, 1.0),
            snapshot(Chain::Ethereum, t0 + 5 * MINUTE_MS, 3.0),
            snapshot(Chain::Ethereum, t0 + 16 * MINUTE_MS, 5.0),
            snapshot(Chain::Ethereum, t0 + 31 * MINUTE_MS, 7.0),
            snapshot(Chain::Solana, t0 + 2 * MINUTE_MS, 9.0),
        ];
        let tokens = vec![token(Chain::Ethereum), token(Chain::Solana)];

        let buckets = bucket_snapshots(&snapshots, &tokens, Interval::FifteenMinutes, 2);
        let ethereum: Vec<&BucketedPrice> = buckets
            .iter()
            .filter(|b| b.token_address == token(Chain::Ethereum))
            .collect();

        assert_eq!(ethereum.len(), 2);
        assert_eq!(ethereum[0].bucket_start_ms, t0 + 30 * MINUTE_MS);
        assert_eq!(ethereum[0].price, 7.0);
        assert_eq!(ethereum[1].bucket_start_ms, t0 + 15 * MINUTE_MS);
        assert_eq!(ethereum[1].first_timestamp_ms, t0 + 16 * MINUTE_MS);

        let everything = bucket_snapshots(&snapshots, &tokens, Interval::FifteenMinutes, 10);
        let first = everything
            .iter()
            .find(|b| b.token_address == token(Chain::Ethereum) && b.bucket_start_ms == t0)
            .unwrap();
        assert_eq!(first.price, 2.0);
        assert_eq!(first.first_timestamp_ms, t0 + MINUTE_MS);

        let solana: Vec<&BucketedPrice> = everything
            .iter()
            .filter(|b| b.token_address == token(Chain::Solana))
            .collect();
        assert_eq!(solana.len(), 1);
        assert_eq!(solana[0].price, 9.0);
    }

    #[test]
    fn test_bucket_snapshots_ignores_unrequested_tokens() {
        let snapshots = vec![snapshot(Chain::Base, 1_000, 1.0)];
        assert!(bucket_snapshots(&snapshots, &[token(Chain::Ethereum)], Interval::OneHour, 5).is_empty());
        assert!(bucket_snapshots(&[], &[token(Chain::Base)], Interval::OneHour, 5).is_empty());
        assert!(bucket_snapshots(&snapshots, &[token(Chain::Base)], Interval::OneHour, 0).is_empty());
    }

    #[test]
    fn test_buckets_cover_every_snapshot_exactly_once() {
        let interval = Interval::ThirtyMinutes;
        let snapshots: Vec<PriceSnapshot> = (0..50)
            .map(|i| snapshot(Chain::Base, 1_700_000_000_000 + i * 7 * MINUTE_MS, i as f64))
            .collect();
        let buckets = bucket_snapshots(&snapshots, &[token(Chain::Base)], interval, u32::MAX);

        for s in &snapshots {
            let containing: Vec<&BucketedPrice> = buckets
                .iter()
                .filter(|b| {
                    s.timestamp >= b.bucket_start_ms && s.timestamp < b.bucket_start_ms + interval.width_ms()
                })
                .collect();
            assert_eq!(containing.len(), 1);
        }
    }
}
