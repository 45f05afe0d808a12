use crate::db::models::MarketDataSnapshot;
use crate::indexer::derivation::market_cap;
use crate::sources::MarketQuote;

/// Starting extremes used before any market data has been stored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MarketSeeds {
    pub all_time_high: Option<f64>,
    pub all_time_low: Option<f64>,
}

/// Next market data row from the latest quote.
///
/// All-time extremes only widen: the high is the max of the previous high
/// (or seed) and the quoted price, the low the min.
pub fn next_market_snapshot(
    quote: &MarketQuote,
    previous: Option<&MarketDataSnapshot>,
    seeds: MarketSeeds,
    timestamp_ms: i64,
) -> MarketDataSnapshot {
    let (high, low) = match previous {
        Some(previous) => (Some(previous.all_time_high), Some(previous.all_time_low)),
        None => (seeds.all_time_high, seeds.all_time_low),
    };

    MarketDataSnapshot {
        all_time_high: high.map_or(quote.price, |high| high.max(quote.price)),
        all_time_low: low.map_or(quote.price, |low| low.min(quote.price)),
        circulating_supply: quote.circulating_supply,
        day_volume: quote.volume_24h,
        market_cap: market_cap(quote.price, quote.circulating_supply),
        price: quote.price,
        timestamp: timestamp_ms,
    }
}
