use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::IndexerError;
use crate::sources::fetch_json;
use crate::utils::value_to_f64;

/// Latest market figures of the tracked token.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketQuote {
    pub price: f64,
    pub circulating_supply: f64,
    pub volume_24h: f64,
}

/// Source of USD reference prices.
#[async_trait]
pub trait ReferencePriceSource: Send + Sync {
    /// USD price of a native asset, by ticker symbol (`ETH`, `SOL`).
    async fn native_price_usd(&self, symbol: &str) -> anyhow::Result<f64>;

    /// Quote of the tracked token.
    async fn market_quote(&self) -> anyhow::Result<MarketQuote>;
}

/// CoinMarketCap Pro API client.
#[derive(Clone)]
pub struct CoinMarketCapClient {
    http: Client,
    base_url: String,
    api_key: String,
    token_id: u64,
}

impl CoinMarketCapClient {
    pub fn new(http: Client, base_url: String, api_key: String, token_id: u64) -> Self {
        Self {
            http,
            base_url,
            api_key,
            token_id,
        }
    }

    async fn get(&self, path_and_query: &str, what: &str) -> anyhow::Result<Value> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path_and_query);
        let request = self
            .http
            .get(url)
            .header("accept", "application/json")
            .header("X-CMC_PRO_API_KEY", &self.api_key);

        fetch_json(request, what).await
    }
}

#[async_trait]
impl ReferencePriceSource for CoinMarketCapClient {
    async fn native_price_usd(&self, symbol: &str) -> anyhow::Result<f64> {
        let body = self
            .get(
                &format!("/v1/cryptocurrency/quotes/latest?symbol={}", symbol),
                "coinmarketcap symbol quote",
            )
            .await?;

        Ok(parse_symbol_price(&body, symbol)?)
    }

    async fn market_quote(&self) -> anyhow::Result<MarketQuote> {
        let body = self
            .get(
                &format!("/v2/cryptocurrency/quotes/latest?id={}", self.token_id),
                "coinmarketcap token quote",
            )
            .await?;

        Ok(parse_market_quote(&body, self.token_id)?)
    }
}

fn parse_symbol_price(body: &Value, symbol: &str) -> Result<f64, IndexerError> {
    let pointer = format!("/data/{}/quote/USD/price", symbol);
    body.pointer(&pointer)
        .and_then(value_to_f64)
        .filter(|price| *price > 0.0)
        .ok_or_else(|| {
            IndexerError::derivation(
                format!("{} reference price", symbol),
                "quote.USD.price is missing or not positive",
            )
        })
}

fn parse_market_quote(body: &Value, token_id: u64) -> Result<MarketQuote, IndexerError> {
    let context = format!("market quote {}", token_id);
    let entry = body
        .pointer(&format!("/data/{}", token_id))
        .ok_or_else(|| IndexerError::derivation(context.clone(), "token is missing from response"))?;

    let read = |pointer: &str| {
        entry.pointer(pointer).and_then(value_to_f64).ok_or_else(|| {
            IndexerError::derivation(context.clone(), format!("{} is missing", pointer))
        })
    };

    Ok(MarketQuote {
        price: read("/quote/USD/price")?,
        circulating_supply: read("/circulating_supply")?,
        // Volume may legitimately be null for a quiet day
        volume_24h: entry
            .pointer("/quote/USD/volume_24h")
            .and_then(value_to_f64)
            .unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_symbol_price() {
        let body = json!({ "data": { "ETH": { "quote": { "USD": { "price": 2512.34 } } } } });
        assert_eq!(parse_symbol_price(&body, "ETH").unwrap(), 2512.34);
        assert!(parse_symbol_price(&body, "SOL").is_err());
    }

    #[test]
    fn test_zero_symbol_price_is_rejected() {
        let body = json!({ "data": { "SOL": { "quote": { "USD": { "price": 0 } } } } });
        assert!(matches!(
            parse_symbol_price(&body, "SOL"),
            Err(IndexerError::Derivation { .. })
        ));
    }

    #[test]
    fn test_parse_market_quote() {
        let body = json!({
            "data": {
                "11823": {
                    "circulating_supply": 1500000000.5,
                    "quote": { "USD": { "price": 0.05, "volume_24h": null } }
                }
            }
        });
        let quote = parse_market_quote(&body, 11823).unwrap();
        assert_eq!(quote.price, 0.05);
        assert_eq!(quote.circulating_supply, 1500000000.5);
        assert_eq!(quote.volume_24h, 0.0);
    }
}
