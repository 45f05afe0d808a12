use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::db::models::Chain;
use crate::error::IndexerError;
use crate::sources::{fetch_json, HolderSource};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoldersResponse {
    total_holders: Option<i64>,
}

/// Holder counts from the Moralis token analytics API.
#[derive(Clone)]
pub struct HolderClient {
    http: Client,
    evm_url: String,
    solana_url: String,
    api_key: String,
}

impl HolderClient {
    pub fn new(http: Client, evm_url: String, solana_url: String, api_key: String) -> Self {
        Self {
            http,
            evm_url,
            solana_url,
            api_key,
        }
    }

    fn holders_url(&self, chain: Chain, token_address: &str) -> String {
        match chain {
            Chain::Ethereum => format!(
                "{}/erc20/{}/holders?chain=eth",
                self.evm_url.trim_end_matches('/'),
                token_address
            ),
            Chain::Base => format!(
                "{}/erc20/{}/holders?chain=base",
                self.evm_url.trim_end_matches('/'),
                token_address
            ),
            Chain::Solana => format!(
                "{}/token/mainnet/holders/{}",
                self.solana_url.trim_end_matches('/'),
                token_address
            ),
        }
    }
}

#[async_trait]
impl HolderSource for HolderClient {
    async fn total_holders(&self, chain: Chain, token_address: &str) -> anyhow::Result<i64> {
        let request = self
            .http
            .get(self.holders_url(chain, token_address))
            .header("accept", "application/json")
            .header("X-API-Key", &self.api_key);

        let response: HoldersResponse = fetch_json(request, "holder count").await?;

        let holders = response.total_holders.ok_or_else(|| {
            IndexerError::derivation(
                format!("{} holder count", chain),
                "totalHolders is missing",
            )
        })?;

        Ok(holders)
    }
}
