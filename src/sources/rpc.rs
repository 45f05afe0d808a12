use std::str::FromStr;

use alloy::eips::BlockNumberOrTag;
use alloy::primitives::Address;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::abis::IERC20;
use crate::error::IndexerError;
use crate::indexer::ChainHead;
use crate::sources::{fetch_json, ChainRpc};

/// EVM chain access through an alloy HTTP provider.
#[derive(Clone)]
pub struct EvmRpc {
    provider: DynProvider,
    token: Address,
}

impl EvmRpc {
    pub fn new(rpc_url: &str, token_address: &str) -> anyhow::Result<Self> {
        let url = Url::parse(rpc_url).with_context(|| format!("Invalid RPC URL: {}", rpc_url))?;
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(url));
        let token = Address::from_str(token_address)
            .with_context(|| format!("Invalid token address: {}", token_address))?;

        Ok(Self { provider, token })
    }
}

#[async_trait]
impl ChainRpc for EvmRpc {
    async fn head(&self, lag: u64) -> anyhow::Result<ChainHead> {
        let latest = self
            .provider
            .get_block_number()
            .await
            .context("eth_blockNumber failed")?;
        let number = latest.saturating_sub(lag);

        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(number))
            .await
            .with_context(|| format!("eth_getBlockByNumber({}) failed", number))?
            .ok_or_else(|| anyhow!("block {} not available yet", number))?;

        Ok(ChainHead {
            block_or_slot: number,
            timestamp_ms: block.header.timestamp as i64 * 1000,
        })
    }

    /// Raw ERC-20 `totalSupply` of the tracked token.
    async fn total_supply(&self) -> anyhow::Result<u128> {
        let supply = IERC20::new(self.token, self.provider.clone())
            .totalSupply()
            .call()
            .await
            .context("totalSupply call failed")?;

        let supply = u128::try_from(supply).map_err(|_| {
            IndexerError::derivation("totalSupply", format!("{} does not fit in u128", supply))
        })?;

        Ok(supply)
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct TokenSupply {
    value: TokenAmount,
}

#[derive(Deserialize)]
struct TokenAmount {
    amount: String,
}

/// Solana JSON-RPC access over plain HTTP.
#[derive(Clone)]
pub struct SolanaRpc {
    http: Client,
    url: String,
    mint: String,
}

impl SolanaRpc {
    pub fn new(http: Client, url: String, mint: String) -> Self {
        Self { http, url, mint }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> anyhow::Result<Option<T>> {
        let request = self.http.post(&self.url).json(&RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        });

        let response: RpcResponse<T> = fetch_json(request, method).await?;

        if let Some(error) = response.error {
            return Err(anyhow!("{} failed ({}): {}", method, error.code, error.message));
        }
        Ok(response.result)
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    /// Slot `lag` slots behind the confirmed tip, with its block time in ms.
    async fn head(&self, lag: u64) -> anyhow::Result<ChainHead> {
        let latest: u64 = self
            .call("getSlot", json!([{ "commitment": "confirmed" }]))
            .await?
            .ok_or_else(|| anyhow!("getSlot returned no result"))?;
        let slot = latest.saturating_sub(lag);

        let block_time: i64 = self
            .call("getBlockTime", json!([slot]))
            .await?
            .ok_or_else(|| anyhow!("block time unavailable for slot {}", slot))?;

        Ok(ChainHead {
            block_or_slot: slot,
            timestamp_ms: block_time * 1000,
        })
    }

    /// Raw SPL supply of the tracked mint.
    async fn total_supply(&self) -> anyhow::Result<u128> {
        let supply: TokenSupply = self
            .call("getTokenSupply", json!([self.mint]))
            .await?
            .ok_or_else(|| anyhow!("getTokenSupply returned no result"))?;

        let amount = u128::from_str(supply.value.amount.trim()).map_err(|e| {
            IndexerError::derivation(
                "token supply",
                format!("invalid amount {:?}: {}", supply.value.amount, e),
            )
        })?;

        Ok(amount)
    }
}
