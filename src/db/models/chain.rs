use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Chains that carry a pool for the tracked token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Base,
    Ethereum,
    Solana,
}

/// Static addresses of the tracked pool on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedPool {
    pub exchange: &'static str,
    pub pool_address: &'static str,
    pub token_address: &'static str,
    /// Pool creation time, unix seconds.
    pub created_at: i64,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Base, Chain::Ethereum, Chain::Solana];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Base => "base",
            Chain::Ethereum => "ethereum",
            Chain::Solana => "solana",
        }
    }

    /// Symbol of the native asset used to convert pool prices to USD.
    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Base | Chain::Ethereum => "ETH",
            Chain::Solana => "SOL",
        }
    }

    /// Blocks (slots on Solana) to stay behind the head so that the
    /// upstream indexers have caught up with the block we query at.
    pub fn block_lag(&self) -> u64 {
        match self {
            Chain::Base => 2,
            Chain::Ethereum => 1,
            Chain::Solana => 20,
        }
    }

    pub fn tracked_pool(&self) -> TrackedPool {
        match self {
            Chain::Base => TrackedPool {
                exchange: "aerodrome",
                pool_address: "0x32bb4ad5fed77f7abf97d1435f8d6aaae59aa64e",
                token_address: "0x764a726d9ced0433a8d7643335919deb03a9a935",
                created_at: 1724361475,
            },
            Chain::Ethereum => TrackedPool {
                exchange: "uniswap_v2",
                pool_address: "0xa7fd8ff8f4cada298286d3006ee8f9c11e2ff84e",
                token_address: "0x67f4c72a50f8df6487720261e188f2abe83f57d7",
                created_at: 1696841963,
            },
            Chain::Solana => TrackedPool {
                exchange: "orca_whirlpool",
                pool_address: "5qJCeYWzvkrKuD1r7bQDus8ffm2vjrunxNUht6NTeise",
                token_address: "6CAsXfiCXZfP8APCG6Vma2DFMindopxiqYQN4LSQfhoC",
                created_at: 1724398200,
            },
        }
    }

    /// Reverse lookup from a stored token address.
    pub fn from_token_address(token_address: &str) -> Option<Chain> {
        Chain::ALL
            .into_iter()
            .find(|chain| chain.tracked_pool().token_address.eq_ignore_ascii_case(token_address))
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base" => Ok(Chain::Base),
            "ethereum" => Ok(Chain::Ethereum),
            "solana" => Ok(Chain::Solana),
            other => Err(anyhow::anyhow!("Unknown chain: {}", other)),
        }
    }
}
