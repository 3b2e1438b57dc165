//! Ethereum JSON-RPC payloads.

use serde::{Deserialize, Serialize};

const WEI_PER_ETH: f64 = 1e18;

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_quantity(text: &str) -> Option<u128> {
    let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
    if digits.is_empty() {
        return None;
    }
    u128::from_str_radix(digits, 16).ok()
}

pub fn wei_to_eth(wei: u128) -> f64 {
    wei as f64 / WEI_PER_ETH
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    pub nonce: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub gas: Option<String>,
    #[serde(default)]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub input: String,
}

impl Transaction {
    pub fn value_wei(&self) -> Option<u128> {
        parse_quantity(&self.value)
    }

    /// `None` while still pending.
    pub fn block(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_quantity).map(|b| b as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    pub block_number: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gas_used: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl TransactionReceipt {
    /// Post-Byzantium receipts report `0x1` on success.
    pub fn succeeded(&self) -> bool {
        self.status.as_deref().and_then(parse_quantity) == Some(1)
    }

    pub fn block(&self) -> Option<u64> {
        parse_quantity(&self.block_number).map(|b| b as u64)
    }
}
