//! Typed Ethereum JSON-RPC calls.
//!
//! The free functions build validated [`RpcCall`]s with the right cacheability: reads of
//! settled state are cacheable, anything asked of the `pending` block is not, and chain-head
//! figures such as the block number or gas price always go to the network. The `RpcClient`
//! methods below run those calls and decode the results.

use crate::call::RpcCall;
use crate::client::RpcClient;
use crate::error::RpcError;
use serde_json::{json, Value};
use std::fmt;

/// Block selector accepted by state-reading methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    #[default]
    Latest,
    Earliest,
    Pending,
    Safe,
    Finalized,
    Number(u64),
}

impl BlockTag {
    pub fn to_param(self) -> Value {
        Value::String(self.to_string())
    }

    /// Results for the pending block change with the mempool and are never cached.
    pub fn is_cacheable(self) -> bool {
        self != BlockTag::Pending
    }
}

impl fmt::Display for BlockTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Earliest => f.write_str("earliest"),
            BlockTag::Pending => f.write_str("pending"),
            BlockTag::Safe => f.write_str("safe"),
            BlockTag::Finalized => f.write_str("finalized"),
            BlockTag::Number(n) => write!(f, "{n:#x}"),
        }
    }
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        BlockTag::Number(number)
    }
}

/// Check the shape of an address (`0x` followed by 40 hex digits) and normalize it to lowercase.
pub fn validate_address(address: &str) -> Result<String, RpcError> {
    let trimmed = address.trim();
    let invalid = |reason: String| {
        tracing::debug!(address = %trimmed, "Rejected invalid address");
        RpcError::Validation(format!("invalid address '{trimmed}': {reason}"))
    };
    let digits = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| invalid("must start with '0x'".into()))?;
    if trimmed.len() != 42 {
        return Err(invalid(format!("must be 42 characters long (got {})", trimmed.len())));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid("contains non-hex characters".into()));
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// Decode a JSON-RPC quantity (`"0x1a"`).
pub fn parse_quantity(value: &Value) -> Result<u128, String> {
    let text = value.as_str().ok_or_else(|| format!("expected hex string, got {value}"))?;
    let digits = text.strip_prefix("0x").ok_or_else(|| format!("missing 0x prefix in {text:?}"))?;
    if digits.is_empty() {
        return Err("empty quantity".into());
    }
    u128::from_str_radix(digits, 16).map_err(|e| format!("bad quantity {text:?}: {e}"))
}

fn parse_bytes(value: &Value) -> Result<Vec<u8>, String> {
    let text = value.as_str().ok_or_else(|| format!("expected hex string, got {value}"))?;
    let digits = text.strip_prefix("0x").ok_or_else(|| format!("missing 0x prefix in {text:?}"))?;
    hex::decode(digits).map_err(|e| format!("bad hex data: {e}"))
}

pub fn chain_id() -> RpcCall {
    RpcCall::read("eth_chainId", json!([]))
}

pub fn block_number() -> RpcCall {
    RpcCall::read("eth_blockNumber", json!([])).with_cacheable(false)
}

pub fn gas_price() -> RpcCall {
    RpcCall::read("eth_gasPrice", json!([])).with_cacheable(false)
}

pub fn get_balance(address: &str, block: BlockTag) -> Result<RpcCall, RpcError> {
    let address = validate_address(address)?;
    Ok(RpcCall::read("eth_getBalance", json!([address, block.to_param()]))
        .with_cacheable(block.is_cacheable()))
}

pub fn get_transaction_count(address: &str, block: BlockTag) -> Result<RpcCall, RpcError> {
    let address = validate_address(address)?;
    Ok(RpcCall::read("eth_getTransactionCount", json!([address, block.to_param()]))
        .with_cacheable(block.is_cacheable()))
}

pub fn get_code(address: &str, block: BlockTag) -> Result<RpcCall, RpcError> {
    let address = validate_address(address)?;
    Ok(RpcCall::read("eth_getCode", json!([address, block.to_param()]))
        .with_cacheable(block.is_cacheable()))
}

pub fn get_block_by_number(block: BlockTag, full_transactions: bool) -> RpcCall {
    RpcCall::read("eth_getBlockByNumber", json!([block.to_param(), full_transactions]))
        .with_cacheable(block.is_cacheable())
}

/// Broadcast a signed transaction. A write: never cached, never resent once it may have left.
pub fn send_raw_transaction(raw: &str) -> Result<RpcCall, RpcError> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Validation("raw transaction must start with '0x'".into()))?;
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(RpcError::Validation("raw transaction must be non-empty, even-length hex".into()));
    }
    Ok(RpcCall::write("eth_sendRawTransaction", json!([raw])))
}

fn quantity_u64(value: &Value) -> Result<u64, String> {
    let n = parse_quantity(value)?;
    u64::try_from(n).map_err(|_| format!("{n} overflows u64"))
}

impl RpcClient {
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.execute_decoded(&chain_id(), quantity_u64).await
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        self.execute_decoded(&block_number(), quantity_u64).await
    }

    /// Legacy gas price in wei.
    pub async fn gas_price(&self) -> Result<u128, RpcError> {
        self.execute_decoded(&gas_price(), parse_quantity).await
    }

    /// Balance in wei.
    pub async fn balance(&self, address: &str, block: BlockTag) -> Result<u128, RpcError> {
        self.execute_decoded(&get_balance(address, block)?, parse_quantity).await
    }

    /// Nonce of `address`. Use [`BlockTag::Pending`] to include pending transactions.
    pub async fn transaction_count(&self, address: &str, block: BlockTag) -> Result<u64, RpcError> {
        self.execute_decoded(&get_transaction_count(address, block)?, quantity_u64).await
    }

    pub async fn code(&self, address: &str) -> Result<Vec<u8>, RpcError> {
        self.execute_decoded(&get_code(address, BlockTag::Latest)?, parse_bytes).await
    }

    pub async fn is_contract(&self, address: &str) -> Result<bool, RpcError> {
        Ok(!self.code(address).await?.is_empty())
    }

    /// Raw block JSON, or `None` when the node does not know the block.
    pub async fn block(
        &self,
        block: BlockTag,
        full_transactions: bool,
    ) -> Result<Option<Value>, RpcError> {
        let call = get_block_by_number(block, full_transactions);
        self.execute_decoded(&call, |value| Ok((!value.is_null()).then(|| value.clone()))).await
    }

    /// Base fee of the latest block, 0 before EIP-1559 or when the node omits it.
    pub async fn base_fee(&self) -> Result<u128, RpcError> {
        let call = get_block_by_number(BlockTag::Latest, false);
        self.execute_decoded(&call, |block| match block.get("baseFeePerGas") {
            None | Some(Value::Null) => Ok(0),
            Some(fee) => parse_quantity(fee),
        })
        .await
    }

    /// Broadcast a signed transaction and return its hash.
    pub async fn send_raw_transaction(&self, raw: &str) -> Result<String, RpcError> {
        self.execute_decoded(&send_raw_transaction(raw)?, |value| {
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("expected transaction hash, got {value}"))
        })
        .await
    }
}
