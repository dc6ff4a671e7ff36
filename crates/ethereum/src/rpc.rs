//! StakingEscrow state reads over Ethereum JSON-RPC (`eth_call`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use sha3::{Digest, Keccak256};
use tracing::{instrument, trace, warn};

use stakeledger_core::error::{ChainError, ChainResult};
use stakeledger_core::metrics::record_chain_call;
use stakeledger_core::models::Address;
use stakeledger_core::ports::{ChainState, StakerInfo};

/// Configuration for the JSON-RPC client.
#[derive(Debug, Clone)]
pub struct RpcChainStateConfig {
    /// HTTP(S) endpoint of an archive node.
    pub rpc_url: String,
    /// Deployed StakingEscrow (dispatcher) address.
    pub staking_escrow: Address,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RpcChainStateConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            staking_escrow: Address([0; 20]),
            timeout: Duration::from_secs(10),
        }
    }
}

/// JSON-RPC adapter implementing the ChainState port.
///
/// Calls are made at the block of the event being processed, so the node
/// must serve historical state.
pub struct RpcChainState {
    client: Client,
    config: RpcChainStateConfig,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl RpcChainState {
    pub fn new(config: RpcChainStateConfig) -> ChainResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            config,
            next_id: AtomicU64::new(1),
        })
    }

    /// `eth_call` against StakingEscrow at `block`, returning the raw result bytes.
    #[instrument(skip(self, calldata))]
    async fn call(&self, method: &'static str, calldata: Vec<u8>, block: u64) -> ChainResult<Vec<u8>> {
        let result = self.request(method, calldata, block).await;
        record_chain_call(method, if result.is_ok() { "ok" } else { "error" });
        if let Err(e) = &result {
            warn!(method, block, error = %e, "⚠️  Contract call failed");
        }
        result
    }

    async fn request(&self, method: &'static str, calldata: Vec<u8>, block: u64) -> ChainResult<Vec<u8>> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "eth_call",
            "params": [
                {
                    "to": self.config.staking_escrow.to_hex(),
                    "data": format!("0x{}", hex::encode(&calldata)),
                },
                format!("0x{:x}", block),
            ],
        });

        let response = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ChainError::RpcError(format!("HTTP {}: {}", status, text)));
        }

        let response: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        if let Some(err) = response.error {
            return Err(ChainError::RpcError(format!("{} ({})", err.message, err.code)));
        }
        let result = response
            .result
            .ok_or_else(|| ChainError::RpcError("response without result".to_string()))?;

        trace!(method, bytes = result.len(), "Call returned");
        let hex_str = result.strip_prefix("0x").unwrap_or(&result);
        hex::decode(hex_str).map_err(|e| ChainError::CallDecodeError {
            method,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl ChainState for RpcChainState {
    async fn previous_period_supply(&self, block: u64) -> ChainResult<u128> {
        const METHOD: &str = "previousPeriodSupply";
        let data = self.call(METHOD, encode_call("previousPeriodSupply()", None), block).await?;
        decode_uint(METHOD, &data, 0)
    }

    async fn sub_stakes_length(&self, staker: &Address, block: u64) -> ChainResult<u64> {
        const METHOD: &str = "getSubStakesLength";
        let data = self
            .call(METHOD, encode_call("getSubStakesLength(address)", Some(staker)), block)
            .await?;
        narrow(METHOD, decode_uint(METHOD, &data, 0)?)
    }

    async fn staker_info(&self, staker: &Address, block: u64) -> ChainResult<StakerInfo> {
        const METHOD: &str = "stakerInfo";
        let data = self
            .call(METHOD, encode_call("stakerInfo(address)", Some(staker)), block)
            .await?;

        Ok(StakerInfo {
            value: decode_uint(METHOD, &data, 0)?,
            current_committed_period: narrow(METHOD, decode_uint(METHOD, &data, 1)?)?,
            next_committed_period: narrow(METHOD, decode_uint(METHOD, &data, 2)?)?,
        })
    }
}

// =============================================================================
// ABI helpers
// =============================================================================

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Calldata for a call taking no arguments or a single address.
fn encode_call(signature: &str, address: Option<&Address>) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    if let Some(address) = address {
        data.extend_from_slice(&[0u8; 12]);
        data.extend_from_slice(address.as_bytes());
    }
    data
}

/// Decode the `word`-th 32-byte return slot as a uint256 that must fit u128.
fn decode_uint(method: &'static str, data: &[u8], word: usize) -> ChainResult<u128> {
    let start = word * 32;
    let slot = data.get(start..start + 32).ok_or_else(|| ChainError::CallDecodeError {
        method,
        message: format!("expected at least {} bytes, got {}", start + 32, data.len()),
    })?;

    let (high, low) = slot.split_at(16);
    if high.iter().any(|b| *b != 0) {
        return Err(ChainError::CallDecodeError {
            method,
            message: format!("word {} exceeds u128", word),
        });
    }

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(low);
    Ok(u128::from_be_bytes(bytes))
}

fn narrow(method: &'static str, value: u128) -> ChainResult<u64> {
    u64::try_from(value).map_err(|_| ChainError::CallDecodeError {
        method,
        message: format!("{} exceeds u64", value),
    })
}
