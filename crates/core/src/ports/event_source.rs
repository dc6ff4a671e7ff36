//! Port trait for the decoded event feed.
//!
//! The host decodes contract logs (name + named parameters) and delivers them
//! in ledger order. Implementations live in the infrastructure layer
//! (e.g., `stakeledger-ethereum`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::ChainResult;
use crate::models::{Address, BlockHash, LogPosition, TxHash};

/// Transaction that emitted a log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Transaction hash.
    pub hash: TxHash,
    /// Sender.
    pub from: Address,
    /// Receiver (None for contract creation).
    #[serde(default)]
    pub to: Option<Address>,
    /// Gas used by the transaction.
    #[serde(default)]
    pub gas_used: u64,
    /// Gas price in wei.
    #[serde(default)]
    pub gas_price: u64,
}

/// A decoded contract event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    /// Block number.
    pub block_number: u64,
    /// Block hash.
    pub block_hash: BlockHash,
    /// Block timestamp (unix seconds).
    pub block_timestamp: i64,
    /// Log index within the block.
    pub log_index: u32,
    /// Data source name the log belongs to (e.g. "StakingEscrow").
    pub contract: String,
    /// Emitting contract address.
    pub address: Address,
    /// Event name (e.g. "Locked").
    pub name: String,
    /// Decoded parameters keyed by ABI name.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Emitting transaction.
    pub transaction: RawTransaction,
}

impl RawLog {
    /// Ledger position of this log.
    pub fn position(&self) -> LogPosition {
        LogPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    /// Block timestamp as a UTC datetime.
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.block_timestamp, 0).unwrap_or_default()
    }
}

/// Stream of decoded logs in ledger order.
pub type LogStream = Pin<Box<dyn Stream<Item = ChainResult<RawLog>> + Send>>;

/// Port trait for the decoded event feed.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Identifier of the chain the feed belongs to.
    fn chain_id(&self) -> &str;

    /// Stream logs strictly after `after` (or from the start).
    async fn subscribe(&self, after: Option<LogPosition>) -> ChainResult<LogStream>;
}
