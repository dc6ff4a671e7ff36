//! Ethereum adapters for the stakeledger indexer.
//!
//! This crate implements two ports from `stakeledger-core`:
//!
//! - [`ChainState`] over JSON-RPC `eth_call`, pinned to the block of the
//!   event being processed
//! - [`EventSource`] over a JSON-lines feed of decoded contract logs
//!
//! # Usage
//!
//! ```ignore
//! use stakeledger_ethereum::{FeedConfig, JsonlEventSource, RpcChainState, RpcChainStateConfig};
//!
//! let chain = RpcChainState::new(RpcChainStateConfig {
//!     rpc_url: "http://localhost:8545".to_string(),
//!     staking_escrow,
//!     ..Default::default()
//! })?;
//! let source = JsonlEventSource::new(FeedConfig {
//!     path: "events.jsonl".into(),
//!     follow: true,
//!     ..Default::default()
//! });
//! ```
//!
//! [`ChainState`]: stakeledger_core::ports::ChainState
//! [`EventSource`]: stakeledger_core::ports::EventSource

mod feed;
mod rpc;

pub use feed::{FeedConfig, JsonlEventSource};
pub use rpc::{RpcChainState, RpcChainStateConfig, selector};
