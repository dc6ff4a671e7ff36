//! Port trait for read-only contract calls.
//!
//! Used to refresh derived fields that cannot be reconstructed from event
//! deltas alone. Every read is pinned to the block of the event being
//! processed so a replay sees the same values.

use async_trait::async_trait;

use crate::error::ChainResult;
use crate::models::Address;

/// Subset of `StakingEscrow.stakerInfo(address)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StakerInfo {
    /// Staked value in wei.
    pub value: u128,
    pub current_committed_period: u64,
    pub next_committed_period: u64,
}

/// Read-only StakingEscrow state.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// `previousPeriodSupply()`: circulating supply in wei.
    async fn previous_period_supply(&self, block: u64) -> ChainResult<u128>;

    /// `getSubStakesLength(staker)`.
    async fn sub_stakes_length(&self, staker: &Address, block: u64) -> ChainResult<u64>;

    /// `stakerInfo(staker)`.
    async fn staker_info(&self, staker: &Address, block: u64) -> ChainResult<StakerInfo>;
}
