//! Aggregates maintained by the StakingEscrow bundle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stakeledger_core::entity::Entity;
use stakeledger_core::models::{Address, NULL_ADDRESS};

/// One staking participant.
///
/// Keyed by the staker address (lowercase hex, no prefix). Created on the
/// first event that references the address and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Staker {
    pub id: String,
    /// Locked tokens (NU).
    pub staked: Decimal,
    pub deposited: Decimal,
    pub minted: Decimal,
    pub withdrawn: Decimal,
    pub slashed: Decimal,
    /// Policy fees withdrawn by the node (ETH).
    pub fees_withdrawn: Decimal,
    /// Number of open sub-stakes.
    pub substakes: u64,
    pub restaking: bool,
    pub winding_down: bool,
    pub bonded: bool,
    /// One-way: set by `Migrated`, never cleared.
    pub migrated: bool,
    pub snapshots: bool,
    pub measure_work: bool,
    /// Bonded worker, or [`NULL_ADDRESS`].
    pub worker: Address,
    /// Last period the staker committed to.
    pub last_commitment: u64,
    /// Period until which re-staking is locked.
    pub restake_locked_until: u64,
    /// Minimum fee rate accepted by the node (wei).
    pub min_fee_rate: Decimal,
}

impl Staker {
    /// A staker with default flags and zeroed accumulators.
    pub fn new(address: &Address) -> Self {
        Self {
            id: address.to_key(),
            staked: Decimal::ZERO,
            deposited: Decimal::ZERO,
            minted: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
            slashed: Decimal::ZERO,
            fees_withdrawn: Decimal::ZERO,
            substakes: 0,
            restaking: true,
            winding_down: false,
            bonded: false,
            migrated: false,
            snapshots: true,
            measure_work: false,
            worker: NULL_ADDRESS,
            last_commitment: 0,
            restake_locked_until: 0,
            min_fee_rate: Decimal::ZERO,
        }
    }

    /// Bond a worker; `bonded` tracks whether it is a real address.
    pub fn bond_worker(&mut self, worker: Address) {
        self.worker = worker;
        self.bonded = !worker.is_null();
    }
}

impl Entity for Staker {
    const KIND: &'static str = "Staker";

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Aggregated statistics for one staking period.
///
/// Keyed by the period number as a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub id: String,
    /// Block timestamp of the first commitment observed for the period.
    pub timestamp: i64,
    pub total_staked: Decimal,
    pub active_stakers: u64,
    pub circulating_supply: Decimal,
    pub participation_rate: Decimal,
    pub minted: Decimal,
    pub finalized: bool,
    pub genesis: bool,
}

impl Entity for Period {
    const KIND: &'static str = "Period";

    fn id(&self) -> String {
        self.id.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_staker_defaults() {
        let staker = Staker::new(&Address([0xab; 20]));
        assert_eq!(staker.id, "ab".repeat(20));
        assert!(staker.restaking);
        assert!(staker.snapshots);
        assert!(!staker.winding_down && !staker.bonded && !staker.migrated);
        assert_eq!(staker.worker, NULL_ADDRESS);
        assert_eq!(staker.substakes, 0);
        assert_eq!(staker.staked, Decimal::ZERO);
    }

    #[test]
    fn bonding_null_worker_unbonds() {
        let mut staker = Staker::new(&Address([1; 20]));
        staker.bond_worker(Address([0xab; 20]));
        assert!(staker.bonded);
        staker.bond_worker(NULL_ADDRESS);
        assert!(!staker.bonded);
        assert!(staker.worker.is_null());
    }

    #[test]
    fn staker_json_is_camel_case() {
        let json = serde_json::to_value(Staker::new(&Address([1; 20]))).unwrap();
        assert_eq!(json["windingDown"], false);
        assert_eq!(json["lastCommitment"], 0);
        assert_eq!(json["worker"], "0".repeat(40));
        assert!(json.get("feesWithdrawn").is_some());
    }
}
