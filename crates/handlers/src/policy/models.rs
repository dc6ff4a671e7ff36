//! Aggregates maintained by the PolicyManager bundle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stakeledger_core::entity::Entity;
use stakeledger_core::models::Address;

/// A re-encryption policy.
///
/// Keyed by the 16-byte policy id as `0x` hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub sponsor: Address,
    pub owner: Address,
    /// Fee rate per node per period (wei).
    pub fee_rate: Decimal,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub nodes: u64,
    pub created_block: u64,
    pub revoked: bool,
    pub revoked_arrangements: u64,
    /// ETH returned by revocations.
    pub revoked_value: Decimal,
    /// ETH refunded for inactive periods.
    pub refunded: Decimal,
}

impl Policy {
    /// Policy id key: `0x` followed by the 16 id bytes in hex.
    pub fn key(policy_id: &[u8; 16]) -> String {
        format!("0x{}", hex::encode(policy_id))
    }
}

impl Entity for Policy {
    const KIND: &'static str = "Policy";

    fn id(&self) -> String {
        self.id.clone()
    }
}

/// Global fee rate bounds; a single record keyed [`FeeRateRange::ID`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeRateRange {
    pub id: String,
    pub min: Decimal,
    pub default_value: Decimal,
    pub max: Decimal,
    pub setter: Address,
    pub updated_block: u64,
}

impl FeeRateRange {
    pub const ID: &'static str = "current";
}

impl Entity for FeeRateRange {
    const KIND: &'static str = "FeeRateRange";

    fn id(&self) -> String {
        self.id.clone()
    }
}
