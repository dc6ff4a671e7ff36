//! PolicyManager handler bundle.
//!
//! # Indexed Events
//!
//! - `PolicyManager::PolicyCreated`, `PolicyRevoked`, `ArrangementRevoked`
//! - `PolicyManager::RefundForPolicy`, `RefundForArrangement`
//! - `PolicyManager::Withdrawn`, `MinFeeRateSet` - recorded on the node's Staker
//! - `PolicyManager::FeeRateRangeSet`
//!
//! # Entities
//!
//! - `Policy` - keyed by policy id, exposed as the `policies` view
//! - `FeeRateRange` - singleton

mod handler;
pub mod models;

use std::sync::Arc;

use stakeledger_core::ports::ContractHandler;

use crate::HandlerBundle;

pub use handler::PolicyManagerHandler;
pub use models::{FeeRateRange, Policy};

pub const MIGRATIONS: &[&str] = &[
    // Migration 0: policies view
    r#"
CREATE OR REPLACE VIEW policies AS
SELECT
    id,
    data->>'sponsor' AS sponsor,
    data->>'owner' AS owner,
    (data->>'feeRate')::NUMERIC AS fee_rate,
    TO_TIMESTAMP((data->>'startTimestamp')::BIGINT) AS start_time,
    TO_TIMESTAMP((data->>'endTimestamp')::BIGINT) AS end_time,
    (data->>'nodes')::BIGINT AS nodes,
    (data->>'createdBlock')::BIGINT AS created_block,
    (data->>'revoked')::BOOLEAN AS revoked,
    (data->>'revokedArrangements')::BIGINT AS revoked_arrangements,
    (data->>'revokedValue')::NUMERIC AS revoked_value,
    (data->>'refunded')::NUMERIC AS refunded,
    updated_block
FROM entities
WHERE kind = 'Policy';
"#,
];

/// Handler bundle for the PolicyManager contract.
#[derive(Debug, Default)]
pub struct PolicyBundle;

impl PolicyBundle {
    pub fn new() -> Self {
        Self
    }
}

impl HandlerBundle for PolicyBundle {
    fn name(&self) -> &'static str {
        "policy"
    }

    fn handlers(&self) -> Vec<Arc<dyn ContractHandler>> {
        vec![Arc::new(PolicyManagerHandler::new())]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        50
    }

    fn entity_kinds(&self) -> &'static [&'static str] {
        &["Policy", "FeeRateRange", "Staker"]
    }
}
