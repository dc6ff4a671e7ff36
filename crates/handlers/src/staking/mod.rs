//! StakingEscrow handler bundle.
//!
//! Projects StakingEscrow events into per-staker aggregates and per-period
//! statistics.
//!
//! # Indexed Events
//!
//! - `StakingEscrow::Locked`, `Divided`, `Merged` - sub-stake bookkeeping
//! - `StakingEscrow::CommitmentMade` - period accumulation and finalization
//! - `StakingEscrow::Deposited`, `Withdrawn`, `Minted`, `Slashed`
//! - `StakingEscrow::ReStakeSet`, `WindDownSet`, `SnapshotSet`, ... - flags
//!
//! # Entities
//!
//! - `Staker` - keyed by address, exposed as the `stakers` view
//! - `Period` - keyed by period number, exposed as the `periods` view
//!
//! # Usage
//!
//! ```ignore
//! use stakeledger_handlers::{StakingBundle, StakingConfig};
//!
//! let bundle = StakingBundle::new(chain_state, StakingConfig::default());
//! registry.register(Box::new(bundle));
//! ```

mod handler;
pub mod models;
pub mod period;

use std::sync::Arc;

use stakeledger_core::ports::{ChainState, ContractHandler};

use crate::HandlerBundle;

pub use handler::{StakingConfig, StakingEscrowHandler};
pub use models::{Period, Staker};
pub use period::{PeriodClock, finalization_target};

/// Typed views over the shared entity table.
pub const MIGRATIONS: &[&str] = &[
    // Migration 0: stakers view
    r#"
CREATE OR REPLACE VIEW stakers AS
SELECT
    id,
    (data->>'staked')::NUMERIC AS staked,
    (data->>'deposited')::NUMERIC AS deposited,
    (data->>'minted')::NUMERIC AS minted,
    (data->>'withdrawn')::NUMERIC AS withdrawn,
    (data->>'slashed')::NUMERIC AS slashed,
    (data->>'feesWithdrawn')::NUMERIC AS fees_withdrawn,
    (data->>'substakes')::BIGINT AS substakes,
    (data->>'restaking')::BOOLEAN AS restaking,
    (data->>'windingDown')::BOOLEAN AS winding_down,
    (data->>'bonded')::BOOLEAN AS bonded,
    (data->>'migrated')::BOOLEAN AS migrated,
    (data->>'snapshots')::BOOLEAN AS snapshots,
    (data->>'measureWork')::BOOLEAN AS measure_work,
    data->>'worker' AS worker,
    (data->>'lastCommitment')::BIGINT AS last_commitment,
    (data->>'restakeLockedUntil')::BIGINT AS restake_locked_until,
    (data->>'minFeeRate')::NUMERIC AS min_fee_rate,
    updated_block
FROM entities
WHERE kind = 'Staker';
"#,
    // Migration 1: periods view
    r#"
CREATE OR REPLACE VIEW periods AS
SELECT
    id::BIGINT AS number,
    TO_TIMESTAMP((data->>'timestamp')::BIGINT) AS timestamp,
    (data->>'totalStaked')::NUMERIC AS total_staked,
    (data->>'activeStakers')::BIGINT AS active_stakers,
    (data->>'circulatingSupply')::NUMERIC AS circulating_supply,
    (data->>'participationRate')::NUMERIC AS participation_rate,
    (data->>'minted')::NUMERIC AS minted,
    (data->>'finalized')::BOOLEAN AS finalized,
    (data->>'genesis')::BOOLEAN AS genesis,
    updated_block
FROM entities
WHERE kind = 'Period';
"#,
];

/// Handler bundle for the StakingEscrow contract.
pub struct StakingBundle {
    chain: Arc<dyn ChainState>,
    config: StakingConfig,
}

impl StakingBundle {
    /// Create a new staking bundle reading live state from `chain`.
    pub fn new(chain: Arc<dyn ChainState>, config: StakingConfig) -> Self {
        Self { chain, config }
    }
}

impl HandlerBundle for StakingBundle {
    fn name(&self) -> &'static str {
        "staking"
    }

    fn handlers(&self) -> Vec<Arc<dyn ContractHandler>> {
        vec![Arc::new(StakingEscrowHandler::new(
            self.chain.clone(),
            self.config,
        ))]
    }

    fn migrations(&self) -> &'static [&'static str] {
        MIGRATIONS
    }

    fn priority(&self) -> i32 {
        // Policy handlers also write Staker records
        100
    }

    fn entity_kinds(&self) -> &'static [&'static str] {
        &["Staker", "Period", "Transaction"]
    }
}
