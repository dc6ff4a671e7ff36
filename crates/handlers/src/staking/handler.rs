//! Handler for the StakingEscrow contract.
//!
//! Each event loads or creates the Staker it names, applies one mutation
//! and stages the save. `CommitmentMade` additionally drives the Period
//! state machine.
//!
//! # Supported Events
//!
//! - `Locked`, `Divided`, `Merged`: sub-stake bookkeeping
//! - `Deposited`, `Withdrawn`, `Minted`, `Slashed`: monetary accumulators
//! - `CommitmentMade`: last commitment and period accumulation
//! - `ReStakeSet`, `ReStakeLocked`, `WindDownSet`, `SnapshotSet`,
//!   `WorkMeasurementSet`, `WorkerBonded`, `Migrated`: configuration

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use stakeledger_core::error::DomainResult;
use stakeledger_core::metrics::record_period_finalized;
use stakeledger_core::models::{Address, checked_add, convert_to_decimal};
use stakeledger_core::ports::{ChainState, ContractHandler, HandlerContext, RawLog};

use super::models::{Period, Staker};
use super::period::{PeriodClock, finalization_target};
use crate::utils::{
    optional_field, parse_address, parse_amount, parse_bool, parse_u64, require_field,
};

// =============================================================================
// Configuration
// =============================================================================

/// Optional live chain-state reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct StakingConfig {
    /// On `CommitmentMade`, overwrite `staked` with `stakerInfo(staker).value`.
    pub refresh_staked_on_commitment: bool,
    /// After `Locked`/`Divided`/`Merged`, overwrite `substakes` with
    /// `getSubStakesLength(staker)`.
    pub reconcile_substakes: bool,
}

// =============================================================================
// Handler
// =============================================================================

/// Handler for the StakingEscrow contract.
pub struct StakingEscrowHandler {
    chain: Arc<dyn ChainState>,
    config: StakingConfig,
    clock: PeriodClock,
}

impl StakingEscrowHandler {
    pub fn new(chain: Arc<dyn ChainState>, config: StakingConfig) -> Self {
        Self {
            chain,
            config,
            clock: PeriodClock::default(),
        }
    }

    /// Staker address of an event: the `staker` parameter, or the
    /// transaction sender when the event does not carry one.
    fn staker_address(&self, log: &RawLog, ctx: &HandlerContext<'_>) -> DomainResult<Address> {
        Ok(optional_field(log, &["staker"], 0, parse_address)?.unwrap_or(ctx.transaction.from))
    }

    async fn load_staker(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<Staker> {
        let address = self.staker_address(log, ctx)?;
        ctx.entities
            .get_or_create(&address.to_key(), || Staker::new(&address))
            .await
    }

    /// Period targeted by an event: the `period` parameter, or the period
    /// containing the block timestamp.
    fn period_of(&self, log: &RawLog) -> DomainResult<u64> {
        Ok(optional_field(log, &["period"], 1, parse_u64)?
            .unwrap_or_else(|| self.clock.period_at(log.block_timestamp)))
    }

    /// Replace `substakes` with the live sub-stake count, if configured.
    async fn reconcile_substakes(
        &self,
        staker: &mut Staker,
        log: &RawLog,
        ctx: &HandlerContext<'_>,
    ) -> DomainResult<()> {
        if !self.config.reconcile_substakes {
            return Ok(());
        }
        let address = self.staker_address(log, ctx)?;
        let live = self.chain.sub_stakes_length(&address, log.block_number).await?;
        if live != staker.substakes {
            debug!(
                staker = %staker.id,
                counted = staker.substakes,
                live,
                "Reconciled sub-stake count"
            );
        }
        staker.substakes = live;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Sub-stakes
    // -------------------------------------------------------------------------

    async fn on_locked(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], 1, parse_amount)?)?;
        let mut staker = self.load_staker(log, ctx).await?;

        staker.substakes += 1;
        staker.staked = checked_add(staker.staked, value, "staker.staked")?;
        self.reconcile_substakes(&mut staker, log, ctx).await?;

        ctx.entities.save(&staker)
    }

    async fn on_divided(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let mut staker = self.load_staker(log, ctx).await?;

        staker.substakes += 1;
        self.reconcile_substakes(&mut staker, log, ctx).await?;

        ctx.entities.save(&staker)
    }

    async fn on_merged(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let mut staker = self.load_staker(log, ctx).await?;

        match staker.substakes.checked_sub(1) {
            Some(n) => staker.substakes = n,
            None => warn!(
                staker = %staker.id,
                position = %log.position(),
                "⚠️  Merge without open sub-stakes, keeping count at 0"
            ),
        }
        self.reconcile_substakes(&mut staker, log, ctx).await?;

        ctx.entities.save(&staker)
    }

    // -------------------------------------------------------------------------
    // Accumulators
    // -------------------------------------------------------------------------

    async fn on_deposited(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], 1, parse_amount)?)?;
        let mut staker = self.load_staker(log, ctx).await?;
        staker.deposited = checked_add(staker.deposited, value, "staker.deposited")?;
        ctx.entities.save(&staker)
    }

    async fn on_withdrawn(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], 1, parse_amount)?)?;
        let mut staker = self.load_staker(log, ctx).await?;
        staker.withdrawn = checked_add(staker.withdrawn, value, "staker.withdrawn")?;
        ctx.entities.save(&staker)
    }

    async fn on_slashed(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let penalty = convert_to_decimal(require_field(log, &["penalty"], 1, parse_amount)?)?;
        let mut staker = self.load_staker(log, ctx).await?;
        staker.slashed = checked_add(staker.slashed, penalty, "staker.slashed")?;
        ctx.entities.save(&staker)
    }

    async fn on_minted(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], 2, parse_amount)?)?;
        let period_number = self.period_of(log)?;

        let mut staker = self.load_staker(log, ctx).await?;
        staker.minted = checked_add(staker.minted, value, "staker.minted")?;
        ctx.entities.save(&staker)?;

        // Minting is only attributed to periods that saw commitments
        if let Some(mut period) = ctx.entities.get::<Period>(&period_number.to_string()).await? {
            period.minted = checked_add(period.minted, value, "period.minted")?;
            ctx.entities.save(&period)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Commitments & periods
    // -------------------------------------------------------------------------

    async fn on_commitment_made(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let period_number = self.period_of(log)?;
        let value = convert_to_decimal(require_field(log, &["value"], 2, parse_amount)?)?;

        let mut staker = self.load_staker(log, ctx).await?;
        staker.last_commitment = period_number;
        if self.config.refresh_staked_on_commitment {
            let address = self.staker_address(log, ctx)?;
            let info = self.chain.staker_info(&address, log.block_number).await?;
            staker.staked = convert_to_decimal(info.value)?;
        }
        ctx.entities.save(&staker)?;

        let id = period_number.to_string();
        let mut period = match ctx.entities.get::<Period>(&id).await? {
            Some(period) => period,
            None => {
                debug!(period = period_number, "📅 Opening period");
                let period = Period::open(period_number, log.block_timestamp);
                if let Some(target) = finalization_target(period_number) {
                    self.finalize_period(target, log, ctx).await?;
                }
                period
            }
        };

        period.record_commitment(value)?;
        ctx.entities.save(&period)
    }

    /// Finalize a period if it exists and is still open.
    async fn finalize_period(
        &self,
        number: u64,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<bool> {
        let Some(mut period) = ctx.entities.get::<Period>(&number.to_string()).await? else {
            trace!(period = number, "No period to finalize");
            return Ok(false);
        };
        if period.finalized {
            trace!(period = number, "Period already finalized");
            return Ok(false);
        }

        let supply = self.chain.previous_period_supply(log.block_number).await?;
        period.finalize(convert_to_decimal(supply)?)?;
        ctx.entities.save(&period)?;

        record_period_finalized();
        info!(
            period = number,
            total_staked = %period.total_staked,
            circulating_supply = %period.circulating_supply,
            participation_rate = %period.participation_rate,
            "🏁 Period finalized"
        );
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Configuration flags
    // -------------------------------------------------------------------------

    async fn set_flag(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
        key: &str,
        apply: fn(&mut Staker, bool),
    ) -> DomainResult<()> {
        let flag = require_field(log, &[key], 1, parse_bool)?;
        let mut staker = self.load_staker(log, ctx).await?;
        apply(&mut staker, flag);
        ctx.entities.save(&staker)
    }

    async fn on_restake_locked(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let until = require_field(log, &["lockUntilPeriod"], 1, parse_u64)?;
        let mut staker = self.load_staker(log, ctx).await?;
        staker.restake_locked_until = until;
        ctx.entities.save(&staker)
    }

    async fn on_worker_bonded(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let worker = require_field(log, &["worker"], 1, parse_address)?;
        let mut staker = self.load_staker(log, ctx).await?;
        staker.bond_worker(worker);
        ctx.entities.save(&staker)
    }

    async fn on_migrated(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let mut staker = self.load_staker(log, ctx).await?;
        staker.migrated = true;
        ctx.entities.save(&staker)
    }
}

#[async_trait]
impl ContractHandler for StakingEscrowHandler {
    fn contract_name(&self) -> &'static str {
        "StakingEscrow"
    }

    async fn handle_event(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        match log.name.as_str() {
            "Locked" => self.on_locked(log, ctx).await,
            "Divided" => self.on_divided(log, ctx).await,
            "Merged" => self.on_merged(log, ctx).await,
            "Deposited" => self.on_deposited(log, ctx).await,
            "Withdrawn" => self.on_withdrawn(log, ctx).await,
            "Slashed" => self.on_slashed(log, ctx).await,
            "Minted" => self.on_minted(log, ctx).await,
            "CommitmentMade" => self.on_commitment_made(log, ctx).await,
            "ReStakeSet" => {
                self.set_flag(log, ctx, "reStake", |s, v| s.restaking = v)
                    .await
            }
            "WindDownSet" => {
                self.set_flag(log, ctx, "windDown", |s, v| s.winding_down = v)
                    .await
            }
            "SnapshotSet" => {
                self.set_flag(log, ctx, "snapshotsEnabled", |s, v| s.snapshots = v)
                    .await
            }
            "WorkMeasurementSet" => {
                self.set_flag(log, ctx, "measureWork", |s, v| s.measure_work = v)
                    .await
            }
            "ReStakeLocked" => self.on_restake_locked(log, ctx).await,
            "WorkerBonded" => self.on_worker_bonded(log, ctx).await,
            "Migrated" => self.on_migrated(log, ctx).await,
            "Prolonged" | "Donated" | "Initialized" | "OwnershipTransferred"
            | "StateVerified" | "UpgradeFinished" => {
                trace!(event = %log.name, "Audit-only event");
                Ok(())
            }
            other => {
                debug!(event = other, "Unhandled StakingEscrow event");
                Ok(())
            }
        }
    }

    fn priority(&self) -> i32 {
        100
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;

    use stakeledger_core::entity::{ChangeSet, EntityCache};
    use stakeledger_core::error::{ChainResult, DomainError};
    use stakeledger_core::models::{
        BlockHash, EventRecord, IndexerCursor, NULL_ADDRESS, Transaction, TxHash, make_event_id,
    };
    use stakeledger_core::ports::{EventData, RawTransaction, Repositories, StakerInfo};
    use stakeledger_storage::MemoryRepositories;

    const WEI: u128 = 1_000_000_000_000_000_000;
    const ALICE: Address = Address([0xa1; 20]);

    /// Chain state with fixed answers and a call log.
    #[derive(Default)]
    struct FixedChain {
        supply: u128,
        substakes: u64,
        staked: u128,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl ChainState for FixedChain {
        async fn previous_period_supply(&self, _block: u64) -> ChainResult<u128> {
            self.calls.lock().unwrap().push("previousPeriodSupply");
            Ok(self.supply)
        }
        async fn sub_stakes_length(&self, _staker: &Address, _block: u64) -> ChainResult<u64> {
            self.calls.lock().unwrap().push("getSubStakesLength");
            Ok(self.substakes)
        }
        async fn staker_info(&self, _staker: &Address, _block: u64) -> ChainResult<StakerInfo> {
            self.calls.lock().unwrap().push("stakerInfo");
            Ok(StakerInfo {
                value: self.staked,
                ..Default::default()
            })
        }
    }

    struct Harness {
        repos: MemoryRepositories,
        chain: Arc<FixedChain>,
        handler: StakingEscrowHandler,
        next_index: u32,
    }

    impl Harness {
        fn new(chain: FixedChain, config: StakingConfig) -> Self {
            let chain = Arc::new(chain);
            Self {
                repos: MemoryRepositories::new(),
                handler: StakingEscrowHandler::new(chain.clone(), config),
                chain,
                next_index: 0,
            }
        }

        /// Apply one event and commit its changes.
        async fn apply(&mut self, name: &str, params: serde_json::Value) -> DomainResult<ChangeSet> {
            self.next_index += 1;
            let log = RawLog {
                block_number: 100 + self.next_index as u64,
                block_hash: BlockHash([1; 32]),
                block_timestamp: 1_620_000_000,
                log_index: self.next_index,
                contract: "StakingEscrow".into(),
                address: Address([0xee; 20]),
                name: name.into(),
                params,
                transaction: RawTransaction {
                    hash: TxHash([self.next_index as u8; 32]),
                    from: ALICE,
                    to: Some(Address([0xee; 20])),
                    gas_used: 0,
                    gas_price: 0,
                },
            };
            let tx = Transaction {
                id: log.transaction.hash.to_hex(),
                block_number: log.block_number,
                timestamp: log.block_timestamp,
                gas_used: 0,
                gas_price: 0,
                from: ALICE,
                to: None,
            };

            let mut ctx = HandlerContext::new(tx, EntityCache::new(self.repos.entities()));
            self.handler.handle_event(&log, &mut ctx).await?;
            let changes = ctx.entities.into_changes();

            let record = EventRecord {
                id: make_event_id(&log.transaction.hash, log.log_index),
                contract: log.contract.clone(),
                name: log.name.clone(),
                block_number: log.block_number,
                block_hash: log.block_hash,
                timestamp: log.timestamp(),
                tx_hash: log.transaction.hash,
                log_index: log.log_index,
                address: log.address,
                params: log.params.clone(),
            };
            let cursor = IndexerCursor {
                chain_id: "test".into(),
                position: log.position(),
                updated_at: log.timestamp(),
            };
            self.repos
                .persist_event_atomic(EventData {
                    changes: &changes,
                    record: &record,
                    cursor: &cursor,
                })
                .await
                .unwrap();
            Ok(changes)
        }

        async fn staker(&self, address: &Address) -> Staker {
            EntityCache::new(self.repos.entities())
                .load(&address.to_key())
                .await
                .unwrap()
        }

        async fn period(&self, number: u64) -> Option<Period> {
            EntityCache::new(self.repos.entities())
                .get(&number.to_string())
                .await
                .unwrap()
        }
    }

    fn wei(tokens: u128) -> String {
        (tokens * WEI).to_string()
    }

    fn staker_param() -> String {
        ALICE.to_hex()
    }

    fn chain() -> FixedChain {
        FixedChain {
            supply: 1_000 * WEI,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn two_locks_accumulate_stake_and_substakes() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        h.apply("Locked", json!({"staker": staker_param(), "value": wei(100), "firstPeriod": 1, "periods": 10}))
            .await
            .unwrap();
        h.apply("Locked", json!({"staker": staker_param(), "value": wei(50), "firstPeriod": 1, "periods": 10}))
            .await
            .unwrap();

        let staker = h.staker(&ALICE).await;
        assert_eq!(staker.staked, dec!(150));
        assert_eq!(staker.substakes, 2);
    }

    #[tokio::test]
    async fn substakes_follow_lock_divide_merge() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();
        h.apply("Locked", json!({"staker": s, "value": wei(10)})).await.unwrap();
        h.apply("Divided", json!({"staker": s, "oldValue": wei(10), "newValue": wei(4)}))
            .await
            .unwrap();
        h.apply("Locked", json!({"staker": s, "value": wei(1)})).await.unwrap();
        h.apply("Merged", json!({"staker": s, "value1": wei(4), "value2": wei(1)}))
            .await
            .unwrap();

        // 2 locks + 1 divide - 1 merge
        assert_eq!(h.staker(&ALICE).await.substakes, 2);
    }

    #[tokio::test]
    async fn events_before_any_lock_create_the_staker() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        h.apply("Merged", json!({"staker": staker_param()})).await.unwrap();
        h.apply("Divided", json!({"staker": staker_param()})).await.unwrap();

        let staker = h.staker(&ALICE).await;
        // Merge on zero stays at zero, then divide adds one
        assert_eq!(staker.substakes, 1);
        assert!(staker.restaking);
    }

    #[tokio::test]
    async fn positional_payload_keys_on_the_staker_param() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let bob = Address([0xb0; 20]);
        h.apply("Locked", json!([bob.to_hex(), wei(100), 1, 10])).await.unwrap();
        h.apply("CommitmentMade", json!([bob.to_hex(), 7, wei(100)])).await.unwrap();

        let staker = h.staker(&bob).await;
        assert_eq!(staker.staked, dec!(100));
        assert_eq!(staker.last_commitment, 7);
        assert_eq!(h.period(7).await.unwrap().total_staked, dec!(100));

        // The sender gets nothing
        let sender: Option<Staker> = EntityCache::new(h.repos.entities())
            .get(&ALICE.to_key())
            .await
            .unwrap();
        assert!(sender.is_none());
    }

    #[tokio::test]
    async fn missing_staker_param_falls_back_to_sender() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        h.apply("Deposited", json!({"value": wei(7)})).await.unwrap();
        assert_eq!(h.staker(&ALICE).await.deposited, dec!(7));
    }

    #[tokio::test]
    async fn accumulators_add_event_values() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();
        h.apply("Deposited", json!({"staker": s, "value": wei(5), "periods": 4})).await.unwrap();
        h.apply("Withdrawn", json!({"staker": s, "value": wei(2)})).await.unwrap();
        h.apply("Slashed", json!({"staker": s, "penalty": wei(1), "investigator": s, "reward": "0"}))
            .await
            .unwrap();
        h.apply("Minted", json!({"staker": s, "period": 2_700, "value": wei(3)}))
            .await
            .unwrap();

        let staker = h.staker(&ALICE).await;
        assert_eq!(staker.deposited, dec!(5));
        assert_eq!(staker.withdrawn, dec!(2));
        assert_eq!(staker.slashed, dec!(1));
        assert_eq!(staker.minted, dec!(3));
        // No commitments for 2700, so no period record was created
        assert!(h.period(2_700).await.is_none());
    }

    #[tokio::test]
    async fn worker_bonding_tracks_null_address() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let worker = Address([0xab; 20]);

        h.apply("WorkerBonded", json!({"staker": staker_param(), "worker": worker.to_hex(), "startPeriod": 1}))
            .await
            .unwrap();
        let staker = h.staker(&ALICE).await;
        assert!(staker.bonded);
        assert_eq!(staker.worker.to_key(), "ab".repeat(20));

        h.apply("WorkerBonded", json!({"staker": staker_param(), "worker": NULL_ADDRESS.to_hex(), "startPeriod": 2}))
            .await
            .unwrap();
        assert!(!h.staker(&ALICE).await.bonded);
    }

    #[tokio::test]
    async fn flag_events_overwrite_fields() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();
        h.apply("ReStakeSet", json!({"staker": s, "reStake": false})).await.unwrap();
        h.apply("WindDownSet", json!({"staker": s, "windDown": true})).await.unwrap();
        h.apply("SnapshotSet", json!({"staker": s, "snapshotsEnabled": false})).await.unwrap();
        h.apply("WorkMeasurementSet", json!({"staker": s, "measureWork": true})).await.unwrap();
        h.apply("ReStakeLocked", json!({"staker": s, "lockUntilPeriod": 2_800})).await.unwrap();
        h.apply("Migrated", json!({"staker": s, "period": 2_675})).await.unwrap();

        let staker = h.staker(&ALICE).await;
        assert!(!staker.restaking);
        assert!(staker.winding_down);
        assert!(!staker.snapshots);
        assert!(staker.measure_work);
        assert_eq!(staker.restake_locked_until, 2_800);
        assert!(staker.migrated);
    }

    #[tokio::test]
    async fn commitment_opens_period_and_finalizes_n_minus_two() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();

        h.apply("CommitmentMade", json!({"staker": s, "period": 8, "value": wei(250)}))
            .await
            .unwrap();
        h.apply("CommitmentMade", json!({"staker": s, "period": 10, "value": wei(100)}))
            .await
            .unwrap();

        let ten = h.period(10).await.unwrap();
        assert_eq!(ten.total_staked, dec!(100));
        assert_eq!(ten.active_stakers, 1);
        assert_eq!(ten.timestamp, 1_620_000_000);
        assert!(!ten.finalized);

        let eight = h.period(8).await.unwrap();
        assert!(eight.finalized);
        assert_eq!(eight.circulating_supply, dec!(1000));
        assert_eq!(eight.participation_rate, dec!(0.25));

        assert_eq!(h.staker(&ALICE).await.last_commitment, 10);
    }

    #[tokio::test]
    async fn period_total_is_sum_of_commitments() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let bob = Address([0xb0; 20]).to_hex();

        h.apply("CommitmentMade", json!({"staker": staker_param(), "period": 5, "value": wei(30)}))
            .await
            .unwrap();
        h.apply("CommitmentMade", json!({"staker": bob, "period": 5, "value": wei(12)}))
            .await
            .unwrap();
        h.apply("CommitmentMade", json!({"staker": bob, "period": 6, "value": wei(1)}))
            .await
            .unwrap();

        let five = h.period(5).await.unwrap();
        assert_eq!(five.total_staked, dec!(42));
        assert_eq!(five.active_stakers, 2);
        assert_eq!(h.period(6).await.unwrap().total_staked, dec!(1));
    }

    #[tokio::test]
    async fn finalization_reads_supply_once() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();
        h.apply("CommitmentMade", json!({"staker": s, "period": 3, "value": "0"}))
            .await
            .unwrap();
        h.apply("CommitmentMade", json!({"staker": s, "period": 5, "value": "0"}))
            .await
            .unwrap();
        let first = h.period(3).await.unwrap();

        // Period 5 already exists: no new finalization
        h.apply("CommitmentMade", json!({"staker": s, "period": 5, "value": "0"}))
            .await
            .unwrap();
        assert_eq!(h.period(3).await.unwrap(), first);
        assert_eq!(first.participation_rate, Decimal::ZERO);
        assert!(first.finalized);

        let calls = h.chain.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["previousPeriodSupply"]);
    }

    #[tokio::test]
    async fn minted_accrues_to_existing_period() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();
        h.apply("CommitmentMade", json!({"staker": s, "period": 9, "value": wei(1)}))
            .await
            .unwrap();
        h.apply("Minted", json!({"staker": s, "period": 9, "value": wei(2)}))
            .await
            .unwrap();
        h.apply("Minted", json!({"staker": s, "period": 9, "value": wei(3)}))
            .await
            .unwrap();

        assert_eq!(h.period(9).await.unwrap().minted, dec!(5));
    }

    #[tokio::test]
    async fn commitment_without_period_uses_clock() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        h.apply("CommitmentMade", json!({"staker": staker_param(), "value": wei(1)}))
            .await
            .unwrap();

        // 1_620_000_000 is after the migration: weekly periods
        let expected = PeriodClock::default().period_at(1_620_000_000);
        assert_eq!(expected, 2_678);
        assert!(h.period(expected).await.is_some());
    }

    #[tokio::test]
    async fn live_reads_when_configured() {
        let chain = FixedChain {
            supply: 1_000 * WEI,
            substakes: 7,
            staked: 900 * WEI,
            ..Default::default()
        };
        let config = StakingConfig {
            refresh_staked_on_commitment: true,
            reconcile_substakes: true,
        };
        let mut h = Harness::new(chain, config);
        let s = staker_param();

        h.apply("Locked", json!({"staker": s, "value": wei(1)})).await.unwrap();
        assert_eq!(h.staker(&ALICE).await.substakes, 7);

        h.apply("CommitmentMade", json!({"staker": s, "period": 4, "value": wei(1)}))
            .await
            .unwrap();
        assert_eq!(h.staker(&ALICE).await.staked, dec!(900));
    }

    #[tokio::test]
    async fn malformed_payload_is_fatal_and_commits_nothing() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let err = h
            .apply("Locked", json!({"staker": staker_param(), "value": "lots"}))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::DecodingError(_)));
        assert_eq!(h.repos.entity_count().await, 0);
    }

    #[tokio::test]
    async fn get_or_create_keeps_persisted_values() {
        let mut h = Harness::new(chain(), StakingConfig::default());
        let s = staker_param();
        h.apply("Locked", json!({"staker": s, "value": wei(10)})).await.unwrap();
        let before = h.staker(&ALICE).await;

        // An audit-only event neither creates nor resets anything
        let changes = h.apply("Prolonged", json!({"staker": s, "value": wei(10)})).await.unwrap();
        assert!(changes.is_empty());
        assert_eq!(h.staker(&ALICE).await, before);
    }
}
