//! Handler for the PolicyManager contract.

use async_trait::async_trait;
use tracing::{debug, trace};

use stakeledger_core::error::DomainResult;
use stakeledger_core::models::{checked_add, convert_to_decimal, wei_to_decimal};
use stakeledger_core::ports::{ContractHandler, HandlerContext, RawLog};

use super::models::{FeeRateRange, Policy};
use crate::staking::Staker;
use crate::utils::{parse_address, parse_amount, parse_bytes16, parse_u64, require_field};

/// Handler for the PolicyManager contract.
///
/// Policies are created by `PolicyCreated`; every later policy event must
/// find its record. Fee withdrawals and minimum fee rates are recorded on
/// the node's [`Staker`].
#[derive(Debug, Default)]
pub struct PolicyManagerHandler;

impl PolicyManagerHandler {
    pub fn new() -> Self {
        Self
    }

    fn policy_id(log: &RawLog) -> DomainResult<String> {
        require_field(log, &["policyId"], 0, parse_bytes16).map(|id| Policy::key(&id))
    }

    async fn on_policy_created(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let policy = Policy {
            id: Self::policy_id(log)?,
            sponsor: require_field(log, &["sponsor"], 1, parse_address)?,
            owner: require_field(log, &["owner"], 2, parse_address)?,
            fee_rate: wei_to_decimal(require_field(log, &["feeRate"], 3, parse_amount)?)?,
            start_timestamp: require_field(log, &["startTimestamp"], 4, parse_u64)?,
            end_timestamp: require_field(log, &["endTimestamp"], 5, parse_u64)?,
            nodes: require_field(log, &["numberOfNodes"], 6, parse_u64)?,
            created_block: log.block_number,
            revoked: false,
            revoked_arrangements: 0,
            revoked_value: Default::default(),
            refunded: Default::default(),
        };

        debug!(policy = %policy.id, nodes = policy.nodes, "📜 Policy created");
        ctx.entities.save(&policy)
    }

    async fn on_policy_revoked(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], 2, parse_amount)?)?;
        let mut policy: Policy = ctx.entities.load(&Self::policy_id(log)?).await?;

        policy.revoked = true;
        policy.revoked_value = checked_add(policy.revoked_value, value, "policy.revokedValue")?;
        ctx.entities.save(&policy)
    }

    async fn on_arrangement_revoked(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], 3, parse_amount)?)?;
        let mut policy: Policy = ctx.entities.load(&Self::policy_id(log)?).await?;

        policy.revoked_arrangements += 1;
        policy.revoked_value = checked_add(policy.revoked_value, value, "policy.revokedValue")?;
        ctx.entities.save(&policy)
    }

    async fn on_refund(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
        value_index: usize,
    ) -> DomainResult<()> {
        let value = convert_to_decimal(require_field(log, &["value"], value_index, parse_amount)?)?;
        let mut policy: Policy = ctx.entities.load(&Self::policy_id(log)?).await?;

        policy.refunded = checked_add(policy.refunded, value, "policy.refunded")?;
        ctx.entities.save(&policy)
    }

    async fn on_withdrawn(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        let node = require_field(log, &["node"], 0, parse_address)?;
        let value = convert_to_decimal(require_field(log, &["value"], 2, parse_amount)?)?;

        let mut staker = ctx
            .entities
            .get_or_create(&node.to_key(), || Staker::new(&node))
            .await?;
        staker.fees_withdrawn = checked_add(staker.fees_withdrawn, value, "staker.feesWithdrawn")?;
        ctx.entities.save(&staker)
    }

    async fn on_min_fee_rate_set(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let node = require_field(log, &["node"], 0, parse_address)?;
        let rate = wei_to_decimal(require_field(log, &["value"], 1, parse_amount)?)?;

        let mut staker = ctx
            .entities
            .get_or_create(&node.to_key(), || Staker::new(&node))
            .await?;
        staker.min_fee_rate = rate;
        ctx.entities.save(&staker)
    }

    async fn on_fee_rate_range_set(
        &self,
        log: &RawLog,
        ctx: &mut HandlerContext<'_>,
    ) -> DomainResult<()> {
        let range = FeeRateRange {
            id: FeeRateRange::ID.to_string(),
            setter: require_field(log, &["sender"], 0, parse_address)?,
            min: wei_to_decimal(require_field(log, &["min"], 1, parse_amount)?)?,
            default_value: wei_to_decimal(require_field(log, &["defaultValue"], 2, parse_amount)?)?,
            max: wei_to_decimal(require_field(log, &["max"], 3, parse_amount)?)?,
            updated_block: log.block_number,
        };
        ctx.entities.save(&range)
    }
}

#[async_trait]
impl ContractHandler for PolicyManagerHandler {
    fn contract_name(&self) -> &'static str {
        "PolicyManager"
    }

    async fn handle_event(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()> {
        match log.name.as_str() {
            "PolicyCreated" => self.on_policy_created(log, ctx).await,
            "PolicyRevoked" => self.on_policy_revoked(log, ctx).await,
            "ArrangementRevoked" => self.on_arrangement_revoked(log, ctx).await,
            "RefundForPolicy" => self.on_refund(log, ctx, 2).await,
            "RefundForArrangement" => self.on_refund(log, ctx, 3).await,
            "Withdrawn" => self.on_withdrawn(log, ctx).await,
            "MinFeeRateSet" => self.on_min_fee_rate_set(log, ctx).await,
            "FeeRateRangeSet" => self.on_fee_rate_range_set(log, ctx).await,
            "OwnershipTransferred" | "StateVerified" | "UpgradeFinished" => {
                trace!(event = %log.name, "Audit-only event");
                Ok(())
            }
            other => {
                debug!(event = other, "Unhandled PolicyManager event");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rust_decimal_macros::dec;
    use serde_json::{Value, json};

    use stakeledger_core::entity::{Entity, EntityCache};
    use stakeledger_core::error::DomainError;
    use stakeledger_core::models::{
        Address, BlockHash, EventRecord, IndexerCursor, Transaction, TxHash, make_event_id,
    };
    use stakeledger_core::ports::{EventData, RawTransaction, Repositories};
    use stakeledger_storage::MemoryRepositories;

    const POLICY_ID: &str = "0x0102030405060708090a0b0c0d0e0f10";
    const NODE: Address = Address([0x0d; 20]);

    fn log(index: u32, name: &str, params: Value) -> RawLog {
        RawLog {
            block_number: 500,
            block_hash: BlockHash([5; 32]),
            block_timestamp: 1_625_000_000,
            log_index: index,
            contract: "PolicyManager".into(),
            address: Address([0xcc; 20]),
            name: name.into(),
            params,
            transaction: RawTransaction {
                hash: TxHash([index as u8; 32]),
                from: Address([0x01; 20]),
                to: None,
                gas_used: 0,
                gas_price: 0,
            },
        }
    }

    /// Handle one log and commit its changes.
    async fn apply(repos: &MemoryRepositories, log: RawLog) -> DomainResult<()> {
        let tx = Transaction {
            id: log.transaction.hash.to_hex(),
            block_number: log.block_number,
            timestamp: log.block_timestamp,
            gas_used: 0,
            gas_price: 0,
            from: log.transaction.from,
            to: None,
        };
        let mut ctx = HandlerContext::new(tx, EntityCache::new(repos.entities()));
        PolicyManagerHandler::new().handle_event(&log, &mut ctx).await?;

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
        let changes = ctx.entities.into_changes();
        repos
            .persist_event_atomic(EventData {
                changes: &changes,
                record: &record,
                cursor: &cursor,
            })
            .await?;
        Ok(())
    }

    async fn load<T: Entity>(repos: &MemoryRepositories, id: &str) -> T {
        EntityCache::new(repos.entities()).load(id).await.unwrap()
    }

    fn created() -> Value {
        json!({
            "policyId": POLICY_ID,
            "sponsor": Address([0x5a; 20]).to_hex(),
            "owner": Address([0x0a; 20]).to_hex(),
            "feeRate": "50000000000",
            "startTimestamp": 1_625_000_000u64,
            "endTimestamp": 1_630_000_000u64,
            "numberOfNodes": 3
        })
    }

    #[tokio::test]
    async fn policy_lifecycle() {
        let repos = MemoryRepositories::new();
        apply(&repos, log(1, "PolicyCreated", created())).await.unwrap();

        let policy: Policy = load(&repos, POLICY_ID).await;
        assert_eq!(policy.fee_rate, dec!(50000000000));
        assert_eq!(policy.nodes, 3);
        assert_eq!(policy.created_block, 500);
        assert!(!policy.revoked);

        apply(
            &repos,
            log(2, "ArrangementRevoked", json!({
                "policyId": POLICY_ID, "sender": NODE.to_hex(), "node": NODE.to_hex(),
                "value": "250000000000000000"
            })),
        )
        .await
        .unwrap();
        apply(
            &repos,
            log(3, "RefundForPolicy", json!({
                "policyId": POLICY_ID, "sender": NODE.to_hex(), "value": "100000000000000000"
            })),
        )
        .await
        .unwrap();
        apply(
            &repos,
            log(4, "PolicyRevoked", json!({
                "policyId": POLICY_ID, "sender": NODE.to_hex(), "value": "500000000000000000"
            })),
        )
        .await
        .unwrap();

        let policy: Policy = load(&repos, POLICY_ID).await;
        assert!(policy.revoked);
        assert_eq!(policy.revoked_arrangements, 1);
        assert_eq!(policy.revoked_value, dec!(0.75));
        assert_eq!(policy.refunded, dec!(0.1));
    }

    #[tokio::test]
    async fn revoking_unknown_policy_is_fatal() {
        let repos = MemoryRepositories::new();
        let err = apply(
            &repos,
            log(1, "PolicyRevoked", json!({
                "policyId": POLICY_ID, "sender": NODE.to_hex(), "value": "1"
            })),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DomainError::EntityNotFound { kind: "Policy", .. }));
        assert_eq!(repos.event_count().await, 0);
    }

    #[tokio::test]
    async fn node_fees_land_on_staker() {
        let repos = MemoryRepositories::new();
        apply(
            &repos,
            log(1, "Withdrawn", json!({
                "node": NODE.to_hex(), "recipient": NODE.to_hex(), "value": "2000000000000000000"
            })),
        )
        .await
        .unwrap();
        apply(
            &repos,
            log(2, "MinFeeRateSet", json!({"node": NODE.to_hex(), "value": "40000000000"})),
        )
        .await
        .unwrap();

        let staker: Staker = load(&repos, &NODE.to_key()).await;
        assert_eq!(staker.fees_withdrawn, dec!(2));
        assert_eq!(staker.min_fee_rate, dec!(40000000000));
        assert!(staker.restaking);
    }

    #[tokio::test]
    async fn fee_rate_range_is_a_singleton() {
        let repos = MemoryRepositories::new();
        for (index, max) in [(1, "100"), (2, "200")] {
            apply(
                &repos,
                log(index, "FeeRateRangeSet", json!({
                    "sender": NODE.to_hex(), "min": "1", "defaultValue": "10", "max": max
                })),
            )
            .await
            .unwrap();
        }

        let range: FeeRateRange = load(&repos, FeeRateRange::ID).await;
        assert_eq!(range.max, dec!(200));
        assert_eq!(range.default_value, dec!(10));
        assert_eq!(repos.entity_count().await, 1);
    }
}
