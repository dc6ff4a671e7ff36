//! End-to-end replay of decoded logs through the indexer service.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal_macros::dec;
use serde_json::{Value, json};

use stakeledger_core::entity::EntityCache;
use stakeledger_core::error::{ChainError, ChainResult, DomainError, IndexerError};
use stakeledger_core::models::{Address, BlockHash, LogPosition, Transaction, TxHash};
use stakeledger_core::ports::{
    ChainState, EventSource, LogStream, RawLog, RawTransaction, Repositories, StakerInfo,
};
use stakeledger_core::services::{IndexerConfig, IndexerService};
use stakeledger_handlers::staking::{Period, Staker};
use stakeledger_handlers::{BundleRegistry, PolicyBundle, StakingBundle, StakingConfig};
use stakeledger_storage::MemoryRepositories;

const WEI: u128 = 1_000_000_000_000_000_000;
const STAKER: Address = Address([0x5e; 20]);

// =============================================================================
// Fixtures
// =============================================================================

/// Finite feed replaying a fixed list of logs.
struct VecSource {
    logs: Mutex<Vec<RawLog>>,
    /// Index of a log preceded by an entry the feed cannot decode.
    corrupt_before: Option<usize>,
}

impl VecSource {
    fn new(logs: Vec<RawLog>) -> Self {
        Self {
            logs: Mutex::new(logs),
            corrupt_before: None,
        }
    }

    fn with_corrupt_entry(logs: Vec<RawLog>, before: usize) -> Self {
        Self {
            logs: Mutex::new(logs),
            corrupt_before: Some(before),
        }
    }

    fn push(&self, log: RawLog) {
        self.logs.lock().unwrap().push(log);
    }
}

#[async_trait]
impl EventSource for VecSource {
    fn chain_id(&self) -> &str {
        "mainnet"
    }

    async fn subscribe(&self, after: Option<LogPosition>) -> ChainResult<LogStream> {
        let mut items: Vec<ChainResult<RawLog>> = Vec::new();
        for (i, log) in self.logs.lock().unwrap().iter().enumerate() {
            if after.is_some_and(|after| log.position() <= after) {
                continue;
            }
            if self.corrupt_before == Some(i) {
                items.push(Err(ChainError::FeedDecodeError {
                    line: i as u64 + 1,
                    message: "invalid type: string \"0x5208\", expected u64".into(),
                }));
            }
            items.push(Ok(log.clone()));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

struct FixedSupply(u128);

#[async_trait]
impl ChainState for FixedSupply {
    async fn previous_period_supply(&self, _block: u64) -> ChainResult<u128> {
        Ok(self.0)
    }
    async fn sub_stakes_length(&self, _staker: &Address, _block: u64) -> ChainResult<u64> {
        Ok(0)
    }
    async fn staker_info(&self, _staker: &Address, _block: u64) -> ChainResult<StakerInfo> {
        Ok(StakerInfo::default())
    }
}

fn log(block: u64, index: u32, contract: &str, name: &str, params: Value) -> RawLog {
    RawLog {
        block_number: block,
        block_hash: BlockHash([block as u8; 32]),
        block_timestamp: 1_620_000_000 + block as i64 * 12,
        log_index: index,
        contract: contract.into(),
        address: Address([0xee; 20]),
        name: name.into(),
        params,
        transaction: RawTransaction {
            hash: TxHash([block as u8; 32]),
            from: STAKER,
            to: Some(Address([0xee; 20])),
            gas_used: 21_000,
            gas_price: 30_000_000_000,
        },
    }
}

fn staking(block: u64, index: u32, name: &str, params: Value) -> RawLog {
    log(block, index, "StakingEscrow", name, params)
}

fn wei(tokens: u128) -> String {
    (tokens * WEI).to_string()
}

fn indexer(
    source: Arc<VecSource>,
    repos: Arc<MemoryRepositories>,
) -> IndexerService<VecSource, MemoryRepositories> {
    let mut bundles = BundleRegistry::new();
    bundles.register(Box::new(StakingBundle::new(
        Arc::new(FixedSupply(2_000 * WEI)),
        StakingConfig::default(),
    )));
    bundles.register(Box::new(PolicyBundle::new()));

    IndexerService::new(
        IndexerConfig {
            chain_id: "mainnet".into(),
            ..Default::default()
        },
        source,
        repos,
        Arc::new(bundles.into_handler_registry()),
    )
}

async fn run(service: &IndexerService<VecSource, MemoryRepositories>) -> Result<(), IndexerError> {
    let (_tx, rx) = tokio::sync::watch::channel(false);
    service.run(rx).await
}

async fn staker(repos: &MemoryRepositories) -> Staker {
    EntityCache::new(repos.entities())
        .load(&STAKER.to_key())
        .await
        .unwrap()
}

fn s() -> String {
    STAKER.to_hex()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn replays_a_staking_history() {
    let source = Arc::new(VecSource::new(vec![
        staking(1, 0, "Locked", json!({"staker": s(), "value": wei(100)})),
        staking(1, 1, "Locked", json!({"staker": s(), "value": wei(50)})),
        staking(2, 0, "CommitmentMade", json!({"staker": s(), "period": 8, "value": wei(150)})),
        staking(3, 0, "CommitmentMade", json!({"staker": s(), "period": 10, "value": wei(150)})),
        staking(3, 1, "Prolonged", json!({"staker": s(), "value": wei(10), "lastPeriod": 12})),
    ]));
    let repos = Arc::new(MemoryRepositories::new());

    run(&indexer(source, repos.clone())).await.unwrap();

    let staker = staker(&repos).await;
    assert_eq!(staker.staked, dec!(150));
    assert_eq!(staker.substakes, 2);
    assert_eq!(staker.last_commitment, 10);

    let cache = EntityCache::new(repos.entities());
    let eight: Period = cache.load("8").await.unwrap();
    assert!(eight.finalized);
    assert_eq!(eight.participation_rate, dec!(0.075));

    // One audit record per log, one transaction per hash
    assert_eq!(repos.event_count().await, 5);
    let tx: Transaction = cache.load(&TxHash([1; 32]).to_hex()).await.unwrap();
    assert_eq!(tx.gas_used, 21_000);
    assert_eq!(tx.block_number, 1);

    let cursor = repos.cursor().get_cursor("mainnet").await.unwrap().unwrap();
    assert_eq!(cursor.position, LogPosition { block_number: 3, log_index: 1 });
}

#[tokio::test]
async fn resuming_from_cursor_does_not_double_count() {
    let source = Arc::new(VecSource::new(vec![
        staking(1, 0, "Deposited", json!({"staker": s(), "value": wei(5)})),
    ]));
    let repos = Arc::new(MemoryRepositories::new());
    let service = indexer(source.clone(), repos.clone());

    run(&service).await.unwrap();
    source.push(staking(2, 0, "Deposited", json!({"staker": s(), "value": wei(7)})));
    run(&service).await.unwrap();

    assert_eq!(staker(&repos).await.deposited, dec!(12));
    assert_eq!(repos.event_count().await, 2);

    // Replaying an already applied log is a no-op
    let applied = service
        .process_log(
            staking(1, 0, "Deposited", json!({"staker": s(), "value": wei(5)})),
            Some(LogPosition { block_number: 2, log_index: 0 }),
        )
        .await
        .unwrap();
    assert!(!applied);
    assert_eq!(staker(&repos).await.deposited, dec!(12));
}

#[tokio::test]
async fn handler_failure_commits_nothing() {
    let source = Arc::new(VecSource::new(vec![
        staking(1, 0, "Locked", json!({"staker": s(), "value": wei(1)})),
        log(2, 0, "PolicyManager", "PolicyRevoked", json!({
            "policyId": "0x000102030405060708090a0b0c0d0e0f",
            "sender": s(),
            "value": "1"
        })),
    ]));
    let repos = Arc::new(MemoryRepositories::new());

    let err = run(&indexer(source, repos.clone())).await.unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Domain(DomainError::EntityNotFound { kind: "Policy", .. })
    ));

    // The transaction record of the failed log was not committed either
    let cache = EntityCache::new(repos.entities());
    assert!(!cache.exists::<Transaction>(&TxHash([2; 32]).to_hex()).await.unwrap());
    assert_eq!(repos.event_count().await, 1);

    let cursor = repos.cursor().get_cursor("mainnet").await.unwrap().unwrap();
    assert_eq!(cursor.position, LogPosition { block_number: 1, log_index: 0 });
}

#[tokio::test]
async fn undecodable_feed_entry_stops_the_run() {
    let source = Arc::new(VecSource::with_corrupt_entry(
        vec![
            staking(1, 0, "Locked", json!({"staker": s(), "value": wei(100)})),
            staking(2, 0, "CommitmentMade", json!({"staker": s(), "period": 8, "value": wei(100)})),
        ],
        1,
    ));
    let repos = Arc::new(MemoryRepositories::new());

    let err = run(&indexer(source, repos.clone())).await.unwrap_err();
    assert!(matches!(
        err,
        IndexerError::Chain(ChainError::FeedDecodeError { line: 2, .. })
    ));

    // Nothing past the broken entry was applied
    assert_eq!(repos.event_count().await, 1);
    let cache = EntityCache::new(repos.entities());
    assert!(!cache.exists::<Period>("8").await.unwrap());
    let cursor = repos.cursor().get_cursor("mainnet").await.unwrap().unwrap();
    assert_eq!(cursor.position, LogPosition { block_number: 1, log_index: 0 });
}

#[tokio::test]
async fn unregistered_contracts_are_skipped() {
    let source = Arc::new(VecSource::new(vec![
        log(1, 0, "WorkLock", "Bid", json!({"sender": s(), "depositedETH": "1"})),
        staking(1, 1, "WindDownSet", json!({"staker": s(), "windDown": true})),
    ]));
    let repos = Arc::new(MemoryRepositories::new());

    run(&indexer(source, repos.clone())).await.unwrap();

    assert!(staker(&repos).await.winding_down);
    assert_eq!(repos.event_count().await, 1);
}

#[tokio::test]
async fn chain_mismatch_is_refused() {
    let repos = Arc::new(MemoryRepositories::new());
    let source = Arc::new(VecSource::new(vec![staking(
        1,
        0,
        "Migrated",
        json!({"staker": s(), "period": 2_675}),
    )]));
    run(&indexer(source.clone(), repos.clone())).await.unwrap();

    let mut bundles = BundleRegistry::new();
    bundles.register(Box::new(PolicyBundle::new()));
    let other = IndexerService::new(
        IndexerConfig {
            chain_id: "goerli".into(),
            ..Default::default()
        },
        source,
        repos,
        Arc::new(bundles.into_handler_registry()),
    );

    let err = run(&other).await.unwrap_err();
    assert!(matches!(err, IndexerError::ChainMismatch { .. }));
}
