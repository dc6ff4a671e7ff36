//! Core indexer service - orchestrates event processing.
//!
//! Logs are applied strictly one at a time, in ledger order. Each log runs
//! to completion (load, mutate, persist) before the next one is read.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::entity::EntityCache;
use crate::error::{ChainError, IndexerError, IndexerResult};
use crate::metrics::{ProcessingTimer, record_event_indexed, record_handler_error};
use crate::models::{EventRecord, IndexerCursor, LogPosition, Transaction, make_event_id};
use crate::ports::{EventData, EventSource, HandlerContext, HandlerRegistry, RawLog, Repositories};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the indexer service.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    /// Network name the indexed data belongs to (e.g. "mainnet").
    pub chain_id: String,
    /// Initial delay before re-subscribing after a feed error.
    pub retry_delay: Duration,
    /// Upper bound for the re-subscribe backoff.
    pub max_retry_delay: Duration,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// IndexerService
// =============================================================================

/// Main indexer service.
///
/// # Flow
///
/// 1. Verify the stored cursor belongs to the configured network
/// 2. Subscribe to the event source after the cursor
/// 3. For each log, get or create its transaction record and run the
///    handler registered for its data source
/// 4. Persist staged entities, the audit record and the cursor atomically
///
/// A handler error stops the run. Nothing staged for the failing log is
/// committed, so a restart retries it from the same cursor. An undecodable
/// feed entry stops the run the same way; transient feed errors only
/// trigger a re-subscribe.
pub struct IndexerService<S: EventSource, R: Repositories> {
    config: IndexerConfig,
    event_source: Arc<S>,
    repositories: Arc<R>,
    handlers: Arc<HandlerRegistry>,
}

impl<S: EventSource, R: Repositories> IndexerService<S, R> {
    pub fn new(
        config: IndexerConfig,
        event_source: Arc<S>,
        repositories: Arc<R>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            config,
            event_source,
            repositories,
            handlers,
        }
    }

    /// Start the indexer.
    ///
    /// Returns `Ok(())` once a finite feed is drained,
    /// [`IndexerError::ShutdownRequested`] on shutdown, and the handler,
    /// storage or feed decode error that stopped processing otherwise.
    #[instrument(skip_all, fields(chain = %self.config.chain_id))]
    pub async fn run(
        &self,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        info!("⛓️  Starting indexer");

        self.verify_chain_id().await?;

        let mut last = self
            .repositories
            .cursor()
            .get_cursor(&self.config.chain_id)
            .await?
            .map(|c| c.position);

        match last {
            Some(position) => info!(position = %position, "⏩ Resuming from cursor"),
            None => debug!("No cursor found, starting fresh"),
        }

        self.follow(&mut last, &mut shutdown_rx).await
    }

    /// Verify the configured network matches the feed and any indexed data.
    async fn verify_chain_id(&self) -> IndexerResult<()> {
        let source_chain = self.event_source.chain_id();
        if source_chain != self.config.chain_id {
            error!(
                connected = source_chain,
                expected = %self.config.chain_id,
                "❌ Event source belongs to a different network"
            );
            return Err(IndexerError::ChainMismatch {
                connected: source_chain.to_string(),
                expected: self.config.chain_id.clone(),
            });
        }

        if let Some(cursor) = self.repositories.cursor().get_any_cursor().await?
            && cursor.chain_id != self.config.chain_id
        {
            error!(
                connected = %self.config.chain_id,
                expected = %cursor.chain_id,
                "❌ Chain mismatch! Database contains data from a different network"
            );
            error!(
                "   Manual action required: either index the correct network or clear the database"
            );

            return Err(IndexerError::ChainMismatch {
                connected: self.config.chain_id.clone(),
                expected: cursor.chain_id,
            });
        }

        debug!("Chain ID verified");
        Ok(())
    }

    /// Consume the feed, re-subscribing with backoff on feed errors.
    #[instrument(skip_all)]
    async fn follow(
        &self,
        last: &mut Option<LogPosition>,
        shutdown_rx: &mut tokio::sync::watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        let mut retry_delay = self.config.retry_delay;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(IndexerError::ShutdownRequested);
            }

            match self.event_source.subscribe(*last).await {
                Ok(mut stream) => {
                    debug!("📡 Subscription established");
                    retry_delay = self.config.retry_delay;

                    loop {
                        let next = tokio::select! {
                            next = stream.next() => next,
                            changed = shutdown_rx.changed() => {
                                if changed.is_err() || *shutdown_rx.borrow() {
                                    debug!("Shutdown requested");
                                    return Err(IndexerError::ShutdownRequested);
                                }
                                continue;
                            }
                        };

                        match next {
                            Some(Ok(log)) => {
                                let position = log.position();
                                if self.process_log(log, *last).await? {
                                    *last = Some(position);
                                }
                            }
                            Some(Err(e @ ChainError::FeedDecodeError { .. })) => {
                                error!(error = %e, last = ?last.map(|p| p.to_string()), "❌ Undecodable feed entry, stopping");
                                return Err(e.into());
                            }
                            Some(Err(e)) => {
                                warn!(error = ?e, "⚠️  Feed error, re-subscribing...");
                                break;
                            }
                            None => {
                                info!(last = ?last.map(|p| p.to_string()), "🏁 Event feed drained");
                                return Ok(());
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = ?e,
                        retry_in_ms = retry_delay.as_millis(),
                        "⚠️  Failed to subscribe, retrying..."
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {
                    debug!(retry_delay_ms = retry_delay.as_millis(), "🔄 Re-subscribing to feed...");
                    retry_delay = (retry_delay * 2).min(self.config.max_retry_delay);
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Err(IndexerError::ShutdownRequested);
                    }
                }
            }
        }
    }

    /// Process a single log through its handler.
    /// Returns `Ok(true)` if committed, `Ok(false)` if skipped.
    #[instrument(skip(self, log), fields(position = %log.position(), event = %log.name))]
    pub async fn process_log(
        &self,
        log: RawLog,
        last: Option<LogPosition>,
    ) -> IndexerResult<bool> {
        let position = log.position();

        // Already applied (happens on re-subscribe)
        if last.is_some_and(|last| position <= last) {
            trace!("Log at or before cursor, skipping");
            return Ok(false);
        }

        let Some(handler) = self.handlers.get(&log.contract) else {
            trace!(contract = %log.contract, "No handler registered, skipping");
            return Ok(false);
        };

        let _timer = ProcessingTimer::new();

        let mut entities = EntityCache::new(self.repositories.entities());
        let transaction = entities
            .get_or_create(&log.transaction.hash.to_hex(), || transaction_from_log(&log))
            .await?;
        let mut ctx = HandlerContext::new(transaction, entities);

        if let Err(e) = handler.handle_event(&log, &mut ctx).await {
            error!(
                contract = %log.contract,
                tx = %log.transaction.hash,
                error = %e,
                "❌ Handler failed, stopping"
            );
            record_handler_error(&log.contract, &log.name);
            return Err(e.into());
        }

        let changes = ctx.entities.into_changes();
        let record = event_record(&log);
        let cursor = IndexerCursor {
            chain_id: self.config.chain_id.clone(),
            position,
            updated_at: chrono::Utc::now(),
        };

        self.repositories
            .persist_event_atomic(EventData {
                changes: &changes,
                record: &record,
                cursor: &cursor,
            })
            .await?;

        record_event_indexed(&log.contract, &log.name);
        debug!(changes = changes.len(), "📥 Event indexed");
        Ok(true)
    }
}

/// Build the transaction cache record for the log's emitting transaction.
fn transaction_from_log(log: &RawLog) -> Transaction {
    Transaction {
        id: log.transaction.hash.to_hex(),
        block_number: log.block_number,
        timestamp: log.block_timestamp,
        gas_used: log.transaction.gas_used,
        gas_price: log.transaction.gas_price,
        from: log.transaction.from,
        to: log.transaction.to,
    }
}

/// Build the audit record for a log.
fn event_record(log: &RawLog) -> EventRecord {
    EventRecord {
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
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, BlockHash, TxHash};
    use crate::ports::RawTransaction;

    fn sample_log() -> RawLog {
        RawLog {
            block_number: 12_000_000,
            block_hash: BlockHash([0xbb; 32]),
            block_timestamp: 1_618_400_000,
            log_index: 3,
            contract: "StakingEscrow".into(),
            address: Address([0xee; 20]),
            name: "Deposited".into(),
            params: serde_json::json!({"value": "1"}),
            transaction: RawTransaction {
                hash: TxHash([0xaa; 32]),
                from: Address([0x01; 20]),
                to: Some(Address([0xee; 20])),
                gas_used: 21_000,
                gas_price: 50_000_000_000,
            },
        }
    }

    #[test]
    fn transaction_record_copies_metadata() {
        let tx = transaction_from_log(&sample_log());
        assert_eq!(tx.id, format!("0x{}", "aa".repeat(32)));
        assert_eq!(tx.block_number, 12_000_000);
        assert_eq!(tx.timestamp, 1_618_400_000);
        assert_eq!(tx.gas_used, 21_000);
        assert_eq!(tx.from, Address([0x01; 20]));
    }

    #[test]
    fn audit_record_is_keyed_by_hash_and_index() {
        let record = event_record(&sample_log());
        assert_eq!(record.id, format!("0x{}-3", "aa".repeat(32)));
        assert_eq!(record.name, "Deposited");
        assert_eq!(record.timestamp.timestamp(), 1_618_400_000);
        assert_eq!(record.params["value"], "1");
    }
}
