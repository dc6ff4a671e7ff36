//! Port trait for contract-specific event handlers.
//!
//! This is the main extensibility point for the indexer. Each contract
//! that needs projection logic implements this trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::entity::EntityCache;
use crate::error::DomainResult;
use crate::models::Transaction;
use crate::ports::event_source::RawLog;

/// Context passed to a handler for one event.
pub struct HandlerContext<'a> {
    /// Cached metadata of the emitting transaction.
    pub transaction: Transaction,
    /// Working set committed atomically once the handler returns.
    pub entities: EntityCache<'a>,
}

impl<'a> HandlerContext<'a> {
    pub fn new(transaction: Transaction, entities: EntityCache<'a>) -> Self {
        Self {
            transaction,
            entities,
        }
    }
}

/// Trait for contract-specific event handlers.
///
/// The handler is called once per event emitted by its data source, in
/// ledger order. It loads or creates aggregates through
/// [`HandlerContext::entities`], applies a delta, and stages the result.
/// Returning an error aborts the event: nothing it staged is committed.
#[async_trait]
pub trait ContractHandler: Send + Sync {
    /// Data source name this handler processes (e.g., "StakingEscrow").
    fn contract_name(&self) -> &'static str;

    /// Apply one event.
    async fn handle_event(&self, log: &RawLog, ctx: &mut HandlerContext<'_>) -> DomainResult<()>;

    /// Priority for handler ordering (higher = earlier).
    fn priority(&self) -> i32 {
        0
    }
}

/// Registry for contract handlers.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ContractHandler>>,
    ordered_handlers: Vec<Arc<dyn ContractHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            ordered_handlers: Vec::new(),
        }
    }

    /// Register a handler for a contract.
    pub fn register(&mut self, handler: Arc<dyn ContractHandler>) {
        let contract = handler.contract_name().to_string();
        self.handlers.insert(contract, handler.clone());
        self.ordered_handlers.push(handler);
        self.ordered_handlers
            .sort_by_key(|b| std::cmp::Reverse(b.priority()));
    }

    /// Get handler for a specific contract.
    pub fn get(&self, contract: &str) -> Option<&Arc<dyn ContractHandler>> {
        self.handlers.get(contract)
    }

    /// Get all handlers in priority order.
    pub fn all(&self) -> &[Arc<dyn ContractHandler>] {
        &self.ordered_handlers
    }

    /// Check if a contract has a registered handler.
    pub fn has_handler(&self, contract: &str) -> bool {
        self.handlers.contains_key(contract)
    }

    /// List all registered contract names.
    pub fn registered_contracts(&self) -> Vec<&str> {
        self.handlers.keys().map(|s| s.as_str()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
