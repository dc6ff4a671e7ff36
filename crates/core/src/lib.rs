//! Core domain layer for the stakeledger indexer.
//!
//! This crate contains the shared models, port traits (interfaces), the
//! per-event entity working set and the indexer service that projects
//! NuCypher StakingEscrow / PolicyManager events into queryable aggregates.
//! It has no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   stakeledger (binary)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │   stakeledger-handlers     │     stakeledger-ethereum       │
//! │  (staking/policy bundles)  │   (event feed, eth_call)       │
//! ├────────────────────────────┴────────────────────────────────┤
//! │                  stakeledger-storage                        │
//! │               (PostgreSQL / in-memory)                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                 stakeledger-core  ← YOU ARE HERE            │
//! │          (models, entities, ports, services)                │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`models`] - Shared models (Address, Transaction, EventRecord, amounts)
//! - [`entity`] - Keyed entities and the per-event [`entity::EntityCache`]
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - Core business logic (IndexerService)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Indexer Lifecycle
//!
//! 1. Subscribe to decoded logs after the stored cursor
//! 2. Get or create the emitting transaction's cache record
//! 3. Call the handler registered for the log's data source
//! 4. Persist staged entities, audit record and cursor atomically

pub mod entity;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
