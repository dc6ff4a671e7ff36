//! Error types for the indexer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Projection logic errors
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Event feed and chain-state read errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Projection logic errors.
///
/// Every variant is fatal for the event being processed: the handler aborts,
/// nothing is committed, and the event is retried on the next run.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A required aggregate was never created.
    #[error("{kind} not found: {id}")]
    EntityNotFound {
        /// Entity kind (e.g. "Policy").
        kind: &'static str,
        /// Entity key.
        id: String,
    },

    /// Address failed validation.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Event parameters or entity data could not be decoded.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// Checked decimal arithmetic overflowed.
    #[error("Arithmetic overflow: {0}")]
    ArithmeticOverflow(String),

    /// No handler registered for a contract.
    #[error("Handler not found for contract: {0}")]
    HandlerNotFound(String),

    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Chain-state read failed.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Requested record was not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Event feed and chain-state read errors.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Connection to the node failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// JSON-RPC request failed or returned an error object.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Contract call returned data that could not be decoded.
    #[error("Call decode error in {method}: {message}")]
    CallDecodeError {
        /// Contract method that was called.
        method: &'static str,
        /// Error details.
        message: String,
    },

    /// Event feed could not be opened or read.
    #[error("Feed error: {0}")]
    FeedError(String),

    /// A feed line could not be decoded into a log.
    #[error("Feed decode error at line {line}: {message}")]
    FeedDecodeError {
        /// 1-based line number in the feed.
        line: u64,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by [`crate::services::IndexerService`].
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Event feed or chain error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Configured network doesn't match stored data.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Chain mismatch: configured for {connected} but database contains data for {expected}")]
    ChainMismatch {
        /// Configured chain id.
        connected: String,
        /// Chain id found in the stored cursor.
        expected: String,
    },

    /// Graceful shutdown was requested.
    #[error("Indexer shutdown requested")]
    ShutdownRequested,

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
