//! Metrics definitions for the indexer.
//!
//! This module defines all metrics used throughout the indexer.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "events_indexed_total",
        "Total number of contract events successfully indexed"
    );
    describe_counter!(
        "handler_errors_total",
        "Total number of handler errors during event processing"
    );
    describe_counter!(
        "periods_finalized_total",
        "Total number of staking periods finalized"
    );
    describe_counter!(
        "chain_calls_total",
        "Total number of read-only contract calls"
    );
    describe_counter!(
        "feed_decode_errors_total",
        "Total number of undecodable lines in the event feed"
    );
    describe_histogram!(
        "event_processing_duration_seconds",
        "Time taken to process one event in seconds"
    );
}

/// Record a successfully indexed event.
///
/// # Arguments
/// * `contract` - The data source name
/// * `event` - The event name
pub fn record_event_indexed(contract: &str, event: &str) {
    counter!("events_indexed_total", "contract" => contract.to_string(), "event" => event.to_string())
        .increment(1);
}

/// Record a handler error.
pub fn record_handler_error(contract: &str, event: &str) {
    counter!("handler_errors_total", "contract" => contract.to_string(), "event" => event.to_string())
        .increment(1);
}

/// Record a period finalization.
pub fn record_period_finalized() {
    counter!("periods_finalized_total").increment(1);
}

/// Record a read-only contract call.
///
/// # Arguments
/// * `method` - The contract method (e.g. "previousPeriodSupply")
/// * `outcome` - "ok" or "error"
pub fn record_chain_call(method: &str, outcome: &str) {
    counter!("chain_calls_total", "method" => method.to_string(), "outcome" => outcome.to_string())
        .increment(1);
}

/// Record an undecodable feed line.
pub fn record_feed_decode_error() {
    counter!("feed_decode_errors_total").increment(1);
}

/// Record event processing duration.
pub fn record_event_processing_duration(duration_secs: f64) {
    histogram!("event_processing_duration_seconds").record(duration_secs);
}

/// A timer that automatically records duration when dropped.
pub struct ProcessingTimer {
    start: Instant,
}

impl ProcessingTimer {
    /// Start a new processing timer.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_event_processing_duration(duration);
    }
}
