//! Decoded event feed read from a JSON-lines file.
//!
//! Each line holds one [`RawLog`] as produced by the upstream decoder, in
//! ledger order. In follow mode the file is tailed: at end of file the
//! reader waits for more data instead of ending the stream. A line that
//! does not decode ends the stream with [`ChainError::FeedDecodeError`];
//! nothing after it is delivered.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, instrument, trace, warn};

use stakeledger_core::error::{ChainError, ChainResult};
use stakeledger_core::metrics::record_feed_decode_error;
use stakeledger_core::models::LogPosition;
use stakeledger_core::ports::{EventSource, LogStream, RawLog};

/// Configuration for the JSON-lines feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Path of the feed file.
    pub path: PathBuf,
    /// Network the feed belongs to.
    pub chain_id: String,
    /// Keep waiting for new lines at end of file.
    pub follow: bool,
    /// How long to wait before re-reading at end of file.
    pub poll_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("events.jsonl"),
            chain_id: "mainnet".to_string(),
            follow: false,
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Event source adapter over a JSON-lines feed.
pub struct JsonlEventSource {
    config: FeedConfig,
}

impl JsonlEventSource {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }
}

struct FeedState {
    reader: BufReader<File>,
    /// Bytes of an unterminated last line, kept until its newline arrives.
    pending: String,
    line: u64,
    after: Option<LogPosition>,
    follow: bool,
    poll_interval: Duration,
    done: bool,
}

impl FeedState {
    /// Read until the next deliverable log, end of feed, or an error.
    async fn next_log(&mut self) -> Option<ChainResult<RawLog>> {
        loop {
            let read = match self.reader.read_line(&mut self.pending).await {
                Ok(read) => read,
                Err(e) => {
                    self.done = true;
                    return Some(Err(ChainError::FeedError(e.to_string())));
                }
            };

            if !self.pending.ends_with('\n') {
                if self.follow {
                    // EOF, possibly mid-line: wait for the writer
                    if read == 0 {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                    continue;
                }
                if self.pending.is_empty() {
                    return None;
                }
            }

            let text = std::mem::take(&mut self.pending);
            self.line += 1;
            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<RawLog>(text) {
                Ok(log) => {
                    if self.after.is_some_and(|after| log.position() <= after) {
                        trace!(line = self.line, position = %log.position(), "Skipping applied log");
                        continue;
                    }
                    return Some(Ok(log));
                }
                Err(e) => {
                    let error = ChainError::FeedDecodeError {
                        line: self.line,
                        message: e.to_string(),
                    };
                    warn!(error = %error, "⚠️  Undecodable feed line, closing feed");
                    record_feed_decode_error();
                    self.done = true;
                    return Some(Err(error));
                }
            }
        }
    }
}

#[async_trait]
impl EventSource for JsonlEventSource {
    fn chain_id(&self) -> &str {
        &self.config.chain_id
    }

    #[instrument(skip(self), fields(path = %self.config.path.display()))]
    async fn subscribe(&self, after: Option<LogPosition>) -> ChainResult<LogStream> {
        let file = File::open(&self.config.path)
            .await
            .map_err(|e| ChainError::FeedError(format!("{}: {}", self.config.path.display(), e)))?;
        debug!(follow = self.config.follow, "📂 Feed opened");

        let state = FeedState {
            reader: BufReader::new(file),
            pending: String::new(),
            line: 0,
            after,
            follow: self.config.follow,
            poll_interval: self.config.poll_interval,
            done: false,
        };

        let stream = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            let next = state.next_log().await?;
            Some((next, state))
        });

        Ok(Box::pin(stream))
    }
}
