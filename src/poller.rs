//! # Chain Poller
//!
//! Interval-driven window scheduling over the chain cursor.
//!
//! Each poller owns one cursor and one window processor. A tick fetches
//! the chain head, carves the next bounded window, runs the processor to
//! completion, and advances the cursor. When the window did not reach
//! the head, the tick loops immediately instead of waiting for the next
//! interval: an explicit catch-up drain whose only brake is the
//! gateway's backoff.
//!
//! A failed cycle is logged and abandoned; the next interval retries
//! from the same cursor. Nothing here is allowed to take the process
//! down.

use crate::cursor::CursorStore;
use crate::error::MonitorError;
use crate::gateway::ChainHeadCache;
use crate::metrics;
use crate::types::PollWindow;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Work performed over one poll window. Implementations are the block
/// scan and the event-log scan; both push detections into the queue and
/// keep per-block failures to themselves.
#[async_trait]
pub trait WindowProcessor: Send + Sync {
    async fn process_window(&self, window: &PollWindow) -> Result<(), MonitorError>;
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Human-readable name used in logs ("block_scan", "event_scan").
    pub label: &'static str,
    pub interval: Duration,
    /// Maximum window span per tick, capping per-tick latency.
    pub max_blocks_per_poll: u64,
}

pub struct Poller {
    config: PollerConfig,
    head: Arc<ChainHeadCache>,
    cursor: Arc<CursorStore>,
    processor: Arc<dyn WindowProcessor>,
}

impl Poller {
    pub fn new(
        config: PollerConfig,
        head: Arc<ChainHeadCache>,
        cursor: Arc<CursorStore>,
        processor: Arc<dyn WindowProcessor>,
    ) -> Self {
        Self {
            config,
            head,
            cursor,
            processor,
        }
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    /// One tick, including the catch-up drain: windows are processed
    /// back to back until the cursor reaches the head observed for that
    /// window. The cursor advances only after a window fully succeeds.
    pub async fn run_once(&self) -> Result<(), MonitorError> {
        loop {
            let head = self.head.head().await?;
            let cursor = self.cursor.get();

            if head <= cursor {
                debug!(
                    "{}: no new blocks (cursor={}, head={})",
                    self.config.label, cursor, head
                );
                return Ok(());
            }

            let window = PollWindow::bounded(cursor + 1, head, self.config.max_blocks_per_poll);
            debug!(
                "{}: processing blocks {}-{} (head={})",
                self.config.label, window.from_block, window.to_block, head
            );

            self.processor.process_window(&window).await?;

            self.cursor.advance(window.to_block);
            metrics::set_cursor(self.config.label, window.to_block);

            if window.to_block >= head {
                return Ok(());
            }

            // Backlog remains: drain immediately rather than waiting out
            // the interval.
            info!(
                "{}: backlog of {} blocks remains, continuing catch-up",
                self.config.label,
                head - window.to_block
            );
        }
    }

    /// Spawn the periodic loop. Runs until the process exits; cycle
    /// failures are logged and the loop proceeds to the next tick.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            info!(
                "{} poller started (interval {:?}, window {} blocks)",
                self.config.label, self.config.interval, self.config.max_blocks_per_poll
            );
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    warn!("{}: poll cycle failed: {}", self.config.label, e);
                }
            }
        })
    }
}
