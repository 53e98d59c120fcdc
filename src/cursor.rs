//! Chain cursor tracking.
//!
//! The cursor is the highest block number fully processed by one
//! watcher. It is an explicit value object injected into the poller, so
//! multiple independent watchers (the block scan and the event-log scan
//! each own one) can track progress without shared module state, and
//! unit tests can observe it deterministically.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic non-decreasing last-processed-block store.
pub struct CursorStore {
    block: AtomicU64,
}

impl CursorStore {
    pub fn new(start_block: u64) -> Self {
        Self {
            block: AtomicU64::new(start_block),
        }
    }

    /// Highest fully processed block.
    pub fn get(&self) -> u64 {
        self.block.load(Ordering::Acquire)
    }

    /// Advance to `block`. Regressions are ignored so the monotonic
    /// invariant holds structurally rather than by caller discipline.
    pub fn advance(&self, block: u64) {
        self.block.fetch_max(block, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_forward() {
        let cursor = CursorStore::new(10);
        cursor.advance(15);
        assert_eq!(cursor.get(), 15);
    }

    #[test]
    fn ignores_regression() {
        let cursor = CursorStore::new(20);
        cursor.advance(5);
        assert_eq!(cursor.get(), 20);
    }

    #[test]
    fn starts_at_configured_block() {
        assert_eq!(CursorStore::new(0).get(), 0);
        assert_eq!(CursorStore::new(1_234).get(), 1_234);
    }
}
