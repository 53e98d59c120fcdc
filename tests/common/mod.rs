//! Shared scripted chain fixture for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chainwatch::error::MonitorError;
use chainwatch::gateway::ChainClient;
use ethers::types::{
    Address, Block, BlockNumber, Bytes, Filter, FilterBlockOption, Log, Transaction,
    TransactionReceipt, H256, U64,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// A chain the test script controls: fixed head, canned blocks, canned
/// contract code, canned logs, and optional failure injection.
#[derive(Default)]
pub struct ScriptedChain {
    head: AtomicU64,
    blocks: Mutex<HashMap<u64, Block<Transaction>>>,
    code: Mutex<HashMap<Address, Bytes>>,
    logs: Mutex<Vec<Log>>,
    /// Remaining head queries to fail with a rate-limit error.
    rate_limited_heads: AtomicU64,
    /// When set, `logs()` always reports the filter as unsupported.
    logs_unsupported: std::sync::atomic::AtomicBool,
}

impl ScriptedChain {
    pub fn with_head(head: u64) -> Self {
        let chain = Self::default();
        chain.head.store(head, Ordering::SeqCst);
        chain
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn add_block(&self, number: u64, transactions: Vec<Transaction>) {
        let block = Block {
            number: Some(U64::from(number)),
            transactions,
            ..Default::default()
        };
        self.blocks.lock().unwrap().insert(number, block);
    }

    pub fn set_code(&self, address: Address, code: &str) {
        self.code
            .lock()
            .unwrap()
            .insert(address, Bytes::from(code.as_bytes().to_vec()));
    }

    pub fn push_log(&self, log: Log) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn fail_next_heads_with_rate_limit(&self, count: u64) {
        self.rate_limited_heads.store(count, Ordering::SeqCst);
    }

    pub fn set_logs_unsupported(&self, unsupported: bool) {
        self.logs_unsupported.store(unsupported, Ordering::SeqCst);
    }
}

fn filter_range(filter: &Filter) -> (u64, u64) {
    match filter.block_option {
        FilterBlockOption::Range {
            from_block,
            to_block,
        } => {
            let from = match from_block {
                Some(BlockNumber::Number(n)) => n.as_u64(),
                _ => 0,
            };
            let to = match to_block {
                Some(BlockNumber::Number(n)) => n.as_u64(),
                _ => u64::MAX,
            };
            (from, to)
        }
        _ => (0, u64::MAX),
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn block_number(&self) -> Result<u64, MonitorError> {
        let remaining = self.rate_limited_heads.load(Ordering::SeqCst);
        if remaining > 0 {
            self.rate_limited_heads.fetch_sub(1, Ordering::SeqCst);
            return Err(MonitorError::RateLimited(
                "too many requests".to_string(),
            ));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_with_txs(
        &self,
        number: u64,
    ) -> Result<Option<Block<Transaction>>, MonitorError> {
        Ok(self.blocks.lock().unwrap().get(&number).cloned())
    }

    async fn transaction_receipt(
        &self,
        _hash: H256,
    ) -> Result<Option<TransactionReceipt>, MonitorError> {
        Ok(None)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, MonitorError> {
        Ok(self
            .code
            .lock()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, MonitorError> {
        if self.logs_unsupported.load(Ordering::SeqCst) {
            return Err(MonitorError::UnsupportedFeature(
                "eth_getLogs is not supported".to_string(),
            ));
        }
        let (from, to) = filter_range(filter);
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|log| {
                log.block_number
                    .map(|n| (from..=to).contains(&n.as_u64()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// Backoff policy with no jitter so waits are deterministic under
/// paused time.
pub fn fast_policy(max_retries: u32) -> chainwatch::BackoffPolicy {
    chainwatch::BackoffPolicy {
        max_retries,
        initial_backoff: std::time::Duration::from_millis(100),
        multiplier: 1.5,
        max_jitter: std::time::Duration::ZERO,
    }
}
