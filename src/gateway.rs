//! # RPC Gateway
//!
//! Rate-limit-aware access to the chain RPC endpoint.
//!
//! ## Features
//!
//! - **`ChainClient` trait**: the five chain queries the monitor needs,
//!   behind a seam so tests can script the chain
//! - **Backoff**: `call_with_backoff` retries rate-limit-shaped errors
//!   with multiplicative backoff and jitter
//! - **QPS limiting**: the ethers-backed client gates every call through
//!   a `governor` rate limiter
//! - **Head caching**: `ChainHeadCache` answers head queries from a
//!   short-lived cache so independent pollers do not double-query
//!
//! ## Usage
//!
//! ```rust,ignore
//! let client = Arc::new(EthersChainClient::new(&url, qps_limit)?);
//! let head = call_with_backoff(&policy, "get_block_number", || client.block_number()).await?;
//! ```

use crate::error::{classify_rpc_error, MonitorError};
use crate::metrics;
use async_trait::async_trait;
use ethers::prelude::{Http, Middleware, Provider};
use ethers::types::{Address, Block, Bytes, Filter, Log, Transaction, TransactionReceipt, H256};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Chain queries consumed by the monitor. Implemented over an ethers
/// provider in production and over scripted fixtures in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn block_number(&self) -> Result<u64, MonitorError>;

    async fn block_with_txs(&self, number: u64)
        -> Result<Option<Block<Transaction>>, MonitorError>;

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, MonitorError>;

    async fn code_at(&self, address: Address) -> Result<Bytes, MonitorError>;

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, MonitorError>;
}

/// Retry policy for `call_with_backoff`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Wait before the first retry.
    pub initial_backoff: Duration,
    /// Multiplier applied to the wait between consecutive retries.
    pub multiplier: f64,
    /// Upper bound of the uniform jitter added to every wait.
    pub max_jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_millis(2_000),
            multiplier: 1.5,
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

/// Run a chain query with rate-limit backoff.
///
/// Only `RateLimited` errors are retried: the wait before retry `k` is
/// the previous wait times the policy multiplier plus uniform jitter,
/// starting from `initial_backoff`. Any other error propagates
/// immediately, and exhausting the retry budget propagates the last
/// rate-limit error to the caller.
pub async fn call_with_backoff<T, F, Fut>(
    policy: &BackoffPolicy,
    op: &str,
    mut call: F,
) -> Result<T, MonitorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, MonitorError>>,
{
    let mut wait = policy.initial_backoff;

    for attempt in 0..=policy.max_retries {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limited() && attempt < policy.max_retries => {
                let jitter_ms = if policy.max_jitter.is_zero() {
                    0
                } else {
                    rand::thread_rng().gen_range(0..policy.max_jitter.as_millis() as u64)
                };
                let delay = wait + Duration::from_millis(jitter_ms);
                warn!(
                    "{}: rate limited (attempt {}/{}), backing off for {:?}",
                    op,
                    attempt + 1,
                    policy.max_retries + 1,
                    delay
                );
                metrics::increment_rpc_retry(op);
                sleep(delay).await;
                wait = Duration::from_millis((wait.as_millis() as f64 * policy.multiplier) as u64);
            }
            Err(err) => return Err(err),
        }
    }

    unreachable!("retry loop always returns");
}

/// `ChainClient` over an ethers HTTP provider with a global QPS cap.
pub struct EthersChainClient {
    provider: Arc<Provider<Http>>,
    limiter: Arc<DirectRateLimiter>,
    endpoint: String,
}

impl EthersChainClient {
    pub fn new(url: &str, qps_limit: u32) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(url)?;
        let quota = Quota::per_second(
            NonZeroU32::new(qps_limit).ok_or_else(|| anyhow::anyhow!("QPS must be non-zero"))?,
        );
        Ok(Self {
            provider: Arc::new(provider),
            limiter: Arc::new(RateLimiter::direct(quota)),
            endpoint: url.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChainClient for EthersChainClient {
    async fn block_number(&self) -> Result<u64, MonitorError> {
        self.limiter.until_ready().await;
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| classify_rpc_error(e.to_string()))
    }

    async fn block_with_txs(
        &self,
        number: u64,
    ) -> Result<Option<Block<Transaction>>, MonitorError> {
        self.limiter.until_ready().await;
        self.provider
            .get_block_with_txs(number)
            .await
            .map_err(|e| classify_rpc_error(e.to_string()))
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<TransactionReceipt>, MonitorError> {
        self.limiter.until_ready().await;
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| classify_rpc_error(e.to_string()))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, MonitorError> {
        self.limiter.until_ready().await;
        self.provider
            .get_code(address, None)
            .await
            .map_err(|e| classify_rpc_error(e.to_string()))
    }

    async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, MonitorError> {
        self.limiter.until_ready().await;
        self.provider
            .get_logs(filter)
            .await
            .map_err(|e| classify_rpc_error(e.to_string()))
    }
}

/// Chain head cache shared by the pollers.
///
/// Answers from the cached value while it is fresh, so the fast and slow
/// ticks together cost one head query per freshness interval. On a fetch
/// error the last known head is returned when one exists; the error only
/// surfaces while the cache is still empty.
pub struct ChainHeadCache {
    client: Arc<dyn ChainClient>,
    policy: BackoffPolicy,
    current_head: AtomicU64,
    last_update: Mutex<Option<Instant>>,
    update_interval: Duration,
}

impl ChainHeadCache {
    pub fn new(
        client: Arc<dyn ChainClient>,
        policy: BackoffPolicy,
        update_interval: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            current_head: AtomicU64::new(0),
            last_update: Mutex::new(None),
            update_interval,
        }
    }

    /// Current chain head, at most `update_interval` stale.
    pub async fn head(&self) -> Result<u64, MonitorError> {
        let mut last_update = self.last_update.lock().await;

        if let Some(updated) = *last_update {
            if updated.elapsed() < self.update_interval {
                let cached = self.current_head.load(Ordering::Relaxed);
                if cached > 0 {
                    debug!("head cache hit: block {}", cached);
                    return Ok(cached);
                }
            }
        }

        match call_with_backoff(&self.policy, "get_block_number", || {
            self.client.block_number()
        })
        .await
        {
            Ok(head) => {
                self.current_head.store(head, Ordering::Relaxed);
                *last_update = Some(Instant::now());
                debug!("head cache updated to block {}", head);
                Ok(head)
            }
            Err(e) => {
                let cached = self.current_head.load(Ordering::Relaxed);
                if cached > 0 {
                    warn!("head fetch failed, serving cached block {}: {}", cached, e);
                    Ok(cached)
                } else {
                    Err(e)
                }
            }
        }
    }
}
