//! Gateway backoff behavior.
//!
//! Tests cover:
//! - Wait growth between consecutive rate-limit retries
//! - Eventual success within the retry budget
//! - Exhaustion propagating the last rate-limit error
//! - Non-rate-limit errors propagating immediately, unretried

mod common;

use chainwatch::error::MonitorError;
use chainwatch::{call_with_backoff, BackoffPolicy};
use common::fast_policy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Fail the first `failures` calls with a rate-limit error, then return
/// the attempt number. Records the instant of every attempt.
struct FlakyOp {
    failures: u64,
    calls: AtomicU64,
    attempt_times: Mutex<Vec<Instant>>,
}

impl FlakyOp {
    fn new(failures: u64) -> Self {
        Self {
            failures,
            calls: AtomicU64::new(0),
            attempt_times: Mutex::new(Vec::new()),
        }
    }

    async fn call(&self) -> Result<u64, MonitorError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.attempt_times.lock().unwrap().push(Instant::now());
        if attempt <= self.failures {
            Err(MonitorError::RateLimited("rate limit exceeded".to_string()))
        } else {
            Ok(attempt)
        }
    }

    fn waits(&self) -> Vec<Duration> {
        let times = self.attempt_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_waits_grow_and_call_succeeds() {
    let op = FlakyOp::new(5);
    let policy = fast_policy(5);

    let result = call_with_backoff(&policy, "flaky", || op.call()).await;
    assert_eq!(result.unwrap(), 6, "succeeds on the attempt after the budget");

    let waits = op.waits();
    assert_eq!(waits.len(), 5);
    for pair in waits.windows(2) {
        assert!(
            pair[1] >= pair[0],
            "wait before retry k+1 ({:?}) must be >= wait before retry k ({:?})",
            pair[1],
            pair[0]
        );
    }
    // First wait is the configured initial backoff.
    assert_eq!(waits[0], Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn exhausting_retries_propagates_last_rate_limit_error() {
    let op = FlakyOp::new(100);
    let policy = fast_policy(5);

    let err = call_with_backoff(&policy, "flaky", || op.call())
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    // Initial attempt plus the full retry budget, nothing more.
    assert_eq!(op.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test(start_paused = true)]
async fn non_rate_limit_errors_are_not_retried() {
    let calls = AtomicU64::new(0);
    let policy = BackoffPolicy::default();

    let err = call_with_backoff(&policy, "broken", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(MonitorError::Rpc("connection reset".to_string())) }
    })
    .await
    .unwrap_err();

    assert!(matches!(err, MonitorError::Rpc(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn success_on_first_attempt_does_not_wait() {
    let policy = fast_policy(5);
    let started = Instant::now();

    let result =
        call_with_backoff(&policy, "healthy", || async { Ok::<_, MonitorError>(42) }).await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(started.elapsed(), Duration::ZERO);
}
