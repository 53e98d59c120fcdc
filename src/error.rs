//! Error taxonomy for the monitoring pipeline.
//!
//! Only `RateLimited` is ever retried (by the gateway's backoff wrapper).
//! `UnsupportedFeature` switches an event source to the fallback block
//! scan for the affected window. `Persistence` and
//! `NotificationDelivery` are logged and swallowed at the call site.
//! Everything else is `Rpc` and fails the current attempt; the enclosing
//! poll tick catches it and proceeds on its next interval. Nothing in
//! this crate terminates the process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// Rate-limit-shaped RPC failure. Retried with backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The provider does not support the requested query shape
    /// (typically a structured log filter).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Store write failure. Logged and swallowed, never retried.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// Notifier delivery failure. Logged and swallowed, never retried.
    #[error("notification delivery failure: {0}")]
    NotificationDelivery(String),

    /// Unclassified RPC failure. Fatal to the current attempt only.
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl MonitorError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MonitorError::RateLimited(_))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, MonitorError::UnsupportedFeature(_))
    }
}

/// Classify a raw provider error by message inspection.
///
/// Providers disagree on error codes, so the gateway matches on the
/// message text the same way it decides provider backoff: "rate limit",
/// "too many requests" and HTTP 429 mark a rate limit; "not supported",
/// "unsupported" and "method not found" mark a missing capability.
pub fn classify_rpc_error(message: impl AsRef<str>) -> MonitorError {
    let raw = message.as_ref();
    let lowered = raw.to_lowercase();

    if lowered.contains("rate limit")
        || lowered.contains("too many requests")
        || lowered.contains("429")
    {
        return MonitorError::RateLimited(raw.to_string());
    }

    if lowered.contains("not supported")
        || lowered.contains("unsupported")
        || lowered.contains("method not found")
    {
        return MonitorError::UnsupportedFeature(raw.to_string());
    }

    MonitorError::Rpc(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_messages() {
        assert!(classify_rpc_error("Rate limit exceeded").is_rate_limited());
        assert!(classify_rpc_error("HTTP 429 Too Many Requests").is_rate_limited());
    }

    #[test]
    fn classifies_unsupported_messages() {
        assert!(classify_rpc_error("eth_getLogs is not supported").is_unsupported());
        assert!(classify_rpc_error("Method not found").is_unsupported());
    }

    #[test]
    fn everything_else_is_plain_rpc() {
        let err = classify_rpc_error("connection reset by peer");
        assert!(matches!(err, MonitorError::Rpc(_)));
    }
}
