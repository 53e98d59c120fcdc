//! # Event Log Ingestion
//!
//! Windowed queries against the declared on-chain event sources.
//!
//! ## Features
//!
//! - **Declarative sources**: each source is an event signature plus the
//!   detection kind it produces, iterated in a fixed order
//! - **Failure isolation**: every source query runs inside its own
//!   failure boundary, so one broken source never starves the others
//! - **Fallback scan**: when a provider rejects structured log filters,
//!   the same window is re-derived block by block from raw transactions
//!   (at-least-once, duplicates accepted)

use crate::block_scan;
use crate::error::MonitorError;
use crate::gateway::{call_with_backoff, BackoffPolicy, ChainClient};
use crate::metrics;
use crate::types::{AlertKind, DetectionEvent, DetectionSource, PollWindow};
use ethers::types::{Address, Filter, Log, U256};
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// One structured event source the monitor watches.
#[derive(Debug, Clone, Copy)]
pub struct EventSource {
    pub name: &'static str,
    pub kind: AlertKind,
    pub signature: &'static str,
}

/// The four sources every window is checked against.
pub const EVENT_SOURCES: [EventSource; 4] = [
    EventSource {
        name: "security_alert",
        kind: AlertKind::SecurityAlert,
        signature: "SecurityAlert(address,string,uint256)",
    },
    EventSource {
        name: "suspicious_transaction",
        kind: AlertKind::SuspiciousTransaction,
        signature: "SuspiciousTransactionReported(address,bytes32,uint256)",
    },
    EventSource {
        name: "token_risk",
        kind: AlertKind::RugPull,
        signature: "TokenRiskFlagged(address,uint8,uint256)",
    },
    EventSource {
        name: "wallet_drainer",
        kind: AlertKind::WalletDrainer,
        signature: "DrainerActivityReported(address,address,uint256)",
    },
];

/// Scanner for one window across all event sources.
pub struct LogScanner {
    client: Arc<dyn ChainClient>,
    policy: BackoffPolicy,
    sources: Vec<EventSource>,
    value_threshold_wei: U256,
    inter_block_delay: Duration,
}

impl LogScanner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        policy: BackoffPolicy,
        value_threshold_wei: U256,
        inter_block_delay: Duration,
    ) -> Self {
        Self {
            client,
            policy,
            sources: EVENT_SOURCES.to_vec(),
            value_threshold_wei,
            inter_block_delay,
        }
    }

    /// Scan a window against every source. Per-source failures are
    /// contained: an unsupported filter degrades that source to the
    /// fallback block scan, any other failure is logged and skipped.
    pub async fn scan_window(&self, window: &PollWindow) -> Vec<DetectionEvent> {
        let mut detections = Vec::new();

        for source in &self.sources {
            match self.scan_source(source, window).await {
                Ok(mut found) => {
                    if !found.is_empty() {
                        debug!(
                            "source {} matched {} logs in blocks {}-{}",
                            source.name,
                            found.len(),
                            window.from_block,
                            window.to_block
                        );
                    }
                    detections.append(&mut found);
                }
                Err(e) if e.is_unsupported() => {
                    warn!(
                        "source {} unsupported by provider, falling back to manual scan \
                         for blocks {}-{}: {}",
                        source.name, window.from_block, window.to_block, e
                    );
                    match self.fallback_scan(source, window).await {
                        Ok(mut found) => detections.append(&mut found),
                        Err(e) => error!("fallback scan failed for {}: {}", source.name, e),
                    }
                }
                Err(e) => {
                    error!(
                        "source {} failed for blocks {}-{}: {}",
                        source.name, window.from_block, window.to_block, e
                    );
                }
            }
        }

        detections
    }

    async fn scan_source(
        &self,
        source: &EventSource,
        window: &PollWindow,
    ) -> Result<Vec<DetectionEvent>, MonitorError> {
        let filter = Filter::new()
            .event(source.signature)
            .from_block(window.from_block)
            .to_block(window.to_block);

        let logs = call_with_backoff(&self.policy, source.name, || self.client.logs(&filter))
            .await?;

        Ok(logs
            .iter()
            .map(|log| detection_from_log(source, log))
            .collect())
    }

    /// Degraded mode: re-derive detections for the window from raw
    /// transaction inspection. Guarantees at-least-once detection at the
    /// cost of possible duplicates with the structured path.
    async fn fallback_scan(
        &self,
        source: &EventSource,
        window: &PollWindow,
    ) -> Result<Vec<DetectionEvent>, MonitorError> {
        let mut detections = Vec::new();

        for number in window.from_block..=window.to_block {
            let block = call_with_backoff(&self.policy, "get_block", || {
                self.client.block_with_txs(number)
            })
            .await?;

            let Some(block) = block else {
                warn!("fallback scan: block {} not available", number);
                continue;
            };

            let found =
                block_scan::scan_block(self.client.as_ref(), &block, self.value_threshold_wei)
                    .await?;

            detections.extend(found.into_iter().map(|d| DetectionEvent {
                source: DetectionSource::FallbackScan,
                kind: source.kind,
                ..d
            }));

            metrics::increment_blocks_scanned("fallback");
            if number < window.to_block && !self.inter_block_delay.is_zero() {
                sleep(self.inter_block_delay).await;
            }
        }

        Ok(detections)
    }
}

/// Build a detection from one matched log entry. The target address is
/// the first indexed address topic when present, the emitter otherwise.
fn detection_from_log(source: &EventSource, log: &Log) -> DetectionEvent {
    let target = log
        .topics
        .get(1)
        .map(|topic| Address::from_slice(&topic.as_bytes()[12..]))
        .unwrap_or(log.address);

    DetectionEvent {
        source: DetectionSource::EventLogs,
        kind: source.kind,
        target_address: target,
        evidence: format!(
            "{} event from {:?} (data: 0x{})",
            source.name,
            log.address,
            hex::encode(&log.data)
        ),
        tx_hash: log.transaction_hash,
        block_number: log.block_number.map(|n| n.as_u64()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::{Bytes, H256, U64};

    #[test]
    fn all_four_sources_are_declared() {
        assert_eq!(EVENT_SOURCES.len(), 4);
        let kinds: Vec<AlertKind> = EVENT_SOURCES.iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&AlertKind::SecurityAlert));
        assert!(kinds.contains(&AlertKind::SuspiciousTransaction));
        assert!(kinds.contains(&AlertKind::RugPull));
        assert!(kinds.contains(&AlertKind::WalletDrainer));
    }

    #[test]
    fn detection_prefers_indexed_address_topic() {
        let target = Address::random();
        let mut topic_bytes = [0u8; 32];
        topic_bytes[12..].copy_from_slice(target.as_bytes());

        let log = Log {
            address: Address::random(),
            topics: vec![H256::random(), H256::from(topic_bytes)],
            data: Bytes::from(vec![0xde, 0xad]),
            block_number: Some(U64::from(42)),
            transaction_hash: Some(H256::random()),
            ..Default::default()
        };

        let detection = detection_from_log(&EVENT_SOURCES[3], &log);
        assert_eq!(detection.target_address, target);
        assert_eq!(detection.kind, AlertKind::WalletDrainer);
        assert_eq!(detection.block_number, 42);
        assert_eq!(detection.source, DetectionSource::EventLogs);
    }

    #[test]
    fn detection_falls_back_to_emitter_address() {
        let emitter = Address::random();
        let log = Log {
            address: emitter,
            topics: vec![H256::random()],
            data: Bytes::default(),
            ..Default::default()
        };

        let detection = detection_from_log(&EVENT_SOURCES[0], &log);
        assert_eq!(detection.target_address, emitter);
    }
}
