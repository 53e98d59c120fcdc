//! # Security Monitor
//!
//! Top-level wiring of the pipeline: two pollers (block scan on the
//! fast tick, event-log scan on the slow tick) produce detections into
//! an explicit queue; a single handler task drains the queue, confirms
//! detections through the risk engine, writes the persisted side
//! effects, and hands confirmed detections to the alert dispatcher.
//!
//! Detections from the structured log sources arrive pre-confirmed by
//! their source contract; heuristic detections (block scan and fallback
//! scan) must pass risk classification of the target's code before they
//! escalate to an alert. Suspicious-transaction records are persisted
//! either way; the record is the audit trail, the alert is the
//! escalation.

use crate::block_scan;
use crate::cursor::CursorStore;
use crate::dispatch::AlertDispatcher;
use crate::error::MonitorError;
use crate::gateway::{call_with_backoff, BackoffPolicy, ChainClient, ChainHeadCache};
use crate::log_scan::LogScanner;
use crate::metrics;
use crate::poller::{Poller, PollerConfig, WindowProcessor};
use crate::risk::RiskEngine;
use crate::store::MonitorStore;
use crate::types::{
    AlertEvent, AlertKind, DetectionEvent, DetectionSource, DrainerRecord, PollWindow,
    SuspiciousTransactionRecord, TokenAnalysisRecord,
};
use async_trait::async_trait;
use chrono::Utc;
use ethers::types::U256;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::info_span;

/// Runtime knobs for the monitor, usually built from `Settings`.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub block_scan_interval: Duration,
    pub event_scan_interval: Duration,
    pub max_blocks_per_poll: u64,
    pub inter_block_delay: Duration,
    pub head_cache_ttl: Duration,
    /// Whole native-token units above which a transfer is suspicious.
    pub value_threshold_units: u64,
    pub detection_queue_size: usize,
    pub backoff: BackoffPolicy,
    /// Block to start scanning from. 0 means start at the current head.
    pub start_block: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            block_scan_interval: Duration::from_secs(15),
            event_scan_interval: Duration::from_secs(60),
            max_blocks_per_poll: 10,
            inter_block_delay: Duration::from_millis(100),
            head_cache_ttl: Duration::from_secs(1),
            value_threshold_units: 1_000,
            detection_queue_size: 256,
            backoff: BackoffPolicy::default(),
            start_block: 0,
        }
    }
}

impl MonitorConfig {
    pub fn from_settings(settings: &crate::settings::Settings) -> Self {
        Self {
            block_scan_interval: Duration::from_secs(settings.monitor.block_scan_interval_seconds),
            event_scan_interval: Duration::from_secs(settings.monitor.event_scan_interval_seconds),
            max_blocks_per_poll: settings.monitor.max_blocks_per_poll,
            inter_block_delay: Duration::from_millis(settings.monitor.inter_block_delay_ms),
            head_cache_ttl: Duration::from_millis(settings.rpc.head_cache_ttl_ms),
            value_threshold_units: settings.monitor.value_threshold_units,
            detection_queue_size: settings.monitor.detection_queue_size,
            backoff: BackoffPolicy {
                max_retries: settings.gateway.max_retries,
                initial_backoff: Duration::from_millis(settings.gateway.initial_backoff_ms),
                multiplier: settings.gateway.backoff_multiplier,
                max_jitter: Duration::from_millis(settings.gateway.max_jitter_ms),
            },
            start_block: settings.monitor.start_block,
        }
    }
}

/// Task handles for a running monitor. Dropping them does not stop the
/// tasks; process shutdown is the only cancellation mechanism.
pub struct MonitorHandles {
    pub block_poller: JoinHandle<()>,
    pub event_poller: JoinHandle<()>,
    pub detection_handler: JoinHandle<()>,
}

// ---------------------------------------------------------------------------
// Window processors
// ---------------------------------------------------------------------------

/// Fast-tick processor: per-block transaction heuristics.
struct BlockScanProcessor {
    client: Arc<dyn ChainClient>,
    policy: BackoffPolicy,
    detections: mpsc::Sender<DetectionEvent>,
    threshold_wei: U256,
    inter_block_delay: Duration,
}

#[async_trait]
impl WindowProcessor for BlockScanProcessor {
    async fn process_window(&self, window: &PollWindow) -> Result<(), MonitorError> {
        for number in window.from_block..=window.to_block {
            let block = call_with_backoff(&self.policy, "get_block", || {
                self.client.block_with_txs(number)
            })
            .await?;

            let Some(block) = block else {
                warn!("block {} not yet available, skipping", number);
                continue;
            };

            // Per-block best effort: a failing block is logged and the
            // window moves on past it.
            match block_scan::scan_block(self.client.as_ref(), &block, self.threshold_wei).await
            {
                Ok(found) => {
                    metrics::increment_blocks_scanned("block_scan");
                    for detection in found {
                        metrics::increment_detection(detection.kind.as_str());
                        if self.detections.send(detection).await.is_err() {
                            warn!("detection queue closed, dropping block scan output");
                            return Ok(());
                        }
                    }
                }
                Err(e) => error!("failed to scan block {}: {}", number, e),
            }

            if number < window.to_block && !self.inter_block_delay.is_zero() {
                sleep(self.inter_block_delay).await;
            }
        }
        Ok(())
    }
}

/// Slow-tick processor: structured event-log sources with fallback.
struct LogScanProcessor {
    scanner: LogScanner,
    detections: mpsc::Sender<DetectionEvent>,
}

#[async_trait]
impl WindowProcessor for LogScanProcessor {
    async fn process_window(&self, window: &PollWindow) -> Result<(), MonitorError> {
        for detection in self.scanner.scan_window(window).await {
            metrics::increment_detection(detection.kind.as_str());
            if self.detections.send(detection).await.is_err() {
                warn!("detection queue closed, dropping log scan output");
                break;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Detection handling
// ---------------------------------------------------------------------------

/// Consumes detections: risk classification, record persistence, alert
/// escalation. Holds no polling state, so it is directly testable.
pub struct DetectionHandler {
    client: Arc<dyn ChainClient>,
    policy: BackoffPolicy,
    store: Arc<dyn MonitorStore>,
    risk: RiskEngine,
    dispatcher: Arc<AlertDispatcher>,
}

impl DetectionHandler {
    pub fn new(
        client: Arc<dyn ChainClient>,
        policy: BackoffPolicy,
        store: Arc<dyn MonitorStore>,
        risk: RiskEngine,
        dispatcher: Arc<AlertDispatcher>,
    ) -> Self {
        Self {
            client,
            policy,
            store,
            risk,
            dispatcher,
        }
    }

    /// Process one detection to completion. Persistence failures are
    /// logged and swallowed; only RPC failures propagate (and are
    /// swallowed by the drain loop).
    pub async fn handle(&self, detection: &DetectionEvent) -> Result<(), MonitorError> {
        let span = info_span!("detection", kind = detection.kind.as_str());
        let _enter = span.enter();

        match detection.kind {
            AlertKind::SecurityAlert => {
                self.dispatcher
                    .dispatch(
                        detection.kind,
                        detection.target_address,
                        detection.evidence.clone(),
                        detection.tx_hash,
                        None,
                    )
                    .await;
            }
            AlertKind::SuspiciousTransaction => {
                self.save_suspicious_record(detection).await;

                // Confirmation tier: escalate only when the recipient's
                // code classifies as drainer- or rug-pull-shaped, or
                // when the structured source already vouched for it.
                if detection.source == DetectionSource::EventLogs {
                    self.dispatch_for(detection, AlertKind::SuspiciousTransaction)
                        .await;
                } else {
                    self.confirm_heuristic_detection(detection).await?;
                }
            }
            AlertKind::RugPull => {
                let code = self.fetch_code(detection).await?;
                let score = self.risk.score_rug_pull(&code);

                let record = TokenAnalysisRecord {
                    token_address: detection.target_address,
                    score: score.score,
                    risk_level: score.risk_level.to_string(),
                    matched_factors: score.matched_factors.clone(),
                    is_potential_rug_pull: score.is_potential_rug_pull,
                    analyzed_at: Utc::now(),
                };
                if let Err(e) = self.store.save_token_analysis(&record).await {
                    error!("failed to save token analysis: {}", e);
                }

                // Structured sources are pre-confirmed; heuristic paths
                // need the score to clear the flag threshold.
                if detection.source == DetectionSource::EventLogs
                    || score.is_potential_rug_pull
                {
                    self.dispatch_for(detection, AlertKind::RugPull).await;
                }
            }
            AlertKind::WalletDrainer => {
                let code = self.fetch_code(detection).await?;
                let assessment = self.risk.classify_drainer(&code);

                let confirmed = detection.source == DetectionSource::EventLogs
                    || assessment.is_drainer;

                if confirmed {
                    let record = DrainerRecord {
                        address: detection.target_address,
                        matched_patterns: assessment.matched_patterns,
                        tx_hash: detection.tx_hash,
                        first_seen_block: detection.block_number,
                        detected_at: Utc::now(),
                    };
                    if let Err(e) = self.store.save_drainer(&record).await {
                        error!("failed to save drainer record: {}", e);
                    }
                    self.dispatch_for(detection, AlertKind::WalletDrainer).await;
                }
            }
        }

        Ok(())
    }

    async fn save_suspicious_record(&self, detection: &DetectionEvent) {
        let record = SuspiciousTransactionRecord {
            tx_hash: detection.tx_hash,
            to: detection.target_address,
            reason: detection.evidence.clone(),
            block_number: detection.block_number,
            detected_at: Utc::now(),
        };
        if let Err(e) = self.store.save_suspicious_transaction(&record).await {
            error!("failed to save suspicious transaction: {}", e);
        }
    }

    /// Second tier for heuristic suspicious-transaction detections: run
    /// the recipient's code through both classifiers and escalate to the
    /// stronger alert kind when either confirms.
    async fn confirm_heuristic_detection(
        &self,
        detection: &DetectionEvent,
    ) -> Result<(), MonitorError> {
        let code = self.fetch_code(detection).await?;
        if code.is_empty() {
            return Ok(());
        }

        let drainer = self.risk.classify_drainer(&code);
        if drainer.is_drainer {
            let record = DrainerRecord {
                address: detection.target_address,
                matched_patterns: drainer.matched_patterns,
                tx_hash: detection.tx_hash,
                first_seen_block: detection.block_number,
                detected_at: Utc::now(),
            };
            if let Err(e) = self.store.save_drainer(&record).await {
                error!("failed to save drainer record: {}", e);
            }
            self.dispatch_for(detection, AlertKind::WalletDrainer).await;
            return Ok(());
        }

        let score = self.risk.score_rug_pull(&code);
        if score.is_potential_rug_pull {
            let record = TokenAnalysisRecord {
                token_address: detection.target_address,
                score: score.score,
                risk_level: score.risk_level.to_string(),
                matched_factors: score.matched_factors,
                is_potential_rug_pull: true,
                analyzed_at: Utc::now(),
            };
            if let Err(e) = self.store.save_token_analysis(&record).await {
                error!("failed to save token analysis: {}", e);
            }
            self.dispatch_for(detection, AlertKind::RugPull).await;
        }

        Ok(())
    }

    async fn fetch_code(&self, detection: &DetectionEvent) -> Result<String, MonitorError> {
        let code = call_with_backoff(&self.policy, "get_code", || {
            self.client.code_at(detection.target_address)
        })
        .await?;
        // The pattern tables match readable fragments (verified source,
        // embedded strings); lossy decoding keeps whatever is matchable
        // in raw bytecode.
        Ok(String::from_utf8_lossy(&code).into_owned())
    }

    async fn dispatch_for(&self, detection: &DetectionEvent, kind: AlertKind) {
        self.dispatcher
            .dispatch(
                kind,
                detection.target_address,
                detection.evidence.clone(),
                detection.tx_hash,
                None,
            )
            .await;
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct SecurityMonitor {
    config: MonitorConfig,
    client: Arc<dyn ChainClient>,
    head: Arc<ChainHeadCache>,
    dispatcher: Arc<AlertDispatcher>,
    store: Arc<dyn MonitorStore>,
    risk: RiskEngine,
}

impl SecurityMonitor {
    pub fn new(
        config: MonitorConfig,
        client: Arc<dyn ChainClient>,
        store: Arc<dyn MonitorStore>,
        dispatcher: AlertDispatcher,
        risk: RiskEngine,
    ) -> Self {
        let head = Arc::new(ChainHeadCache::new(
            client.clone(),
            config.backoff.clone(),
            config.head_cache_ttl,
        ));
        Self {
            config,
            client,
            head,
            dispatcher: Arc::new(dispatcher),
            store,
            risk,
        }
    }

    /// Subscribe to the realtime alert topic.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.dispatcher.subscribe()
    }

    pub fn dispatcher(&self) -> &Arc<AlertDispatcher> {
        &self.dispatcher
    }

    /// Spawn the full pipeline: both pollers and the detection handler.
    pub async fn spawn(self) -> Result<MonitorHandles, MonitorError> {
        let start_block = if self.config.start_block > 0 {
            self.config.start_block
        } else {
            self.head.head().await?
        };
        info!("security monitor starting at block {}", start_block);

        let (detections_tx, mut detections_rx) =
            mpsc::channel::<DetectionEvent>(self.config.detection_queue_size);

        let threshold_wei = block_scan::value_threshold_wei(self.config.value_threshold_units);

        let block_processor = Arc::new(BlockScanProcessor {
            client: self.client.clone(),
            policy: self.config.backoff.clone(),
            detections: detections_tx.clone(),
            threshold_wei,
            inter_block_delay: self.config.inter_block_delay,
        });

        let log_processor = Arc::new(LogScanProcessor {
            scanner: LogScanner::new(
                self.client.clone(),
                self.config.backoff.clone(),
                threshold_wei,
                self.config.inter_block_delay,
            ),
            detections: detections_tx,
        });

        let block_poller = Arc::new(Poller::new(
            PollerConfig {
                label: "block_scan",
                interval: self.config.block_scan_interval,
                max_blocks_per_poll: self.config.max_blocks_per_poll,
            },
            self.head.clone(),
            Arc::new(CursorStore::new(start_block)),
            block_processor,
        ));

        let event_poller = Arc::new(Poller::new(
            PollerConfig {
                label: "event_scan",
                interval: self.config.event_scan_interval,
                max_blocks_per_poll: self.config.max_blocks_per_poll,
            },
            self.head.clone(),
            Arc::new(CursorStore::new(start_block)),
            log_processor,
        ));

        let handler = DetectionHandler::new(
            self.client.clone(),
            self.config.backoff.clone(),
            self.store.clone(),
            self.risk,
            self.dispatcher.clone(),
        );

        let detection_handler = tokio::spawn(async move {
            while let Some(detection) = detections_rx.recv().await {
                if let Err(e) = handler.handle(&detection).await {
                    warn!(
                        "failed to handle {} detection at block {}: {}",
                        detection.kind, detection.block_number, e
                    );
                }
            }
            info!("detection queue drained and closed");
        });

        Ok(MonitorHandles {
            block_poller: block_poller.spawn(),
            event_poller: event_poller.spawn(),
            detection_handler,
        })
    }
}
