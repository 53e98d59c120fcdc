//! # Chainwatch
//!
//! A monitoring pipeline for on-chain threat detection and
//! severity-routed alerting on EVM networks. Chainwatch ingests blocks
//! and a fixed set of on-chain event sources, applies heuristic and
//! pattern-weighted risk detection, and turns confirmed detections into
//! persisted alerts fanned out to per-user notification channels.
//!
//! ## Overview
//!
//! The pipeline is built to stay alive rather than to be exact: it
//! survives RPC rate limits with multiplicative backoff, catches up
//! after backlogs with bounded windows, isolates failures across
//! independent event sources, and never blocks detection on a slow
//! notifier or store.
//!
//! ## Architecture
//!
//! ### Ingestion Layer
//! Two interval-driven pollers walk the chain behind independent
//! cursors: a fast tick running per-block transaction heuristics and a
//! slow tick querying four structured event-log sources (with a manual
//! block-scan fallback when a provider cannot serve log filters).
//!
//! ### Classification Layer
//! Detections concerning a contract address are confirmed against the
//! risk engine: a weighted rug-pull factor table and a drainer
//! indicator set, both pure functions of the contract code text.
//!
//! ### Dispatch Layer
//! Confirmed detections become severity-classified alerts: persisted
//! through the store interface, published on a realtime topic, and
//! delivered per user preference through the notifier registry.

// Core Types
/// Data model: detections, alerts, severities, preferences
pub mod types;
/// Error taxonomy and RPC error classification
pub mod error;

// Ingestion Layer
/// Rate-limit-aware chain access and head caching
pub mod gateway;
/// Last-processed-block tracking
pub mod cursor;
/// Interval scheduling and catch-up draining
pub mod poller;
/// Per-block transaction heuristics
pub mod block_scan;
/// Structured event-log sources with fallback scanning
pub mod log_scan;

// Classification Layer
/// Weighted pattern scoring and drainer classification
pub mod risk;

// Dispatch Layer
/// Severity classification, persistence and fan-out
pub mod dispatch;
/// Notification channels
pub mod notify;

// Infrastructure
/// Store interface with Postgres and in-memory implementations
pub mod store;
/// Metrics and observability
pub mod metrics;
/// Configuration management
pub mod settings;

// Top-level wiring
/// The monitor: pollers, detection queue and handler
pub mod monitor;

// Re-exports for convenience
pub use dispatch::AlertDispatcher;
pub use error::MonitorError;
pub use gateway::{call_with_backoff, BackoffPolicy, ChainClient, EthersChainClient};
pub use monitor::{DetectionHandler, MonitorConfig, SecurityMonitor};
pub use notify::{Notifier, NotifierRegistry};
pub use risk::RiskEngine;
pub use settings::Settings;
pub use store::{MemoryStore, MonitorStore, PostgresStore};
pub use types::{Alert, AlertEvent, AlertKind, DetectionEvent, Severity};
