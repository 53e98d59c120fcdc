//! Core data model shared across the monitoring pipeline.
//!
//! Detections are ephemeral: they are produced by the block and event-log
//! scanners, flow through the detection queue, and are consumed by
//! classification and dispatch. Only their side effects (alerts and the
//! persisted records) outlive the pipeline.

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Where a detection was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Per-block transaction heuristics.
    BlockScan,
    /// Structured event-log query against one of the declared sources.
    EventLogs,
    /// Manual block-by-block re-derivation when log queries are unsupported.
    FallbackScan,
}

impl std::fmt::Display for DetectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DetectionSource::BlockScan => "block_scan",
            DetectionSource::EventLogs => "event_logs",
            DetectionSource::FallbackScan => "fallback_scan",
        };
        write!(f, "{}", name)
    }
}

/// Alert category. Doubles as the detection kind so that a detection maps
/// onto the alert it may become without a translation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SecurityAlert,
    SuspiciousTransaction,
    RugPull,
    WalletDrainer,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::SecurityAlert => "security_alert",
            AlertKind::SuspiciousTransaction => "suspicious_transaction",
            AlertKind::RugPull => "rug_pull",
            AlertKind::WalletDrainer => "wallet_drainer",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert severity. The variant order is the ordinal order used for
/// threshold comparisons.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Ordinal scale: low(1) < medium(2) < high(3) < critical(4).
    pub fn ordinal(&self) -> u8 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
            Severity::Critical => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ephemeral detection signal. Not persisted; input to classification
/// and dispatch.
#[derive(Debug, Clone)]
pub struct DetectionEvent {
    pub source: DetectionSource,
    pub kind: AlertKind,
    pub target_address: Address,
    pub evidence: String,
    pub tx_hash: Option<H256>,
    pub block_number: u64,
}

/// An inclusive block range scheduled for one poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollWindow {
    pub from_block: u64,
    pub to_block: u64,
}

impl PollWindow {
    /// Window starting at `from`, capped to `max_blocks` and never past
    /// `head`.
    pub fn bounded(from: u64, head: u64, max_blocks: u64) -> Self {
        let to = head.min(from.saturating_add(max_blocks.saturating_sub(1)));
        Self {
            from_block: from,
            to_block: to,
        }
    }

    pub fn len(&self) -> u64 {
        self.to_block.saturating_sub(self.from_block) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.to_block < self.from_block
    }
}

/// A persisted, severity-classified alert. Created by the dispatcher;
/// mutated only through `resolve`; deletion is terminal removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub kind: AlertKind,
    pub severity: Severity,
    pub target_address: Address,
    pub details: String,
    pub tx_hash: Option<H256>,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// Realtime alert lifecycle events published on the broadcast topic for
/// UI consumption.
#[derive(Debug, Clone)]
pub enum AlertEvent {
    Created(Alert),
    Resolved { id: Uuid, resolved_by: String },
}

/// Notification channel identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Telegram,
    Email,
    Browser,
}

impl std::fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NotificationChannel::Telegram => "telegram",
            NotificationChannel::Email => "email",
            NotificationChannel::Browser => "browser",
        };
        write!(f, "{}", name)
    }
}

/// One concrete delivery target: a channel plus the channel-specific
/// address (chat id, email address, user topic).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub channel: NotificationChannel,
    pub target: String,
}

/// Per-channel configuration inside a user preference. `None` / `false`
/// means the channel is disabled for that user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub telegram: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub browser: bool,
}

/// A user's notification routing preferences. Owned externally; the core
/// only reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNotificationPreference {
    pub user_id: String,
    #[serde(default)]
    pub channels: ChannelConfig,
    /// Alert kinds explicitly toggled. A kind absent from the map counts
    /// as enabled.
    #[serde(default)]
    pub alert_kinds_enabled: HashMap<AlertKind, bool>,
    #[serde(default = "default_severity_threshold")]
    pub severity_threshold: Severity,
}

fn default_severity_threshold() -> Severity {
    Severity::Low
}

impl UserNotificationPreference {
    /// Whether this user should receive the given alert, per kind toggle
    /// and severity threshold.
    pub fn wants(&self, alert: &Alert) -> bool {
        if self.alert_kinds_enabled.get(&alert.kind) == Some(&false) {
            return false;
        }
        alert.severity.ordinal() >= self.severity_threshold.ordinal()
    }

    /// All destinations enabled for this user.
    pub fn destinations(&self) -> Vec<Destination> {
        let mut out = Vec::new();
        if let Some(chat_id) = &self.channels.telegram {
            out.push(Destination {
                channel: NotificationChannel::Telegram,
                target: chat_id.clone(),
            });
        }
        if let Some(email) = &self.channels.email {
            out.push(Destination {
                channel: NotificationChannel::Email,
                target: email.clone(),
            });
        }
        if self.channels.browser {
            out.push(Destination {
                channel: NotificationChannel::Browser,
                target: self.user_id.clone(),
            });
        }
        out
    }
}

/// Persisted side effect of a suspicious-transaction detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspiciousTransactionRecord {
    pub tx_hash: Option<H256>,
    pub to: Address,
    pub reason: String,
    pub block_number: u64,
    pub detected_at: DateTime<Utc>,
}

/// Persisted side effect of a token risk classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenAnalysisRecord {
    pub token_address: Address,
    pub score: f64,
    pub risk_level: String,
    pub matched_factors: Vec<String>,
    pub is_potential_rug_pull: bool,
    pub analyzed_at: DateTime<Utc>,
}

/// Persisted side effect of a wallet-drainer classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainerRecord {
    pub address: Address,
    pub matched_patterns: Vec<String>,
    pub tx_hash: Option<H256>,
    pub first_seen_block: u64,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordinal_order() {
        assert!(Severity::Low.ordinal() < Severity::Medium.ordinal());
        assert!(Severity::Medium.ordinal() < Severity::High.ordinal());
        assert!(Severity::High.ordinal() < Severity::Critical.ordinal());
        // Derived Ord agrees with the ordinal scale.
        assert!(Severity::Low < Severity::Critical);
    }

    #[test]
    fn poll_window_bounded_by_max_blocks() {
        let w = PollWindow::bounded(101, 1_000, 10);
        assert_eq!(w.from_block, 101);
        assert_eq!(w.to_block, 110);
        assert_eq!(w.len(), 10);
    }

    #[test]
    fn poll_window_capped_at_head() {
        let w = PollWindow::bounded(95, 100, 50);
        assert_eq!(w.to_block, 100);
        assert_eq!(w.len(), 6);
    }

    #[test]
    fn preference_defaults_to_all_kinds_enabled() {
        let pref = UserNotificationPreference {
            user_id: "u1".to_string(),
            channels: ChannelConfig::default(),
            alert_kinds_enabled: HashMap::new(),
            severity_threshold: Severity::Low,
        };
        let alert = Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::RugPull,
            severity: Severity::High,
            target_address: Address::zero(),
            details: String::new(),
            tx_hash: None,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        };
        assert!(pref.wants(&alert));
    }
}
