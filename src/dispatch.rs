//! # Alert Dispatcher
//!
//! Turns confirmed detections into persisted, severity-classified
//! alerts and fans them out to per-user notification channels.
//!
//! ## Features
//!
//! - **Severity classification**: declarative kind → severity table
//! - **Persist-then-notify**: alerts are written to the store before any
//!   delivery; store failures never block fan-out
//! - **Preference routing**: per-user kind toggles and severity
//!   thresholds; delivery per enabled channel, failures isolated
//! - **Default fallback**: when no user is eligible, one delivery to the
//!   configured default destination
//! - **Realtime topic**: alert lifecycle events are published on a
//!   broadcast channel for UI consumption

use crate::metrics;
use crate::notify::NotifierRegistry;
use crate::store::MonitorStore;
use crate::types::{
    Alert, AlertEvent, AlertKind, Severity, UserNotificationPreference,
};
use chrono::Utc;
use ethers::types::{Address, H256};
use log::{debug, error, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Default kind → severity table.
pub fn default_severity_map() -> HashMap<AlertKind, Severity> {
    HashMap::from([
        (AlertKind::WalletDrainer, Severity::Critical),
        (AlertKind::RugPull, Severity::High),
        (AlertKind::SuspiciousTransaction, Severity::Medium),
        (AlertKind::SecurityAlert, Severity::Medium),
    ])
}

const ALERT_EVENT_CAPACITY: usize = 256;

pub struct AlertDispatcher {
    store: Arc<dyn MonitorStore>,
    registry: NotifierRegistry,
    preferences: Vec<UserNotificationPreference>,
    severity_map: HashMap<AlertKind, Severity>,
    events_tx: broadcast::Sender<AlertEvent>,
}

impl AlertDispatcher {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        registry: NotifierRegistry,
        preferences: Vec<UserNotificationPreference>,
        severity_map: HashMap<AlertKind, Severity>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(ALERT_EVENT_CAPACITY);
        Self {
            store,
            registry,
            preferences,
            severity_map,
            events_tx,
        }
    }

    /// Subscribe to the realtime alert topic.
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events_tx.subscribe()
    }

    /// Severity for a kind, from the table; unmapped kinds default to
    /// medium.
    pub fn classify_severity(&self, kind: AlertKind) -> Severity {
        self.severity_map
            .get(&kind)
            .copied()
            .unwrap_or(Severity::Medium)
    }

    /// Create, persist, publish and fan out an alert. The returned alert
    /// is the created record regardless of persistence or delivery
    /// outcomes; delivery is best-effort.
    pub async fn dispatch(
        &self,
        kind: AlertKind,
        target_address: Address,
        details: String,
        tx_hash: Option<H256>,
        severity: Option<Severity>,
    ) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4(),
            kind,
            severity: severity.unwrap_or_else(|| self.classify_severity(kind)),
            target_address,
            details,
            tx_hash,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        };

        if let Err(e) = self.store.create_alert(&alert).await {
            error!("failed to persist alert {}: {}", alert.id, e);
        }
        metrics::increment_alert(alert.kind.as_str(), alert.severity.as_str());

        let _ = self.events_tx.send(AlertEvent::Created(alert.clone()));

        self.fan_out(&alert).await;

        alert
    }

    /// Mark an alert resolved and publish the lifecycle event.
    pub async fn resolve(&self, id: Uuid, resolved_by: &str) {
        if let Err(e) = self
            .store
            .resolve_alert(id, resolved_by, Utc::now())
            .await
        {
            error!("failed to resolve alert {}: {}", id, e);
            return;
        }
        let _ = self.events_tx.send(AlertEvent::Resolved {
            id,
            resolved_by: resolved_by.to_string(),
        });
    }

    /// Terminal removal. Not a state transition; no lifecycle event.
    pub async fn delete(&self, id: Uuid) {
        if let Err(e) = self.store.delete_alert(id).await {
            error!("failed to delete alert {}: {}", id, e);
        }
    }

    /// Deliver to every eligible user channel; fall back to the default
    /// destination when nobody is eligible.
    async fn fan_out(&self, alert: &Alert) {
        let mut attempted = 0usize;

        for pref in &self.preferences {
            if !pref.wants(alert) {
                debug!(
                    "user {} skipped for {} alert (kind toggle or threshold)",
                    pref.user_id, alert.kind
                );
                continue;
            }

            for destination in pref.destinations() {
                let Some(notifier) = self.registry.get(destination.channel) else {
                    warn!("no notifier registered for channel {}", destination.channel);
                    continue;
                };

                attempted += 1;
                let result = notifier.send_alert(alert, &destination.target).await;
                if !result.success {
                    warn!(
                        "delivery to {}:{} failed for alert {}: {}",
                        destination.channel,
                        destination.target,
                        alert.id,
                        result.error.unwrap_or_default()
                    );
                    metrics::increment_delivery_failure(&destination.channel.to_string());
                }
            }
        }

        if attempted == 0 {
            debug!(
                "no user channel eligible for alert {}, using default destination",
                alert.id
            );
            let result = self.registry.deliver_default(alert).await;
            if !result.success {
                warn!(
                    "default delivery failed for alert {}: {}",
                    alert.id,
                    result.error.unwrap_or_default()
                );
                metrics::increment_delivery_failure("default");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::Destination;
    use crate::types::NotificationChannel;

    fn dispatcher_with_defaults() -> AlertDispatcher {
        let registry = NotifierRegistry::new(Destination {
            channel: NotificationChannel::Browser,
            target: "ops".to_string(),
        });
        AlertDispatcher::new(
            Arc::new(MemoryStore::new()),
            registry,
            Vec::new(),
            default_severity_map(),
        )
    }

    #[test]
    fn severity_table_matches_defaults() {
        let dispatcher = dispatcher_with_defaults();
        assert_eq!(
            dispatcher.classify_severity(AlertKind::WalletDrainer),
            Severity::Critical
        );
        assert_eq!(
            dispatcher.classify_severity(AlertKind::RugPull),
            Severity::High
        );
        assert_eq!(
            dispatcher.classify_severity(AlertKind::SuspiciousTransaction),
            Severity::Medium
        );
    }

    #[tokio::test]
    async fn explicit_severity_overrides_table() {
        let dispatcher = dispatcher_with_defaults();
        let alert = dispatcher
            .dispatch(
                AlertKind::SuspiciousTransaction,
                Address::zero(),
                "test".to_string(),
                None,
                Some(Severity::Critical),
            )
            .await;
        assert_eq!(alert.severity, Severity::Critical);
    }
}
