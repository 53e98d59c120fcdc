//! # Notifiers
//!
//! Delivery of alerts to per-user channels. Each channel is a
//! `Notifier` implementation registered in a `NotifierRegistry`; the
//! dispatcher looks notifiers up by channel and treats every delivery as
//! best-effort.

use crate::types::{Alert, Destination, NotificationChannel, Severity};
use async_trait::async_trait;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// One delivery channel. Implementations must not panic on failure;
/// they report through the returned `DeliveryResult`.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_alert(&self, alert: &Alert, destination: &str) -> DeliveryResult;
}

fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Low => "ℹ️",
        Severity::Medium => "⚠️",
        Severity::High => "🚨",
        Severity::Critical => "🚨🚨",
    }
}

/// HTML message body shared by the channel implementations.
pub fn format_alert(alert: &Alert) -> String {
    let mut body = format!(
        "{} <b>{}</b> [{}]\n\n<b>Target:</b> {:?}\n<b>Details:</b> {}",
        severity_marker(alert.severity),
        alert.kind,
        alert.severity,
        alert.target_address,
        alert.details,
    );
    if let Some(hash) = alert.tx_hash {
        body.push_str(&format!("\n<b>Tx:</b> {:?}", hash));
    }
    body
}

/// Telegram Bot API notifier. The destination is the chat id.
pub struct TelegramNotifier {
    client: reqwest::Client,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: bot_token.into(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_alert(&self, alert: &Alert, destination: &str) -> DeliveryResult {
        if self.bot_token.is_empty() || destination.is_empty() {
            return DeliveryResult::failed("telegram bot token or chat id not configured");
        }

        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let message = format_alert(alert);

        match self
            .client
            .post(&url)
            .form(&[
                ("chat_id", destination),
                ("text", message.as_str()),
                ("parse_mode", "HTML"),
            ])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => DeliveryResult::ok(),
            Ok(response) => {
                DeliveryResult::failed(format!("telegram API returned {}", response.status()))
            }
            Err(e) => DeliveryResult::failed(e.to_string()),
        }
    }
}

/// Structured-log notifier. Used for the browser channel in headless
/// deployments and as the default fallback destination.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_alert(&self, alert: &Alert, destination: &str) -> DeliveryResult {
        info!(
            "[alert:{}] {} severity={} target={:?} details={}",
            destination, alert.kind, alert.severity, alert.target_address, alert.details
        );
        DeliveryResult::ok()
    }
}

/// Channel → notifier lookup plus the fallback destination used when no
/// user preference routes an alert anywhere.
pub struct NotifierRegistry {
    notifiers: HashMap<NotificationChannel, Arc<dyn Notifier>>,
    default_destination: Destination,
}

impl NotifierRegistry {
    pub fn new(default_destination: Destination) -> Self {
        Self {
            notifiers: HashMap::new(),
            default_destination,
        }
    }

    pub fn register(&mut self, channel: NotificationChannel, notifier: Arc<dyn Notifier>) {
        self.notifiers.insert(channel, notifier);
    }

    pub fn get(&self, channel: NotificationChannel) -> Option<&Arc<dyn Notifier>> {
        self.notifiers.get(&channel)
    }

    pub fn default_destination(&self) -> &Destination {
        &self.default_destination
    }

    /// Deliver to the fallback destination. Best-effort like every other
    /// delivery.
    pub async fn deliver_default(&self, alert: &Alert) -> DeliveryResult {
        let dest = &self.default_destination;
        match self.get(dest.channel) {
            Some(notifier) => notifier.send_alert(alert, &dest.target).await,
            None => {
                warn!(
                    "no notifier registered for default channel {}",
                    dest.channel
                );
                DeliveryResult::failed("default channel has no registered notifier")
            }
        }
    }
}
