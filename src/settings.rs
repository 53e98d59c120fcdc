use crate::dispatch::default_severity_map;
use crate::risk::{
    default_drainer_patterns, default_rug_pull_factors, DrainerPattern, RiskEngine, RiskFactor,
};
use crate::types::{AlertKind, NotificationChannel, Severity, UserNotificationPreference};
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    #[serde(default)]
    pub http_urls: Vec<String>,
    #[serde(default = "default_qps_limit")]
    pub qps_limit: u32,
    #[serde(default = "default_head_cache_ttl_ms")]
    pub head_cache_ttl_ms: u64,
}

fn default_qps_limit() -> u32 {
    25
}
fn default_head_cache_ttl_ms() -> u64 {
    1_000
}

impl Default for Rpc {
    fn default() -> Self {
        Self {
            http_urls: Vec::new(),
            qps_limit: default_qps_limit(),
            head_cache_ttl_ms: default_head_cache_ttl_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Gateway {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}
fn default_initial_backoff_ms() -> u64 {
    2_000
}
fn default_backoff_multiplier() -> f64 {
    1.5
}
fn default_max_jitter_ms() -> u64 {
    1_000
}

impl Default for Gateway {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Monitor {
    #[serde(default = "default_block_scan_interval_seconds")]
    pub block_scan_interval_seconds: u64,
    #[serde(default = "default_event_scan_interval_seconds")]
    pub event_scan_interval_seconds: u64,
    #[serde(default = "default_max_blocks_per_poll")]
    pub max_blocks_per_poll: u64,
    #[serde(default = "default_inter_block_delay_ms")]
    pub inter_block_delay_ms: u64,
    /// Whole native-token units above which a transfer is flagged.
    #[serde(default = "default_value_threshold_units")]
    pub value_threshold_units: u64,
    #[serde(default = "default_detection_queue_size")]
    pub detection_queue_size: usize,
    /// 0 starts at the current chain head.
    #[serde(default)]
    pub start_block: u64,
}

fn default_block_scan_interval_seconds() -> u64 {
    15
}
fn default_event_scan_interval_seconds() -> u64 {
    60
}
fn default_max_blocks_per_poll() -> u64 {
    10
}
fn default_inter_block_delay_ms() -> u64 {
    100
}
fn default_value_threshold_units() -> u64 {
    1_000
}
fn default_detection_queue_size() -> usize {
    256
}

impl Default for Monitor {
    fn default() -> Self {
        Self {
            block_scan_interval_seconds: default_block_scan_interval_seconds(),
            event_scan_interval_seconds: default_event_scan_interval_seconds(),
            max_blocks_per_poll: default_max_blocks_per_poll(),
            inter_block_delay_ms: default_inter_block_delay_ms(),
            value_threshold_units: default_value_threshold_units(),
            detection_queue_size: default_detection_queue_size(),
            start_block: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Risk {
    #[serde(default = "default_rug_pull_flag_threshold")]
    pub rug_pull_flag_threshold: f64,
    #[serde(default = "default_drainer_min_matches")]
    pub drainer_min_matches: usize,
    /// Empty list falls back to the built-in factor table.
    #[serde(default)]
    pub rug_pull_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub drainer_patterns: Vec<DrainerPattern>,
}

fn default_rug_pull_flag_threshold() -> f64 {
    70.0
}
fn default_drainer_min_matches() -> usize {
    2
}

impl Default for Risk {
    fn default() -> Self {
        Self {
            rug_pull_flag_threshold: default_rug_pull_flag_threshold(),
            drainer_min_matches: default_drainer_min_matches(),
            rug_pull_factors: Vec::new(),
            drainer_patterns: Vec::new(),
        }
    }
}

impl Risk {
    pub fn effective_rug_pull_factors(&self) -> Vec<RiskFactor> {
        if self.rug_pull_factors.is_empty() {
            default_rug_pull_factors()
        } else {
            self.rug_pull_factors.clone()
        }
    }

    pub fn effective_drainer_patterns(&self) -> Vec<DrainerPattern> {
        if self.drainer_patterns.is_empty() {
            default_drainer_patterns()
        } else {
            self.drainer_patterns.clone()
        }
    }

    pub fn build_engine(&self) -> RiskEngine {
        RiskEngine::new(
            self.effective_rug_pull_factors(),
            self.effective_drainer_patterns(),
            self.rug_pull_flag_threshold,
            self.drainer_min_matches,
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Alerts {
    /// Kind → severity overrides merged over the built-in table.
    #[serde(default)]
    pub severity_overrides: HashMap<AlertKind, Severity>,
    #[serde(default = "default_fallback_channel")]
    pub default_channel: NotificationChannel,
    #[serde(default = "default_fallback_destination")]
    pub default_destination: String,
    /// Notification preferences loaded by the daemon. Embedders supply
    /// their own source.
    #[serde(default)]
    pub preferences: Vec<UserNotificationPreference>,
}

fn default_fallback_channel() -> NotificationChannel {
    NotificationChannel::Browser
}
fn default_fallback_destination() -> String {
    "ops".to_string()
}

impl Alerts {
    /// Built-in kind → severity table with configured overrides applied.
    pub fn severity_map(&self) -> HashMap<AlertKind, Severity> {
        let mut map = default_severity_map();
        for (kind, severity) in &self.severity_overrides {
            map.insert(*kind, *severity);
        }
        map
    }
}

impl Default for Alerts {
    fn default() -> Self {
        Self {
            severity_overrides: HashMap::new(),
            default_channel: default_fallback_channel(),
            default_destination: default_fallback_destination(),
            preferences: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Telegram {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[default]
    #[serde(rename = "pretty")]
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Metrics {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_metrics_port() -> u16 {
    9_090
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub rpc: Rpc,
    #[serde(default)]
    pub gateway: Gateway,
    #[serde(default)]
    pub monitor: Monitor,
    #[serde(default)]
    pub risk: Risk,
    #[serde(default)]
    pub alerts: Alerts,
    #[serde(default)]
    pub telegram: Telegram,
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub metrics: Metrics,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder().add_source(File::with_name(path)).build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Environment variable overrides for deploy-time secrets and
        // endpoints.
        if let Ok(raw_http) = env::var("CW_RPC_HTTP_URLS") {
            if let Some(list) = parse_string_list(&raw_http) {
                if !list.is_empty() {
                    settings.rpc.http_urls = list;
                }
            }
        }
        if let Ok(token) = env::var("CW_TELEGRAM_BOT_TOKEN") {
            let trimmed = token.trim();
            if !trimmed.is_empty() {
                settings.telegram.bot_token = trimmed.to_string();
            }
        }

        Ok(settings)
    }
}

fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    // JSON array form first, then plain comma-separated.
    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
    }

    let parts: Vec<String> = trimmed
        .split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect();
    Some(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_url_list() {
        let parsed = parse_string_list(r#"["http://a:8545", "http://b:8545"]"#).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], "http://a:8545");
    }

    #[test]
    fn parses_comma_separated_url_list() {
        let parsed = parse_string_list("http://a:8545, http://b:8545").unwrap();
        assert_eq!(parsed, vec!["http://a:8545", "http://b:8545"]);
    }

    #[test]
    fn defaults_match_shipped_constants() {
        let settings = Settings::default();
        assert_eq!(settings.gateway.max_retries, 5);
        assert_eq!(settings.gateway.initial_backoff_ms, 2_000);
        assert_eq!(settings.monitor.block_scan_interval_seconds, 15);
        assert_eq!(settings.monitor.event_scan_interval_seconds, 60);
        assert_eq!(settings.risk.rug_pull_flag_threshold, 70.0);
        assert_eq!(settings.risk.drainer_min_matches, 2);
    }
}
