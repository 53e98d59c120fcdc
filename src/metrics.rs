// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{counter, describe_counter, describe_gauge, gauge, Unit};

// NOTE: When the observability feature is disabled, provide no-op macro
// stubs so call sites compile unchanged.
#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = $value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {{
        let _ = $value;
        $(let _ = &$label_value;)*
    }};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{counter, describe_counter, describe_gauge, gauge};

/// Initializes the descriptions for all the metrics in the application.
/// Call once at startup.
pub fn describe_metrics() {
    describe_gauge!("cw_up", "Monitor process liveness (1=up).");
    describe_gauge!("cw_cursor_block", "Last fully processed block per watcher.");
    describe_counter!(
        "cw_blocks_scanned_total",
        "Blocks scanned, labeled by scan path."
    );
    describe_counter!(
        "cw_detections_total",
        "Detection events produced, labeled by kind."
    );
    describe_counter!(
        "cw_alerts_total",
        "Alerts dispatched, labeled by kind and severity."
    );
    describe_counter!(
        "cw_delivery_failures_total",
        "Notification delivery failures, labeled by channel."
    );
    describe_counter!(
        "cw_rpc_retries_total",
        "Rate-limit retries performed by the gateway, labeled by operation."
    );
}

pub fn set_up(up: bool) {
    gauge!("cw_up", if up { 1.0 } else { 0.0 });
}

pub fn set_cursor(watcher: &str, block: u64) {
    gauge!("cw_cursor_block", block as f64, "watcher" => watcher.to_string());
}

pub fn increment_blocks_scanned(path: &str) {
    counter!("cw_blocks_scanned_total", 1, "path" => path.to_string());
}

pub fn increment_detection(kind: &str) {
    counter!("cw_detections_total", 1, "kind" => kind.to_string());
}

pub fn increment_alert(kind: &str, severity: &str) {
    counter!(
        "cw_alerts_total",
        1,
        "kind" => kind.to_string(),
        "severity" => severity.to_string()
    );
}

pub fn increment_delivery_failure(channel: &str) {
    counter!("cw_delivery_failures_total", 1, "channel" => channel.to_string());
}

pub fn increment_rpc_retry(op: &str) {
    counter!("cw_rpc_retries_total", 1, "op" => op.to_string());
}
