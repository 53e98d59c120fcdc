//! # Chainwatch Daemon
//!
//! Continuous service running the full monitoring pipeline: block and
//! event-log pollers, risk classification, alert persistence and
//! notification fan-out.
//!
//! ## Overview
//!
//! This service:
//! - Polls blocks on the fast tick and event-log sources on the slow
//!   tick (intervals configurable via `[monitor]` in Config.toml)
//! - Persists alerts to Postgres when `DATABASE_URL` is set, to memory
//!   otherwise
//! - Delivers alerts via Telegram when `CW_TELEGRAM_BOT_TOKEN` is set
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin watchd -- --config Config.toml
//! ```
//!
//! Press Ctrl+C to stop. Process shutdown is the only cancellation
//! mechanism; in-flight poll cycles are abandoned with the process.

use anyhow::Result;
use chainwatch::notify::{LogNotifier, TelegramNotifier};
use chainwatch::types::{Destination, NotificationChannel};
use chainwatch::{
    metrics, AlertDispatcher, AlertEvent, EthersChainClient, MemoryStore, MonitorConfig,
    MonitorStore, NotifierRegistry, PostgresStore, SecurityMonitor, Settings,
};
use clap::Parser;
use log::{info, warn};
use std::env;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "watchd", about = "Chainwatch monitoring daemon")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "Config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    env_logger::init();

    let args = Args::parse();

    println!("🚀 Starting Chainwatch Daemon");
    println!("═══════════════════════════════════════════════════════════════════\n");

    // 1. Load settings
    let settings = Settings::from_file(&args.config)?;
    println!("✅ Settings loaded from {}", args.config);

    metrics::describe_metrics();

    // 2. Create the chain client
    let rpc_url = settings
        .rpc
        .http_urls
        .first()
        .ok_or_else(|| anyhow::anyhow!("no RPC endpoint configured (rpc.http_urls)"))?;
    if settings.rpc.http_urls.len() > 1 {
        warn!(
            "{} RPC endpoints configured, using the first",
            settings.rpc.http_urls.len()
        );
    }
    let client = Arc::new(EthersChainClient::new(rpc_url, settings.rpc.qps_limit)?);
    println!("✅ Chain client ready ({})", client.endpoint());

    // 3. Connect the store
    let store: Arc<dyn MonitorStore> = if env::var("DATABASE_URL").is_ok() {
        let pg = PostgresStore::connect().await?;
        let open = pg.open_alert_count().await.unwrap_or_default();
        println!("✅ Postgres store connected ({} open alerts)", open);
        Arc::new(pg)
    } else {
        warn!("DATABASE_URL not set, alerts will not survive restarts");
        println!("✅ In-memory store ready");
        Arc::new(MemoryStore::new())
    };

    // 4. Build the notifier registry
    let mut registry = NotifierRegistry::new(Destination {
        channel: settings.alerts.default_channel,
        target: settings.alerts.default_destination.clone(),
    });
    registry.register(NotificationChannel::Browser, Arc::new(LogNotifier));
    registry.register(NotificationChannel::Email, Arc::new(LogNotifier));
    if !settings.telegram.bot_token.is_empty() {
        registry.register(
            NotificationChannel::Telegram,
            Arc::new(TelegramNotifier::new(settings.telegram.bot_token.clone())),
        );
        println!("✅ Telegram notifier registered");
    } else {
        registry.register(NotificationChannel::Telegram, Arc::new(LogNotifier));
        warn!("CW_TELEGRAM_BOT_TOKEN not set, telegram deliveries go to the log");
    }

    // 5. Wire the monitor
    let dispatcher = AlertDispatcher::new(
        store.clone(),
        registry,
        settings.alerts.preferences.clone(),
        settings.alerts.severity_map(),
    );
    let monitor = SecurityMonitor::new(
        MonitorConfig::from_settings(&settings),
        client,
        store,
        dispatcher,
        settings.risk.build_engine(),
    );

    // 6. Surface the realtime topic in the daemon log
    let mut alert_events = monitor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = alert_events.recv().await {
            match event {
                AlertEvent::Created(alert) => {
                    info!(
                        "alert created: {} {} severity={} target={:?}",
                        alert.id, alert.kind, alert.severity, alert.target_address
                    );
                }
                AlertEvent::Resolved { id, resolved_by } => {
                    info!("alert resolved: {} by {}", id, resolved_by);
                }
            }
        }
    });

    // 7. Run until Ctrl+C
    let handles = monitor.spawn().await?;
    metrics::set_up(true);
    println!("✅ Monitor running (Ctrl+C to stop)\n");

    signal::ctrl_c().await?;
    println!("\n🛑 Shutting down");
    metrics::set_up(false);

    handles.block_poller.abort();
    handles.event_poller.abort();
    handles.detection_handler.abort();

    Ok(())
}
