//! # Persistence
//!
//! The monitor writes alerts and detection side effects through the
//! `MonitorStore` trait and never reads them back for control flow.
//! Two implementations are provided:
//!
//! - **`PostgresStore`**: sqlx-backed, with an idempotent schema
//!   bootstrap and connect retries to survive startup races
//! - **`MemoryStore`**: in-process maps, for tests and embedders that
//!   bring their own durable store

use crate::error::MonitorError;
use crate::types::{
    Alert, DrainerRecord, SuspiciousTransactionRecord, TokenAnalysisRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{info, warn};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::env;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Database schema name.
pub const SCHEMA: &str = "chainwatch";

/// Store operations the monitor depends on. All calls are
/// fire-and-forget from the monitor's perspective: failures surface as
/// `MonitorError::Persistence` and are logged and swallowed upstream.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    async fn create_alert(&self, alert: &Alert) -> Result<(), MonitorError>;

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), MonitorError>;

    async fn delete_alert(&self, id: Uuid) -> Result<(), MonitorError>;

    async fn save_suspicious_transaction(
        &self,
        record: &SuspiciousTransactionRecord,
    ) -> Result<(), MonitorError>;

    async fn save_token_analysis(&self, record: &TokenAnalysisRecord)
        -> Result<(), MonitorError>;

    async fn save_drainer(&self, record: &DrainerRecord) -> Result<(), MonitorError>;
}

fn persistence_err(e: impl std::fmt::Display) -> MonitorError {
    MonitorError::Persistence(e.to_string())
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// sqlx-backed store writing into the `chainwatch` schema.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect using `DATABASE_URL` with capped exponential retry, then
    /// bootstrap the schema. Retries cover DNS/startup races when the
    /// database comes up alongside the monitor.
    pub async fn connect() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        Self::connect_with_url(&database_url).await
    }

    pub async fn connect_with_url(database_url: &str) -> anyhow::Result<Self> {
        let mut last_err: Option<anyhow::Error> = None;
        let max_attempts: u32 = 10;

        for attempt in 1..=max_attempts {
            match PgPoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Duration::from_secs(5))
                .connect(database_url)
                .await
            {
                Ok(pool) => {
                    info!(
                        "connected to database (attempt {}/{})",
                        attempt, max_attempts
                    );
                    let store = Self { pool };
                    match store.initialize_schema().await {
                        Ok(()) => return Ok(store),
                        Err(e) => last_err = Some(e),
                    }
                }
                Err(e) => last_err = Some(e.into()),
            }

            let delay_ms = (1u64 << attempt.min(6)) * 200;
            warn!(
                "database connect/init attempt {}/{} failed, retrying in {} ms",
                attempt, max_attempts, delay_ms
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("unknown database connection error")))
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", SCHEMA))
            .execute(&self.pool)
            .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {}.alerts (
                id UUID PRIMARY KEY,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                target_address TEXT NOT NULL,
                details TEXT NOT NULL,
                tx_hash TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                resolved BOOLEAN NOT NULL DEFAULT FALSE,
                resolved_at TIMESTAMPTZ,
                resolved_by TEXT
            )",
            SCHEMA
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {}.suspicious_transactions (
                id BIGSERIAL PRIMARY KEY,
                tx_hash TEXT,
                to_address TEXT NOT NULL,
                reason TEXT NOT NULL,
                block_number BIGINT NOT NULL,
                detected_at TIMESTAMPTZ NOT NULL,
                UNIQUE (tx_hash, reason)
            )",
            SCHEMA
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {}.token_analyses (
                id BIGSERIAL PRIMARY KEY,
                token_address TEXT NOT NULL,
                score DOUBLE PRECISION NOT NULL,
                risk_level TEXT NOT NULL,
                matched_factors TEXT[] NOT NULL,
                is_potential_rug_pull BOOLEAN NOT NULL,
                analyzed_at TIMESTAMPTZ NOT NULL
            )",
            SCHEMA
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {}.wallet_drainers (
                address TEXT PRIMARY KEY,
                matched_patterns TEXT[] NOT NULL,
                tx_hash TEXT,
                first_seen_block BIGINT NOT NULL,
                detected_at TIMESTAMPTZ NOT NULL
            )",
            SCHEMA
        ))
        .execute(&self.pool)
        .await?;

        info!("database schema ready");
        Ok(())
    }

    /// Unresolved alert count, used by the daemon's startup banner.
    pub async fn open_alert_count(&self) -> Result<i64, MonitorError> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS open FROM {}.alerts WHERE resolved = FALSE",
            SCHEMA
        ))
        .fetch_one(&self.pool)
        .await
        .map_err(persistence_err)?;

        row.try_get::<i64, _>("open").map_err(persistence_err)
    }
}

#[async_trait]
impl MonitorStore for PostgresStore {
    async fn create_alert(&self, alert: &Alert) -> Result<(), MonitorError> {
        sqlx::query(&format!(
            "INSERT INTO {}.alerts
                (id, kind, severity, target_address, details, tx_hash, created_at, resolved)
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE)
             ON CONFLICT (id) DO NOTHING",
            SCHEMA
        ))
        .bind(alert.id)
        .bind(alert.kind.as_str())
        .bind(alert.severity.as_str())
        .bind(format!("{:?}", alert.target_address))
        .bind(&alert.details)
        .bind(alert.tx_hash.map(|h| format!("{:?}", h)))
        .bind(alert.created_at)
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        Ok(())
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        sqlx::query(&format!(
            "UPDATE {}.alerts
             SET resolved = TRUE, resolved_at = $2, resolved_by = $3
             WHERE id = $1 AND resolved = FALSE",
            SCHEMA
        ))
        .bind(id)
        .bind(resolved_at)
        .bind(resolved_by)
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        Ok(())
    }

    async fn delete_alert(&self, id: Uuid) -> Result<(), MonitorError> {
        sqlx::query(&format!("DELETE FROM {}.alerts WHERE id = $1", SCHEMA))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(persistence_err)?;

        Ok(())
    }

    async fn save_suspicious_transaction(
        &self,
        record: &SuspiciousTransactionRecord,
    ) -> Result<(), MonitorError> {
        sqlx::query(&format!(
            "INSERT INTO {}.suspicious_transactions
                (tx_hash, to_address, reason, block_number, detected_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (tx_hash, reason) DO NOTHING",
            SCHEMA
        ))
        .bind(record.tx_hash.map(|h| format!("{:?}", h)))
        .bind(format!("{:?}", record.to))
        .bind(&record.reason)
        .bind(record.block_number as i64)
        .bind(record.detected_at)
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        Ok(())
    }

    async fn save_token_analysis(
        &self,
        record: &TokenAnalysisRecord,
    ) -> Result<(), MonitorError> {
        sqlx::query(&format!(
            "INSERT INTO {}.token_analyses
                (token_address, score, risk_level, matched_factors, is_potential_rug_pull, analyzed_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            SCHEMA
        ))
        .bind(format!("{:?}", record.token_address))
        .bind(record.score)
        .bind(&record.risk_level)
        .bind(&record.matched_factors)
        .bind(record.is_potential_rug_pull)
        .bind(record.analyzed_at)
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        Ok(())
    }

    async fn save_drainer(&self, record: &DrainerRecord) -> Result<(), MonitorError> {
        sqlx::query(&format!(
            "INSERT INTO {}.wallet_drainers
                (address, matched_patterns, tx_hash, first_seen_block, detected_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (address) DO NOTHING",
            SCHEMA
        ))
        .bind(format!("{:?}", record.address))
        .bind(&record.matched_patterns)
        .bind(record.tx_hash.map(|h| format!("{:?}", h)))
        .bind(record.first_seen_block as i64)
        .bind(record.detected_at)
        .execute(&self.pool)
        .await
        .map_err(persistence_err)?;

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-process store used by tests and by embedders without Postgres.
#[derive(Default)]
pub struct MemoryStore {
    alerts: DashMap<Uuid, Alert>,
    suspicious_transactions: Mutex<Vec<SuspiciousTransactionRecord>>,
    token_analyses: Mutex<Vec<TokenAnalysisRecord>>,
    drainers: Mutex<Vec<DrainerRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alert(&self, id: Uuid) -> Option<Alert> {
        self.alerts.get(&id).map(|a| a.value().clone())
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.len()
    }

    pub fn suspicious_transactions(&self) -> Vec<SuspiciousTransactionRecord> {
        self.suspicious_transactions.lock().unwrap().clone()
    }

    pub fn token_analyses(&self) -> Vec<TokenAnalysisRecord> {
        self.token_analyses.lock().unwrap().clone()
    }

    pub fn drainers(&self) -> Vec<DrainerRecord> {
        self.drainers.lock().unwrap().clone()
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn create_alert(&self, alert: &Alert) -> Result<(), MonitorError> {
        self.alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn resolve_alert(
        &self,
        id: Uuid,
        resolved_by: &str,
        resolved_at: DateTime<Utc>,
    ) -> Result<(), MonitorError> {
        match self.alerts.get_mut(&id) {
            Some(mut alert) if !alert.resolved => {
                alert.resolved = true;
                alert.resolved_at = Some(resolved_at);
                alert.resolved_by = Some(resolved_by.to_string());
                Ok(())
            }
            Some(_) => Ok(()),
            None => Err(MonitorError::Persistence(format!(
                "alert {} not found",
                id
            ))),
        }
    }

    async fn delete_alert(&self, id: Uuid) -> Result<(), MonitorError> {
        self.alerts.remove(&id);
        Ok(())
    }

    async fn save_suspicious_transaction(
        &self,
        record: &SuspiciousTransactionRecord,
    ) -> Result<(), MonitorError> {
        self.suspicious_transactions
            .lock()
            .unwrap()
            .push(record.clone());
        Ok(())
    }

    async fn save_token_analysis(
        &self,
        record: &TokenAnalysisRecord,
    ) -> Result<(), MonitorError> {
        self.token_analyses.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn save_drainer(&self, record: &DrainerRecord) -> Result<(), MonitorError> {
        self.drainers.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlertKind, Severity};
    use ethers::types::Address;

    fn sample_alert() -> Alert {
        Alert {
            id: Uuid::new_v4(),
            kind: AlertKind::RugPull,
            severity: Severity::High,
            target_address: Address::random(),
            details: "token flagged".to_string(),
            tx_hash: None,
            created_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[tokio::test]
    async fn memory_store_alert_lifecycle() {
        let store = MemoryStore::new();
        let alert = sample_alert();
        let id = alert.id;

        store.create_alert(&alert).await.unwrap();
        assert_eq!(store.alert_count(), 1);

        store.resolve_alert(id, "analyst", Utc::now()).await.unwrap();
        let stored = store.alert(id).unwrap();
        assert!(stored.resolved);
        assert_eq!(stored.resolved_by.as_deref(), Some("analyst"));

        store.delete_alert(id).await.unwrap();
        assert_eq!(store.alert_count(), 0);
    }

    #[tokio::test]
    async fn resolving_unknown_alert_is_a_persistence_error() {
        let store = MemoryStore::new();
        let err = store
            .resolve_alert(Uuid::new_v4(), "analyst", Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MonitorError::Persistence(_)));
    }
}
