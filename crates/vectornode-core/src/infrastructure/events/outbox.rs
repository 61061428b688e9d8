//! SQLite outbox implementation of the EventBus
//!
//! Rows in `rag_events` move `pending -> in_flight -> done`, or to `dead`
//! once their attempt budget is spent. The store's insert triggers write the
//! rows; this type only claims and settles them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::domain::events::{BusCounts, ChangeEvent, Delivery, EventBus, NackOutcome};
use crate::error::{Error, Result};
use crate::infrastructure::time::{format_timestamp, now_timestamp};

/// Upper bound on the retry delay
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Delivery policy for the outbox
#[derive(Debug, Clone)]
pub struct BusSettings {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub visibility_timeout: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self::from_pipeline_config(&PipelineConfig::default())
    }
}

impl BusSettings {
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
        }
    }

    /// Delay before the next attempt after `attempts` failures
    pub fn backoff_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.retry_backoff
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

/// Outbox-table event bus
#[derive(Clone)]
pub struct SqliteEventBus {
    pool: SqlitePool,
    signal: Arc<Notify>,
    settings: BusSettings,
}

impl SqliteEventBus {
    pub fn new(pool: SqlitePool, settings: BusSettings) -> Self {
        Self {
            pool,
            signal: Arc::new(Notify::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &BusSettings {
        &self.settings
    }

    /// Return dead-lettered events to pending with a fresh budget
    pub async fn replay_dead(&self) -> Result<u64> {
        let now = now_timestamp();
        let replayed = sqlx::query(
            r#"
            UPDATE rag_events
            SET status = 'pending', attempts = 0, available_at = ?, claimed_at = NULL, updated_at = ?
            WHERE status = 'dead'
            "#,
        )
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if replayed > 0 {
            info!(events = replayed, "Dead-lettered events returned to pending");
            self.signal.notify_one();
        }
        Ok(replayed)
    }

    /// Delete acknowledged events last touched before `older_than` ago
    pub async fn purge_done(&self, older_than: Duration) -> Result<u64> {
        let age = chrono::Duration::from_std(older_than)
            .map_err(|e| Error::InvalidInput(format!("Purge age out of range: {}", e)))?;
        let cutoff = format_timestamp(&(Utc::now() - age));

        let purged = sqlx::query("DELETE FROM rag_events WHERE status = 'done' AND updated_at < ?")
            .bind(&cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();

        debug!(events = purged, "Purged acknowledged events");
        Ok(purged)
    }
}

#[async_trait]
impl EventBus for SqliteEventBus {
    async fn publish(&self, event: &ChangeEvent) -> Result<i64> {
        if matches!(event, ChangeEvent::Unknown) {
            return Err(Error::InvalidInput("Cannot publish an unknown event".to_string()));
        }

        let payload = serde_json::to_string(event)?;
        let now = now_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO rag_events (event_type, payload, status, attempts, available_at, created_at, updated_at)
            VALUES (?, ?, 'pending', 0, ?, ?, ?)
            "#,
        )
        .bind(event.event_type())
        .bind(&payload)
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        debug!(event_id = id, event_type = event.event_type(), "Event published");
        self.signal.notify_one();
        Ok(id)
    }

    async fn claim(&self, max: usize) -> Result<Vec<Delivery>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let visibility = chrono::Duration::from_std(self.settings.visibility_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let stale = format_timestamp(&(now - visibility));
        let now = format_timestamp(&now);

        let rows: Vec<(i64, i64, String)> = sqlx::query_as(
            r#"
            UPDATE rag_events
            SET status = 'in_flight', attempts = attempts + 1, claimed_at = ?, updated_at = ?
            WHERE id IN (
                SELECT id FROM rag_events
                WHERE (status = 'pending' AND available_at <= ?)
                   OR (status = 'in_flight' AND claimed_at <= ?)
                ORDER BY id
                LIMIT ?
            )
            RETURNING id, attempts, payload
            "#,
        )
        .bind(&now)
        .bind(&now)
        .bind(&now)
        .bind(&stale)
        .bind(max as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut deliveries: Vec<Delivery> = rows
            .into_iter()
            .map(|(id, attempts, payload)| Delivery {
                id,
                attempts: attempts.max(0) as u32,
                event: ChangeEvent::from_payload(&payload),
            })
            .collect();
        deliveries.sort_by_key(|d| d.id);

        if !deliveries.is_empty() {
            debug!(events = deliveries.len(), "Claimed events");
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE rag_events SET status = 'done', last_error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now_timestamp())
        .bind(delivery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<NackOutcome> {
        let now = Utc::now();

        if delivery.attempts >= self.settings.max_attempts {
            sqlx::query(
                "UPDATE rag_events SET status = 'dead', last_error = ?, updated_at = ? WHERE id = ?",
            )
            .bind(error)
            .bind(format_timestamp(&now))
            .bind(delivery.id)
            .execute(&self.pool)
            .await?;

            warn!(
                event_id = delivery.id,
                attempts = delivery.attempts,
                error = %error,
                "Event dead-lettered"
            );
            return Ok(NackOutcome::DeadLettered);
        }

        let backoff = chrono::Duration::from_std(self.settings.backoff_for(delivery.attempts))
            .unwrap_or_else(|_| chrono::Duration::seconds(300));
        let retry_at = now + backoff;

        sqlx::query(
            r#"
            UPDATE rag_events
            SET status = 'pending', available_at = ?, claimed_at = NULL, last_error = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(format_timestamp(&retry_at))
        .bind(error)
        .bind(format_timestamp(&now))
        .bind(delivery.id)
        .execute(&self.pool)
        .await?;

        debug!(
            event_id = delivery.id,
            attempts = delivery.attempts,
            retry_at = %retry_at,
            "Event scheduled for retry"
        );
        Ok(NackOutcome::Retried { retry_at })
    }

    async fn recover(&self) -> Result<u64> {
        let recovered = sqlx::query(
            "UPDATE rag_events SET status = 'pending', claimed_at = NULL, updated_at = ? WHERE status = 'in_flight'",
        )
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if recovered > 0 {
            info!(events = recovered, "Recovered in-flight events");
        }
        Ok(recovered)
    }

    async fn counts(&self) -> Result<BusCounts> {
        let (pending, in_flight, done, dead): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'in_flight'), 0),
                COALESCE(SUM(status = 'done'), 0),
                COALESCE(SUM(status = 'dead'), 0)
            FROM rag_events
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(BusCounts {
            pending,
            in_flight,
            done,
            dead,
        })
    }

    fn signal(&self) -> Arc<Notify> {
        self.signal.clone()
    }
}
