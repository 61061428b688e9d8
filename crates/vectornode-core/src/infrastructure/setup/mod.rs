//! SQLite storage for accepted provider configurations

use async_trait::async_trait;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::domain::setup::{SetupRecord, SetupRepository};
use crate::error::Result;
use crate::infrastructure::time::{format_timestamp, parse_timestamp};

pub struct SqliteSetupRepository {
    pool: SqlitePool,
}

impl SqliteSetupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SetupRepository for SqliteSetupRepository {
    async fn save_active(&self, record: &SetupRecord) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE setup_configurations SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO setup_configurations
                (id, provider, chat_model, embed_model, base_url, api_key_hint, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.provider)
        .bind(&record.chat_model)
        .bind(&record.embed_model)
        .bind(&record.base_url)
        .bind(&record.api_key_hint)
        .bind(format_timestamp(&record.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(id = %record.id, provider = %record.provider, "Setup configuration saved");
        Ok(())
    }

    async fn active(&self) -> Result<Option<SetupRecord>> {
        let row: Option<SetupRow> =
            sqlx::query_as("SELECT * FROM setup_configurations WHERE is_active = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(SetupRow::into_record))
    }

    async fn history(&self, limit: usize) -> Result<Vec<SetupRecord>> {
        let rows: Vec<SetupRow> = sqlx::query_as(
            "SELECT * FROM setup_configurations ORDER BY created_at DESC, id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SetupRow::into_record).collect())
    }
}

#[derive(Debug, FromRow)]
struct SetupRow {
    id: String,
    provider: String,
    chat_model: String,
    embed_model: String,
    base_url: Option<String>,
    api_key_hint: Option<String>,
    is_active: i64,
    created_at: String,
}

impl SetupRow {
    fn into_record(self) -> SetupRecord {
        SetupRecord {
            is_active: self.is_active == 1,
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            provider: self.provider,
            chat_model: self.chat_model,
            embed_model: self.embed_model,
            base_url: self.base_url,
            api_key_hint: self.api_key_hint,
        }
    }
}
