//! SQLite implementation of the MemoryStore
//!
//! Nearest-neighbour search is an exact cosine scan: candidate ids and vectors
//! are loaded for rows of the query's dimension, ranked in Rust, and only the
//! winning rows are fetched in full.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::memory::{
    Context, Entity, EntityLink, KnowledgeBase, MemoryStore, Neighbor, NewContext, NewEntity,
    NewKnowledgeBase, Relation, StoreStats,
};
use crate::error::{Error, Result};
use crate::infrastructure::time::{format_timestamp, now_timestamp, parse_timestamp};

use super::vector;

const RELATION_SELECT: &str = r#"
    SELECT r.id, r.source_id, r.target_id,
           s.name AS source_name, t.name AS target_name,
           r.relation_type, r.edge_weight, r.metadata, r.created_at, r.updated_at
    FROM relations r
    JOIN entities s ON s.id = r.source_id
    JOIN entities t ON t.id = r.target_id
"#;

/// SQLite implementation of the memory store
#[derive(Clone)]
pub struct SqliteMemoryStore {
    pool: SqlitePool,
    change_signal: Option<Arc<Notify>>,
}

impl SqliteMemoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            change_signal: None,
        }
    }

    /// Wake the change bus subscriber after every committed insert
    pub fn with_change_signal(mut self, signal: Arc<Notify>) -> Self {
        self.change_signal = Some(signal);
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn signal_change(&self) {
        if let Some(signal) = &self.change_signal {
            signal.notify_one();
        }
    }

    async fn fetch_by_ids<R>(&self, table: &str, ids: &[String]) -> Result<Vec<R>>
    where
        R: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT * FROM {} WHERE id IN (", table));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.clone());
        }
        separated.push_unseparated(")");

        Ok(builder.build_query_as::<R>().fetch_all(&self.pool).await?)
    }

    async fn nearest_contexts(
        &self,
        candidates: Vec<(String, Vec<u8>)>,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor<Context>>> {
        let ranked = vector::rank(query, candidates, k);
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let rows: Vec<ContextRow> = self.fetch_by_ids("contexts", &ids).await?;
        let mut by_id: HashMap<String, Context> = rows
            .into_iter()
            .map(|r| (r.id.clone(), r.into_context()))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|(id, distance)| by_id.remove(&id).map(|row| Neighbor { row, distance }))
            .collect())
    }

    async fn edges(&self, filter: &str, bind: &str) -> Result<Vec<Relation>> {
        let sql = format!(
            "{} WHERE {} ORDER BY r.edge_weight DESC, r.source_id, r.target_id, r.relation_type",
            RELATION_SELECT, filter
        );
        let rows: Vec<RelationRow> = sqlx::query_as(&sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RelationRow::into_relation).collect())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    // ========== Write Operations ==========

    async fn insert_kb(&self, kb: NewKnowledgeBase) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let metadata = serde_json::to_string(&kb.metadata)?;

        sqlx::query(
            r#"
            INSERT INTO knowledge_bases (id, user_id, role, content, vector, dimensions, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&kb.user_id)
        .bind(kb.role.as_str())
        .bind(&kb.content)
        .bind(vector::encode(&kb.vector))
        .bind(kb.vector.len() as i64)
        .bind(&metadata)
        .bind(now_timestamp())
        .execute(&self.pool)
        .await?;

        debug!(kb_id = %id, user_id = %kb.user_id, "Knowledge base entry saved");
        self.signal_change();
        Ok(id)
    }

    async fn insert_contexts(&self, kb_id: &str, rows: Vec<NewContext>) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());
        let mut inserted = 0u64;

        for row in &rows {
            let metadata = serde_json::to_string(&row.metadata)?;
            let result = sqlx::query(
                r#"
                INSERT INTO contexts (id, kb_id, chunk_index, text_chunk, vector, dimensions, metadata, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(kb_id, chunk_index) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(kb_id)
            .bind(row.chunk_index)
            .bind(&row.text_chunk)
            .bind(vector::encode(&row.vector))
            .bind(row.vector.len() as i64)
            .bind(&metadata)
            .bind(now_timestamp())
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();

            let (id,): (String,) =
                sqlx::query_as("SELECT id FROM contexts WHERE kb_id = ? AND chunk_index = ?")
                    .bind(kb_id)
                    .bind(row.chunk_index)
                    .fetch_one(&mut *tx)
                    .await?;
            ids.push(id);
        }

        tx.commit().await?;

        debug!(
            kb_id = %kb_id,
            contexts = rows.len(),
            inserted = inserted,
            "Contexts saved"
        );
        if inserted > 0 {
            self.signal_change();
        }
        Ok(ids)
    }

    async fn find_or_link_entity(&self, entity: NewEntity, context_id: &str) -> Result<EntityLink> {
        if entity.name.trim().is_empty() {
            return Err(Error::InvalidInput("Entity name must not be blank".to_string()));
        }

        let metadata = serde_json::to_string(&entity.metadata)?;
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before it reads
        let inserted = sqlx::query(
            r#"
            INSERT INTO entities (id, name, entity_type, description, vector, dimensions, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&entity.name)
        .bind(&entity.entity_type)
        .bind(&entity.description)
        .bind(vector::encode(&entity.vector))
        .bind(entity.vector.len() as i64)
        .bind(&metadata)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let (entity_id,): (String,) = sqlx::query_as("SELECT id FROM entities WHERE name = ?")
            .bind(&entity.name)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO entity_contexts (entity_id, context_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(entity_id, context_id) DO NOTHING
            "#,
        )
        .bind(&entity_id)
        .bind(context_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(
            entity_id = %entity_id,
            entity_name = %entity.name,
            context_id = %context_id,
            created = inserted,
            "Entity linked"
        );
        Ok(EntityLink {
            entity_id,
            created: inserted,
        })
    }

    async fn upsert_relation(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &str,
        context_id: &str,
    ) -> Result<i64> {
        let now = now_timestamp();
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction holds the write lock before it reads
        let created = sqlx::query(
            r#"
            INSERT INTO relations (id, source_id, target_id, relation_type, edge_weight, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, 1, '{}', ?, ?)
            ON CONFLICT(source_id, target_id, relation_type) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(source_id)
        .bind(target_id)
        .bind(relation_type)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let (relation_id,): (String,) = sqlx::query_as(
            "SELECT id FROM relations WHERE source_id = ? AND target_id = ? AND relation_type = ?",
        )
        .bind(source_id)
        .bind(target_id)
        .bind(relation_type)
        .fetch_one(&mut *tx)
        .await?;

        let observed = sqlx::query(
            r#"
            INSERT INTO relation_observations (relation_id, context_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(relation_id, context_id) DO NOTHING
            "#,
        )
        .bind(&relation_id)
        .bind(context_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if observed && !created {
            sqlx::query(
                "UPDATE relations SET edge_weight = edge_weight + 1, updated_at = ? WHERE id = ?",
            )
            .bind(&now)
            .bind(&relation_id)
            .execute(&mut *tx)
            .await?;
        }

        let (weight,): (i64,) = sqlx::query_as("SELECT edge_weight FROM relations WHERE id = ?")
            .bind(&relation_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            relation_id = %relation_id,
            source_id = %source_id,
            target_id = %target_id,
            relation_type = %relation_type,
            context_id = %context_id,
            edge_weight = weight,
            repeated = !observed,
            "Relation upserted"
        );
        Ok(weight)
    }

    async fn annotate_context(&self, context_id: &str, patch: &Value) -> Result<()> {
        let updated = sqlx::query("UPDATE contexts SET metadata = json_patch(metadata, ?) WHERE id = ?")
            .bind(serde_json::to_string(patch)?)
            .bind(context_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(Error::ContextNotFound(context_id.to_string()));
        }
        Ok(())
    }

    async fn merge_entity(&self, source_id: &str, target_id: &str) -> Result<()> {
        if source_id == target_id {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        // No-op write: takes the write lock and checks the target in one statement
        let target_exists = sqlx::query("UPDATE entities SET metadata = metadata WHERE id = ?")
            .bind(target_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            == 1;

        let source: Option<(String,)> = sqlx::query_as("SELECT id FROM entities WHERE id = ?")
            .bind(source_id)
            .fetch_optional(&mut *tx)
            .await?;
        if source.is_none() {
            // Already merged
            tx.commit().await?;
            debug!(source_id = %source_id, "Merge source absent, nothing to do");
            return Ok(());
        }
        if !target_exists {
            return Err(Error::EntityNotFound(target_id.to_string()));
        }

        let links = sqlx::query(
            r#"
            INSERT OR IGNORE INTO entity_contexts (entity_id, context_id, created_at)
            SELECT ?, context_id, created_at FROM entity_contexts WHERE entity_id = ?
            "#,
        )
        .bind(target_id)
        .bind(source_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let edges: Vec<(String, String, String, String, i64, String, String)> = sqlx::query_as(
            r#"
            SELECT id, source_id, target_id, relation_type, edge_weight, metadata, created_at
            FROM relations
            WHERE source_id = ? OR target_id = ?
            "#,
        )
        .bind(source_id)
        .bind(source_id)
        .fetch_all(&mut *tx)
        .await?;

        let now = now_timestamp();
        let remap = |id: &str| if id == source_id { target_id.to_string() } else { id.to_string() };
        for (old_id, from, to, relation_type, weight, metadata, created_at) in &edges {
            let (from, to) = (remap(from), remap(to));

            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT id FROM relations WHERE source_id = ? AND target_id = ? AND relation_type = ?",
            )
            .bind(&from)
            .bind(&to)
            .bind(relation_type)
            .fetch_optional(&mut *tx)
            .await?;

            let merged_id = match existing {
                Some((merged_id,)) => {
                    // Contexts that observed both edges count once
                    let (shared,): (i64,) = sqlx::query_as(
                        r#"
                        SELECT COUNT(*) FROM relation_observations o
                        WHERE o.relation_id = ?
                          AND o.context_id IN (
                              SELECT context_id FROM relation_observations WHERE relation_id = ?)
                        "#,
                    )
                    .bind(old_id)
                    .bind(&merged_id)
                    .fetch_one(&mut *tx)
                    .await?;

                    sqlx::query(
                        "UPDATE relations SET edge_weight = edge_weight + ?, updated_at = ? WHERE id = ?",
                    )
                    .bind((weight - shared).max(0))
                    .bind(&now)
                    .bind(&merged_id)
                    .execute(&mut *tx)
                    .await?;
                    merged_id
                }
                None => {
                    let merged_id = Uuid::new_v4().to_string();
                    sqlx::query(
                        r#"
                        INSERT INTO relations (id, source_id, target_id, relation_type, edge_weight, metadata, created_at, updated_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&merged_id)
                    .bind(&from)
                    .bind(&to)
                    .bind(relation_type)
                    .bind(weight)
                    .bind(metadata)
                    .bind(created_at)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await?;
                    merged_id
                }
            };

            sqlx::query(
                r#"
                INSERT OR IGNORE INTO relation_observations (relation_id, context_id, created_at)
                SELECT ?, context_id, created_at FROM relation_observations WHERE relation_id = ?
                "#,
            )
            .bind(&merged_id)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        }

        // Cascades the source's own links, edges and observations
        sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            source_id = %source_id,
            target_id = %target_id,
            links = links,
            relations = edges.len(),
            "Entities merged"
        );
        Ok(())
    }

    async fn delete_by_user(&self, user_id: &str) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM knowledge_bases WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        info!(user_id = %user_id, knowledge_bases = deleted, "User data deleted");
        Ok(deleted)
    }

    // ========== Lookups ==========

    async fn get_kb(&self, id: &str) -> Result<Option<KnowledgeBase>> {
        let row: Option<KbRow> = sqlx::query_as("SELECT * FROM knowledge_bases WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(KbRow::into_kb))
    }

    async fn get_context(&self, id: &str) -> Result<Option<Context>> {
        let row: Option<ContextRow> = sqlx::query_as("SELECT * FROM contexts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(ContextRow::into_context))
    }

    async fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = sqlx::query_as("SELECT * FROM entities WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(EntityRow::into_entity))
    }

    async fn entity_by_name(&self, name: &str, ignore_case: bool) -> Result<Option<Entity>> {
        let row: Option<EntityRow> = if ignore_case {
            // An exact-case match wins over other spellings
            sqlx::query_as(
                "SELECT * FROM entities WHERE name = ? COLLATE NOCASE ORDER BY (name = ?) DESC, id LIMIT 1",
            )
            .bind(name)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT * FROM entities WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
        };
        Ok(row.map(EntityRow::into_entity))
    }

    async fn contexts_of_kb(&self, kb_id: &str) -> Result<Vec<Context>> {
        let rows: Vec<ContextRow> =
            sqlx::query_as("SELECT * FROM contexts WHERE kb_id = ? ORDER BY chunk_index")
                .bind(kb_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(ContextRow::into_context).collect())
    }

    async fn kbs_of_user(&self, user_id: &str) -> Result<Vec<KnowledgeBase>> {
        let rows: Vec<KbRow> = sqlx::query_as(
            "SELECT * FROM knowledge_bases WHERE user_id = ? ORDER BY created_at DESC, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(KbRow::into_kb).collect())
    }

    // ========== Vector Search ==========

    async fn knn_contexts(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<Context>>> {
        let candidates: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT id, vector FROM contexts WHERE dimensions = ?")
                .bind(query.len() as i64)
                .fetch_all(&self.pool)
                .await?;
        self.nearest_contexts(candidates, query, k).await
    }

    async fn knn_entities(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<Entity>>> {
        let candidates: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT id, vector FROM entities WHERE dimensions = ?")
                .bind(query.len() as i64)
                .fetch_all(&self.pool)
                .await?;

        let ranked = vector::rank(query, candidates, k);
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let rows: Vec<EntityRow> = self.fetch_by_ids("entities", &ids).await?;
        let mut by_id: HashMap<String, Entity> = rows
            .into_iter()
            .map(|r| (r.id.clone(), r.into_entity()))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|(id, distance)| by_id.remove(&id).map(|row| Neighbor { row, distance }))
            .collect())
    }

    async fn knn_kbs(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor<KnowledgeBase>>> {
        let candidates: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT id, vector FROM knowledge_bases WHERE dimensions = ?")
                .bind(query.len() as i64)
                .fetch_all(&self.pool)
                .await?;

        let ranked = vector::rank(query, candidates, k);
        let ids: Vec<String> = ranked.iter().map(|(id, _)| id.clone()).collect();
        let rows: Vec<KbRow> = self.fetch_by_ids("knowledge_bases", &ids).await?;
        let mut by_id: HashMap<String, KnowledgeBase> =
            rows.into_iter().map(|r| (r.id.clone(), r.into_kb())).collect();

        Ok(ranked
            .into_iter()
            .filter_map(|(id, distance)| by_id.remove(&id).map(|row| Neighbor { row, distance }))
            .collect())
    }

    async fn knn_recent_contexts(
        &self,
        days: u32,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor<Context>>> {
        let cutoff = format_timestamp(&window_start(Duration::days(i64::from(days)))?);
        let candidates: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT id, vector FROM contexts WHERE dimensions = ? AND created_at >= ?",
        )
        .bind(query.len() as i64)
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;
        self.nearest_contexts(candidates, query, k).await
    }

    async fn disambiguate(&self, name: &str, context_vector: &[f32]) -> Result<Option<Entity>> {
        let candidates: Vec<(String, Vec<u8>)> = sqlx::query_as(
            "SELECT id, vector FROM entities WHERE name = ? COLLATE NOCASE AND dimensions = ?",
        )
        .bind(name)
        .bind(context_vector.len() as i64)
        .fetch_all(&self.pool)
        .await?;

        match vector::rank(context_vector, candidates, 1).into_iter().next() {
            Some((id, _)) => self.get_entity(&id).await,
            None => self.entity_by_name(name, true).await,
        }
    }

    // ========== Time Filters ==========

    async fn recent_contexts(&self, days: u32, limit: usize) -> Result<Vec<Context>> {
        let cutoff = window_start(Duration::days(i64::from(days)))?;
        self.contexts_between(cutoff, Utc::now(), limit).await
    }

    async fn contexts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Context>> {
        let rows: Vec<ContextRow> = sqlx::query_as(
            r#"
            SELECT * FROM contexts
            WHERE created_at >= ? AND created_at <= ?
            ORDER BY created_at DESC, id
            LIMIT ?
            "#,
        )
        .bind(format_timestamp(&start))
        .bind(format_timestamp(&end))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ContextRow::into_context).collect())
    }

    async fn recent_kbs(&self, hours: u32, limit: usize) -> Result<Vec<KnowledgeBase>> {
        self.kbs_since(window_start(Duration::hours(i64::from(hours)))?, limit)
            .await
    }

    async fn kbs_since(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<KnowledgeBase>> {
        let rows: Vec<KbRow> = sqlx::query_as(
            r#"
            SELECT * FROM knowledge_bases
            WHERE created_at >= ?
            ORDER BY created_at DESC, id
            LIMIT ?
            "#,
        )
        .bind(format_timestamp(&since))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(KbRow::into_kb).collect())
    }

    // ========== Graph Joins ==========

    async fn out_edges(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.edges("r.source_id = ?", entity_id).await
    }

    async fn in_edges(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.edges("r.target_id = ?", entity_id).await
    }

    async fn two_hop(&self, entity_id: &str) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT DISTINCT e.*
            FROM relations r1
            JOIN relations r2 ON r2.source_id = r1.target_id
            JOIN entities e ON e.id = r2.target_id
            WHERE r1.source_id = ?
            ORDER BY e.name, e.id
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EntityRow::into_entity).collect())
    }

    async fn top_edges(&self, k: usize) -> Result<Vec<Relation>> {
        let sql = format!(
            "{} ORDER BY r.edge_weight DESC, r.source_id, r.target_id, r.relation_type LIMIT ?",
            RELATION_SELECT
        );
        let rows: Vec<RelationRow> = sqlx::query_as(&sql)
            .bind(k as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RelationRow::into_relation).collect())
    }

    async fn siblings(&self, context_id: &str) -> Result<Vec<Context>> {
        let rows: Vec<ContextRow> = sqlx::query_as(
            r#"
            SELECT c.* FROM contexts c
            JOIN contexts origin ON origin.kb_id = c.kb_id
            WHERE origin.id = ? AND c.id != origin.id
            ORDER BY c.chunk_index
            "#,
        )
        .bind(context_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ContextRow::into_context).collect())
    }

    async fn contexts_of_entity(&self, entity_id: &str) -> Result<Vec<Context>> {
        let rows: Vec<ContextRow> = sqlx::query_as(
            r#"
            SELECT c.* FROM contexts c
            JOIN entity_contexts ec ON ec.context_id = c.id
            WHERE ec.entity_id = ?
            ORDER BY c.created_at DESC, c.id
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ContextRow::into_context).collect())
    }

    async fn entities_of_context(&self, context_id: &str) -> Result<Vec<Entity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(
            r#"
            SELECT e.* FROM entities e
            JOIN entity_contexts ec ON ec.entity_id = e.id
            WHERE ec.context_id = ?
            ORDER BY e.name, e.id
            "#,
        )
        .bind(context_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(EntityRow::into_entity).collect())
    }

    async fn relations_by_source(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.out_edges(entity_id).await
    }

    async fn relations_by_target(&self, entity_id: &str) -> Result<Vec<Relation>> {
        self.in_edges(entity_id).await
    }

    async fn relations_by_type(&self, relation_type: &str, limit: usize) -> Result<Vec<Relation>> {
        let sql = format!(
            "{} WHERE r.relation_type = ? ORDER BY r.edge_weight DESC, r.source_id, r.target_id LIMIT ?",
            RELATION_SELECT
        );
        let rows: Vec<RelationRow> = sqlx::query_as(&sql)
            .bind(relation_type)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(RelationRow::into_relation).collect())
    }

    // ========== Statistics ==========

    async fn stats(&self) -> Result<StoreStats> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM knowledge_bases),
                (SELECT COUNT(*) FROM contexts),
                (SELECT COUNT(*) FROM entities),
                (SELECT COUNT(*) FROM entity_contexts),
                (SELECT COUNT(*) FROM relations),
                (SELECT COUNT(*) FROM rag_events WHERE status = 'pending'),
                (SELECT COUNT(*) FROM rag_events WHERE status = 'in_flight'),
                (SELECT COUNT(*) FROM rag_events WHERE status = 'dead')
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            knowledge_bases: row.0,
            contexts: row.1,
            entities: row.2,
            entity_links: row.3,
            relations: row.4,
            events_pending: row.5,
            events_in_flight: row.6,
            events_dead: row.7,
        })
    }
}

// ========== Row Types ==========

/// Start of a window reaching `span` back from now
fn window_start(span: Duration) -> Result<DateTime<Utc>> {
    Utc::now()
        .checked_sub_signed(span)
        .ok_or_else(|| Error::InvalidInput(format!("time window of {span} is out of range")))
}

fn parse_metadata(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()))
}

#[derive(Debug, FromRow)]
struct KbRow {
    id: String,
    user_id: String,
    role: String,
    content: String,
    vector: Vec<u8>,
    metadata: String,
    created_at: String,
}

impl KbRow {
    fn into_kb(self) -> KnowledgeBase {
        KnowledgeBase {
            role: self.role.parse().unwrap_or_default(),
            vector: vector::decode(&self.vector),
            metadata: parse_metadata(&self.metadata),
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            user_id: self.user_id,
            content: self.content,
        }
    }
}

#[derive(Debug, FromRow)]
struct ContextRow {
    id: String,
    kb_id: String,
    chunk_index: i64,
    text_chunk: String,
    vector: Vec<u8>,
    metadata: String,
    created_at: String,
}

impl ContextRow {
    fn into_context(self) -> Context {
        Context {
            vector: vector::decode(&self.vector),
            metadata: parse_metadata(&self.metadata),
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            kb_id: self.kb_id,
            chunk_index: self.chunk_index,
            text_chunk: self.text_chunk,
        }
    }
}

#[derive(Debug, FromRow)]
struct EntityRow {
    id: String,
    name: String,
    entity_type: String,
    description: String,
    vector: Vec<u8>,
    metadata: String,
    created_at: String,
}

impl EntityRow {
    fn into_entity(self) -> Entity {
        Entity {
            vector: vector::decode(&self.vector),
            metadata: parse_metadata(&self.metadata),
            created_at: parse_timestamp(&self.created_at),
            id: self.id,
            name: self.name,
            entity_type: self.entity_type,
            description: self.description,
        }
    }
}

#[derive(Debug, FromRow)]
struct RelationRow {
    id: String,
    source_id: String,
    target_id: String,
    source_name: String,
    target_name: String,
    relation_type: String,
    edge_weight: i64,
    metadata: String,
    created_at: String,
    updated_at: String,
}

impl RelationRow {
    fn into_relation(self) -> Relation {
        Relation {
            metadata: parse_metadata(&self.metadata),
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
            id: self.id,
            source_id: self.source_id,
            target_id: self.target_id,
            source_name: self.source_name,
            target_name: self.target_name,
            relation_type: self.relation_type,
            edge_weight: self.edge_weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::Role;
    use crate::storage::{Database, DatabaseConfig};
    use serde_json::json;

    async fn store() -> SqliteMemoryStore {
        let db = Database::in_memory().await.unwrap();
        SqliteMemoryStore::new(db.pool().clone())
    }

    fn kb(user: &str, content: &str, vector: Vec<f32>) -> NewKnowledgeBase {
        NewKnowledgeBase {
            user_id: user.to_string(),
            role: Role::User,
            content: content.to_string(),
            vector,
            metadata: json!({}),
        }
    }

    fn chunk(index: i64, text: &str, vector: Vec<f32>) -> NewContext {
        NewContext {
            chunk_index: index,
            text_chunk: text.to_string(),
            vector,
            metadata: json!({ "chunk_index": index }),
        }
    }

    fn entity(name: &str, vector: Vec<f32>) -> NewEntity {
        NewEntity {
            name: name.to_string(),
            entity_type: "PERSON".to_string(),
            description: String::new(),
            vector,
            metadata: json!({ "type": "PERSON" }),
        }
    }

    async fn seeded_context(store: &SqliteMemoryStore) -> (String, String) {
        let kb_id = store.insert_kb(kb("u1", "text", vec![1.0, 0.0])).await.unwrap();
        let ids = store
            .insert_contexts(&kb_id, vec![chunk(0, "text", vec![1.0, 0.0])])
            .await
            .unwrap();
        (kb_id, ids[0].clone())
    }

    #[tokio::test]
    async fn test_insert_and_get_kb() {
        let store = store().await;
        let id = store
            .insert_kb(kb("u1", "Hello world.", vec![0.1, 0.2, 0.3]))
            .await
            .unwrap();

        let loaded = store.get_kb(&id).await.unwrap().unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(loaded.role, Role::User);
        assert_eq!(loaded.content, "Hello world.");
        assert_eq!(loaded.vector, vec![0.1, 0.2, 0.3]);
        assert!(store.get_kb("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_contexts_is_idempotent() {
        let store = store().await;
        let kb_id = store.insert_kb(kb("u1", "a. b.", vec![1.0])).await.unwrap();

        let first = store
            .insert_contexts(&kb_id, vec![chunk(0, "a.", vec![1.0]), chunk(1, "b.", vec![1.0])])
            .await
            .unwrap();
        let second = store
            .insert_contexts(&kb_id, vec![chunk(0, "a.", vec![1.0]), chunk(1, "b.", vec![1.0])])
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.contexts_of_kb(&kb_id).await.unwrap().len(), 2);

        let stats = store.stats().await.unwrap();
        // One KB_CREATED plus one CONTEXT_CREATED per new row
        assert_eq!(stats.events_pending, 3);
    }

    #[tokio::test]
    async fn test_insert_contexts_for_missing_kb_fails() {
        let store = store().await;
        let err = store
            .insert_contexts("nope", vec![chunk(0, "x", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DatabaseError(_)));
    }

    #[tokio::test]
    async fn test_find_or_link_entity_dedupes_by_name() {
        let store = store().await;
        let kb_id = store.insert_kb(kb("u1", "x", vec![1.0])).await.unwrap();
        let ctx = store
            .insert_contexts(&kb_id, vec![chunk(0, "x", vec![1.0]), chunk(1, "y", vec![1.0])])
            .await
            .unwrap();

        let first = store
            .find_or_link_entity(entity("John", vec![1.0]), &ctx[0])
            .await
            .unwrap();
        let second = store
            .find_or_link_entity(entity("John", vec![1.0]), &ctx[1])
            .await
            .unwrap();
        let again = store
            .find_or_link_entity(entity("John", vec![1.0]), &ctx[1])
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert!(!again.created);
        assert_eq!(first.entity_id, second.entity_id);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entities, 1);
        assert_eq!(stats.entity_links, 2);
        assert_eq!(store.contexts_of_entity(&first.entity_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_entity_names_are_case_sensitive() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;

        let upper = store.find_or_link_entity(entity("Apple", vec![1.0, 0.0]), &ctx).await.unwrap();
        let lower = store.find_or_link_entity(entity("apple", vec![1.0, 0.0]), &ctx).await.unwrap();
        assert_ne!(upper.entity_id, lower.entity_id);

        assert!(store.entity_by_name("APPLE", false).await.unwrap().is_none());
        let found = store.entity_by_name("apple", true).await.unwrap().unwrap();
        assert_eq!(found.name, "apple");
    }

    async fn extra_contexts(store: &SqliteMemoryStore, n: usize) -> Vec<String> {
        let kb_id = store.insert_kb(kb("u1", "more", vec![1.0, 0.0])).await.unwrap();
        let chunks = (0..n)
            .map(|i| chunk(i as i64, &format!("chunk {}", i), vec![1.0, 0.0]))
            .collect();
        store.insert_contexts(&kb_id, chunks).await.unwrap()
    }

    #[tokio::test]
    async fn test_upsert_relation_counts_observing_contexts() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        let mut contexts = vec![ctx];
        contexts.extend(extra_contexts(&store, 2).await);

        for (expected, context_id) in (1..=3).zip(&contexts) {
            let weight = store
                .upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", context_id)
                .await
                .unwrap();
            assert_eq!(weight, expected);
        }

        let edges = store.out_edges(&a.entity_id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_weight, 3);
        assert_eq!(edges[0].source_name, "A");
        assert_eq!(edges[0].target_name, "B");
        assert_eq!(store.in_edges(&b.entity_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_observation_keeps_weight() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();

        for _ in 0..3 {
            let weight = store
                .upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", &ctx)
                .await
                .unwrap();
            assert_eq!(weight, 1);
        }
        assert_eq!(store.out_edges(&a.entity_id).await.unwrap()[0].edge_weight, 1);
    }

    #[tokio::test]
    async fn test_concurrent_upserts_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("memory.db").display());
        let db = Database::new(DatabaseConfig::with_url(url)).await.unwrap();
        let store = Arc::new(SqliteMemoryStore::new(db.pool().clone()));

        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        let contexts = extra_contexts(&store, 8).await;

        let upserts = contexts.iter().map(|context_id| {
            let store = store.clone();
            let (a, b) = (a.entity_id.clone(), b.entity_id.clone());
            let context_id = context_id.clone();
            async move { store.upsert_relation(&a, &b, "KNOWS", &context_id).await }
        });
        let results = futures_util::future::join_all(upserts).await;
        assert!(results.iter().all(|r| r.is_ok()));

        let edges = store.out_edges(&a.entity_id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_weight, contexts.len() as i64);
        db.close().await;
    }

    #[tokio::test]
    async fn test_self_loop_relation_allowed() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();

        let weight = store
            .upsert_relation(&a.entity_id, &a.entity_id, "IS", &ctx)
            .await
            .unwrap();
        assert_eq!(weight, 1);
    }

    #[tokio::test]
    async fn test_merge_entity_moves_links_and_sums_weights() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let a2 = store.find_or_link_entity(entity("A.", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        let more = extra_contexts(&store, 2).await;

        store.upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", &ctx).await.unwrap();
        store.upsert_relation(&a2.entity_id, &b.entity_id, "KNOWS", &more[0]).await.unwrap();
        store.upsert_relation(&a2.entity_id, &b.entity_id, "KNOWS", &more[1]).await.unwrap();

        store.merge_entity(&a2.entity_id, &a.entity_id).await.unwrap();

        assert!(store.get_entity(&a2.entity_id).await.unwrap().is_none());
        let edges = store.out_edges(&a.entity_id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_weight, 3);

        // Idempotent
        store.merge_entity(&a2.entity_id, &a.entity_id).await.unwrap();
        assert_eq!(store.out_edges(&a.entity_id).await.unwrap()[0].edge_weight, 3);

        // Observations moved with the edge
        let weight = store
            .upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", &more[1])
            .await
            .unwrap();
        assert_eq!(weight, 3);
    }

    #[tokio::test]
    async fn test_merge_counts_shared_contexts_once() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let a2 = store.find_or_link_entity(entity("A.", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        let more = extra_contexts(&store, 1).await;

        store.upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", &ctx).await.unwrap();
        store.upsert_relation(&a2.entity_id, &b.entity_id, "KNOWS", &ctx).await.unwrap();
        store.upsert_relation(&a2.entity_id, &b.entity_id, "KNOWS", &more[0]).await.unwrap();

        store.merge_entity(&a2.entity_id, &a.entity_id).await.unwrap();

        let edges = store.out_edges(&a.entity_id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_weight, 2);
    }

    #[tokio::test]
    async fn test_merge_into_missing_target_is_not_found() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        store.upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", &ctx).await.unwrap();

        let err = store.merge_entity(&a.entity_id, "missing").await.unwrap_err();
        assert!(matches!(err, Error::EntityNotFound(_)));
        assert!(store.get_entity(&a.entity_id).await.unwrap().is_some());
        assert_eq!(store.out_edges(&a.entity_id).await.unwrap()[0].edge_weight, 1);
    }

    #[tokio::test]
    async fn test_merge_on_file_database_with_concurrent_writer() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("memory.db").display());
        let db = Database::new(DatabaseConfig::with_url(url)).await.unwrap();
        let store = Arc::new(SqliteMemoryStore::new(db.pool().clone()));

        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let a2 = store.find_or_link_entity(entity("A.", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        let contexts = extra_contexts(&store, 4).await;
        store.upsert_relation(&a2.entity_id, &b.entity_id, "KNOWS", &ctx).await.unwrap();

        let merge = {
            let store = store.clone();
            let (source, target) = (a2.entity_id.clone(), a.entity_id.clone());
            async move { store.merge_entity(&source, &target).await }
        };
        let writes = contexts.iter().map(|context_id| {
            let store = store.clone();
            let (a, b) = (a.entity_id.clone(), b.entity_id.clone());
            let context_id = context_id.clone();
            async move { store.upsert_relation(&a, &b, "KNOWS", &context_id).await.map(|_| ()) }
        });
        let (merged, written) = tokio::join!(merge, futures_util::future::join_all(writes));
        merged.unwrap();
        assert!(written.iter().all(|r| r.is_ok()));

        let edges = store.out_edges(&a.entity_id).await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_weight, contexts.len() as i64 + 1);
        db.close().await;
    }

    #[tokio::test]
    async fn test_annotate_context_merges_metadata() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;

        store
            .annotate_context(&ctx, &json!({ "extraction": { "topics": ["x"] } }))
            .await
            .unwrap();

        let loaded = store.get_context(&ctx).await.unwrap().unwrap();
        assert_eq!(loaded.metadata["chunk_index"], 0);
        assert_eq!(loaded.metadata["extraction"]["topics"][0], "x");
        assert!(matches!(
            store.annotate_context("missing", &json!({})).await,
            Err(Error::ContextNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_user_cascades_contexts_only() {
        let store = store().await;
        let (kb_id, ctx) = seeded_context(&store).await;
        store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let other = store.insert_kb(kb("u2", "keep", vec![1.0, 0.0])).await.unwrap();

        assert_eq!(store.delete_by_user("u1").await.unwrap(), 1);

        assert!(store.get_kb(&kb_id).await.unwrap().is_none());
        assert!(store.get_context(&ctx).await.unwrap().is_none());
        assert!(store.get_kb(&other).await.unwrap().is_some());

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.contexts, 0);
        assert_eq!(stats.entity_links, 0);
        assert_eq!(stats.entities, 1);
    }

    #[tokio::test]
    async fn test_knn_orders_by_distance() {
        let store = store().await;
        let near = store.insert_kb(kb("u1", "near", vec![1.0, 0.1])).await.unwrap();
        let far = store.insert_kb(kb("u1", "far", vec![0.0, 1.0])).await.unwrap();
        store.insert_kb(kb("u1", "other dims", vec![1.0, 0.0, 0.0])).await.unwrap();

        let hits = store.knn_kbs(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].row.id, near);
        assert_eq!(hits[1].row.id, far);
        assert!(hits[0].score() >= hits[1].score());
    }

    #[tokio::test]
    async fn test_two_hop_and_top_edges() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        let a = store.find_or_link_entity(entity("A", vec![1.0, 0.0]), &ctx).await.unwrap();
        let b = store.find_or_link_entity(entity("B", vec![1.0, 0.0]), &ctx).await.unwrap();
        let c = store.find_or_link_entity(entity("C", vec![1.0, 0.0]), &ctx).await.unwrap();

        let more = extra_contexts(&store, 1).await;

        store.upsert_relation(&a.entity_id, &b.entity_id, "KNOWS", &ctx).await.unwrap();
        store.upsert_relation(&b.entity_id, &c.entity_id, "KNOWS", &ctx).await.unwrap();
        store.upsert_relation(&b.entity_id, &c.entity_id, "KNOWS", &more[0]).await.unwrap();

        let hop = store.two_hop(&a.entity_id).await.unwrap();
        assert_eq!(hop.len(), 1);
        assert_eq!(hop[0].name, "C");

        let top = store.top_edges(1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].source_name, "B");
        assert_eq!(top[0].edge_weight, 2);
        assert_eq!(store.relations_by_type("KNOWS", 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_siblings_exclude_self_in_chunk_order() {
        let store = store().await;
        let kb_id = store.insert_kb(kb("u1", "x", vec![1.0])).await.unwrap();
        let ids = store
            .insert_contexts(
                &kb_id,
                vec![chunk(2, "c", vec![1.0]), chunk(0, "a", vec![1.0]), chunk(1, "b", vec![1.0])],
            )
            .await
            .unwrap();

        let siblings = store.siblings(&ids[2]).await.unwrap();
        let indices: Vec<i64> = siblings.iter().map(|c| c.chunk_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_time_filters() {
        let store = store().await;
        store.insert_kb(kb("u1", "recent", vec![1.0])).await.unwrap();

        assert_eq!(store.recent_kbs(1, 10).await.unwrap().len(), 1);
        let future = Utc::now() + Duration::hours(1);
        assert!(store.kbs_since(future, 10).await.unwrap().is_empty());
        assert_eq!(store.kbs_of_user("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_time_windows_past_the_calendar_are_invalid() {
        let store = store().await;

        assert!(matches!(
            store.recent_kbs(u32::MAX, 10).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.recent_contexts(200_000_000, 10).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            store.knn_recent_contexts(u32::MAX, &[1.0, 0.0], 5).await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_disambiguate_picks_nearest() {
        let store = store().await;
        let (_, ctx) = seeded_context(&store).await;
        store.find_or_link_entity(entity("Jaguar", vec![1.0, 0.0]), &ctx).await.unwrap();
        store.find_or_link_entity(entity("jaguar", vec![0.0, 1.0]), &ctx).await.unwrap();

        let hit = store.disambiguate("JAGUAR", &[0.1, 0.9]).await.unwrap().unwrap();
        assert_eq!(hit.name, "jaguar");
        assert!(store.disambiguate("Puma", &[1.0, 0.0]).await.unwrap().is_none());
    }
}
