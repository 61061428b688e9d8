//! Database migrations
//!
//! Versioned SQLite schema for the memory store. The change bus is an
//! outbox table filled by `AFTER INSERT` triggers, so an event row commits
//! in the same transaction as the knowledge base or context row it announces.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 3;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Four-tier memory model
const MIGRATION_V1: &str = r#"
    -- Knowledge base entries: one per ingestion call
    CREATE TABLE IF NOT EXISTS knowledge_bases (
        id TEXT PRIMARY KEY NOT NULL,
        user_id TEXT NOT NULL CHECK (length(trim(user_id)) > 0),
        role TEXT NOT NULL CHECK (role IN ('USER', 'AGENT', 'SYSTEM')),
        content TEXT NOT NULL CHECK (length(content) > 0),
        vector BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_knowledge_bases_user_id ON knowledge_bases(user_id);
    CREATE INDEX IF NOT EXISTS idx_knowledge_bases_created_at ON knowledge_bases(created_at);

    -- Embedded chunks of a knowledge base entry
    CREATE TABLE IF NOT EXISTS contexts (
        id TEXT PRIMARY KEY NOT NULL,
        kb_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
        text_chunk TEXT NOT NULL CHECK (length(text_chunk) > 0),
        vector BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        UNIQUE (kb_id, chunk_index)
    );

    CREATE INDEX IF NOT EXISTS idx_contexts_created_at ON contexts(created_at);

    -- Deduplicated concepts; name is the canonical, case-sensitive identity
    CREATE TABLE IF NOT EXISTS entities (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE CHECK (length(name) > 0),
        entity_type TEXT NOT NULL DEFAULT 'OTHER',
        description TEXT NOT NULL DEFAULT '',
        vector BLOB NOT NULL,
        dimensions INTEGER NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_entities_name_nocase ON entities(name COLLATE NOCASE);

    -- Entity <-> context junction
    CREATE TABLE IF NOT EXISTS entity_contexts (
        entity_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        context_id TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        PRIMARY KEY (entity_id, context_id)
    );

    CREATE INDEX IF NOT EXISTS idx_entity_contexts_context_id ON entity_contexts(context_id);

    -- Directed, typed, weighted edges between entities
    CREATE TABLE IF NOT EXISTS relations (
        id TEXT PRIMARY KEY NOT NULL,
        source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
        relation_type TEXT NOT NULL CHECK (length(relation_type) > 0),
        edge_weight INTEGER NOT NULL DEFAULT 1 CHECK (edge_weight >= 1),
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (source_id, target_id, relation_type)
    );

    CREATE INDEX IF NOT EXISTS idx_relations_target_id ON relations(target_id);
    CREATE INDEX IF NOT EXISTS idx_relations_type ON relations(relation_type);
    CREATE INDEX IF NOT EXISTS idx_relations_weight ON relations(edge_weight DESC, source_id, target_id);

    -- Durable change bus (outbox)
    CREATE TABLE IF NOT EXISTS rag_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        event_type TEXT NOT NULL,
        payload TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'in_flight', 'done', 'dead')),
        attempts INTEGER NOT NULL DEFAULT 0,
        available_at TEXT NOT NULL,
        claimed_at TEXT,
        last_error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_rag_events_claim ON rag_events(status, available_at);

    CREATE TRIGGER IF NOT EXISTS trg_knowledge_bases_created
    AFTER INSERT ON knowledge_bases
    BEGIN
        INSERT INTO rag_events (event_type, payload, status, attempts, available_at, created_at, updated_at)
        VALUES (
            'KB_CREATED',
            json_object('type', 'KB_CREATED', 'id', NEW.id, 'content', NEW.content),
            'pending', 0, NEW.created_at, NEW.created_at, NEW.created_at
        );
    END;

    CREATE TRIGGER IF NOT EXISTS trg_contexts_created
    AFTER INSERT ON contexts
    BEGIN
        INSERT INTO rag_events (event_type, payload, status, attempts, available_at, created_at, updated_at)
        VALUES (
            'CONTEXT_CREATED',
            json_object('type', 'CONTEXT_CREATED', 'id', NEW.id, 'kb_id', NEW.kb_id, 'text_chunk', NEW.text_chunk),
            'pending', 0, NEW.created_at, NEW.created_at, NEW.created_at
        );
    END;
"#;

/// Migration 2: Runtime provider setup history
const MIGRATION_V2: &str = r#"
    CREATE TABLE IF NOT EXISTS setup_configurations (
        id TEXT PRIMARY KEY NOT NULL,
        provider TEXT NOT NULL,
        chat_model TEXT NOT NULL,
        embed_model TEXT NOT NULL,
        base_url TEXT,
        api_key_hint TEXT,
        is_active INTEGER NOT NULL DEFAULT 0 CHECK (is_active IN (0, 1)),
        created_at TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_setup_configurations_single_active
        ON setup_configurations(is_active) WHERE is_active = 1;
"#;

/// Migration 3: Per-context relation observations
///
/// A relation's weight counts the distinct contexts that observed it, so a
/// redelivered `CONTEXT_CREATED` cannot raise it twice.
const MIGRATION_V3: &str = r#"
    CREATE TABLE IF NOT EXISTS relation_observations (
        relation_id TEXT NOT NULL REFERENCES relations(id) ON DELETE CASCADE,
        context_id TEXT NOT NULL REFERENCES contexts(id) ON DELETE CASCADE,
        created_at TEXT NOT NULL,
        PRIMARY KEY (relation_id, context_id)
    );

    CREATE INDEX IF NOT EXISTS idx_relation_observations_context_id
        ON relation_observations(context_id);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Memory model and change bus");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Provider setup history");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    if current_version < 3 {
        tracing::info!("Applying migration v3: Relation observations");
        sqlx::raw_sql(MIGRATION_V3).execute(pool).await?;
        record_migration(pool, 3).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in [
            "knowledge_bases",
            "contexts",
            "entities",
            "entity_contexts",
            "relations",
            "rag_events",
            "setup_configurations",
            "relation_observations",
        ] {
            let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(count, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_kb_insert_trigger_emits_event() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO knowledge_bases (id, user_id, role, content, vector, dimensions, created_at)
             VALUES ('kb-1', 'u1', 'USER', 'Hello world.', X'00000000', 1, '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let (event_type, payload): (String, String) =
            sqlx::query_as("SELECT event_type, payload FROM rag_events")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(event_type, "KB_CREATED");

        let payload: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload["type"], "KB_CREATED");
        assert_eq!(payload["id"], "kb-1");
        assert_eq!(payload["content"], "Hello world.");
    }

    #[tokio::test]
    async fn test_ignored_context_insert_emits_no_event() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO knowledge_bases (id, user_id, role, content, vector, dimensions, created_at)
             VALUES ('kb-1', 'u1', 'USER', 'x', X'00000000', 1, '2026-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .unwrap();

        for id in ["c-1", "c-2"] {
            sqlx::query(
                "INSERT INTO contexts (id, kb_id, chunk_index, text_chunk, vector, dimensions, created_at)
                 VALUES (?, 'kb-1', 0, 'x', X'00000000', 1, '2026-01-01T00:00:00.000000Z')
                 ON CONFLICT(kb_id, chunk_index) DO NOTHING",
            )
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        }

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM rag_events WHERE event_type = 'CONTEXT_CREATED'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }
}
