//! Vectornode - semantic memory service

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vectornode_core::config::Config;
use vectornode_core::domain::events::EventBus;
use vectornode_core::domain::ingest::{IngestRequest, WorkerPool, WorkerSettings};
use vectornode_core::domain::memory::{MemoryStore, Role};
use vectornode_core::llm::{ModelPair, ModelRegistry};
use vectornode_core::storage::{Database, DatabaseConfig};
use vectornode_server::{AppState, create_router, serve};

const DEFAULT_LOG_FILTER: &str = "info,vectornode_core=debug";

#[derive(Parser)]
#[command(name = "vectornode")]
#[command(author, version, about = "Semantic memory service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file (falls back to `VECTORNODE_CONFIG`)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the ingestion workers
    Serve {
        /// Address to bind, overrides `server.bind_addr`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Apply pending schema migrations and exit
    Migrate,

    /// Print schema, store and change bus status
    Status,

    /// Ingest one document through the front-door
    Ingest {
        /// Owner of the document
        #[arg(short, long)]
        user: String,
        /// USER, AGENT or SYSTEM
        #[arg(short, long, default_value = "USER")]
        role: Role,
        /// Document text
        text: String,
    },

    /// Return stuck or dead-lettered events to the queue
    Replay {
        /// Replay dead-lettered events instead of in-flight ones
        #[arg(long)]
        dead: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => cmd_serve(config, bind).await,
        Commands::Migrate => cmd_migrate(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Ingest { user, role, text } => cmd_ingest(&config, user, role, text).await,
        Commands::Replay { dead } => cmd_replay(&config, dead).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn open_database(config: &Config) -> anyhow::Result<Database> {
    Database::new(DatabaseConfig::from_store_config(&config.store)).await
}

/// An unusable provider must not keep the server down; `POST /api/setup` can fix it later
fn initial_registry(config: &Config) -> Arc<ModelRegistry> {
    let pair = match ModelPair::from_config(&config.llm) {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "LLM provider not configured; waiting for /api/setup");
            ModelPair::unconfigured(e.to_string())
        }
    };
    Arc::new(ModelRegistry::new(pair))
}

async fn cmd_serve(config: Config, bind: Option<String>) -> anyhow::Result<()> {
    let database = open_database(&config).await?;
    let registry = initial_registry(&config);
    let state = AppState::new(database.clone(), registry, &config)?;

    let recovered = state.bus.recover().await?;
    if recovered > 0 {
        info!(recovered, "Returned in-flight events to the queue");
    }

    let workers = WorkerPool::spawn(
        state.pipeline.clone(),
        state.event_bus(),
        WorkerSettings::from_pipeline_config(&config.pipeline),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal.cancel();
    });

    let addr = bind.unwrap_or_else(|| config.server.bind_addr.clone());
    let listener = TcpListener::bind(&addr).await?;
    let descriptor = state.registry.descriptor();
    info!(
        %addr,
        provider = %descriptor.provider,
        chat_model = %descriptor.chat_model,
        embed_model = %descriptor.embed_model,
        "Vectornode starting"
    );

    let result = serve(listener, create_router(state), shutdown).await;

    workers.shutdown().await;
    database.close().await;
    info!("Vectornode stopped");
    result.map_err(Into::into)
}

async fn cmd_migrate(config: &Config) -> anyhow::Result<()> {
    let database = open_database(config).await?;
    database.migrate().await?;
    let status = database.migration_status().await?;
    println!("Schema at version {}", status.current_version);
    database.close().await;
    Ok(())
}

async fn cmd_status(config: &Config) -> anyhow::Result<()> {
    let database = open_database(config).await?;
    let registry = initial_registry(config);
    let state = AppState::new(database.clone(), registry, config)?;

    let schema = database.migration_status().await?;
    let stats = state.store.stats().await?;
    let bus = state.bus.counts().await?;
    let descriptor = state.registry.descriptor();

    println!("Database:  {}", database.config().url);
    println!(
        "Schema:    v{} (latest v{})",
        schema.current_version, schema.target_version
    );
    println!(
        "Provider:  {} (chat {}, embed {})",
        descriptor.provider, descriptor.chat_model, descriptor.embed_model
    );
    println!("Store:     {}", serde_json::to_string(&stats)?);
    println!("Bus:       {}", serde_json::to_string(&bus)?);
    if let Some(record) = state.setup.active().await? {
        println!(
            "Setup:     {} / {} (since {})",
            record.provider, record.chat_model, record.created_at
        );
    }

    database.close().await;
    Ok(())
}

async fn cmd_ingest(config: &Config, user: String, role: Role, text: String) -> anyhow::Result<()> {
    let database = open_database(config).await?;
    let registry = Arc::new(ModelRegistry::new(ModelPair::from_config(&config.llm)?));
    let state = AppState::new(database.clone(), registry, config)?;

    let receipt = state
        .ingest
        .ingest(IngestRequest {
            user_id: user,
            role,
            content: text,
            metadata: None,
        })
        .await?;
    println!("{}", serde_json::to_string_pretty(&receipt)?);

    let drained = state
        .pipeline
        .drain(state.bus.as_ref(), config.pipeline.batch_size)
        .await?;
    println!("Processed {} event(s)", drained);

    database.close().await;
    Ok(())
}

async fn cmd_replay(config: &Config, dead: bool) -> anyhow::Result<()> {
    let database = open_database(config).await?;
    let registry = initial_registry(config);
    let state = AppState::new(database.clone(), registry, config)?;

    let replayed = if dead {
        state.bus.replay_dead().await?
    } else {
        state.bus.recover().await?
    };
    println!("Requeued {} event(s)", replayed);

    database.close().await;
    Ok(())
}
