//! Process-root wiring shared by every handler

use std::sync::Arc;

use vectornode_core::config::Config;
use vectornode_core::domain::events::EventBus;
use vectornode_core::domain::ingest::{Chunker, Extractor, IngestService, IngestionPipeline};
use vectornode_core::domain::memory::MemoryStore;
use vectornode_core::domain::query::QueryEngine;
use vectornode_core::domain::setup::{ClientFactory, SetupRepository, SetupService};
use vectornode_core::infrastructure::events::{BusSettings, SqliteEventBus};
use vectornode_core::infrastructure::memory::SqliteMemoryStore;
use vectornode_core::infrastructure::setup::SqliteSetupRepository;
use vectornode_core::llm::ModelRegistry;
use vectornode_core::storage::Database;

/// Router state; cheap to clone, every field is reference-counted
#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub registry: Arc<ModelRegistry>,
    pub store: Arc<dyn MemoryStore>,
    pub bus: Arc<SqliteEventBus>,
    pub ingest: Arc<IngestService>,
    pub query: Arc<QueryEngine>,
    pub setup: Arc<SetupService>,
    pub pipeline: Arc<IngestionPipeline>,
}

impl AppState {
    /// Build the store, bus and services over one pool; the registry is shared by all of them
    pub fn new(
        database: Database,
        registry: Arc<ModelRegistry>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let pool = database.pool().clone();
        let bus = Arc::new(SqliteEventBus::new(
            pool.clone(),
            BusSettings::from_pipeline_config(&config.pipeline),
        ));
        let store: Arc<dyn MemoryStore> =
            Arc::new(SqliteMemoryStore::new(pool.clone()).with_change_signal(bus.signal()));
        let setup_repository: Arc<dyn SetupRepository> =
            Arc::new(SqliteSetupRepository::new(pool));

        let pipeline = IngestionPipeline::new(
            store.clone(),
            registry.clone(),
            Extractor::new(registry.clone()),
            Chunker::from_config(&config.pipeline)?,
        );

        Ok(Self {
            ingest: Arc::new(IngestService::new(store.clone(), registry.clone())),
            query: Arc::new(QueryEngine::new(store.clone(), registry.clone())),
            setup: Arc::new(SetupService::new(
                registry.clone(),
                setup_repository,
                config.llm.clone(),
            )),
            pipeline: Arc::new(pipeline),
            database,
            registry,
            store,
            bus,
        })
    }

    /// Replace how `POST /api/setup` builds candidate clients
    pub fn with_client_factory(mut self, config: &Config, factory: ClientFactory) -> Self {
        let repository: Arc<dyn SetupRepository> =
            Arc::new(SqliteSetupRepository::new(self.database.pool().clone()));
        self.setup = Arc::new(SetupService::with_factory(
            self.registry.clone(),
            repository,
            config.llm.clone(),
            factory,
        ));
        self
    }

    pub fn event_bus(&self) -> Arc<dyn EventBus> {
        self.bus.clone()
    }
}
