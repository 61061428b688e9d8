//! Bounded worker pool consuming the change bus
//!
//! One dispatcher task claims batches and spawns a handler per delivery,
//! holding a semaphore permit for its lifetime. Concurrency never exceeds
//! `pool_size`; a slow handler only occupies its own slot.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::domain::events::EventBus;

use super::pipeline::IngestionPipeline;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub pool_size: usize,
    pub batch_size: usize,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_pipeline_config(&PipelineConfig::default())
    }
}

impl WorkerSettings {
    pub fn from_pipeline_config(config: &PipelineConfig) -> Self {
        Self {
            pool_size: config.worker_pool_size.max(1),
            batch_size: config.batch_size.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
        }
    }
}

/// Handle to the running dispatcher
pub struct WorkerPool {
    cancel: CancellationToken,
    dispatcher: JoinHandle<()>,
    shutdown_timeout: Duration,
}

impl WorkerPool {
    pub fn spawn(
        pipeline: Arc<IngestionPipeline>,
        bus: Arc<dyn EventBus>,
        settings: WorkerSettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let shutdown_timeout = settings.shutdown_timeout;

        info!(
            pool_size = settings.pool_size,
            batch_size = settings.batch_size,
            "Starting ingestion workers"
        );
        let dispatcher = tokio::spawn(dispatch(pipeline, bus, settings, cancel.clone()));

        Self {
            cancel,
            dispatcher,
            shutdown_timeout,
        }
    }

    /// Token that stops the dispatcher when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop claiming and wait for in-flight handlers, up to the shutdown timeout.
    ///
    /// Handlers still running at the deadline are aborted; their deliveries stay
    /// `in_flight` and are recovered on the next start.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let abort = self.dispatcher.abort_handle();

        match tokio::time::timeout(self.shutdown_timeout, self.dispatcher).await {
            Ok(Ok(())) => info!("Ingestion workers stopped"),
            Ok(Err(e)) => error!(error = %e, "Ingestion dispatcher panicked"),
            Err(_) => {
                warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Workers did not finish in time; aborting"
                );
                abort.abort();
            }
        }
    }
}

async fn dispatch(
    pipeline: Arc<IngestionPipeline>,
    bus: Arc<dyn EventBus>,
    settings: WorkerSettings,
    cancel: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(settings.pool_size));
    let mut handlers = JoinSet::new();

    loop {
        if cancel.is_cancelled() {
            break;
        }

        while let Some(joined) = handlers.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "Event handler task failed");
            }
        }

        let free = permits.available_permits();
        if free == 0 {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = handlers.join_next() => continue,
            }
        }

        let deliveries = match bus.claim(free.min(settings.batch_size)).await {
            Ok(deliveries) => deliveries,
            Err(e) => {
                warn!(error = %e, "Failed to claim events");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(settings.poll_interval) => continue,
                }
            }
        };

        if deliveries.is_empty() {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = bus.wait(settings.poll_interval) => continue,
            }
        }

        debug!(count = deliveries.len(), "Dispatching events");
        for delivery in deliveries {
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let pipeline = pipeline.clone();
            let bus = bus.clone();
            handlers.spawn(async move {
                pipeline.process(bus.as_ref(), delivery).await;
                drop(permit);
            });
        }
    }

    debug!(in_flight = handlers.len(), "Draining in-flight handlers");
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Event handler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ingest::{Chunker, Extractor};
    use crate::domain::memory::{MemoryStore, NewKnowledgeBase, Role};
    use crate::infrastructure::events::{BusSettings, SqliteEventBus};
    use crate::infrastructure::memory::SqliteMemoryStore;
    use crate::storage::Database;
    use crate::testing::{FixedEmbedder, ScriptedChat};
    use serde_json::json;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            pool_size: 2,
            batch_size: 4,
            poll_interval: Duration::from_millis(20),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_workers_process_published_entries() {
        let db = Database::in_memory().await.unwrap();
        let bus = Arc::new(SqliteEventBus::new(db.pool().clone(), BusSettings::default()));
        let store = Arc::new(
            SqliteMemoryStore::new(db.pool().clone()).with_change_signal(bus.signal()),
        );
        let pipeline = Arc::new(IngestionPipeline::new(
            store.clone(),
            Arc::new(FixedEmbedder::new(vec![1.0, 0.0])),
            Extractor::new(Arc::new(ScriptedChat::always(
                r#"{"entities":[{"name":"Rust"}],"relations":[]}"#,
            ))),
            Chunker::default(),
        ));

        let pool = WorkerPool::spawn(pipeline.clone(), bus.clone(), settings());

        store
            .insert_kb(NewKnowledgeBase {
                user_id: "u1".to_string(),
                role: Role::User,
                content: "Rust is a language.".to_string(),
                vector: vec![1.0, 0.0],
                metadata: json!({}),
            })
            .await
            .unwrap();

        let mut done = false;
        for _ in 0..200 {
            let counts = bus.counts().await.unwrap();
            if counts.done == 2 && counts.pending == 0 && counts.in_flight == 0 {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.shutdown().await;

        assert!(done, "events were not processed");
        let stats = pipeline.stats().snapshot();
        assert_eq!(stats.contexts_created, 1);
        assert_eq!(stats.entities_created, 1);
    }

    #[tokio::test]
    async fn test_shutdown_when_idle() {
        let db = Database::in_memory().await.unwrap();
        let bus = Arc::new(SqliteEventBus::new(db.pool().clone(), BusSettings::default()));
        let store = Arc::new(SqliteMemoryStore::new(db.pool().clone()));
        let pipeline = Arc::new(IngestionPipeline::new(
            store,
            Arc::new(FixedEmbedder::new(vec![1.0])),
            Extractor::new(Arc::new(ScriptedChat::always("{}"))),
            Chunker::default(),
        ));

        let pool = WorkerPool::spawn(pipeline, bus, settings());
        let token = pool.cancellation_token();
        pool.shutdown().await;
        assert!(token.is_cancelled());
    }
}
