//! Change-bus event handlers
//!
//! `KB_CREATED` fans an entry out into embedded contexts; `CONTEXT_CREATED`
//! extracts entities and relations from one context. Both handlers are
//! idempotent under redelivery: chunking is deterministic, context inserts
//! ignore existing `(kb_id, chunk_index)` pairs, entities dedupe by name and
//! links dedupe by pair. Relation weights count distinct observing contexts,
//! so replaying a context leaves them unchanged.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::domain::events::{ChangeEvent, Delivery, EventBus, NackOutcome};
use crate::domain::memory::{MemoryStore, NewContext, NewEntity};
use crate::error::{ErrorKind, Result};
use crate::llm::Embedder;

use super::chunker::Chunker;
use super::extractor::{ExtractionMetadata, Extractor};

/// Pipeline counters, updated lock-free by concurrent handlers
#[derive(Debug, Default)]
pub struct PipelineStats {
    events_processed: AtomicU64,
    events_failed: AtomicU64,
    events_dead_lettered: AtomicU64,
    events_ignored: AtomicU64,
    contexts_created: AtomicU64,
    entities_created: AtomicU64,
    entities_linked: AtomicU64,
    entities_skipped: AtomicU64,
    relations_upserted: AtomicU64,
    relations_dropped: AtomicU64,
}

/// Point-in-time copy of `PipelineStats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub events_processed: u64,
    pub events_failed: u64,
    pub events_dead_lettered: u64,
    pub events_ignored: u64,
    pub contexts_created: u64,
    pub entities_created: u64,
    pub entities_linked: u64,
    pub entities_skipped: u64,
    pub relations_upserted: u64,
    pub relations_dropped: u64,
}

impl PipelineStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineStatsSnapshot {
            events_processed: load(&self.events_processed),
            events_failed: load(&self.events_failed),
            events_dead_lettered: load(&self.events_dead_lettered),
            events_ignored: load(&self.events_ignored),
            contexts_created: load(&self.contexts_created),
            entities_created: load(&self.entities_created),
            entities_linked: load(&self.entities_linked),
            entities_skipped: load(&self.entities_skipped),
            relations_upserted: load(&self.relations_upserted),
            relations_dropped: load(&self.relations_dropped),
        }
    }
}

/// Handlers for `KB_CREATED` and `CONTEXT_CREATED`
pub struct IngestionPipeline {
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn Embedder>,
    extractor: Extractor,
    chunker: Chunker,
    stats: Arc<PipelineStats>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn Embedder>,
        extractor: Extractor,
        chunker: Chunker,
    ) -> Self {
        Self {
            store,
            embedder,
            extractor,
            chunker,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    pub async fn handle(&self, event: &ChangeEvent) -> Result<()> {
        match event {
            ChangeEvent::KbCreated { id, content } => self.on_kb_created(id, content).await,
            ChangeEvent::ContextCreated {
                id,
                kb_id,
                text_chunk,
            } => self.on_context_created(id, kb_id, text_chunk).await,
            ChangeEvent::Unknown => {
                warn!("Ignoring event with unknown type");
                PipelineStats::bump(&self.stats.events_ignored, 1);
                Ok(())
            }
        }
    }

    /// Run one delivery and settle it on the bus
    pub async fn process(&self, bus: &dyn EventBus, delivery: Delivery) {
        let event_type = delivery.event.event_type();

        match self.handle(&delivery.event).await {
            Ok(()) => {
                PipelineStats::bump(&self.stats.events_processed, 1);
                if let Err(e) = bus.ack(delivery.id).await {
                    error!(event_id = delivery.id, error = %e, "Failed to acknowledge event");
                }
            }
            Err(e) => {
                PipelineStats::bump(&self.stats.events_failed, 1);
                warn!(
                    event_id = delivery.id,
                    event_type = event_type,
                    attempts = delivery.attempts,
                    kind = %e.kind(),
                    error = %e,
                    "Event handler failed"
                );

                match bus.nack(&delivery, &e.to_string()).await {
                    Ok(NackOutcome::DeadLettered) => {
                        PipelineStats::bump(&self.stats.events_dead_lettered, 1);
                        error!(
                            event_id = delivery.id,
                            event_type = event_type,
                            kind = %ErrorKind::PipelineDropped,
                            "Event exhausted its retry budget"
                        );
                    }
                    Ok(NackOutcome::Retried { retry_at }) => {
                        debug!(event_id = delivery.id, retry_at = %retry_at, "Event will be retried");
                    }
                    Err(nack_err) => {
                        error!(event_id = delivery.id, error = %nack_err, "Failed to return event to the bus");
                    }
                }
            }
        }
    }

    /// Claim and process due events until none remain; returns the number processed
    pub async fn drain(&self, bus: &dyn EventBus, batch_size: usize) -> Result<usize> {
        let mut processed = 0;
        loop {
            let deliveries = bus.claim(batch_size.max(1)).await?;
            if deliveries.is_empty() {
                return Ok(processed);
            }
            processed += deliveries.len();
            join_all(deliveries.into_iter().map(|d| self.process(bus, d))).await;
        }
    }

    async fn on_kb_created(&self, kb_id: &str, content: &str) -> Result<()> {
        if self.store.get_kb(kb_id).await?.is_none() {
            debug!(kb_id = %kb_id, "Knowledge base entry no longer exists; skipping");
            return Ok(());
        }

        let started = Utc::now();
        let chunks = self.chunker.chunk(content);
        info!(kb_id = %kb_id, chunks = chunks.len(), "Content chunked");
        if chunks.is_empty() {
            return Ok(());
        }

        let vectors = join_all(chunks.iter().map(|chunk| self.embedder.embed(chunk))).await;

        // A partial set would leave a gap in chunk_index; retry the whole entry instead
        let total = chunks.len();
        let mut rows = Vec::with_capacity(total);
        for (index, (chunk, vector)) in chunks.into_iter().zip(vectors).enumerate() {
            let vector = vector.inspect_err(|e| {
                warn!(kb_id = %kb_id, chunk_index = index, error = %e, "Chunk embedding failed");
            })?;
            rows.push(NewContext {
                chunk_index: index as i64,
                metadata: json!({
                    "source_kb_id": kb_id,
                    "chunk_index": index,
                    "total_chunks": total,
                    "chunk_length": chunk.chars().count(),
                    "processing_started": started.to_rfc3339(),
                }),
                text_chunk: chunk,
                vector,
            });
        }

        let ids = match self.store.insert_contexts(kb_id, rows).await {
            Ok(ids) => ids,
            Err(e) if e.is_unique_violation() => {
                debug!(kb_id = %kb_id, "Contexts already stored");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        PipelineStats::bump(&self.stats.contexts_created, ids.len() as u64);
        info!(kb_id = %kb_id, contexts = ids.len(), "Contexts saved");
        Ok(())
    }

    async fn on_context_created(&self, context_id: &str, kb_id: &str, text: &str) -> Result<()> {
        if self.store.get_context(context_id).await?.is_none() {
            debug!(context_id = %context_id, "Context no longer exists; skipping");
            return Ok(());
        }

        let extraction = self.extractor.extract(text).await;
        info!(
            context_id = %context_id,
            entities = extraction.entities.len(),
            relations = extraction.relations.len(),
            "Extraction complete"
        );

        if extraction.metadata != ExtractionMetadata::default() {
            let patch = json!({ "extraction": extraction.metadata });
            if let Err(e) = self.store.annotate_context(context_id, &patch).await {
                warn!(context_id = %context_id, error = %e, "Failed to store extraction metadata");
            }
        }

        let started = Utc::now();
        let vectors = join_all(extraction.entities.iter().map(|entity| {
            let text = format!("{} {}", entity.name, entity.description);
            async move { self.embedder.embed(text.trim()).await }
        }))
        .await;

        // Lowercased name -> id, so relations match regardless of the model's casing
        let mut ids: HashMap<String, String> = HashMap::new();

        for (entity, vector) in extraction.entities.iter().zip(vectors) {
            let vector = match vector {
                Ok(vector) => vector,
                Err(e) => {
                    PipelineStats::bump(&self.stats.entities_skipped, 1);
                    warn!(entity = %entity.name, error = %e, "Entity embedding failed; skipping");
                    continue;
                }
            };

            let new_entity = NewEntity {
                name: entity.name.clone(),
                entity_type: entity.entity_type.clone(),
                description: entity.description.clone(),
                vector,
                metadata: json!({
                    "type": entity.entity_type,
                    "description": entity.description,
                    "source_kb_id": kb_id,
                    "source_context_id": context_id,
                    "extraction_method": "llm",
                    "extraction_started": started.to_rfc3339(),
                }),
            };

            match self.store.find_or_link_entity(new_entity, context_id).await {
                Ok(link) => {
                    if link.created {
                        PipelineStats::bump(&self.stats.entities_created, 1);
                    } else {
                        PipelineStats::bump(&self.stats.entities_linked, 1);
                    }
                    ids.insert(entity.name.to_lowercase(), link.entity_id);
                }
                Err(e) => {
                    PipelineStats::bump(&self.stats.entities_skipped, 1);
                    warn!(entity = %entity.name, error = %e, "Failed to store entity; skipping");
                }
            }
        }

        for relation in &extraction.relations {
            let source = ids.get(&relation.source_name.to_lowercase());
            let target = ids.get(&relation.target_name.to_lowercase());
            let (Some(source), Some(target)) = (source, target) else {
                PipelineStats::bump(&self.stats.relations_dropped, 1);
                warn!(
                    context_id = %context_id,
                    source = %relation.source_name,
                    target = %relation.target_name,
                    relation_type = %relation.relation_type,
                    "Relation references an unknown entity; dropping"
                );
                continue;
            };

            match self
                .store
                .upsert_relation(source, target, &relation.relation_type, context_id)
                .await
            {
                Ok(_) => PipelineStats::bump(&self.stats.relations_upserted, 1),
                Err(e) => {
                    warn!(
                        source = %relation.source_name,
                        target = %relation.target_name,
                        error = %e,
                        "Failed to upsert relation; skipping"
                    );
                }
            }
        }

        debug!(context_id = %context_id, entities = ids.len(), "Context processed");
        Ok(())
    }
}
