//! Ingestion domain module
//!
//! - `IngestService`: synchronous front-door storing one knowledge base entry
//! - `Chunker` and `Extractor`: the text-processing stages
//! - `IngestionPipeline`: handlers for the change-bus events
//! - `WorkerPool`: bounded, cancellable consumer of the bus

mod chunker;
mod extractor;
mod front_door;
mod pipeline;
mod worker;

pub use chunker::{Chunker, normalize_whitespace};
pub use extractor::{
    DEFAULT_ENTITY_TYPE, DEFAULT_RELATION_TYPE, ExtractedEntity, ExtractedRelation, Extraction,
    ExtractionMetadata, Extractor, parse_extraction,
};
pub use front_door::{IngestReceipt, IngestRequest, IngestService};
pub use pipeline::{IngestionPipeline, PipelineStats, PipelineStatsSnapshot};
pub use worker::{WorkerPool, WorkerSettings};
