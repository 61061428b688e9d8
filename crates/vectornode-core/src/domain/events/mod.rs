//! Change bus
//!
//! Durable, at-least-once delivery of the row-insert events that drive the
//! ingestion pipeline. Payloads are self-contained so handlers never need a
//! follow-up read to start work.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::Result;

/// Event emitted when a knowledge base or context row commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeEvent {
    KbCreated {
        id: String,
        content: String,
    },
    ContextCreated {
        id: String,
        kb_id: String,
        text_chunk: String,
    },
    /// Any `type` this build does not handle
    #[serde(other)]
    Unknown,
}

impl ChangeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::KbCreated { .. } => "KB_CREATED",
            Self::ContextCreated { .. } => "CONTEXT_CREATED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Decode a stored payload; anything unreadable becomes `Unknown`
    pub fn from_payload(payload: &str) -> Self {
        serde_json::from_str(payload).unwrap_or(Self::Unknown)
    }
}

/// A claimed event awaiting `ack` or `nack`
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: i64,
    /// Delivery attempts including this one
    pub attempts: u32,
    pub event: ChangeEvent,
}

/// What happened to a negatively acknowledged delivery
#[derive(Debug, Clone, PartialEq)]
pub enum NackOutcome {
    Retried { retry_at: DateTime<Utc> },
    DeadLettered,
}

/// Event counts by delivery status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusCounts {
    pub pending: i64,
    pub in_flight: i64,
    pub done: i64,
    pub dead: i64,
}

/// Publish/subscribe seam over the durable event log
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Append an event; returns its delivery id
    async fn publish(&self, event: &ChangeEvent) -> Result<i64>;

    /// Claim up to `max` due events, oldest first
    async fn claim(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Mark a delivery as processed
    async fn ack(&self, delivery_id: i64) -> Result<()>;

    /// Return a delivery for retry with backoff, or dead-letter it when its budget is spent
    async fn nack(&self, delivery: &Delivery, error: &str) -> Result<NackOutcome>;

    /// Return every in-flight delivery to pending; used at start-up after a crash
    async fn recover(&self) -> Result<u64>;

    async fn counts(&self) -> Result<BusCounts>;

    /// Wake-up handle shared with publishers in this process
    fn signal(&self) -> Arc<Notify>;

    /// Sleep until a local publish or `timeout`, whichever comes first
    async fn wait(&self, timeout: Duration) {
        let signal = self.signal();
        let _ = tokio::time::timeout(timeout, signal.notified()).await;
    }
}
