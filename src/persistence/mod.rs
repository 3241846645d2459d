// Storage seams between the ingestion and evaluation loops
pub mod memory;
pub mod redis_store;

use crate::models::{OrderRecord, Score, Tick};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{MemoryAuditLog, MemoryTickStore};
pub use redis_store::RedisTickStore;

/// Append-only, per-pair ordered log of ticks
///
/// The ingestion loop only appends, the evaluation loop only reads.
#[async_trait]
pub trait TickStore: Send + Sync {
    /// Append one tick to the pair's history
    async fn append(&self, tick: &Tick) -> Result<()>;

    /// Ticks for `pair` with `start <= timestamp < end`, oldest first
    async fn query_range(
        &self,
        pair: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Tick>>;

    /// Full tick history for `pair`, oldest first
    async fn query(&self, pair: &str) -> Result<Vec<Tick>> {
        self.query_range(pair, None, None).await
    }
}

/// Durable score history (write path only)
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn record(&self, score: &Score) -> Result<()>;
}

/// Durable order attempt history (write path only)
#[async_trait]
pub trait OrderJournal: Send + Sync {
    async fn record_order(&self, order: &OrderRecord) -> Result<()>;
}
