use super::{OrderJournal, ScoreStore, TickStore};
use crate::models::{OrderRecord, Score, Tick};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory tick log
///
/// Keeps each pair's ticks sorted by timestamp; ticks with equal timestamps
/// stay in arrival order.
#[derive(Clone, Default)]
pub struct MemoryTickStore {
    data: Arc<RwLock<HashMap<String, Vec<Tick>>>>,
}

impl MemoryTickStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticks held for a pair
    pub fn tick_count(&self, pair: &str) -> Result<usize> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        Ok(data.get(pair).map(|t| t.len()).unwrap_or(0))
    }

    /// All pairs with at least one tick
    pub fn pairs(&self) -> Result<Vec<String>> {
        let data = self.data.read().map_err(|e| e.to_string())?;
        Ok(data.keys().cloned().collect())
    }
}

#[async_trait]
impl TickStore for MemoryTickStore {
    async fn append(&self, tick: &Tick) -> Result<()> {
        let mut data = self.data.write().map_err(|e| e.to_string())?;

        let ticks = data.entry(tick.pair.clone()).or_default();
        let position = ticks.partition_point(|t| t.timestamp <= tick.timestamp);
        ticks.insert(position, tick.clone());

        Ok(())
    }

    async fn query_range(
        &self,
        pair: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Tick>> {
        let data = self.data.read().map_err(|e| e.to_string())?;

        Ok(data
            .get(pair)
            .map(|ticks| {
                ticks
                    .iter()
                    .filter(|t| start.map_or(true, |s| t.timestamp >= s))
                    .filter(|t| end.map_or(true, |e| t.timestamp < e))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// In-memory score and order history
///
/// Used by tests, the replay tool, and as the fallback when Postgres is
/// unavailable.
#[derive(Clone, Default)]
pub struct MemoryAuditLog {
    scores: Arc<RwLock<Vec<Score>>>,
    orders: Arc<RwLock<Vec<OrderRecord>>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scores(&self) -> Result<Vec<Score>> {
        let scores = self.scores.read().map_err(|e| e.to_string())?;
        Ok(scores.clone())
    }

    pub fn orders(&self) -> Result<Vec<OrderRecord>> {
        let orders = self.orders.read().map_err(|e| e.to_string())?;
        Ok(orders.clone())
    }
}

#[async_trait]
impl ScoreStore for MemoryAuditLog {
    async fn record(&self, score: &Score) -> Result<()> {
        let mut scores = self.scores.write().map_err(|e| e.to_string())?;
        scores.push(score.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderJournal for MemoryAuditLog {
    async fn record_order(&self, order: &OrderRecord) -> Result<()> {
        let mut orders = self.orders.write().map_err(|e| e.to_string())?;
        orders.push(order.clone());
        Ok(())
    }
}
