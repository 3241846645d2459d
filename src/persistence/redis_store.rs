use super::TickStore;
use crate::models::Tick;
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};
use uuid::Uuid;

/// Tick as stored in a Redis sorted set member
///
/// The id keeps identical ticks from collapsing into one set member.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredTick {
    id: Uuid,
    price: f64,
    volume: f64,
    timestamp: DateTime<Utc>,
}

/// Redis-backed tick log
///
/// Uses sorted sets with microsecond timestamps as scores for time-range queries
#[derive(Clone)]
pub struct RedisTickStore {
    conn: ConnectionManager,
}

impl RedisTickStore {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }

    fn key(pair: &str) -> String {
        format!("ticks:{}", pair)
    }

    fn score_of(timestamp: &DateTime<Utc>) -> f64 {
        timestamp.timestamp_micros() as f64
    }

    /// Remove ticks older than `keep_hours`
    pub async fn cleanup_old(&self, pair: &str, keep_hours: u64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::hours(keep_hours as i64);
        let mut conn = self.conn.clone();

        let removed: usize = conn
            .zrembyscore(Self::key(pair), "-inf", Self::score_of(&cutoff))
            .await?;

        if removed > 0 {
            tracing::debug!("Cleaned up {} old ticks for {}", removed, pair);
        }

        Ok(removed)
    }

    /// Count of stored ticks for a pair
    pub async fn count_ticks(&self, pair: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let count: usize = conn.zcard(Self::key(pair)).await?;
        Ok(count)
    }
}

#[async_trait]
impl TickStore for RedisTickStore {
    async fn append(&self, tick: &Tick) -> Result<()> {
        let stored = StoredTick {
            id: Uuid::new_v4(),
            price: tick.price,
            volume: tick.volume,
            timestamp: tick.timestamp,
        };
        let value = serde_json::to_string(&stored)?;

        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(Self::key(&tick.pair), value, Self::score_of(&tick.timestamp))
            .await?;

        Ok(())
    }

    async fn query_range(
        &self,
        pair: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Tick>> {
        let min = start
            .map(|s| Self::score_of(&s).to_string())
            .unwrap_or_else(|| "-inf".to_string());
        // Exclusive upper bound
        let max = end
            .map(|e| format!("({}", Self::score_of(&e)))
            .unwrap_or_else(|| "+inf".to_string());

        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(Self::key(pair), min, max).await?;

        let mut ticks = Vec::with_capacity(members.len());
        for json_str in members {
            let stored: StoredTick = serde_json::from_str(&json_str)?;
            ticks.push(Tick {
                pair: pair.to_string(),
                price: stored.price,
                volume: stored.volume,
                timestamp: stored.timestamp,
            });
        }

        // Members sharing a score come back in lexical order
        ticks.sort_by_key(|t| t.timestamp);

        tracing::debug!("Loaded {} ticks for {} from Redis", ticks.len(), pair);

        Ok(ticks)
    }
}
