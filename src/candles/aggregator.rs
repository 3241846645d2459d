use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{Candle, Tick};
use crate::persistence::TickStore;

const DEFAULT_INTERVAL_SECS: i64 = 300; // 5 minutes
const DEFAULT_MIN_TICKS: usize = 50;
const DEFAULT_MIN_CANDLES: usize = 50;

/// Resampling parameters
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationConfig {
    /// Bucket width in seconds
    pub interval_secs: i64,
    /// Raw ticks required before resampling is attempted
    pub min_ticks: usize,
    /// Non-empty candles required after resampling
    pub min_candles: usize,
    /// Only read ticks from the last N hours; `None` reads the full history
    pub lookback_hours: Option<u64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            min_ticks: DEFAULT_MIN_TICKS,
            min_candles: DEFAULT_MIN_CANDLES,
            lookback_hours: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("{pair}: not enough raw ticks ({found}/{required})")]
    InsufficientTicks {
        pair: String,
        found: usize,
        required: usize,
    },

    #[error("{pair}: insufficient candles after aggregation ({found}/{required})")]
    InsufficientCandles {
        pair: String,
        found: usize,
        required: usize,
    },

    #[error("{pair}: tick store query failed: {source}")]
    Store {
        pair: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AggregationError {
    /// True for the "not enough history yet" cases
    pub fn is_insufficient_data(&self) -> bool {
        matches!(
            self,
            AggregationError::InsufficientTicks { .. } | AggregationError::InsufficientCandles { .. }
        )
    }
}

/// Turns a pair's tick history into fixed-width OHLCV candles
#[derive(Clone)]
pub struct CandleAggregator {
    store: Arc<dyn TickStore>,
    config: AggregationConfig,
}

impl CandleAggregator {
    pub fn new(store: Arc<dyn TickStore>, config: AggregationConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Read the pair's ticks and resample them into candles
    ///
    /// Fails with an insufficient-data error when fewer than `min_ticks` ticks
    /// exist or fewer than `min_candles` non-empty buckets remain.
    pub async fn aggregate(&self, pair: &str) -> Result<Vec<Candle>, AggregationError> {
        let start = self
            .config
            .lookback_hours
            .map(|h| Utc::now() - chrono::Duration::hours(h as i64));

        let ticks = self
            .store
            .query_range(pair, start, None)
            .await
            .map_err(|source| AggregationError::Store {
                pair: pair.to_string(),
                source,
            })?;

        if ticks.len() < self.config.min_ticks {
            return Err(AggregationError::InsufficientTicks {
                pair: pair.to_string(),
                found: ticks.len(),
                required: self.config.min_ticks,
            });
        }

        let candles = build_candles(pair, &ticks, self.config.interval_secs);

        if candles.len() < self.config.min_candles {
            return Err(AggregationError::InsufficientCandles {
                pair: pair.to_string(),
                found: candles.len(),
                required: self.config.min_candles,
            });
        }

        tracing::debug!(
            pair = %pair,
            ticks = ticks.len(),
            candles = candles.len(),
            "Aggregated candles"
        );

        Ok(candles)
    }
}

/// Resample ticks into candles aligned to `interval_secs` boundaries
///
/// Ticks are ordered by timestamp first (stable, so equal timestamps keep
/// their given order). Buckets without ticks produce no candle.
pub fn build_candles(pair: &str, ticks: &[Tick], interval_secs: i64) -> Vec<Candle> {
    if ticks.is_empty() || interval_secs <= 0 {
        return Vec::new();
    }

    let mut ordered: Vec<&Tick> = ticks.iter().collect();
    ordered.sort_by_key(|t| t.timestamp);

    let mut buckets: BTreeMap<i64, Vec<&Tick>> = BTreeMap::new();
    for tick in ordered {
        let bucket = bucket_start_secs(&tick.timestamp, interval_secs);
        buckets.entry(bucket).or_default().push(tick);
    }

    buckets
        .into_iter()
        .filter_map(|(start, bucket_ticks)| synthesize_candle(pair, start, interval_secs, &bucket_ticks))
        .collect()
}

/// Align a timestamp down to its bucket boundary (in seconds)
fn bucket_start_secs(timestamp: &DateTime<Utc>, interval_secs: i64) -> i64 {
    timestamp.timestamp().div_euclid(interval_secs) * interval_secs
}

fn synthesize_candle(pair: &str, start: i64, interval_secs: i64, ticks: &[&Tick]) -> Option<Candle> {
    let first = ticks.first()?;
    let last = ticks.last()?;

    let high = ticks.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
    let low = ticks.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
    let volume = ticks.iter().map(|t| t.volume).sum();

    Some(Candle {
        pair: pair.to_string(),
        bucket_start: Utc.timestamp_opt(start, 0).single()?,
        bucket_end: Utc.timestamp_opt(start + interval_secs, 0).single()?,
        open: first.price,
        high,
        low,
        close: last.price,
        volume,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryTickStore;

    fn tick_at(secs: i64, price: f64, volume: f64) -> Tick {
        Tick::new("X/Y", price, volume, Utc.timestamp_opt(secs, 0).unwrap())
    }

    fn small_config() -> AggregationConfig {
        AggregationConfig {
            interval_secs: 300,
            min_ticks: 5,
            min_candles: 3,
            lookback_hours: None,
        }
    }

    #[test]
    fn test_single_bucket_ohlcv() {
        let ticks = vec![
            tick_at(10, 100.0, 1.0),
            tick_at(20, 105.0, 2.0),
            tick_at(30, 95.0, 3.0),
            tick_at(40, 101.0, 4.0),
        ];

        let candles = build_candles("X/Y", &ticks, 300);
        assert_eq!(candles.len(), 1);

        let c = &candles[0];
        assert_eq!(c.open, 100.0);
        assert_eq!(c.high, 105.0);
        assert_eq!(c.low, 95.0);
        assert_eq!(c.close, 101.0);
        assert_eq!(c.volume, 10.0);
        assert_eq!(c.bucket_start.timestamp(), 0);
        assert_eq!(c.bucket_end.timestamp(), 300);
    }

    #[test]
    fn test_unordered_ticks_use_timestamp_order() {
        let ticks = vec![
            tick_at(40, 101.0, 1.0),
            tick_at(10, 100.0, 1.0),
            tick_at(25, 99.0, 1.0),
        ];

        let candles = build_candles("X/Y", &ticks, 300);
        assert_eq!(candles[0].open, 100.0);
        assert_eq!(candles[0].close, 101.0);
    }

    #[test]
    fn test_empty_buckets_are_dropped() {
        // Buckets 0, 2 and 5 have ticks; 1, 3 and 4 are empty
        let ticks = vec![
            tick_at(0, 100.0, 1.0),
            tick_at(650, 101.0, 1.0),
            tick_at(1550, 102.0, 1.0),
        ];

        let candles = build_candles("X/Y", &ticks, 300);
        let starts: Vec<i64> = candles.iter().map(|c| c.bucket_start.timestamp()).collect();
        assert_eq!(starts, vec![0, 600, 1500]);
    }

    #[test]
    fn test_bucket_boundary_starts_new_candle() {
        let ticks = vec![tick_at(299, 100.0, 1.0), tick_at(300, 200.0, 1.0)];

        let candles = build_candles("X/Y", &ticks, 300);
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 100.0);
        assert_eq!(candles[1].open, 200.0);
    }

    #[test]
    fn test_no_ticks_no_candles() {
        assert!(build_candles("X/Y", &[], 300).is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_insufficient_ticks() {
        let store = Arc::new(MemoryTickStore::new());
        for i in 0..4 {
            store.append(&tick_at(i * 300, 100.0, 1.0)).await.unwrap();
        }

        let aggregator = CandleAggregator::new(store, small_config());
        let err = aggregator.aggregate("X/Y").await.unwrap_err();

        assert!(err.is_insufficient_data());
        assert!(matches!(
            err,
            AggregationError::InsufficientTicks { found: 4, required: 5, .. }
        ));
    }

    #[tokio::test]
    async fn test_aggregate_insufficient_candles() {
        let store = Arc::new(MemoryTickStore::new());
        // Enough ticks, all inside two buckets
        for i in 0..10 {
            store.append(&tick_at(i * 50, 100.0, 1.0)).await.unwrap();
        }

        let aggregator = CandleAggregator::new(store, small_config());
        let err = aggregator.aggregate("X/Y").await.unwrap_err();

        assert!(matches!(
            err,
            AggregationError::InsufficientCandles { found: 2, required: 3, .. }
        ));
    }

    #[tokio::test]
    async fn test_aggregate_exactly_min_ticks_succeeds() {
        let store = Arc::new(MemoryTickStore::new());
        let config = AggregationConfig::default();
        // One tick per bucket: exactly min_ticks ticks -> exactly min_candles candles
        for i in 0..config.min_ticks as i64 {
            store
                .append(&tick_at(i * 300 + 5, 100.0 + i as f64, 1.0))
                .await
                .unwrap();
        }

        let aggregator = CandleAggregator::new(store, config.clone());
        let candles = aggregator.aggregate("X/Y").await.unwrap();

        assert_eq!(candles.len(), config.min_candles);
        assert_eq!(candles.last().unwrap().close, 149.0);
    }

    #[tokio::test]
    async fn test_aggregate_unknown_pair() {
        let store = Arc::new(MemoryTickStore::new());
        let aggregator = CandleAggregator::new(store, AggregationConfig::default());

        let err = aggregator.aggregate("NONE/USD").await.unwrap_err();
        assert!(matches!(err, AggregationError::InsufficientTicks { found: 0, .. }));
    }
}
