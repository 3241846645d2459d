// Tick history to OHLCV candle resampling
pub mod aggregator;

pub use aggregator::{build_candles, AggregationConfig, AggregationError, CandleAggregator};
