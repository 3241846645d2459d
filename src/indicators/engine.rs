use thiserror::Error;

use super::macd::{calculate_macd, settled_macd};
use super::moving_average::ema_series;
use super::obv::obv_series;
use super::rsi::rsi_series;
use crate::models::{Candle, IndicatorSnapshot};

pub const EMA_SHORT: usize = 9;
pub const EMA_LONG: usize = 21;
pub const RSI_PERIOD: usize = 14;

#[derive(Debug, Error, PartialEq)]
pub enum IndicatorError {
    #[error("MACD series has undefined values")]
    MacdUndefined,

    #[error("latest candle has undefined {0}")]
    LatestUndefined(&'static str),
}

/// Computes the fixed indicator set over a candle series
///
/// Pure: the snapshot depends only on the candles passed in.
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine;

impl IndicatorEngine {
    pub fn new() -> Self {
        Self
    }

    /// Indicator values for the final candle
    ///
    /// Fails when the settled MACD series has an undefined value, or when
    /// any indicator is still warming up at the final candle.
    pub fn compute(&self, candles: &[Candle]) -> Result<IndicatorSnapshot, IndicatorError> {
        let latest = candles.last().ok_or(IndicatorError::LatestUndefined("candle"))?;

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let macd = calculate_macd(&closes);
        if settled_macd(&macd).is_none() {
            tracing::debug!(pair = %latest.pair, "MACD calculation has undefined values");
            return Err(IndicatorError::MacdUndefined);
        }

        let ema9 = last_defined(&ema_series(&closes, EMA_SHORT), "ema9")?;
        let ema21 = last_defined(&ema_series(&closes, EMA_LONG), "ema21")?;
        let rsi14 = last_defined(&rsi_series(&closes, RSI_PERIOD), "rsi14")?;
        let macd_point = macd
            .last()
            .copied()
            .flatten()
            .ok_or(IndicatorError::LatestUndefined("macd"))?;
        let obv = obv_series(&closes, &volumes)
            .last()
            .copied()
            .filter(|v| v.is_finite())
            .ok_or(IndicatorError::LatestUndefined("obv"))?;

        if !latest.close.is_finite() {
            return Err(IndicatorError::LatestUndefined("close"));
        }

        Ok(IndicatorSnapshot {
            pair: latest.pair.clone(),
            timestamp: latest.bucket_start,
            ema9,
            ema21,
            rsi14,
            macd_line: macd_point.line,
            macd_signal: macd_point.signal,
            macd_histogram: macd_point.histogram,
            obv,
            close_price: latest.close,
        })
    }
}

fn last_defined(series: &[Option<f64>], field: &'static str) -> Result<f64, IndicatorError> {
    series
        .last()
        .copied()
        .flatten()
        .filter(|v| v.is_finite())
        .ok_or(IndicatorError::LatestUndefined(field))
}
