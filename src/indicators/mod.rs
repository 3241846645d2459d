// Technical indicators module
// Implements EMA, RSI, MACD and OBV over candle closes

pub mod engine;
pub mod macd;
pub mod moving_average;
pub mod obv;
pub mod rsi;

pub use engine::{IndicatorEngine, IndicatorError};
pub use macd::{calculate_macd, macd_series, settled_macd, MacdPoint};
pub use moving_average::{calculate_ema, calculate_sma, ema_series};
pub use obv::{calculate_obv, obv_series};
pub use rsi::{calculate_rsi, rsi_series};
