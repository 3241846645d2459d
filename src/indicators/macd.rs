/// Moving Average Convergence Divergence (MACD)
///
/// line = EMA(fast) - EMA(slow), signal = EMA(signal) of the line,
/// histogram = line - signal.
use super::moving_average::ema_series;

pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// MACD aligned with the input series
///
/// Entries before the slow EMA and the signal EMA have both warmed up are
/// `None` (the first defined entry is at index `slow + signal - 2`).
pub fn macd_series(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Vec<Option<MacdPoint>> {
    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let line: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();

    let mut points = vec![None; closes.len()];

    // Signal EMA runs over the defined part of the line only
    let Some(first_defined) = line.iter().position(|v| v.is_some()) else {
        return points;
    };
    let defined_line: Vec<f64> = line[first_defined..].iter().map(|v| v.unwrap_or(f64::NAN)).collect();
    let signal_ema = ema_series(&defined_line, signal);

    for (offset, signal_value) in signal_ema.into_iter().enumerate() {
        if let Some(signal_value) = signal_value {
            let line_value = defined_line[offset];
            points[first_defined + offset] = Some(MacdPoint {
                line: line_value,
                signal: signal_value,
                histogram: line_value - signal_value,
            });
        }
    }

    points
}

/// MACD with the standard 12/26/9 periods
pub fn calculate_macd(closes: &[f64]) -> Vec<Option<MacdPoint>> {
    macd_series(closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL)
}

/// The post-warm-up part of a MACD series
///
/// Returns `None` when nothing is defined yet or any defined value is not finite.
pub fn settled_macd(points: &[Option<MacdPoint>]) -> Option<Vec<MacdPoint>> {
    let first = points.iter().position(|p| p.is_some())?;

    points[first..]
        .iter()
        .map(|p| {
            let p = (*p)?;
            (p.line.is_finite() && p.signal.is_finite() && p.histogram.is_finite()).then_some(p)
        })
        .collect()
}
