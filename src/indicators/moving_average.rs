/// Calculate Simple Moving Average (SMA) of the last `period` values
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA) of the whole series
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied().flatten()
}

/// EMA aligned with the input series
///
/// The first `period - 1` entries are `None`; the value at `period - 1` is
/// the SMA of the first `period` values, and every later value applies the
/// `2 / (period + 1)` smoothing factor.
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return series;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Start with SMA
    let mut ema = values[..period].iter().sum::<f64>() / period as f64;
    series[period - 1] = Some(ema);

    for (i, value) in values.iter().enumerate().skip(period) {
        ema = (value - ema) * multiplier + ema;
        series[i] = Some(ema);
    }

    series
}
