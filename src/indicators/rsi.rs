/// Calculate Relative Strength Index (RSI)
///
/// RSI measures the magnitude of recent price changes to evaluate
/// overbought or oversold conditions.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
pub fn calculate_rsi(prices: &[f64], period: usize) -> Option<f64> {
    rsi_series(prices, period).last().copied().flatten()
}

/// RSI aligned with the input series, using Wilder's smoothing
///
/// The first `period` entries are `None` (one price change is lost to the
/// difference). Average gain/loss are seeded with the simple mean of the
/// first `period` changes.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut series = vec![None; prices.len()];
    if period == 0 || prices.len() < period + 1 {
        return series;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = prices
        .windows(2)
        .map(|w| {
            let change = w[1] - w[0];
            if change > 0.0 {
                (change, 0.0)
            } else {
                (0.0, change.abs())
            }
        })
        .unzip();

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;
    series[period] = rsi_from_averages(avg_gain, avg_loss);

    let smoothing = period as f64;
    for i in period..gains.len() {
        avg_gain = (avg_gain * (smoothing - 1.0) + gains[i]) / smoothing;
        avg_loss = (avg_loss * (smoothing - 1.0) + losses[i]) / smoothing;
        series[i + 1] = rsi_from_averages(avg_gain, avg_loss);
    }

    series
}

/// `None` when there was no movement at all (0/0)
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { None } else { Some(100.0) };
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}
