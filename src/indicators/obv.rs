/// Calculate On-Balance Volume (OBV) series
///
/// Starts at the first volume; each later volume is added when the close
/// rose, subtracted when it fell, and ignored when unchanged.
pub fn obv_series(closes: &[f64], volumes: &[f64]) -> Vec<f64> {
    let len = closes.len().min(volumes.len());
    let mut series = Vec::with_capacity(len);
    if len == 0 {
        return series;
    }

    let mut obv = volumes[0];
    series.push(obv);

    for i in 1..len {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            obv += volumes[i];
        } else if change < 0.0 {
            obv -= volumes[i];
        }
        series.push(obv);
    }

    series
}

/// Latest OBV value
pub fn calculate_obv(closes: &[f64], volumes: &[f64]) -> Option<f64> {
    obv_series(closes, volumes).last().copied()
}
