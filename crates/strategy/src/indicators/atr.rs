use common::{Bar, Error, Result};

/// True range per bar.
///
/// The first bar has no previous close, so its true range is just `high - low`.
/// Every later bar takes the largest of `high - low`, `|high - prev_close|`
/// and `|low - prev_close|`.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                None => range,
                Some(prev_close) => range
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
            }
        })
        .collect()
}

/// Average True Range as a simple moving average of the true range.
///
/// The window shrinks at the start of the series: `atr[i]` averages the last
/// `min(i + 1, length)` true ranges, so the output has one value per bar.
/// Returns `Error::EmptySeries` for no bars and `Error::InvalidParameter`
/// for a zero `length`.
pub fn average_true_range(bars: &[Bar], length: usize) -> Result<Vec<f64>> {
    if length == 0 {
        return Err(Error::InvalidParameter("ATR length must be >= 1".into()));
    }
    if bars.is_empty() {
        return Err(Error::EmptySeries);
    }

    let tr = true_range(bars);
    let atr = (0..tr.len())
        .map(|i| {
            let window = &tr[(i + 1).saturating_sub(length)..=i];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect();

    Ok(atr)
}
