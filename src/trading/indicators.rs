//! Technical indicators over close series.
//!
//! Pure functions over `f64` slices; callers convert Decimal closes once
//! per evaluation. Each returns `None` when the series is too short, and
//! every value refers to the last sample of the slice, so the previous
//! sample's value is obtained by passing `&values[..len - 1]`.

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Relative Strength Index with Wilder smoothing. Needs `period + 1`
/// values for the first reading.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta >= 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..values.len() {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta >= 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Bollinger bands `(lower, upper)` at the last sample: SMA of the last
/// `period` values plus/minus `std_dev` population standard deviations.
pub fn bollinger(values: &[f64], period: usize, std_dev: f64) -> Option<(f64, f64)> {
    let mean = sma(values, period)?;
    let window = &values[values.len() - period..];
    let variance =
        window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
    let sd = variance.sqrt();
    Some((mean - std_dev * sd, mean + std_dev * sd))
}
