//! Moving averages and other rolling statistics over daily bar series.
//!
//! All functions take chronologically ordered slices (oldest first) and
//! return `None` when the window does not fit.

use crate::types::DailyBar;

/// Simple moving average over the trailing `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Simple moving average of the `period` values ending at `idx` (inclusive).
pub fn sma_at(values: &[f64], idx: usize, period: usize) -> Option<f64> {
    if period == 0 || idx + 1 < period || idx >= values.len() {
        return None;
    }
    let window = &values[idx + 1 - period..=idx];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Exponential moving average series, recursive form: seeded with the first
/// value, alpha = 2 / (span + 1).
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    if values.is_empty() || span == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Latest exponential moving average value.
pub fn ema(values: &[f64], span: usize) -> Option<f64> {
    ema_series(values, span).last().copied()
}

/// MACD line series: EMA12 minus EMA26.
pub fn macd_line(closes: &[f64]) -> Vec<f64> {
    let fast = ema_series(closes, 12);
    let slow = ema_series(closes, 26);
    fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect()
}

/// Sample standard deviation (n - 1 denominator).
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

/// Session-over-session fractional change at `idx`. `None` for the first
/// session.
pub fn change_at(closes: &[f64], idx: usize) -> Option<f64> {
    if idx == 0 || idx >= closes.len() || closes[idx - 1] == 0.0 {
        return None;
    }
    Some(closes[idx] / closes[idx - 1] - 1.0)
}

/// Latest session-over-session fractional change.
pub fn last_change(closes: &[f64]) -> Option<f64> {
    if closes.is_empty() {
        return None;
    }
    change_at(closes, closes.len() - 1)
}

/// Mean high-low range over the trailing `period` bars.
pub fn avg_range(bars: &[DailyBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    let window = &bars[bars.len() - period..];
    Some(window.iter().map(|b| b.range()).sum::<f64>() / period as f64)
}

/// Highest high over the trailing `period` bars.
pub fn highest_high(bars: &[DailyBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    bars[bars.len() - period..]
        .iter()
        .map(|b| b.high)
        .fold(None, |acc: Option<f64>, h| Some(acc.map_or(h, |a| a.max(h))))
}

/// Lowest low over the trailing `period` bars.
pub fn lowest_low(bars: &[DailyBar], period: usize) -> Option<f64> {
    if period == 0 || bars.len() < period {
        return None;
    }
    bars[bars.len() - period..]
        .iter()
        .map(|b| b.low)
        .fold(None, |acc: Option<f64>, l| Some(acc.map_or(l, |a| a.min(l))))
}

pub fn closes(bars: &[DailyBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn volumes(bars: &[DailyBar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume as f64).collect()
}
