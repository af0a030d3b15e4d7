//! Market Regime Classification
//!
//! Classifies broad-market health from the index daily series: counts
//! distribution days (institutional selling), tracks the rally attempt off
//! the trailing low, and searches for a Follow-Through Day to confirm a new
//! uptrend.

use crate::indicators::{change_at, closes, last_change, sma, sma_at, volumes};
use crate::types::DailyBar;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market status, decided in strict priority order (first match wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    /// Follow-Through Day found and price above the 50-session SMA
    #[serde(rename = "Uptrend-Confirmed")]
    UptrendConfirmed,
    /// Distribution-day count at or above the warning threshold
    #[serde(rename = "Under-Pressure")]
    UnderPressure,
    /// Rally off the trailing low is alive but unconfirmed
    #[serde(rename = "Rally-Attempt")]
    RallyAttempt,
    /// Price below the 50-session SMA with no live rally
    #[serde(rename = "Downtrend")]
    Downtrend,
    /// Price above the 50-session SMA with no live rally
    #[serde(rename = "Correcting")]
    Correcting,
}

impl fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MarketStatus::UptrendConfirmed => "Uptrend-Confirmed",
            MarketStatus::UnderPressure => "Under-Pressure",
            MarketStatus::RallyAttempt => "Rally-Attempt",
            MarketStatus::Downtrend => "Downtrend",
            MarketStatus::Correcting => "Correcting",
        };
        write!(f, "{}", s)
    }
}

/// Configuration for market regime classification
#[derive(Debug, Clone)]
pub struct RegimeConfig {
    /// Minimum index sessions required (default: 75)
    pub min_sessions: usize,
    /// Trailing window scanned for distribution days and the low (default: 25)
    pub scan_window: usize,
    /// Session drop that marks a distribution day (default: 0.002 = -0.2%)
    pub distribution_drop: f64,
    /// Later rally above a distribution close that invalidates it (default: 0.05)
    pub invalidation_rally: f64,
    /// Distribution-day count that flips the market to Under-Pressure (default: 6)
    pub warning_count: u32,
    /// Volume SMA period a distribution day must exceed (default: 50)
    pub volume_sma_period: usize,
    /// Minimum session gain for a Follow-Through Day (default: 0.015 = +1.5%)
    pub ftd_min_change: f64,
    /// Earliest FTD candidate, in sessions after the low (default: 4)
    pub ftd_min_day: usize,
    /// Price SMA period for the trend check (default: 50)
    pub trend_sma_period: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            min_sessions: 75,
            scan_window: 25,
            distribution_drop: 0.002,
            invalidation_rally: 0.05,
            warning_count: 6,
            volume_sma_period: 50,
            ftd_min_change: 0.015,
            ftd_min_day: 4,
            trend_sma_period: 50,
        }
    }
}

/// Result of one regime classification. Recomputed fresh each run, never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRegime {
    pub status: MarketStatus,
    /// Qualifying, non-invalidated distribution days in the scan window
    pub distribution_day_count: u32,
    /// Sessions elapsed since the lowest close in the scan window
    pub days_since_low: u32,
    /// Latest session change of the index, in percent
    pub last_index_change_pct: f64,
}

impl MarketRegime {
    /// Headline used in the report metadata line.
    pub fn headline(&self) -> String {
        format!(
            "{} (distribution days: {} / days since low: {})",
            self.status, self.distribution_day_count, self.days_since_low
        )
    }
}

/// Count qualifying distribution days in the trailing scan window, applying
/// the forward invalidation rule.
fn count_distribution_days(
    close_vals: &[f64],
    vol_vals: &[f64],
    config: &RegimeConfig,
) -> u32 {
    let n = close_vals.len();
    let mut count = 0u32;

    // a window wider than the series scans the whole series
    for i in n.saturating_sub(config.scan_window)..n {
        let Some(change) = change_at(close_vals, i) else {
            continue;
        };
        let Some(vol_sma) = sma_at(vol_vals, i, config.volume_sma_period) else {
            continue;
        };

        let qualifies = change <= -config.distribution_drop
            && vol_vals[i] > vol_vals[i - 1]
            && vol_vals[i] > vol_sma;
        if !qualifies {
            continue;
        }

        let threshold = close_vals[i] * (1.0 + config.invalidation_rally);
        let invalidated = close_vals[i + 1..].iter().any(|c| *c >= threshold);
        if !invalidated {
            count += 1;
        }
    }

    count
}

/// Locate the lowest close in the trailing scan window. Returns the absolute
/// index of the low (first occurrence on ties) and its value.
fn find_window_low(close_vals: &[f64], window: usize) -> (usize, f64) {
    let start = close_vals.len().saturating_sub(window);
    let mut low_idx = start;
    let mut low_val = close_vals[start];
    for (i, &c) in close_vals.iter().enumerate().skip(start + 1) {
        if c < low_val {
            low_val = c;
            low_idx = i;
        }
    }
    (low_idx, low_val)
}

/// Search newest to oldest for a Follow-Through Day among sessions at least
/// `ftd_min_day` sessions after the low.
fn find_follow_through(
    close_vals: &[f64],
    vol_vals: &[f64],
    low_idx: usize,
    config: &RegimeConfig,
) -> bool {
    let first_candidate = low_idx + config.ftd_min_day;
    if first_candidate >= close_vals.len() {
        return false;
    }
    for i in (first_candidate..close_vals.len()).rev() {
        let Some(change) = change_at(close_vals, i) else {
            continue;
        };
        if change >= config.ftd_min_change && vol_vals[i] > vol_vals[i - 1] {
            return true;
        }
    }
    false
}

/// Classify the market regime from the index daily series.
///
/// Fatal when the series is shorter than `config.min_sessions`: without a
/// regime the downstream screen cannot run meaningfully.
pub fn classify_market(bars: &[DailyBar], config: &RegimeConfig) -> Result<MarketRegime> {
    if bars.len() < config.min_sessions {
        bail!(
            "index series too short: {} sessions, need {}",
            bars.len(),
            config.min_sessions
        );
    }

    let close_vals = closes(bars);
    let vol_vals = volumes(bars);
    let n = close_vals.len();

    let last_change_frac = last_change(&close_vals).unwrap_or(0.0);
    let distribution_day_count = count_distribution_days(&close_vals, &vol_vals, config);

    let (low_idx, low_val) = find_window_low(&close_vals, config.scan_window);
    let days_since_low = (n - 1 - low_idx) as u32;

    // A close back under the low voids the rally attempt.
    let rally_void = close_vals[low_idx + 1..].iter().any(|c| *c < low_val);

    let ftd_found = !rally_void
        && days_since_low as usize >= config.ftd_min_day
        && find_follow_through(&close_vals, &vol_vals, low_idx, config);

    let price = close_vals[n - 1];
    let sma_trend = sma(&close_vals, config.trend_sma_period);

    let status = if ftd_found && sma_trend.is_some_and(|s| price > s) {
        MarketStatus::UptrendConfirmed
    } else if distribution_day_count >= config.warning_count {
        MarketStatus::UnderPressure
    } else if !rally_void && !ftd_found && days_since_low > 0 {
        MarketStatus::RallyAttempt
    } else if sma_trend.is_some_and(|s| price < s) {
        MarketStatus::Downtrend
    } else {
        MarketStatus::Correcting
    };

    Ok(MarketRegime {
        status,
        distribution_day_count,
        days_since_low,
        last_index_change_pct: last_change_frac * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(points: &[(f64, u64)]) -> Vec<DailyBar> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        points
            .iter()
            .enumerate()
            .map(|(i, &(close, volume))| DailyBar {
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close + 0.5,
                low: close - 0.5,
                close,
                volume,
            })
            .collect()
    }

    /// 75 flat sessions at the given close and volume.
    fn flat(close: f64, volume: u64) -> Vec<(f64, u64)> {
        vec![(close, volume); 75]
    }

    #[test]
    fn test_too_short_is_fatal() {
        let bars = series(&vec![(100.0, 1000); 40]);
        assert!(classify_market(&bars, &RegimeConfig::default()).is_err());
    }

    #[test]
    fn test_scan_window_wider_than_series() {
        // a window larger than the whole series scans the whole series
        let mut points: Vec<(f64, u64)> = (0..11).map(|i| (100.0 - i as f64, 1000)).collect();
        points.push((90.5, 1000));

        let config = RegimeConfig {
            min_sessions: 10,
            scan_window: 500,
            ..RegimeConfig::default()
        };
        let regime = classify_market(&series(&points), &config).unwrap();
        assert_eq!(regime.status, MarketStatus::RallyAttempt);
        assert_eq!(regime.days_since_low, 1);
        assert_eq!(regime.distribution_day_count, 0);
    }

    #[test]
    fn test_distribution_day_counted() {
        let mut points = flat(100.0, 1000);
        // down -1% on a volume spike, then flat below: stays valid
        for p in points.iter_mut().skip(65) {
            *p = (99.0, 1000);
        }
        points[65] = (99.0, 2000);

        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        assert_eq!(regime.distribution_day_count, 1);
    }

    #[test]
    fn test_distribution_day_invalidated_by_rally() {
        let mut points = flat(100.0, 1000);
        for p in points.iter_mut().skip(65) {
            *p = (99.0, 1000);
        }
        points[65] = (99.0, 2000);
        // a later close >= 99 * 1.05 wipes the distribution day
        for p in points.iter_mut().skip(70) {
            *p = (104.0, 900);
        }

        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        assert_eq!(regime.distribution_day_count, 0);
    }

    #[test]
    fn test_under_pressure_without_follow_through() {
        let mut points = flat(100.0, 1000);
        // six alternating drops on volume spikes inside the scan window,
        // recoveries too small and too quiet to ever qualify as an FTD
        let mut close = 100.0;
        for k in 0..6 {
            let i = 52 + k * 2;
            close *= 0.994;
            points[i] = (close, 1500 + k as u64 * 100);
            points[i + 1] = (close * 1.004, 800);
            close *= 1.004;
        }
        for p in points.iter_mut().skip(64) {
            *p = (close, 900);
        }
        // final session is a fresh low so no rally attempt is alive
        points[74] = (close * 0.99, 850);

        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        assert_eq!(regime.distribution_day_count, 6);
        assert_eq!(regime.days_since_low, 0);
        assert_eq!(regime.status, MarketStatus::UnderPressure);
    }

    #[test]
    fn test_follow_through_outranks_distribution() {
        // six distribution days and a follow-through both present: the FTD
        // with price above the 50-SMA must win
        let mut points = flat(100.0, 1000);
        let mut close = 100.0;
        for k in 0..6 {
            let i = 50 + k * 2;
            close *= 0.994;
            points[i] = (close, 1500 + k as u64 * 100);
            points[i + 1] = (close * 1.003, 800);
            close *= 1.003;
        }
        // low at session 62, three quiet days, then the FTD on day 4
        points[62] = (close * 0.995, 700);
        let low = close * 0.995;
        points[63] = (low * 1.002, 650);
        points[64] = (low * 1.004, 620);
        points[65] = (low * 1.006, 600);
        points[66] = (low * 1.006 * 1.02, 1400);
        let after_ftd = low * 1.006 * 1.02;
        for p in points.iter_mut().skip(67) {
            *p = (after_ftd, 900);
        }

        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        assert_eq!(regime.distribution_day_count, 6);
        assert_eq!(regime.status, MarketStatus::UptrendConfirmed);
    }

    #[test]
    fn test_rally_attempt_before_day_four() {
        let mut points = flat(100.0, 1000);
        // low two sessions ago, mild recovery, no FTD possible yet
        points[72] = (97.0, 1100);
        points[73] = (97.5, 900);
        points[74] = (98.0, 950);

        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        assert_eq!(regime.days_since_low, 2);
        assert_eq!(regime.status, MarketStatus::RallyAttempt);
    }

    #[test]
    fn test_close_below_prior_low_resets_rally() {
        let mut points = flat(100.0, 1000);
        points[70] = (95.0, 1100);
        points[71] = (96.0, 900);
        points[72] = (96.5, 900);
        points[73] = (94.5, 950);
        points[74] = (94.8, 900);

        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        // the break of the 95.0 low becomes the new window low, so the
        // attempt restarts from there instead of voiding
        assert_eq!(regime.days_since_low, 1);
        assert_eq!(regime.status, MarketStatus::RallyAttempt);
    }

    #[test]
    fn test_downtrend_when_today_is_the_low() {
        let mut points: Vec<(f64, u64)> = Vec::new();
        for i in 0..75 {
            points.push((110.0 - i as f64 * 0.2, 1000));
        }
        let regime = classify_market(&series(&points), &RegimeConfig::default()).unwrap();
        assert_eq!(regime.days_since_low, 0);
        assert_eq!(regime.status, MarketStatus::Downtrend);
    }

    #[test]
    fn test_follow_through_day_confirms_uptrend() {
        // trailing low six sessions ago, never broken, +1.8% on 1.3x volume
        // exactly four sessions after the low; early sessions sit lower so
        // the final price clears the 50-SMA
        let mut points = flat(95.0, 1000);
        for p in points.iter_mut().take(68).skip(50) {
            *p = (100.0, 1000);
        }
        points[68] = (96.0, 1200); // the low
        points[69] = (96.2, 900);
        points[70] = (96.4, 880);
        points[71] = (96.5, 860);
        points[72] = (96.5 * 1.018, 1118); // day 4 after the low: +1.8%, 1.3x
        points[73] = (96.5 * 1.018, 1000);
        points[74] = (96.5 * 1.018 * 1.001, 1000);

        let config = RegimeConfig::default();
        let regime = classify_market(&series(&points), &config).unwrap();
        assert_eq!(regime.days_since_low, 6);
        assert_eq!(regime.status, MarketStatus::UptrendConfirmed);
    }

    #[test]
    fn test_headline_format() {
        let regime = MarketRegime {
            status: MarketStatus::RallyAttempt,
            distribution_day_count: 3,
            days_since_low: 5,
            last_index_change_pct: 0.42,
        };
        assert_eq!(
            regime.headline(),
            "Rally-Attempt (distribution days: 3 / days since low: 5)"
        );
    }
}
