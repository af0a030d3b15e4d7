//! Launchpad scoring for tagged tickers
//!
//! Scores the most recent session 0..=10. Three base criteria look at the
//! candle itself; a pattern-specific bonus is added on top. When a ticker
//! carries several tags only the best bonus counts.

use crate::indicators::{avg_range, closes, highest_high, last_change, sma, stddev, volumes};
use crate::types::{DailyBar, Tag};

/// Minimum sessions required to score at all
const MIN_SESSIONS: usize = 20;

/// Points granted per satisfied criterion
const CRITERION_POINTS: u8 = 2;

/// Score ceiling
const MAX_SCORE: u8 = 10;

/// Close must land in the top share of the session range
const STRONG_CLOSE_MIN: f64 = 0.8;

/// Session range must stay below this share of the trailing average range
const TIGHT_RANGE_RATIO: f64 = 0.8;

/// Sessions averaged for the range comparison
const RANGE_AVG_SESSIONS: usize = 20;

/// Upper shadow must stay below this share of the session range
const CLEAN_TOP_MAX: f64 = 0.1;

/// VCP bonus: volume below this share of its 50-session average
const VCP_QUIET_VOLUME_RATIO: f64 = 0.5;

/// VCP bonus: stddev of recent closes below this share of price
const VCP_TIGHT_CLOSES_RATIO: f64 = 0.005;

/// VCP bonus: closes examined for tightness
const VCP_CLOSE_WINDOW: usize = 3;

/// Volume SMA period for the quiet-volume check
const VOLUME_SMA_SESSIONS: usize = 50;

/// High-Base bonus: low may sit at most this multiple above the 20-SMA
const HIGH_BASE_SMA_SLACK: f64 = 1.015;

/// High-Base bonus: SMA period for the support check
const HIGH_BASE_SMA_SESSIONS: usize = 20;

/// PowerPlay bonus: close must hold this share of the recent high
const POWER_PLAY_HIGH_PROXIMITY: f64 = 0.98;

/// PowerPlay bonus: sessions in the recent-high window
const POWER_PLAY_HIGH_WINDOW: usize = 5;

/// Score breakdown for one ticker's latest session.
#[derive(Debug, Clone, Copy, Default)]
pub struct LaunchpadScore {
    /// Close landed in the top 20% of the session range
    pub strong_close: bool,
    /// Session range tighter than 80% of the trailing average
    pub tight_range: bool,
    /// Upper shadow under 10% of the session range
    pub clean_top: bool,
    /// Best pattern-specific bonus
    pub pattern_bonus: u8,
    /// Final score, capped at 10
    pub total: u8,
}

/// Score one ticker. A red or flat candle, a zero-range session, or short
/// history all score zero regardless of the other criteria.
pub fn score_launchpad(bars: &[DailyBar], tags: &[Tag], index_bars: &[DailyBar]) -> LaunchpadScore {
    if bars.len() < MIN_SESSIONS {
        return LaunchpadScore::default();
    }
    let last = bars[bars.len() - 1];
    let range = last.range();
    if range <= 0.0 || last.close <= last.open {
        return LaunchpadScore::default();
    }

    let strong_close = (last.close - last.low) / range >= STRONG_CLOSE_MIN;
    let tight_range = avg_range(bars, RANGE_AVG_SESSIONS)
        .is_some_and(|avg| range < avg * TIGHT_RANGE_RATIO);
    let clean_top = last.upper_shadow() < range * CLEAN_TOP_MAX;

    let base = [strong_close, tight_range, clean_top]
        .iter()
        .filter(|&&c| c)
        .count() as u8
        * CRITERION_POINTS;

    let pattern_bonus = tags
        .iter()
        .map(|tag| match tag {
            Tag::VcpThreeSteps => vcp_bonus(bars),
            Tag::HighBase | Tag::HighBaseStrict => high_base_bonus(bars),
            Tag::PowerPlay => power_play_bonus(bars, index_bars),
        })
        .max()
        .unwrap_or(0);

    LaunchpadScore {
        strong_close,
        tight_range,
        clean_top,
        pattern_bonus,
        total: (base + pattern_bonus).min(MAX_SCORE),
    }
}

/// Quiet volume plus tight closes: the pause after a contraction.
fn vcp_bonus(bars: &[DailyBar]) -> u8 {
    let close_vals = closes(bars);
    let vol_vals = volumes(bars);
    let n = close_vals.len();
    let mut bonus = 0;

    if sma(&vol_vals, VOLUME_SMA_SESSIONS)
        .is_some_and(|avg| vol_vals[n - 1] < avg * VCP_QUIET_VOLUME_RATIO)
    {
        bonus += CRITERION_POINTS;
    }
    if stddev(&close_vals[n - VCP_CLOSE_WINDOW..]) < close_vals[n - 1] * VCP_TIGHT_CLOSES_RATIO {
        bonus += CRITERION_POINTS;
    }
    bonus
}

/// Support at the 20-SMA plus a hammer-shaped candle.
fn high_base_bonus(bars: &[DailyBar]) -> u8 {
    let close_vals = closes(bars);
    let last = bars[bars.len() - 1];
    let mut bonus = 0;

    if sma(&close_vals, HIGH_BASE_SMA_SESSIONS)
        .is_some_and(|avg| last.low <= avg * HIGH_BASE_SMA_SLACK)
    {
        bonus += CRITERION_POINTS;
    }
    if last.lower_shadow() > last.body() {
        bonus += CRITERION_POINTS;
    }
    bonus
}

/// Holding near the highs plus relative strength against the index.
fn power_play_bonus(bars: &[DailyBar], index_bars: &[DailyBar]) -> u8 {
    let last = bars[bars.len() - 1];
    let mut bonus = 0;

    if highest_high(bars, POWER_PLAY_HIGH_WINDOW)
        .is_some_and(|high| last.close >= high * POWER_PLAY_HIGH_PROXIMITY)
    {
        bonus += CRITERION_POINTS;
    }
    let stock_change = last_change(&closes(bars));
    let index_change = last_change(&closes(index_bars));
    if let (Some(stock), Some(index)) = (stock_change, index_change) {
        if stock >= 0.0 && index < 0.0 {
            bonus += CRITERION_POINTS;
        }
    }
    bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bar(i: usize, open: f64, high: f64, low: f64, close: f64, volume: u64) -> DailyBar {
        let start = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        DailyBar {
            date: start + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// 19 wide quiet sessions, then one engineered candle.
    fn series_with_last(open: f64, high: f64, low: f64, close: f64, volume: u64) -> Vec<DailyBar> {
        let mut bars: Vec<DailyBar> = (0..19)
            .map(|i| bar(i, 100.0, 102.5, 97.5, 100.0, 1000))
            .collect();
        bars.push(bar(19, open, high, low, close, volume));
        bars
    }

    fn flat_index() -> Vec<DailyBar> {
        (0..20).map(|i| bar(i, 50.0, 50.5, 49.5, 50.0, 500)).collect()
    }

    #[test]
    fn test_red_candle_scores_zero() {
        // every base criterion would pass, but the close is under the open
        let bars = series_with_last(102.0, 102.1, 99.9, 101.9, 1000);
        let score = score_launchpad(&bars, &[Tag::VcpThreeSteps], &flat_index());
        assert_eq!(score.total, 0);
        assert!(!score.strong_close);
    }

    #[test]
    fn test_doji_scores_zero() {
        let bars = series_with_last(100.0, 100.0, 100.0, 100.0, 1000);
        assert_eq!(score_launchpad(&bars, &[], &flat_index()).total, 0);
    }

    #[test]
    fn test_short_history_scores_zero() {
        let bars = &series_with_last(100.0, 102.0, 99.9, 101.9, 1000)[..10];
        assert_eq!(score_launchpad(bars, &[], &flat_index()).total, 0);
    }

    #[test]
    fn test_base_criteria_without_tags() {
        // close in the top 5% of a tight range with no upper shadow
        let bars = series_with_last(100.0, 102.0, 99.9, 102.0, 1000);
        let score = score_launchpad(&bars, &[], &flat_index());
        assert!(score.strong_close);
        assert!(score.tight_range);
        assert!(score.clean_top);
        assert_eq!(score.pattern_bonus, 0);
        assert_eq!(score.total, 6);
    }

    #[test]
    fn test_best_bonus_wins_over_sum() {
        // quiet volume and pin-tight closes give the full VCP bonus (4);
        // the PowerPlay side earns its high-proximity half (100.6 >= 0.98
        // x 102.5). The bonuses do not stack: 4, not 6.
        let mut bars: Vec<DailyBar> = (0..60)
            .map(|i| bar(i, 100.0, 102.5, 97.5, 100.0, 1000))
            .collect();
        bars.push(bar(60, 100.0, 100.65, 99.9, 100.6, 400));
        let tags = [Tag::VcpThreeSteps, Tag::PowerPlay];
        let score = score_launchpad(&bars, &tags, &flat_index());

        // base: strong close (0.93), tight range (0.75 < 3.83), clean top
        assert_eq!(score.total - score.pattern_bonus, 6);
        assert_eq!(score.pattern_bonus, 4);
        assert_eq!(score.total, 10);
    }

    #[test]
    fn test_relative_strength_bonus_needs_weak_index() {
        // close holds 98% of the five-session high either way; the second
        // bonus half only arrives when the index closed down
        let mut bars: Vec<DailyBar> = (0..60)
            .map(|i| bar(i, 100.0, 102.5, 97.5, 100.0, 1000))
            .collect();
        bars.push(bar(60, 100.0, 100.65, 99.9, 100.6, 1000));

        let mut weak_index = flat_index();
        weak_index.push(bar(20, 50.0, 50.1, 49.0, 49.2, 500));

        let with_weak = score_launchpad(&bars, &[Tag::PowerPlay], &weak_index);
        let with_flat = score_launchpad(&bars, &[Tag::PowerPlay], &flat_index());
        assert_eq!(with_weak.pattern_bonus, 4);
        assert_eq!(with_flat.pattern_bonus, 2);
    }
}
