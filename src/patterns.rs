//! Pattern detection for the nightly screen
//!
//! A ticker must pass the trend template before any base pattern is
//! considered. Tags are additive: one evaluation can carry VCP, PowerPlay
//! and a High-Base tag at once.

use crate::indicators::{change_at, closes, highest_high, lowest_low, sma, sma_at, volumes};
use crate::types::{DailyBar, Tag};

/// Minimum sessions required before any evaluation (52-week lookback)
pub const MIN_SESSIONS: usize = 252;

/// VCP lookback windows, each split into three equal thirds
const VCP_LOOKBACKS: [usize; 3] = [60, 90, 120];

/// Amplitude ceiling for the final third of a valid contraction
const VCP_FINAL_AMPLITUDE_MAX: f64 = 0.10;

/// Minimum gain over the PowerPlay window (1.70 = +70%)
const POWER_PLAY_MIN_GAIN: f64 = 1.70;

/// PowerPlay close must hold at least this share of the window high
const POWER_PLAY_HIGH_RATIO: f64 = 0.75;

/// PowerPlay momentum window in sessions
const POWER_PLAY_WINDOW: usize = 40;

/// High-Base gain band over the trailing window
const HIGH_BASE_MIN_GAIN: f64 = 1.10;
const HIGH_BASE_MAX_GAIN: f64 = 1.70;

/// High-Base close must hold at least this share of the window high
const HIGH_BASE_HIGH_RATIO: f64 = 0.90;

/// High-Base momentum window in sessions
const HIGH_BASE_WINDOW: usize = 10;

/// Strict upgrade: single-session gain that marks the sharp move
const STRICT_SPIKE_GAIN: f64 = 0.10;

/// Strict upgrade: sessions scanned for the spike
const STRICT_SPIKE_WINDOW: usize = 5;

/// Strict upgrade: trailing sessions that must all show volume dry-up
const STRICT_DRY_UP_SESSIONS: usize = 3;

/// Volume SMA period used for the dry-up check
const VOLUME_SMA_SESSIONS: usize = 50;

/// Trend template: close must sit at least this multiple above the 52-week low
const TEMPLATE_LOW_MULT: f64 = 1.30;

/// Trend template: close must hold at least this share of the 52-week high
const TEMPLATE_HIGH_RATIO: f64 = 0.75;

/// Trend template: sessions over which the 200-SMA may not decline
const TEMPLATE_SLOPE_WINDOW: usize = 20;

/// Trend template breakdown. All four must hold for any tag to be set.
#[derive(Debug, Clone, Copy)]
pub struct TrendTemplate {
    /// close > SMA50 > SMA150 > SMA200
    pub stacked_mas: bool,
    /// SMA200 non-decreasing across the trailing slope window
    pub sma200_rising: bool,
    /// close >= 1.30 x 52-week low
    pub above_low_floor: bool,
    /// close >= 0.75 x 52-week high
    pub near_high: bool,
}

impl TrendTemplate {
    pub fn passes(&self) -> bool {
        self.stacked_mas && self.sma200_rising && self.above_low_floor && self.near_high
    }
}

/// Evaluate the trend template. `None` when the series is too short.
pub fn evaluate_template(bars: &[DailyBar]) -> Option<TrendTemplate> {
    if bars.len() < MIN_SESSIONS {
        return None;
    }

    let close_vals = closes(bars);
    let n = close_vals.len();
    let close = close_vals[n - 1];

    let sma50 = sma(&close_vals, 50)?;
    let sma150 = sma(&close_vals, 150)?;
    let sma200 = sma(&close_vals, 200)?;
    let stacked_mas = close > sma50 && sma50 > sma150 && sma150 > sma200;

    let mut sma200_rising = true;
    for i in (n - TEMPLATE_SLOPE_WINDOW + 1)..n {
        let (Some(prev), Some(curr)) = (sma_at(&close_vals, i - 1, 200), sma_at(&close_vals, i, 200))
        else {
            sma200_rising = false;
            break;
        };
        if curr < prev {
            sma200_rising = false;
            break;
        }
    }

    let low_52w = lowest_low(bars, MIN_SESSIONS)?;
    let high_52w = highest_high(bars, MIN_SESSIONS)?;

    Some(TrendTemplate {
        stacked_mas,
        sma200_rising,
        above_low_floor: close >= low_52w * TEMPLATE_LOW_MULT,
        near_high: close >= high_52w * TEMPLATE_HIGH_RATIO,
    })
}

/// Check one VCP lookback window: three equal thirds with strictly
/// decreasing amplitude and a tight final third.
fn vcp_window_contracts(bars: &[DailyBar], lookback: usize) -> bool {
    if bars.len() < lookback {
        return false;
    }
    let step = lookback / 3;
    let n = bars.len();

    let thirds = [
        &bars[n - lookback..n - lookback + step],
        &bars[n - lookback + step..n - step],
        &bars[n - step..],
    ];

    let mut amplitudes = [0.0f64; 3];
    for (i, third) in thirds.iter().enumerate() {
        let high = third.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = third.iter().map(|b| b.low).fold(f64::MAX, f64::min);
        if high <= 0.0 {
            return false;
        }
        amplitudes[i] = (high - low) / high;
    }

    amplitudes[0] > amplitudes[1]
        && amplitudes[1] > amplitudes[2]
        && amplitudes[2] < VCP_FINAL_AMPLITUDE_MAX
}

fn is_power_play(bars: &[DailyBar]) -> bool {
    let n = bars.len();
    if n < POWER_PLAY_WINDOW {
        return false;
    }
    let close = bars[n - 1].close;
    let base = bars[n - POWER_PLAY_WINDOW].close;
    let Some(window_high) = highest_high(bars, POWER_PLAY_WINDOW) else {
        return false;
    };
    base > 0.0 && close / base >= POWER_PLAY_MIN_GAIN && close >= window_high * POWER_PLAY_HIGH_RATIO
}

/// Sharp single-session move followed by volume dry-up marks the strict
/// variant of a high base.
fn is_strict_high_base(bars: &[DailyBar]) -> bool {
    let close_vals = closes(bars);
    let vol_vals = volumes(bars);
    let n = close_vals.len();
    if n < STRICT_SPIKE_WINDOW || n < STRICT_DRY_UP_SESSIONS {
        return false;
    }

    let spiked = (n - STRICT_SPIKE_WINDOW..n)
        .any(|i| change_at(&close_vals, i).is_some_and(|c| c >= STRICT_SPIKE_GAIN));
    if !spiked {
        return false;
    }

    (n - STRICT_DRY_UP_SESSIONS..n)
        .all(|i| sma_at(&vol_vals, i, VOLUME_SMA_SESSIONS).is_some_and(|avg| vol_vals[i] < avg))
}

fn high_base_tag(bars: &[DailyBar]) -> Option<Tag> {
    let n = bars.len();
    if n < HIGH_BASE_WINDOW {
        return None;
    }
    let close = bars[n - 1].close;
    let base = bars[n - HIGH_BASE_WINDOW].close;
    let window_high = highest_high(bars, HIGH_BASE_WINDOW)?;
    if base <= 0.0 {
        return None;
    }

    let gain = close / base;
    if !(HIGH_BASE_MIN_GAIN..=HIGH_BASE_MAX_GAIN).contains(&gain)
        || close < window_high * HIGH_BASE_HIGH_RATIO
    {
        return None;
    }

    if is_strict_high_base(bars) {
        Some(Tag::HighBaseStrict)
    } else {
        Some(Tag::HighBase)
    }
}

/// Detect all pattern tags for one ticker. Short history or a failed trend
/// template yields an empty set.
pub fn detect_patterns(bars: &[DailyBar]) -> Vec<Tag> {
    let Some(template) = evaluate_template(bars) else {
        return Vec::new();
    };
    if !template.passes() {
        return Vec::new();
    }

    let mut tags = Vec::new();
    if VCP_LOOKBACKS
        .iter()
        .any(|&lookback| vcp_window_contracts(bars, lookback))
    {
        tags.push(Tag::VcpThreeSteps);
    }
    if is_power_play(bars) {
        tags.push(Tag::PowerPlay);
    }
    if let Some(tag) = high_base_tag(bars) {
        tags.push(tag);
    }
    tags
}
