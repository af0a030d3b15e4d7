//! Stealth-accumulation tracker
//!
//! Nightly scan for quiet bases: tickers grinding up on tight ranges just
//! above a rising 10-EMA, sized for institutional footprints. Qualifying
//! tickers earn a consecutive-day streak persisted as JSON; each one also
//! gets a trailing-bar CSV for the ranking pass. A tracked ticker that is
//! scanned and fails any criterion is dropped on the spot; one that stops
//! appearing in the snapshot at all ages out after two weeks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::UniverseSnapshot;
use crate::indicators::{closes, ema, ema_series, highest_high, macd_line, sma};
use crate::report::{sort_rows, SortDir, SortKey, SortValue};
use crate::types::DailyBar;

/// Sessions required before a ticker can be evaluated
pub const MIN_SESSIONS: usize = 60;

/// Sessions inspected by the up-day and tight-range checks
const WINDOW: usize = 10;

/// Up closes required inside the window
const UP_DAYS_REQUIRED: usize = 7;

/// Ceiling on a session's (high - low) / close inside the window
const MAX_RANGE_RATIO: f64 = 0.077;

/// Close must sit above the 10-EMA but within this multiple of it
const EMA_SLACK: f64 = 1.03;

/// Market-cap band for the tracker, 150M to 20B USD, both ends inclusive
const TRACKER_CAP_MIN: f64 = 150.0e6;
const TRACKER_CAP_MAX: f64 = 20.0e9;

/// Calendar days a tracked ticker may go unscanned before it is dropped
const MAX_STALE_DAYS: i64 = 14;

/// Trailing bars written to each tracked ticker's cache file
const CACHE_BARS: usize = 20;

/// Cached sessions required before a ticker can be ranked
pub const MIN_RANK_SESSIONS: usize = 10;

/// Rank-score weights
const CONSISTENCY_WEIGHT: f64 = 0.3;
const PROXIMITY_WEIGHT: f64 = 0.4;
const TIGHTNESS_WEIGHT: f64 = 0.2;
const IMPULSE_POINTS: f64 = 10.0;

/// Tightness above this renders as "tight"
const TIGHT_THRESHOLD: f64 = 20.0;

const STATE_FILE: &str = "accumulation_state.json";

// ============================================================================
// Stealth criteria
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// Lower market-cap bound, inclusive
    pub cap_min: f64,
    /// Upper market-cap bound, inclusive
    pub cap_max: f64,
    /// Tracked tickers whose cache is older than this many calendar days
    /// are dropped from the set
    pub max_stale_days: i64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            cap_min: TRACKER_CAP_MIN,
            cap_max: TRACKER_CAP_MAX,
            max_stale_days: MAX_STALE_DAYS,
        }
    }
}

/// Individual stealth checks. All must hold for a ticker to qualify.
#[derive(Debug, Clone, Copy)]
pub struct StealthCriteria {
    /// At least 7 of the last 10 sessions closed above their open
    pub up_day_majority: bool,
    /// Every one of the last 10 sessions ranged at most 7.7% of its close
    pub tight_ranges: bool,
    /// EMA10 > SMA20 > SMA50 at the latest session
    pub stacked_averages: bool,
    /// EMA10 < close < 1.03 x EMA10
    pub riding_ema: bool,
    /// Market cap inside the tracker band, bounds inclusive
    pub cap_in_band: bool,
}

impl StealthCriteria {
    pub fn passes(&self) -> bool {
        self.up_day_majority
            && self.tight_ranges
            && self.stacked_averages
            && self.riding_ema
            && self.cap_in_band
    }
}

/// Evaluate the stealth checks, `None` when the series is too short.
pub fn evaluate_stealth(
    bars: &[DailyBar],
    market_cap: Option<f64>,
    config: &TrackerConfig,
) -> Option<StealthCriteria> {
    if bars.len() < MIN_SESSIONS {
        return None;
    }

    let window = &bars[bars.len() - WINDOW..];
    let up_days = window.iter().filter(|bar| bar.close > bar.open).count();
    let tight_ranges = window
        .iter()
        .all(|bar| bar.range() / bar.close <= MAX_RANGE_RATIO);

    let close_series = closes(bars);
    let (Some(ema10), Some(sma20), Some(sma50)) = (
        ema(&close_series, 10),
        sma(&close_series, 20),
        sma(&close_series, 50),
    ) else {
        return None;
    };
    let last_close = bars[bars.len() - 1].close;

    Some(StealthCriteria {
        up_day_majority: up_days >= UP_DAYS_REQUIRED,
        tight_ranges,
        stacked_averages: ema10 > sma20 && sma20 > sma50,
        riding_ema: last_close > ema10 && last_close < ema10 * EMA_SLACK,
        cap_in_band: market_cap.is_some_and(|cap| cap >= config.cap_min && cap <= config.cap_max),
    })
}

// ============================================================================
// Streak state
// ============================================================================

/// Consecutive qualifying days per ticker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccumulationState {
    pub counts: BTreeMap<String, u32>,
}

pub fn load_state(state_dir: &Path) -> Result<AccumulationState> {
    let path = state_dir.join(STATE_FILE);
    if !path.exists() {
        return Ok(AccumulationState::default());
    }
    let raw = std::fs::read(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save_state(state: &AccumulationState, state_dir: &Path) -> Result<()> {
    let path = state_dir.join(STATE_FILE);
    let raw = serde_json::to_vec_pretty(state)?;
    std::fs::write(&path, raw)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Outcome of one tracker pass
#[derive(Debug, Clone)]
pub struct TrackerUpdate {
    /// Qualifying tickers with their streak after the update
    pub qualified: Vec<(String, u32)>,
    /// Tracked tickers scanned this pass that no longer qualify
    pub dropped: u32,
    /// Tracked tickers aged out after going unscanned too long
    pub aged_out: u32,
}

/// Run the stealth scan over a snapshot and persist the updated state.
///
/// Tickers absent from the snapshot keep their entry, so a transient data
/// gap never resets a streak; an entry whose cache goes more than
/// `max_stale_days` without a refresh is aged out with its cache file.
pub fn run_tracker(
    snapshot: &UniverseSnapshot,
    config: &TrackerConfig,
    state_dir: &Path,
) -> Result<TrackerUpdate> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
    let mut state = load_state(state_dir)?;

    // None = no data this pass, Some(passes) = scanned
    let scans: Vec<Option<bool>> = snapshot
        .stocks
        .par_iter()
        .map(|stock| {
            if stock.bars.is_empty() {
                return None;
            }
            let verdict = evaluate_stealth(&stock.bars, stock.fundamentals.market_cap, config)
                .map_or(false, |criteria| criteria.passes());
            Some(verdict)
        })
        .collect();

    let mut qualified = Vec::new();
    let mut dropped = 0u32;
    for (stock, scan) in snapshot.stocks.iter().zip(scans) {
        match scan {
            Some(true) => {
                let count = state.counts.get(&stock.ticker).copied().unwrap_or(0) + 1;
                state.counts.insert(stock.ticker.clone(), count);
                write_ticker_cache(state_dir, &stock.ticker, count, &stock.bars, snapshot.session_date)?;
                qualified.push((stock.ticker.clone(), count));
            }
            Some(false) => {
                if state.counts.remove(&stock.ticker).is_some() {
                    remove_ticker_cache(state_dir, &stock.ticker)?;
                    dropped += 1;
                    debug!("{} dropped from the accumulation set", stock.ticker);
                }
            }
            None => {}
        }
    }

    // a delisted symbol never fails a scan, it just stops appearing; age
    // its entry out once the cache date falls behind
    let cutoff = snapshot.session_date - chrono::Duration::days(config.max_stale_days);
    let mut aged_out = 0u32;
    for (ticker, cached) in cache_dates(state_dir)? {
        if cached < cutoff && state.counts.remove(&ticker).is_some() {
            remove_ticker_cache(state_dir, &ticker)?;
            aged_out += 1;
            debug!("{} aged out of the accumulation set", ticker);
        }
    }

    save_state(&state, state_dir)?;
    info!(
        "Accumulation pass: {} qualifying, {} dropped, {} aged out, {} tracked total",
        qualified.len(),
        dropped,
        aged_out,
        state.counts.len()
    );
    Ok(TrackerUpdate {
        qualified,
        dropped,
        aged_out,
    })
}

// ============================================================================
// Per-ticker bar caches
// ============================================================================

fn cache_file_name(ticker: &str, count: u32, session_date: chrono::NaiveDate) -> String {
    format!("[{:02}]_{}_{}.csv", count, ticker, session_date.format("%Y%m%d"))
}

/// Parse a `[NN]_TICKER_YYYYMMDD.csv` file name into the ticker and the
/// session date it was written.
fn parse_cache_name(name: &str) -> Option<(&str, chrono::NaiveDate)> {
    let stem = name.strip_suffix(".csv")?;
    let rest = stem.strip_prefix('[')?;
    let (count, tail) = rest.split_once("]_")?;
    if count.len() != 2 || !count.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let (ticker, date) = tail.rsplit_once('_')?;
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = chrono::NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
    Some((ticker, date))
}

/// Cache-file session date per tracked ticker.
fn cache_dates(state_dir: &Path) -> Result<BTreeMap<String, chrono::NaiveDate>> {
    let mut dates = BTreeMap::new();
    for entry in std::fs::read_dir(state_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((ticker, date)) = parse_cache_name(name) {
            dates.insert(ticker.to_string(), date);
        }
    }
    Ok(dates)
}

fn write_ticker_cache(
    state_dir: &Path,
    ticker: &str,
    count: u32,
    bars: &[DailyBar],
    session_date: chrono::NaiveDate,
) -> Result<PathBuf> {
    remove_ticker_cache(state_dir, ticker)?;

    let path = state_dir.join(cache_file_name(ticker, count, session_date));
    let mut writer = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let start = bars.len().saturating_sub(CACHE_BARS);
    for bar in &bars[start..] {
        writer.serialize(bar)?;
    }
    writer.flush()?;
    Ok(path)
}

fn remove_ticker_cache(state_dir: &Path, ticker: &str) -> Result<()> {
    for entry in std::fs::read_dir(state_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if parse_cache_name(name).is_some_and(|(cached, _)| cached == ticker) {
            std::fs::remove_file(entry.path())
                .with_context(|| format!("Failed to remove stale cache {}", name))?;
        }
    }
    Ok(())
}

fn find_ticker_cache(state_dir: &Path, ticker: &str) -> Result<Option<PathBuf>> {
    for entry in std::fs::read_dir(state_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if parse_cache_name(name).is_some_and(|(cached, _)| cached == ticker) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

fn read_ticker_cache(path: &Path) -> Result<Vec<DailyBar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut bars = Vec::new();
    for record in reader.deserialize() {
        let bar: DailyBar = record?;
        bars.push(bar);
    }
    Ok(bars)
}

// ============================================================================
// Ranking
// ============================================================================

/// One tracked ticker scored for the leaderboards
#[derive(Debug, Clone)]
pub struct RankedTicker {
    pub ticker: String,
    /// Consecutive qualifying days
    pub appearances: u32,
    /// Percent of the last 10 sessions closing up on the day and over the
    /// prior close
    pub consistency: f64,
    /// Latest close as a percent of the highest cached high
    pub proximity: f64,
    /// How much the latest range undercuts the 10-session mean, in percent;
    /// negative when the latest session is wider than usual
    pub tightness: f64,
    /// EMA13 and the MACD line both rising
    pub impulse_rising: bool,
    pub rank_score: f64,
}

impl RankedTicker {
    pub fn tightness_label(&self) -> &'static str {
        if self.tightness > TIGHT_THRESHOLD {
            "tight"
        } else {
            "normal"
        }
    }

    pub fn impulse_label(&self) -> &'static str {
        if self.impulse_rising {
            "blue"
        } else {
            "neutral"
        }
    }
}

/// Score one ticker from its cached bars, `None` when too few sessions.
pub fn rank_ticker(ticker: &str, appearances: u32, bars: &[DailyBar]) -> Option<RankedTicker> {
    if bars.len() < MIN_RANK_SESSIONS {
        return None;
    }
    let n = bars.len();
    let close_series = closes(bars);

    let start = n - WINDOW;
    let up_days = (start..n)
        .filter(|&i| {
            let bar = &bars[i];
            bar.close > bar.open && i > 0 && bar.close > bars[i - 1].close
        })
        .count();
    let consistency = up_days as f64 / WINDOW as f64 * 100.0;

    let top = highest_high(bars, n)?;
    let last_close = bars[n - 1].close;
    let proximity = last_close / top * 100.0;

    let last_range = bars[n - 1].range();
    let mean_range: f64 = bars[start..].iter().map(DailyBar::range).sum::<f64>() / WINDOW as f64;
    let tightness = if mean_range == 0.0 {
        0.0
    } else {
        (1.0 - last_range / mean_range) * 100.0
    };

    let ema13 = ema_series(&close_series, 13);
    let macd = macd_line(&close_series);
    let impulse_rising = ema13[n - 1] > ema13[n - 2] && macd[n - 1] > macd[n - 2];

    let rank_score = consistency * CONSISTENCY_WEIGHT
        + proximity * PROXIMITY_WEIGHT
        + tightness.max(0.0) * TIGHTNESS_WEIGHT
        + if impulse_rising { IMPULSE_POINTS } else { 0.0 };

    Some(RankedTicker {
        ticker: ticker.to_string(),
        appearances,
        consistency,
        proximity,
        tightness,
        impulse_rising,
        rank_score,
    })
}

/// Rank every tracked ticker from its cached bars, best score first.
pub fn rank_tracked(state_dir: &Path) -> Result<Vec<RankedTicker>> {
    let state = load_state(state_dir)?;
    let mut ranked = Vec::new();
    for (ticker, &count) in &state.counts {
        let Some(path) = find_ticker_cache(state_dir, ticker)? else {
            debug!("No cached bars for tracked ticker {}", ticker);
            continue;
        };
        let bars = read_ticker_cache(&path)?;
        match rank_ticker(ticker, count, &bars) {
            Some(row) => ranked.push(row),
            None => debug!("{}: too few cached sessions to rank", ticker),
        }
    }

    sort_rows(
        &mut ranked,
        &[
            SortKey {
                value: |r: &RankedTicker| SortValue::Number(Some(r.rank_score)),
                dir: SortDir::Desc,
            },
            SortKey {
                value: |r: &RankedTicker| SortValue::Text(r.ticker.clone()),
                dir: SortDir::Asc,
            },
        ],
    );
    Ok(ranked)
}
