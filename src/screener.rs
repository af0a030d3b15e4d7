//! Nightly screening orchestrator
//!
//! Runs the regime classifier once against the index, then screens every
//! ticker in parallel: pattern tags, market-cap band, growth label,
//! launchpad score. A ticker that fails never aborts the batch; skip
//! reasons are tallied instead.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{TickerData, UniverseSnapshot};
use crate::fundamentals::{classify_growth, CapBand};
use crate::indicators::{closes, ema, sma};
use crate::launchpad::score_launchpad;
use crate::patterns::{detect_patterns, MIN_SESSIONS};
use crate::regime::{classify_market, MarketRegime, MarketStatus, RegimeConfig};
use crate::report::{sort_rows, SortDir, SortKey, SortValue};
use crate::types::{DailyBar, ScreenResult, Tag};

/// A/D ratio at or above this, during a rally attempt or under pressure,
/// adds the breadth note to the summary line
const BREADTH_NOTE_RATIO: f64 = 1.5;

/// Screen-wide knobs
#[derive(Debug, Clone, Default)]
pub struct ScreenConfig {
    pub cap_band: CapBand,
    pub regime: RegimeConfig,
}

/// Market-wide summary of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSummary {
    pub regime: MarketRegime,
    pub advances: u32,
    pub declines: u32,
}

impl MarketSummary {
    pub fn advance_decline_ratio(&self) -> f64 {
        self.advances as f64 / self.declines.max(1) as f64
    }

    /// One-line summary used as the CSV metadata line.
    pub fn line(&self) -> String {
        let ratio = self.advance_decline_ratio();
        let mut line = format!(
            "{} | A/D: {:.2} (adv {} / dec {})",
            self.regime.headline(),
            ratio,
            self.advances,
            self.declines
        );
        let improving = matches!(
            self.regime.status,
            MarketStatus::RallyAttempt | MarketStatus::UnderPressure
        );
        if ratio >= BREADTH_NOTE_RATIO && improving {
            line.push_str(" | breadth improving - watch leaders");
        }
        line
    }
}

/// Output of one screening run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayReport {
    pub session_date: NaiveDate,
    pub summary: MarketSummary,
    pub rows: Vec<ScreenResult>,
}

/// Skip counts merged from the parallel evaluations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenTallies {
    pub no_data: u32,
    pub short_history: u32,
    pub untagged: u32,
    pub cap_out_of_band: u32,
}

enum TickerOutcome {
    Row(ScreenResult),
    NoData,
    ShortHistory,
    Untagged,
    CapOutOfBand,
}

struct Evaluation {
    /// Some(true) = advance, Some(false) = decline, None = under two sessions
    breadth: Option<bool>,
    outcome: TickerOutcome,
}

/// Screen a frozen snapshot. Pure with respect to the snapshot: the same
/// input yields byte-identical rows and summary.
pub fn screen_snapshot(
    snapshot: &UniverseSnapshot,
    config: &ScreenConfig,
) -> Result<(DayReport, ScreenTallies)> {
    let run_id = Uuid::new_v4();
    info!(
        "Run {}: screening {} tickers for {}",
        run_id,
        snapshot.stocks.len(),
        snapshot.session_date
    );

    let regime = classify_market(&snapshot.index_bars, &config.regime)
        .with_context(|| format!("Failed to classify regime for {}", snapshot.index_symbol))?;
    info!("Run {}: {}", run_id, regime.headline());

    let evaluations: Vec<Evaluation> = snapshot
        .stocks
        .par_iter()
        .map(|stock| evaluate_ticker(stock, &snapshot.index_bars, &config.cap_band))
        .collect();

    let mut summary = MarketSummary {
        regime,
        advances: 0,
        declines: 0,
    };
    let mut tallies = ScreenTallies::default();
    let mut rows = Vec::new();

    for evaluation in evaluations {
        match evaluation.breadth {
            Some(true) => summary.advances += 1,
            Some(false) => summary.declines += 1,
            None => {}
        }
        match evaluation.outcome {
            TickerOutcome::Row(row) => rows.push(row),
            TickerOutcome::NoData => tallies.no_data += 1,
            TickerOutcome::ShortHistory => tallies.short_history += 1,
            TickerOutcome::Untagged => tallies.untagged += 1,
            TickerOutcome::CapOutOfBand => tallies.cap_out_of_band += 1,
        }
    }

    // deterministic output order regardless of worker scheduling
    sort_rows(
        &mut rows,
        &[
            SortKey {
                value: |row: &ScreenResult| SortValue::Number(Some(row.launchpad_score as f64)),
                dir: SortDir::Desc,
            },
            SortKey {
                value: |row: &ScreenResult| SortValue::Number(row.market_cap_billions),
                dir: SortDir::Desc,
            },
            SortKey {
                value: |row: &ScreenResult| SortValue::Text(row.ticker.clone()),
                dir: SortDir::Asc,
            },
        ],
    );

    info!(
        "Run {}: {} hits / {} advances / {} declines (skipped: {} no data, {} short, {} untagged, {} cap)",
        run_id,
        rows.len(),
        summary.advances,
        summary.declines,
        tallies.no_data,
        tallies.short_history,
        tallies.untagged,
        tallies.cap_out_of_band
    );

    Ok((
        DayReport {
            session_date: snapshot.session_date,
            summary,
            rows,
        },
        tallies,
    ))
}

fn evaluate_ticker(stock: &TickerData, index_bars: &[DailyBar], cap_band: &CapBand) -> Evaluation {
    let bars = &stock.bars;
    if bars.is_empty() {
        debug!("{}: no price history in snapshot", stock.ticker);
        return Evaluation {
            breadth: None,
            outcome: TickerOutcome::NoData,
        };
    }
    // breadth counts the raw universe, before any history filter
    let breadth = breadth_direction(bars);

    if bars.len() < MIN_SESSIONS {
        return Evaluation {
            breadth,
            outcome: TickerOutcome::ShortHistory,
        };
    }

    let tags = detect_patterns(bars);
    if tags.is_empty() {
        return Evaluation {
            breadth,
            outcome: TickerOutcome::Untagged,
        };
    }

    if !cap_band.contains(stock.fundamentals.market_cap) {
        debug!("{}: tagged but market cap out of band", stock.ticker);
        return Evaluation {
            breadth,
            outcome: TickerOutcome::CapOutOfBand,
        };
    }

    let score = score_launchpad(bars, &tags, index_bars);
    match build_row(stock, tags, score.total) {
        Some(row) => Evaluation {
            breadth,
            outcome: TickerOutcome::Row(row),
        },
        None => Evaluation {
            breadth,
            outcome: TickerOutcome::NoData,
        },
    }
}

/// Advance when the last close improved on the prior close; a tie counts
/// as a decline.
fn breadth_direction(bars: &[DailyBar]) -> Option<bool> {
    if bars.len() < 2 {
        return None;
    }
    Some(bars[bars.len() - 1].close > bars[bars.len() - 2].close)
}

fn build_row(stock: &TickerData, tags: Vec<Tag>, launchpad_score: u8) -> Option<ScreenResult> {
    let close_vals = closes(&stock.bars);
    let price = *close_vals.last()?;
    let ema10 = ema(&close_vals, 10)?;
    let sma20 = sma(&close_vals, 20)?;
    let sma50 = sma(&close_vals, 50)?;
    let record = &stock.fundamentals;

    Some(ScreenResult {
        ticker: stock.ticker.clone(),
        price: round2(price),
        tags,
        growth_label: classify_growth(record),
        revenue_growth_pct: record.revenue_growth.map(to_pct),
        earnings_growth_pct: record.earnings_growth.map(to_pct),
        ebitda_growth_pct: record.ebitda_growth.map(to_pct),
        operating_cf_millions: record.operating_cashflow.map(|v| round2(v / 1e6)),
        market_cap_billions: record.market_cap.map(|v| round2(v / 1e9)),
        launchpad_score,
        ema10: round2(ema10),
        sma20: round2(sma20),
        sma50: round2(sma50),
    })
}

fn to_pct(fraction: f64) -> f64 {
    (fraction * 1000.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
