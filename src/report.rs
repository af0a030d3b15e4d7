//! Screen-report serialization and leaderboard rendering
//!
//! One multi-key sort utility serves every consumer: the day report's
//! output ordering, the trend table, and each leaderboard section. No
//! section writes its own comparator chain.

use std::cmp::Ordering;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::accumulation::RankedTicker;
use crate::screener::{DayReport, ScreenTallies};
use crate::types::{GrowthLabel, ScreenResult, Tag};

/// First cell of the metadata line in a screen CSV
pub const METADATA_PREFIX: &str = "REPORT_METADATA";

/// Rows shown per leaderboard section
const LEADERBOARD_DEPTH: usize = 10;

const SCREEN_HEADER: [&str; 13] = [
    "ticker",
    "price",
    "tags",
    "growth_label",
    "revenue_growth_pct",
    "ebitda_growth_pct",
    "earnings_growth_pct",
    "operating_cf_millions",
    "market_cap_billions",
    "launchpad_score",
    "ema10",
    "sma20",
    "sma50",
];

// ============================================================================
// Multi-key sort utility
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// A sortable cell: a number (possibly missing) or text
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Number(Option<f64>),
    Text(String),
}

/// One key in a sort priority list
pub struct SortKey<T> {
    pub value: fn(&T) -> SortValue,
    pub dir: SortDir,
}

/// Stable multi-key sort. Keys apply in declaration order; missing numbers
/// always sort last regardless of direction.
pub fn sort_rows<T>(rows: &mut [T], keys: &[SortKey<T>]) {
    rows.sort_by(|a, b| {
        for key in keys {
            let ord = compare_values(&(key.value)(a), &(key.value)(b), key.dir);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn directed(ord: Ordering, dir: SortDir) -> Ordering {
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}

fn compare_values(a: &SortValue, b: &SortValue, dir: SortDir) -> Ordering {
    match (a, b) {
        (SortValue::Number(x), SortValue::Number(y)) => match (x, y) {
            (Some(x), Some(y)) => directed(x.total_cmp(y), dir),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        (SortValue::Text(x), SortValue::Text(y)) => directed(x.cmp(y), dir),
        // mixed kinds only arise from a misdeclared key list
        _ => Ordering::Equal,
    }
}

// ============================================================================
// Screen CSV
// ============================================================================

/// Write `screen_YYYY-MM-DD.csv`: one metadata line, then the row table.
pub fn write_screen_csv(report: &DayReport, out_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    let path = out_dir.join(format!("screen_{}.csv", report.session_date));

    let mut file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writeln!(file, "{},{}", METADATA_PREFIX, report.summary.line())?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(SCREEN_HEADER)?;
    for row in &report.rows {
        writer.write_record(row_record(row))?;
    }
    writer.flush()?;

    info!("Wrote {} rows to {}", report.rows.len(), path.display());
    Ok(path)
}

fn row_record(row: &ScreenResult) -> Vec<String> {
    vec![
        row.ticker.clone(),
        row.price.to_string(),
        Tag::join(&row.tags),
        row.growth_label.to_string(),
        format_opt(row.revenue_growth_pct),
        format_opt(row.ebitda_growth_pct),
        format_opt(row.earnings_growth_pct),
        format_opt(row.operating_cf_millions),
        format_opt(row.market_cap_billions),
        row.launchpad_score.to_string(),
        row.ema10.to_string(),
        row.sma20.to_string(),
        row.sma50.to_string(),
    ]
}

fn format_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// A screen CSV read back from disk
#[derive(Debug, Clone)]
pub struct SavedReport {
    pub session_date: NaiveDate,
    pub metadata: String,
    pub rows: Vec<ScreenResult>,
}

/// Read a screen CSV written by [`write_screen_csv`].
pub fn read_screen_csv(path: &Path) -> Result<SavedReport> {
    let session_date = date_from_filename(path)
        .ok_or_else(|| anyhow!("No date in screen filename {}", path.display()))?;
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let (first, rest) = text
        .split_once('\n')
        .ok_or_else(|| anyhow!("{} has no table", path.display()))?;
    let metadata = first
        .strip_prefix(METADATA_PREFIX)
        .and_then(|tail| tail.strip_prefix(','))
        .ok_or_else(|| anyhow!("{} does not start with a metadata line", path.display()))?
        .trim_end_matches('\r')
        .to_string();

    let mut reader = csv::Reader::from_reader(rest.as_bytes());
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            parse_row(&record).with_context(|| format!("Bad row in {}", path.display()))?,
        );
    }

    Ok(SavedReport {
        session_date,
        metadata,
        rows,
    })
}

fn parse_row(record: &csv::StringRecord) -> Result<ScreenResult> {
    let cell = |i: usize| record.get(i).unwrap_or_default().trim();
    Ok(ScreenResult {
        ticker: cell(0).to_string(),
        price: cell(1).parse()?,
        tags: Tag::parse_list(cell(2)),
        growth_label: GrowthLabel::parse(cell(3))
            .ok_or_else(|| anyhow!("Unknown growth label {:?}", cell(3)))?,
        revenue_growth_pct: parse_opt(cell(4))?,
        ebitda_growth_pct: parse_opt(cell(5))?,
        earnings_growth_pct: parse_opt(cell(6))?,
        operating_cf_millions: parse_opt(cell(7))?,
        market_cap_billions: parse_opt(cell(8))?,
        launchpad_score: cell(9).parse()?,
        ema10: cell(10).parse()?,
        sma20: cell(11).parse()?,
        sma50: cell(12).parse()?,
    })
}

fn parse_opt(cell: &str) -> Result<Option<f64>> {
    if cell.is_empty() {
        Ok(None)
    } else {
        Ok(Some(cell.parse()?))
    }
}

/// Date embedded in a dated filename such as `screen_2025-08-22.csv`.
pub fn date_from_filename(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let (_, date) = stem.rsplit_once('_')?;
    date.parse().ok()
}

/// Dated screen CSVs in a directory, oldest first.
pub fn list_screen_csvs(out_dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>> {
    if !out_dir.exists() {
        return Ok(vec![]);
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(out_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let date = name
            .strip_prefix("screen_")
            .and_then(|rest| rest.strip_suffix(".csv"))
            .and_then(|stem| stem.parse::<NaiveDate>().ok());
        if let Some(date) = date {
            found.push((date, entry.path()));
        }
    }

    found.sort_by_key(|(date, _)| *date);
    Ok(found)
}

// ============================================================================
// Terminal output
// ============================================================================

/// Print the day's screen results.
pub fn print_day_report(report: &DayReport, tallies: &ScreenTallies) {
    println!("\n=== SCREEN {} ===", report.session_date);
    println!("{}", report.summary.line());
    println!(
        "Hits: {} (skipped: {} no data, {} short history, {} untagged, {} cap out of band)",
        report.rows.len(),
        tallies.no_data,
        tallies.short_history,
        tallies.untagged,
        tallies.cap_out_of_band
    );
    for (i, row) in report.rows.iter().enumerate() {
        println!(
            "  {}. {} score={} price={} growth={} [{}]",
            i + 1,
            row.ticker,
            row.launchpad_score,
            row.price,
            row.growth_label,
            Tag::join(&row.tags)
        );
    }
}

/// Print the accumulation leaderboards. Every section is an ordered key
/// list over the same ranked rows.
pub fn print_leaderboards(ranked: &[RankedTicker]) {
    print_section(
        "TOP RANKED",
        ranked,
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
    print_section(
        "CLOSEST TO HIGHS",
        ranked,
        &[
            SortKey {
                value: |r: &RankedTicker| SortValue::Number(Some(r.proximity)),
                dir: SortDir::Desc,
            },
            SortKey {
                value: |r: &RankedTicker| SortValue::Number(Some(r.rank_score)),
                dir: SortDir::Desc,
            },
        ],
    );
    print_section(
        "TIGHTEST BASES",
        ranked,
        &[
            SortKey {
                value: |r: &RankedTicker| SortValue::Number(Some(r.tightness)),
                dir: SortDir::Desc,
            },
            SortKey {
                value: |r: &RankedTicker| SortValue::Number(Some(r.rank_score)),
                dir: SortDir::Desc,
            },
        ],
    );
}

fn print_section(title: &str, ranked: &[RankedTicker], keys: &[SortKey<RankedTicker>]) {
    let mut rows = ranked.to_vec();
    sort_rows(&mut rows, keys);

    println!("\n=== {} ===", title);
    if rows.is_empty() {
        println!("  (no tracked tickers)");
        return;
    }
    for (i, row) in rows.iter().take(LEADERBOARD_DEPTH).enumerate() {
        println!(
            "  {}. {} score={:.1} consistency={:.0}% proximity={:.1}% tightness={:.1} [{} / {}] seen {}x",
            i + 1,
            row.ticker,
            row.rank_score,
            row.consistency,
            row.proximity,
            row.tightness,
            row.tightness_label(),
            row.impulse_label(),
            row.appearances
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{MarketRegime, MarketStatus};
    use crate::screener::MarketSummary;
    use uuid::Uuid;

    struct Item {
        name: &'static str,
        score: Option<f64>,
    }

    #[test]
    fn test_sort_priority_and_missing_last() {
        let mut items = vec![
            Item { name: "b", score: Some(1.0) },
            Item { name: "d", score: None },
            Item { name: "a", score: Some(3.0) },
            Item { name: "c", score: Some(1.0) },
        ];
        sort_rows(
            &mut items,
            &[
                SortKey {
                    value: |i: &Item| SortValue::Number(i.score),
                    dir: SortDir::Desc,
                },
                SortKey {
                    value: |i: &Item| SortValue::Text(i.name.to_string()),
                    dir: SortDir::Asc,
                },
            ],
        );
        let order: Vec<&str> = items.iter().map(|i| i.name).collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);

        // missing stays last under ascending direction too
        sort_rows(
            &mut items,
            &[SortKey {
                value: |i: &Item| SortValue::Number(i.score),
                dir: SortDir::Asc,
            }],
        );
        assert_eq!(items.last().unwrap().name, "d");
    }

    fn sample_report() -> DayReport {
        let regime = MarketRegime {
            status: MarketStatus::UptrendConfirmed,
            distribution_day_count: 1,
            days_since_low: 8,
            last_index_change_pct: 0.6,
        };
        DayReport {
            session_date: NaiveDate::from_ymd_opt(2025, 8, 22).unwrap(),
            summary: MarketSummary {
                regime,
                advances: 120,
                declines: 80,
            },
            rows: vec![
                ScreenResult {
                    ticker: "LEAD".to_string(),
                    price: 101.25,
                    tags: vec![Tag::VcpThreeSteps, Tag::HighBaseStrict],
                    growth_label: GrowthLabel::Excellent,
                    revenue_growth_pct: Some(32.5),
                    earnings_growth_pct: Some(41.0),
                    ebitda_growth_pct: None,
                    operating_cf_millions: Some(250.75),
                    market_cap_billions: Some(8.5),
                    launchpad_score: 8,
                    ema10: 99.11,
                    sma20: 97.3,
                    sma50: 92.48,
                },
                ScreenResult {
                    ticker: "QUIET".to_string(),
                    price: 45.1,
                    tags: vec![Tag::PowerPlay],
                    growth_label: GrowthLabel::Unconfirmed,
                    revenue_growth_pct: None,
                    earnings_growth_pct: None,
                    ebitda_growth_pct: None,
                    operating_cf_millions: None,
                    market_cap_billions: None,
                    launchpad_score: 4,
                    ema10: 44.02,
                    sma20: 43.55,
                    sma50: 41.9,
                },
            ],
        }
    }

    #[test]
    fn test_screen_csv_round_trip() {
        let dir = std::env::temp_dir().join(format!("screen-report-test-{}", Uuid::new_v4()));
        let report = sample_report();

        let path = write_screen_csv(&report, &dir).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "screen_2025-08-22.csv"
        );

        let saved = read_screen_csv(&path).unwrap();
        assert_eq!(saved.session_date, report.session_date);
        assert_eq!(saved.metadata, report.summary.line());

        // the multi-tag cell survives CSV quoting
        let before = serde_json::to_string(&report.rows).unwrap();
        let after = serde_json::to_string(&saved.rows).unwrap();
        assert_eq!(before, after);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_screen_csv_listing() {
        let dir = std::env::temp_dir().join(format!("screen-list-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("screen_2025-08-20.csv"), "x").unwrap();
        std::fs::write(dir.join("screen_2025-08-18.csv"), "x").unwrap();
        std::fs::write(dir.join("trend_table_2025-08-20.csv"), "x").unwrap();

        let listed = list_screen_csvs(&dir).unwrap();
        let dates: Vec<String> = listed.iter().map(|(d, _)| d.to_string()).collect();
        assert_eq!(dates, vec!["2025-08-18", "2025-08-20"]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_date_from_filename() {
        let path = Path::new("/tmp/out/trend_table_2025-08-22.csv");
        assert_eq!(
            date_from_filename(path),
            NaiveDate::from_ymd_opt(2025, 8, 22)
        );
        assert!(date_from_filename(Path::new("notes.csv")).is_none());
    }
}
