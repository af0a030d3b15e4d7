//! Multi-day trend aggregation
//!
//! Merges the last N screen CSVs into one wide table: a row per ticker
//! keyed by how many days it appeared, with one column group per session
//! date. A marker row ahead of the table carries each day's market
//! summary line.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::info;

use crate::report::{sort_rows, SavedReport, SortDir, SortKey, SortValue};
use crate::types::{ScreenResult, Tag};

/// Ticker cell of the market-summary row
pub const MARKET_ROW_TICKER: &str = "### MARKET_ENVIRONMENT ###";

/// Days merged into one trend table by default
pub const DEFAULT_TREND_DAYS: usize = 5;

/// One ticker across the merged days. `cells` aligns with the table's
/// date list; a `None` cell means the ticker did not appear that day.
#[derive(Debug, Clone)]
pub struct TrendRow {
    pub ticker: String,
    pub appearances: u32,
    pub cells: Vec<Option<ScreenResult>>,
}

/// The wide merge of N day reports
#[derive(Debug, Clone)]
pub struct TrendTable {
    /// Session dates, oldest first
    pub dates: Vec<NaiveDate>,
    /// Market summary line per date, aligned with `dates`
    pub market_lines: Vec<String>,
    pub rows: Vec<TrendRow>,
}

/// Merge day reports into the wide trend table. Rows are ordered by
/// appearance count, then by the latest day's revenue growth, unknown
/// last.
pub fn merge_reports(reports: &[SavedReport]) -> TrendTable {
    let mut ordered: Vec<&SavedReport> = reports.iter().collect();
    ordered.sort_by_key(|report| report.session_date);

    let dates: Vec<NaiveDate> = ordered.iter().map(|r| r.session_date).collect();
    let market_lines: Vec<String> = ordered.iter().map(|r| r.metadata.clone()).collect();

    let mut by_ticker: BTreeMap<String, TrendRow> = BTreeMap::new();
    for (day_idx, report) in ordered.iter().enumerate() {
        for row in &report.rows {
            let entry = by_ticker
                .entry(row.ticker.clone())
                .or_insert_with(|| TrendRow {
                    ticker: row.ticker.clone(),
                    appearances: 0,
                    cells: vec![None; dates.len()],
                });
            entry.appearances += 1;
            entry.cells[day_idx] = Some(row.clone());
        }
    }

    let mut rows: Vec<TrendRow> = by_ticker.into_values().collect();
    sort_rows(
        &mut rows,
        &[
            SortKey {
                value: |row: &TrendRow| SortValue::Number(Some(row.appearances as f64)),
                dir: SortDir::Desc,
            },
            SortKey {
                value: |row: &TrendRow| SortValue::Number(latest_revenue(row)),
                dir: SortDir::Desc,
            },
        ],
    );

    info!(
        "Merged {} days into {} trend rows",
        dates.len(),
        rows.len()
    );
    TrendTable {
        dates,
        market_lines,
        rows,
    }
}

fn latest_revenue(row: &TrendRow) -> Option<f64> {
    row.cells
        .last()
        .and_then(|cell| cell.as_ref())
        .and_then(|result| result.revenue_growth_pct)
}

/// Column names of one per-date group.
const DATE_GROUP: [&str; 12] = [
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

/// Write the trend table as `trend_table_YYYY-MM-DD.csv`.
pub fn write_trend_csv(
    table: &TrendTable,
    out_dir: &Path,
    session_date: NaiveDate,
) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;
    let path = out_dir.join(format!("trend_table_{}.csv", session_date));

    let file = std::fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);

    let mut header = vec!["ticker".to_string(), "appearances".to_string()];
    for date in &table.dates {
        for column in DATE_GROUP {
            header.push(format!("{}_{}", column, date));
        }
    }
    writer.write_record(&header)?;

    // market row first: the summary line rides in each date's price cell
    let mut market = vec![MARKET_ROW_TICKER.to_string(), "-".to_string()];
    for line in &table.market_lines {
        market.push(line.clone());
        market.extend(std::iter::repeat(String::new()).take(DATE_GROUP.len() - 1));
    }
    writer.write_record(&market)?;

    for row in &table.rows {
        let mut record = vec![row.ticker.clone(), row.appearances.to_string()];
        for cell in &row.cells {
            match cell {
                Some(result) => record.extend(cell_group(result)),
                None => record.extend(std::iter::repeat(String::new()).take(DATE_GROUP.len())),
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!("Wrote trend table to {}", path.display());
    Ok(path)
}

fn cell_group(result: &ScreenResult) -> Vec<String> {
    vec![
        result.price.to_string(),
        Tag::join(&result.tags),
        result.growth_label.to_string(),
        opt_cell(result.revenue_growth_pct),
        opt_cell(result.ebitda_growth_pct),
        opt_cell(result.earnings_growth_pct),
        opt_cell(result.operating_cf_millions),
        opt_cell(result.market_cap_billions),
        result.launchpad_score.to_string(),
        result.ema10.to_string(),
        result.sma20.to_string(),
        result.sma50.to_string(),
    ]
}

fn opt_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GrowthLabel;
    use uuid::Uuid;

    fn row(ticker: &str, revenue: Option<f64>) -> ScreenResult {
        ScreenResult {
            ticker: ticker.to_string(),
            price: 50.0,
            tags: vec![Tag::HighBase],
            growth_label: GrowthLabel::Good,
            revenue_growth_pct: revenue,
            earnings_growth_pct: None,
            ebitda_growth_pct: None,
            operating_cf_millions: None,
            market_cap_billions: Some(4.0),
            launchpad_score: 6,
            ema10: 49.0,
            sma20: 48.0,
            sma50: 45.0,
        }
    }

    fn saved(day: u32, metadata: &str, rows: Vec<ScreenResult>) -> SavedReport {
        SavedReport {
            session_date: NaiveDate::from_ymd_opt(2025, 8, day).unwrap(),
            metadata: metadata.to_string(),
            rows,
        }
    }

    fn sample_reports() -> Vec<SavedReport> {
        vec![
            saved(
                18,
                "day one",
                vec![row("ALFA", Some(10.0)), row("CHEM", Some(55.0))],
            ),
            saved(19, "day two", vec![row("ALFA", Some(12.0)), row("BOLT", Some(90.0))]),
            saved(
                20,
                "day three",
                vec![row("ALFA", Some(11.0)), row("CHEM", Some(20.0)), row("DRIL", Some(35.0))],
            ),
        ]
    }

    #[test]
    fn test_merge_counts_and_ordering() {
        let table = merge_reports(&sample_reports());

        assert_eq!(table.dates.len(), 3);
        assert_eq!(table.market_lines, vec!["day one", "day two", "day three"]);

        let order: Vec<(&str, u32)> = table
            .rows
            .iter()
            .map(|r| (r.ticker.as_str(), r.appearances))
            .collect();
        // ALFA leads on appearances, then CHEM; DRIL and BOLT tie at one
        // appearance and the latest day's revenue breaks the tie. BOLT
        // missed the latest day, so its revenue is unknown and sorts last.
        assert_eq!(
            order,
            vec![("ALFA", 3), ("CHEM", 2), ("DRIL", 1), ("BOLT", 1)]
        );
    }

    #[test]
    fn test_merge_cells_align_with_dates() {
        let table = merge_reports(&sample_reports());
        let chem = table.rows.iter().find(|r| r.ticker == "CHEM").unwrap();
        assert!(chem.cells[0].is_some());
        assert!(chem.cells[1].is_none());
        assert!(chem.cells[2].is_some());
        assert_eq!(
            chem.cells[2].as_ref().unwrap().revenue_growth_pct,
            Some(20.0)
        );
    }

    #[test]
    fn test_trend_csv_layout() {
        let dir = std::env::temp_dir().join(format!("trend-table-test-{}", Uuid::new_v4()));
        let table = merge_reports(&sample_reports());
        let date = NaiveDate::from_ymd_opt(2025, 8, 20).unwrap();

        let path = write_trend_csv(&table, &dir, date).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("ticker,appearances,price_2025-08-18"));
        assert!(header.contains("sma50_2025-08-20"));

        let market = lines.next().unwrap();
        assert!(market.starts_with(MARKET_ROW_TICKER));
        assert!(market.contains("day two"));

        let first_stock = lines.next().unwrap();
        assert!(first_stock.starts_with("ALFA,3,"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
