//! Market-data HTTP adapter
//!
//! Thin client over a daily-bars provider plus the batched universe fetch.
//! All throttling (batching, cooldown, retry) lives here; the screen itself
//! works from an immutable snapshot, never from live calls.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use futures::{stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::cache::TickerData;
use crate::types::{DailyBar, Fundamentals};

/// Default symbol count per fetch batch
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Calendar days of history that cover a 252-session lookback with
/// weekends and holidays to spare
pub const DEFAULT_LOOKBACK_DAYS: i64 = 400;

/// Throttling knobs for the universe fetch
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Symbols per batch
    pub batch_size: usize,
    /// Concurrent requests within a batch
    pub concurrency: usize,
    /// Pause between batches
    pub cooldown: Duration,
    /// Extra attempts per symbol after the first
    pub max_retries: u32,
    /// Pause before each retry
    pub retry_pause: Duration,
    /// Calendar days of history requested per symbol
    pub lookback_days: i64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 8,
            cooldown: Duration::from_secs(2),
            max_retries: 2,
            retry_pause: Duration::from_secs(1),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// One daily bar as the provider returns it
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BarRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
}

/// Fundamentals as the provider returns them; absent fields stay unknown
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FundamentalsRow {
    market_cap: Option<f64>,
    revenue_growth: Option<f64>,
    earnings_growth: Option<f64>,
    ebitda_growth: Option<f64>,
    operating_cashflow: Option<f64>,
}

/// HTTP client for the daily market-data API
pub struct MarketDataClient {
    client: Client,
    base_url: String,
    token: String,
}

impl MarketDataClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            base_url,
            token,
        }
    }

    /// Daily bars for one symbol from `start`, oldest first.
    pub async fn daily_bars(&self, symbol: &str, start: NaiveDate) -> Result<Vec<DailyBar>> {
        let url = format!("{}/daily/{}/prices", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("startDate", start.to_string()), ("token", self.token.clone())])
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send price request for {}", symbol))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GET {} failed ({}): {}", url, status, body));
        }

        let rows: Vec<BarRow> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse price response for {}", symbol))?;

        let mut bars: Vec<DailyBar> = rows
            .into_iter()
            .map(|row| DailyBar {
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            })
            .collect();
        normalize_bars(&mut bars);
        Ok(bars)
    }

    /// Fundamentals snapshot for one symbol.
    pub async fn fundamentals(&self, symbol: &str) -> Result<Fundamentals> {
        let url = format!("{}/fundamentals/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .query(&[("token", self.token.clone())])
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send fundamentals request for {}", symbol))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("GET {} failed ({}): {}", url, status, body));
        }

        let row: FundamentalsRow = response
            .json()
            .await
            .with_context(|| format!("Failed to parse fundamentals response for {}", symbol))?;

        Ok(Fundamentals {
            market_cap: row.market_cap,
            revenue_growth: row.revenue_growth,
            earnings_growth: row.earnings_growth,
            ebitda_growth: row.ebitda_growth,
            operating_cashflow: row.operating_cashflow,
        })
    }

    /// Fetch the whole universe in throttled batches. Symbols that still
    /// fail after retries are logged and omitted.
    pub async fn fetch_universe(
        &self,
        symbols: &[String],
        start: NaiveDate,
        config: &FetchConfig,
    ) -> Vec<TickerData> {
        let batch_size = config.batch_size.max(1);
        let batch_count = symbols.len().div_ceil(batch_size);
        let mut universe = Vec::with_capacity(symbols.len());

        for (index, batch) in symbols.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(config.cooldown).await;
            }
            info!(
                "Fetching batch {}/{} ({} symbols)",
                index + 1,
                batch_count,
                batch.len()
            );

            let results: Vec<(String, Result<TickerData>)> =
                stream::iter(batch.iter().map(|symbol| {
                    let symbol = symbol.clone();
                    async move {
                        let result = self.fetch_symbol(&symbol, start, config).await;
                        (symbol, result)
                    }
                }))
                .buffer_unordered(config.concurrency.max(1))
                .collect()
                .await;

            for (symbol, result) in results {
                match result {
                    Ok(data) => universe.push(data),
                    Err(e) => warn!("Skipping {}: {:#}", symbol, e),
                }
            }
        }

        info!("Fetched {}/{} symbols", universe.len(), symbols.len());
        universe
    }

    async fn fetch_symbol(
        &self,
        symbol: &str,
        start: NaiveDate,
        config: &FetchConfig,
    ) -> Result<TickerData> {
        let mut last_err = None;
        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                debug!("Retry {} for {}", attempt, symbol);
                tokio::time::sleep(config.retry_pause).await;
            }
            match self.try_fetch_symbol(symbol, start).await {
                Ok(data) => return Ok(data),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("No fetch attempt made for {}", symbol)))
    }

    async fn try_fetch_symbol(&self, symbol: &str, start: NaiveDate) -> Result<TickerData> {
        let bars = self.daily_bars(symbol, start).await?;
        if bars.is_empty() {
            return Err(anyhow!("No price history returned for {}", symbol));
        }
        // a missing fundamentals record does not block the technical screen
        let fundamentals = match self.fundamentals(symbol).await {
            Ok(record) => record,
            Err(e) => {
                debug!("No fundamentals for {}: {:#}", symbol, e);
                Fundamentals::default()
            }
        };
        Ok(TickerData {
            ticker: symbol.to_string(),
            bars,
            fundamentals,
        })
    }
}

/// Sort chronologically and drop duplicate dates, keeping the later record
/// when the feed repeats a date.
fn normalize_bars(bars: &mut Vec<DailyBar>) {
    bars.sort_by_key(|bar| bar.date);
    bars.reverse();
    bars.dedup_by_key(|bar| bar.date);
    bars.reverse();
}

/// Parse a universe listing: one ticker per line, `#` starts a comment.
/// Symbols come back uppercased, sorted, and deduplicated; a repeated
/// line must not screen or track a ticker twice.
pub fn parse_universe(text: &str) -> Vec<String> {
    let mut symbols: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let symbol = line.split('#').next().unwrap_or_default().trim();
            if symbol.is_empty() {
                None
            } else {
                Some(symbol.to_uppercase())
            }
        })
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

/// Read a universe file from disk.
pub fn read_universe(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read universe file {}", path.display()))?;
    let symbols = parse_universe(&text);
    if symbols.is_empty() {
        return Err(anyhow!("Universe file {} lists no symbols", path.display()));
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_universe_parsing() {
        let text = "# watchlist\naapl\nMSFT  # megacap\n\n  nvda\n";
        assert_eq!(parse_universe(text), vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[test]
    fn test_universe_dedups_repeated_symbols() {
        // a ticker listed twice (any case) yields one snapshot entry, so
        // appearance counts and streaks stay per-ticker
        let text = "nvda\nACME\nacme\nNVDA  # repeated\nACME\n";
        assert_eq!(parse_universe(text), vec!["ACME", "NVDA"]);
    }

    #[test]
    fn test_bar_row_deserialization() {
        let json = r#"{"date":"2025-06-02","open":10.0,"high":11.0,"low":9.5,"close":10.8,"volume":1200}"#;
        let row: BarRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2025, 6, 2).unwrap());
        assert_eq!(row.volume, 1200);
    }

    #[test]
    fn test_fundamentals_row_defaults_missing_fields() {
        let row: FundamentalsRow = serde_json::from_str(r#"{"marketCap":2.5e9}"#).unwrap();
        assert_eq!(row.market_cap, Some(2.5e9));
        assert!(row.revenue_growth.is_none());
        assert!(row.operating_cashflow.is_none());
    }

    #[test]
    fn test_bar_normalization_keeps_latest_duplicate() {
        let date = |d: u32| NaiveDate::from_ymd_opt(2025, 6, d).unwrap();
        let mk = |d: u32, close: f64| DailyBar {
            date: date(d),
            open: close,
            high: close,
            low: close,
            close,
            volume: 100,
        };
        let mut bars = vec![mk(3, 11.0), mk(2, 10.0), mk(3, 11.5)];
        normalize_bars(&mut bars);
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, date(2));
        assert_eq!(bars[1].close, 11.5);
    }
}
