//! Snapshot cache for screen inputs
//!
//! One snapshot freezes everything a run needs: the index series plus every
//! ticker's bars and fundamentals. Screening the same snapshot twice
//! produces identical output, so reruns never refetch.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::{DailyBar, Fundamentals};

/// Zstd level for snapshot files
const COMPRESSION_LEVEL: i32 = 3;

/// Bars and fundamentals for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerData {
    pub ticker: String,
    pub bars: Vec<DailyBar>,
    pub fundamentals: Fundamentals,
}

/// Frozen input of one screening run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseSnapshot {
    pub session_date: NaiveDate,
    pub index_symbol: String,
    pub index_bars: Vec<DailyBar>,
    pub stocks: Vec<TickerData>,
}

fn snapshot_path(cache_dir: &Path, date: NaiveDate) -> PathBuf {
    cache_dir.join(format!("snapshot_{}.json.zst", date))
}

/// Save a snapshot as `snapshot_YYYY-MM-DD.json.zst`.
pub fn save_snapshot(snapshot: &UniverseSnapshot, cache_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)
        .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
    let path = snapshot_path(cache_dir, snapshot.session_date);

    let json = serde_json::to_vec(snapshot)?;
    let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)?;
    std::fs::write(&path, compressed)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;

    info!(
        "Saved snapshot for {} ({} tickers)",
        snapshot.session_date,
        snapshot.stocks.len()
    );
    Ok(path)
}

/// Load the snapshot for one session date, if cached.
pub fn load_snapshot(cache_dir: &Path, date: NaiveDate) -> Result<Option<UniverseSnapshot>> {
    let path = snapshot_path(cache_dir, date);
    if !path.exists() {
        return Ok(None);
    }

    let compressed = std::fs::read(&path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    let json = zstd::decode_all(&compressed[..])?;
    let snapshot: UniverseSnapshot = serde_json::from_slice(&json)
        .with_context(|| format!("Failed to decode snapshot {}", path.display()))?;
    Ok(Some(snapshot))
}

/// Dates with a cached snapshot, oldest first.
pub fn snapshot_dates(cache_dir: &Path) -> Result<Vec<NaiveDate>> {
    if !cache_dir.exists() {
        return Ok(vec![]);
    }

    let mut dates = Vec::new();
    for entry in std::fs::read_dir(cache_dir)? {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().to_string();
        if let Some(stem) = filename
            .strip_prefix("snapshot_")
            .and_then(|rest| rest.strip_suffix(".json.zst"))
        {
            if let Ok(date) = stem.parse::<NaiveDate>() {
                dates.push(date);
            }
        }
    }

    dates.sort();
    Ok(dates)
}

/// Load the newest cached snapshot, if any.
pub fn load_latest_snapshot(cache_dir: &Path) -> Result<Option<UniverseSnapshot>> {
    match snapshot_dates(cache_dir)?.last() {
        Some(&date) => load_snapshot(cache_dir, date),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("snapshot-cache-test-{}", Uuid::new_v4()))
    }

    fn sample_snapshot(date: NaiveDate) -> UniverseSnapshot {
        let bar = DailyBar {
            date,
            open: 10.0,
            high: 10.5,
            low: 9.8,
            close: 10.2,
            volume: 1500,
        };
        UniverseSnapshot {
            session_date: date,
            index_symbol: "SPY".to_string(),
            index_bars: vec![bar],
            stocks: vec![TickerData {
                ticker: "AAPL".to_string(),
                bars: vec![bar],
                fundamentals: Fundamentals {
                    market_cap: Some(3.0e12),
                    ..Fundamentals::default()
                },
            }],
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = scratch_dir();
        let date = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let snapshot = sample_snapshot(date);

        save_snapshot(&snapshot, &dir).unwrap();
        let loaded = load_snapshot(&dir, date).unwrap().unwrap();
        assert_eq!(loaded.session_date, date);
        assert_eq!(loaded.stocks.len(), 1);
        assert_eq!(loaded.stocks[0].ticker, "AAPL");
        assert_eq!(loaded.stocks[0].fundamentals.market_cap, Some(3.0e12));

        assert!(load_snapshot(&dir, date.succ_opt().unwrap()).unwrap().is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_snapshot_listing_sorted() {
        let dir = scratch_dir();
        let d1 = NaiveDate::from_ymd_opt(2025, 8, 4).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        save_snapshot(&sample_snapshot(d1), &dir).unwrap();
        save_snapshot(&sample_snapshot(d2), &dir).unwrap();
        // an unrelated file in the cache directory is ignored
        std::fs::write(dir.join("notes.txt"), "x").unwrap();

        assert_eq!(snapshot_dates(&dir).unwrap(), vec![d2, d1]);
        let latest = load_latest_snapshot(&dir).unwrap().unwrap();
        assert_eq!(latest.session_date, d1);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
