use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use breakout_radar::accumulation::{self, TrackerConfig};
use breakout_radar::cache::{self, UniverseSnapshot};
use breakout_radar::persistence;
use breakout_radar::provider::{read_universe, FetchConfig, MarketDataClient};
use breakout_radar::regime::{classify_market, RegimeConfig};
use breakout_radar::report;
use breakout_radar::screener::{screen_snapshot, ScreenConfig};

#[derive(Parser, Debug)]
#[command(name = "breakout-radar")]
#[command(about = "Nightly US equity screener: trend templates, market regime, launchpad scoring")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Print verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch universe bars and fundamentals, write the session snapshot
    Fetch {
        /// Universe file with one ticker per line (# for comments)
        #[arg(short, long, default_value = "universe.txt")]
        universe: PathBuf,

        /// Index symbol used for regime classification
        #[arg(short, long, default_value = "SPY")]
        index: String,

        /// Session date (YYYY-MM-DD), defaults to today in New York
        #[arg(short = 'D', long)]
        date: Option<String>,

        /// Snapshot cache directory
        #[arg(short, long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Market data API base URL
        #[arg(long, env = "MARKET_DATA_URL")]
        base_url: String,

        /// Market data API token
        #[arg(long, env = "MARKET_DATA_TOKEN")]
        token: String,

        /// Symbols per fetch batch
        #[arg(long, default_value = "50")]
        batch_size: usize,

        /// Calendar days of history to request
        #[arg(long, default_value = "400")]
        lookback_days: i64,
    },

    /// Screen the session snapshot and write the dated results CSV
    Screen {
        /// Universe file, used only when the snapshot must be fetched
        #[arg(short, long, default_value = "universe.txt")]
        universe: PathBuf,

        /// Index symbol used for regime classification
        #[arg(short, long, default_value = "SPY")]
        index: String,

        /// Session date (YYYY-MM-DD), defaults to today in New York
        #[arg(short = 'D', long)]
        date: Option<String>,

        /// Snapshot cache directory
        #[arg(short, long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Output directory for screen CSVs
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Market data API base URL (only needed without a cached snapshot)
        #[arg(long, env = "MARKET_DATA_URL")]
        base_url: Option<String>,

        /// Market data API token (only needed without a cached snapshot)
        #[arg(long, env = "MARKET_DATA_TOKEN")]
        token: Option<String>,
    },

    /// Classify the index regime and print it
    Regime {
        /// Index symbol to classify
        #[arg(short, long, default_value = "SPY")]
        index: String,

        /// Session date (YYYY-MM-DD), defaults to today in New York
        #[arg(short = 'D', long)]
        date: Option<String>,

        /// Snapshot cache directory
        #[arg(short, long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Market data API base URL (only needed without a cached snapshot)
        #[arg(long, env = "MARKET_DATA_URL")]
        base_url: Option<String>,

        /// Market data API token (only needed without a cached snapshot)
        #[arg(long, env = "MARKET_DATA_TOKEN")]
        token: Option<String>,
    },

    /// Run the stealth-accumulation scan and update tracker state
    Accumulate {
        /// Universe file, used only when the snapshot must be fetched
        #[arg(short, long, default_value = "universe.txt")]
        universe: PathBuf,

        /// Index symbol stored with the snapshot
        #[arg(short, long, default_value = "SPY")]
        index: String,

        /// Session date (YYYY-MM-DD), defaults to today in New York
        #[arg(short = 'D', long)]
        date: Option<String>,

        /// Snapshot cache directory
        #[arg(short, long, default_value = "cache")]
        cache_dir: PathBuf,

        /// Tracker state directory
        #[arg(short, long, default_value = "state")]
        state_dir: PathBuf,

        /// Market data API base URL (only needed without a cached snapshot)
        #[arg(long, env = "MARKET_DATA_URL")]
        base_url: Option<String>,

        /// Market data API token (only needed without a cached snapshot)
        #[arg(long, env = "MARKET_DATA_TOKEN")]
        token: Option<String>,
    },

    /// Merge recent screens into the trend table and print leaderboards
    Report {
        /// Output directory holding dated screen CSVs
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Tracker state directory
        #[arg(short, long, default_value = "state")]
        state_dir: PathBuf,

        /// Days of screens to merge
        #[arg(short = 'n', long, default_value = "5")]
        days: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Commands::Fetch {
            universe,
            index,
            date,
            cache_dir,
            base_url,
            token,
            batch_size,
            lookback_days,
        } => {
            run_fetch(
                universe, index, date, cache_dir, base_url, token, batch_size, lookback_days,
            )
            .await?;
        }
        Commands::Screen {
            universe,
            index,
            date,
            cache_dir,
            output_dir,
            base_url,
            token,
        } => {
            run_screen(universe, index, date, cache_dir, output_dir, base_url, token).await?;
        }
        Commands::Regime {
            index,
            date,
            cache_dir,
            base_url,
            token,
        } => {
            run_regime(index, date, cache_dir, base_url, token).await?;
        }
        Commands::Accumulate {
            universe,
            index,
            date,
            cache_dir,
            state_dir,
            base_url,
            token,
        } => {
            run_accumulate(universe, index, date, cache_dir, state_dir, base_url, token).await?;
        }
        Commands::Report {
            output_dir,
            state_dir,
            days,
        } => {
            run_report(output_dir, state_dir, days)?;
        }
    }

    Ok(())
}

/// Resolve the session date, defaulting to today on the US exchange clock.
fn resolve_session_date(date: Option<String>) -> Result<NaiveDate> {
    match date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .with_context(|| format!("Invalid session date '{}', expected YYYY-MM-DD", raw)),
        None => Ok(chrono::Utc::now()
            .with_timezone(&chrono_tz::America::New_York)
            .date_naive()),
    }
}

async fn load_or_fetch_snapshot(
    cache_dir: &Path,
    date: NaiveDate,
    universe: &Path,
    index: &str,
    base_url: Option<String>,
    token: Option<String>,
) -> Result<UniverseSnapshot> {
    if let Some(snapshot) = cache::load_snapshot(cache_dir, date)? {
        info!("Loaded cached snapshot for {}", date);
        return Ok(snapshot);
    }

    let (Some(base_url), Some(token)) = (base_url, token) else {
        bail!(
            "No cached snapshot for {} and no API credentials. Run 'fetch' first or set MARKET_DATA_URL / MARKET_DATA_TOKEN.",
            date
        );
    };

    info!("No cached snapshot for {}, fetching", date);
    let symbols = read_universe(universe)?;
    let client = MarketDataClient::new(base_url, token);
    let config = FetchConfig::default();
    let start = date - chrono::Duration::days(config.lookback_days);

    let index_bars = client
        .daily_bars(index, start)
        .await
        .with_context(|| format!("Failed to fetch index history for {}", index))?;
    let stocks = client.fetch_universe(&symbols, start, &config).await;

    let snapshot = UniverseSnapshot {
        session_date: date,
        index_symbol: index.to_string(),
        index_bars,
        stocks,
    };
    cache::save_snapshot(&snapshot, cache_dir)?;
    Ok(snapshot)
}

#[allow(clippy::too_many_arguments)]
async fn run_fetch(
    universe: PathBuf,
    index: String,
    date: Option<String>,
    cache_dir: PathBuf,
    base_url: String,
    token: String,
    batch_size: usize,
    lookback_days: i64,
) -> Result<()> {
    info!("=== FETCH MODE ===");
    let session_date = resolve_session_date(date)?;
    info!("Session date: {}", session_date);
    info!("Universe file: {:?}", universe);

    let symbols = read_universe(&universe)?;
    info!("Universe: {} symbols, index {}", symbols.len(), index);

    let client = MarketDataClient::new(base_url, token);
    let config = FetchConfig {
        batch_size,
        lookback_days,
        ..Default::default()
    };
    let start = session_date - chrono::Duration::days(config.lookback_days);

    let index_bars = client
        .daily_bars(&index, start)
        .await
        .with_context(|| format!("Failed to fetch index history for {}", index))?;
    if index_bars.is_empty() {
        bail!("No index history returned for {}", index);
    }
    info!("Fetched {} index sessions for {}", index_bars.len(), index);

    let stocks = client.fetch_universe(&symbols, start, &config).await;

    let snapshot = UniverseSnapshot {
        session_date,
        index_symbol: index,
        index_bars,
        stocks,
    };
    cache::save_snapshot(&snapshot, &cache_dir)?;

    info!(
        "Fetch complete: {} of {} symbols",
        snapshot.stocks.len(),
        symbols.len()
    );
    Ok(())
}

async fn run_screen(
    universe: PathBuf,
    index: String,
    date: Option<String>,
    cache_dir: PathBuf,
    output_dir: PathBuf,
    base_url: Option<String>,
    token: Option<String>,
) -> Result<()> {
    info!("=== SCREEN MODE ===");
    let session_date = resolve_session_date(date)?;
    info!("Session date: {}", session_date);

    let snapshot =
        load_or_fetch_snapshot(&cache_dir, session_date, &universe, &index, base_url, token)
            .await?;

    let (day_report, tallies) = screen_snapshot(&snapshot, &ScreenConfig::default())?;
    let path = report::write_screen_csv(&day_report, &output_dir)?;

    report::print_day_report(&day_report, &tallies);
    info!("Wrote screen to {:?}", path);
    Ok(())
}

async fn run_regime(
    index: String,
    date: Option<String>,
    cache_dir: PathBuf,
    base_url: Option<String>,
    token: Option<String>,
) -> Result<()> {
    info!("=== REGIME MODE ===");
    let session_date = resolve_session_date(date)?;

    let index_bars = match cache::load_snapshot(&cache_dir, session_date)? {
        Some(snapshot) if snapshot.index_symbol == index => {
            info!("Using index bars from cached snapshot for {}", session_date);
            snapshot.index_bars
        }
        _ => {
            let (Some(base_url), Some(token)) = (base_url, token) else {
                bail!(
                    "No cached snapshot for {} and no API credentials. Run 'fetch' first or set MARKET_DATA_URL / MARKET_DATA_TOKEN.",
                    session_date
                );
            };
            let client = MarketDataClient::new(base_url, token);
            let start = session_date
                - chrono::Duration::days(breakout_radar::provider::DEFAULT_LOOKBACK_DAYS);
            client
                .daily_bars(&index, start)
                .await
                .with_context(|| format!("Failed to fetch index history for {}", index))?
        }
    };

    let regime = classify_market(&index_bars, &RegimeConfig::default())
        .with_context(|| format!("Failed to classify regime for {}", index))?;

    println!("\n=== MARKET REGIME {} ({}) ===", session_date, index);
    println!("{}", regime.headline());
    println!("Last index change: {:+.2}%", regime.last_index_change_pct);
    Ok(())
}

async fn run_accumulate(
    universe: PathBuf,
    index: String,
    date: Option<String>,
    cache_dir: PathBuf,
    state_dir: PathBuf,
    base_url: Option<String>,
    token: Option<String>,
) -> Result<()> {
    info!("=== ACCUMULATE MODE ===");
    let session_date = resolve_session_date(date)?;
    info!("Session date: {}", session_date);
    info!("State directory: {:?}", state_dir);

    let snapshot =
        load_or_fetch_snapshot(&cache_dir, session_date, &universe, &index, base_url, token)
            .await?;

    let update = accumulation::run_tracker(&snapshot, &TrackerConfig::default(), &state_dir)?;

    println!("\n=== ACCUMULATION {} ===", snapshot.session_date);
    if update.qualified.is_empty() {
        println!("No qualifying tickers");
    }
    for (i, (ticker, streak)) in update.qualified.iter().enumerate() {
        println!("  {}. {} ({} day streak)", i + 1, ticker, streak);
    }
    Ok(())
}

fn run_report(output_dir: PathBuf, state_dir: PathBuf, days: usize) -> Result<()> {
    info!("=== REPORT MODE ===");

    let files = report::list_screen_csvs(&output_dir)?;
    if files.is_empty() {
        bail!(
            "No screen CSVs found in {:?}. Run 'screen' first.",
            output_dir
        );
    }
    let start = files.len().saturating_sub(days.max(1));
    let recent = &files[start..];
    info!("Merging {} screen files", recent.len());

    let mut reports = Vec::with_capacity(recent.len());
    for (_, path) in recent {
        reports.push(report::read_screen_csv(path)?);
    }

    let table = persistence::merge_reports(&reports);
    let stamp = recent[recent.len() - 1].0;
    let path = persistence::write_trend_csv(&table, &output_dir, stamp)?;
    info!("Wrote trend table to {:?}", path);

    let ranked = accumulation::rank_tracked(&state_dir)?;
    report::print_leaderboards(&ranked);
    Ok(())
}
