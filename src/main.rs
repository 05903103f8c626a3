//! Expiry-aware options strategy backtest CLI.
//!
//! # Usage
//!
//! ```bash
//! # Full run: DTE day selection plus leg resolution, with JSON export
//! expiry-backtest run --config config/strategies.toml --data data --output results/run.json
//!
//! # Day selection only (no snapshots loaded)
//! expiry-backtest scan --config config/strategies.toml --data data
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use expiry_backtest::{
    BacktestRunner, BacktestSettings, DataLoader, Exchange, RunResult, SnapshotStore, Strategy,
    TradingCalendar,
};

const SEPARATOR: &str = "============================================================";

/// Sessions loaded past the last strategy end date so that expiries after
/// it (month end, next-month legs) stay resolvable.
const CALENDAR_LOOKAHEAD_DAYS: i64 = 70;

#[derive(Parser)]
#[command(name = "expiry-backtest")]
#[command(about = "Expiry-aware day selection and strike resolution for options strategies")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate strategies and resolve legs against option snapshots
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to data directory
        #[arg(short, long, default_value = "data")]
        data: String,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report which days each strategy fires on, without loading snapshots
    Scan {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to data directory
        #[arg(short, long, default_value = "data")]
        data: String,

        /// Write the full result as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Earliest start and latest end per symbol across strategies.
fn symbol_ranges(strategies: &[Strategy]) -> BTreeMap<String, (NaiveDate, NaiveDate)> {
    let mut ranges: BTreeMap<String, (NaiveDate, NaiveDate)> = BTreeMap::new();
    for strategy in strategies {
        let symbol = strategy.instrument().symbol().to_string();
        let range = ranges
            .entry(symbol)
            .or_insert((strategy.start_date(), strategy.end_date()));
        range.0 = range.0.min(strategy.start_date());
        range.1 = range.1.max(strategy.end_date());
    }
    ranges
}

/// One calendar per exchange, from the trade dates present in the data.
fn build_calendars(loader: &DataLoader, strategies: &[Strategy]) -> Result<Vec<TradingCalendar>> {
    let mut by_exchange: BTreeMap<Exchange, BTreeSet<NaiveDate>> = BTreeMap::new();

    for (symbol, (start, end)) in symbol_ranges(strategies) {
        let Some(exchange) = strategies
            .iter()
            .find(|s| s.instrument().symbol() == symbol)
            .map(|s| s.instrument().exchange())
        else {
            continue;
        };
        let dates = loader
            .trading_dates(&symbol, start, end + Duration::days(CALENDAR_LOOKAHEAD_DAYS))
            .with_context(|| format!("Failed to read trade dates for {}", symbol))?;
        info!("{}: {} trade dates from {} to {}", symbol, dates.len(), start, end);

        by_exchange.entry(exchange).or_default().extend(dates);
    }

    by_exchange
        .into_iter()
        .map(|(exchange, dates)| {
            TradingCalendar::new(exchange, dates)
                .with_context(|| format!("No trading dates for {}", exchange))
        })
        .collect()
}

fn prepare(config: &Path, loader: &DataLoader) -> Result<BacktestRunner> {
    let settings = BacktestSettings::load(config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;
    let strategies = settings.strategies()?;
    let expiries = settings.expiry_resolver()?;
    let sessions = settings.market_sessions()?;

    let calendars = build_calendars(loader, &strategies)?;
    for cal in &calendars {
        info!(
            "{} calendar: {} sessions, {} to {}",
            cal.exchange(),
            cal.len(),
            cal.first(),
            cal.last()
        );
    }

    Ok(BacktestRunner::new(strategies, calendars, expiries, sessions)?)
}

fn load_store(loader: &DataLoader, strategies: &[Strategy]) -> Result<SnapshotStore> {
    let ranges = symbol_ranges(strategies);
    let mut store = SnapshotStore::new();

    let pb = ProgressBar::new(ranges.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    for (symbol, (start, end)) in &ranges {
        pb.set_message(symbol.clone());
        let count = loader
            .load_store(symbol, *start, *end, &mut store)
            .with_context(|| format!("Failed to load snapshots for {}", symbol))?;
        info!("{}: {} snapshots", symbol, count);
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} snapshots", store.len()));

    Ok(store)
}

fn report(result: &RunResult, output: Option<&Path>) -> Result<()> {
    println!("{}", SEPARATOR);
    print!("{}", result.summary());
    println!("{}", SEPARATOR);

    if let Some(path) = output {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(result)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Results written to {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("expiry_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data,
            output,
        } => {
            let loader = DataLoader::new(&data);
            let runner = prepare(&config, &loader)?;
            let store = load_store(&loader, runner.strategies())?;
            let result = runner.run(&store);
            report(&result, output.as_deref())?;
        }
        Commands::Scan {
            config,
            data,
            output,
        } => {
            let loader = DataLoader::new(&data);
            let runner = prepare(&config, &loader)?;
            let result = runner.scan();
            report(&result, output.as_deref())?;
        }
    }

    Ok(())
}
