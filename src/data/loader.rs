//! Data loader for intraday option parquet files.
//!
//! One file per underlying and year, laid out as
//! `{data_dir}/options/{SYMBOL}/{SYMBOL}_{YEAR}.parquet`, with one row per
//! option bar:
//! - trade_date, time, expiry (dates as `YYYY-MM-DD`, time as `HH:MM:SS`)
//! - strike, option_type (`CE`/`PE`)
//! - underlying, close, volume, open_interest

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveTime};
use polars::prelude::*;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{MarketSnapshot, OptionQuote, OptionType, SnapshotStore};

/// Expected columns in the parquet files.
pub const EXPECTED_COLUMNS: &[&str] = &[
    "trade_date",
    "time",
    "expiry",
    "strike",
    "option_type",
    "underlying",
    "close",
    "volume",
    "open_interest",
];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parquet data loader for intraday option bars.
pub struct DataLoader {
    data_dir: String,
}

impl DataLoader {
    /// Create a new data loader pointing to the data directory.
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
        }
    }

    /// Get the path to a symbol's parquet file for a given year.
    fn parquet_path(&self, symbol: &str, year: i32) -> String {
        format!(
            "{}/options/{}/{}_{}.parquet",
            self.data_dir, symbol, symbol, year
        )
    }

    /// List available years for a symbol.
    pub fn available_years(&self, symbol: &str) -> Result<Vec<i32>, LoaderError> {
        let dir_path = format!("{}/options/{}", self.data_dir, symbol);
        let path = Path::new(&dir_path);

        if !path.exists() {
            return Ok(vec![]);
        }

        let mut years = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            let year = name
                .strip_prefix(&format!("{}_", symbol))
                .and_then(|rest| rest.strip_suffix(".parquet"))
                .and_then(|y| y.parse::<i32>().ok());
            if let Some(year) = year {
                years.push(year);
            }
        }
        years.sort();
        Ok(years)
    }

    /// Load raw parquet data for a symbol and year as a LazyFrame.
    pub fn load_lazy(&self, symbol: &str, year: i32) -> Result<LazyFrame, LoaderError> {
        let path = self.parquet_path(symbol, year);
        if !Path::new(&path).exists() {
            return Err(LoaderError::FileNotFound(path));
        }
        let lf = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?;
        Ok(lf)
    }

    /// Lazily scan every year file covering `[start_date, end_date]`.
    fn scan_range(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<LazyFrame, LoaderError> {
        let mut frames = Vec::new();
        for year in start_date.year()..=end_date.year() {
            match self.load_lazy(symbol, year) {
                Ok(lf) => frames.push(lf),
                Err(LoaderError::FileNotFound(path)) => {
                    debug!("No data file {}", path);
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        if frames.is_empty() {
            return Err(LoaderError::InvalidData(format!(
                "No data found for {} between {} and {}",
                symbol, start_date, end_date
            )));
        }

        let combined = concat(&frames, UnionArgs::default())?;

        // Dates are stored as ISO strings so lexical order is date order
        Ok(combined.filter(
            col("trade_date")
                .gt_eq(lit(start_date.to_string()))
                .and(col("trade_date").lt_eq(lit(end_date.to_string()))),
        ))
    }

    /// Load all rows for a date range.
    pub fn load_date_range(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<DataFrame, LoaderError> {
        Ok(self.scan_range(symbol, start_date, end_date)?.collect()?)
    }

    /// Distinct trade dates observed for a symbol, sorted.
    pub fn trading_dates(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, LoaderError> {
        let df = self
            .scan_range(symbol, start_date, end_date)?
            .select([col("trade_date")])
            .collect()?;

        let dates_col = df.column("trade_date")?;
        let mut dates: Vec<NaiveDate> = (0..df.height())
            .filter_map(|idx| date_at(dates_col, idx))
            .collect();
        dates.sort();
        dates.dedup();

        Ok(dates)
    }

    /// Load snapshots for a date range, ordered by (date, time).
    pub fn load_snapshots(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<MarketSnapshot>, LoaderError> {
        let df = self.load_date_range(symbol, start_date, end_date)?;
        let snapshots = dataframe_to_snapshots(&df, symbol)?;
        info!(
            "Loaded {} snapshots ({} rows) for {} from {} to {}",
            snapshots.len(),
            df.height(),
            symbol,
            start_date,
            end_date
        );
        Ok(snapshots)
    }

    /// Load snapshots for a symbol straight into a store.
    pub fn load_store(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        store: &mut SnapshotStore,
    ) -> Result<usize, LoaderError> {
        let snapshots = self.load_snapshots(symbol, start_date, end_date)?;
        let count = snapshots.len();
        store.extend(snapshots);
        Ok(count)
    }
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719163)
}

/// Read a date cell stored either as an ISO string or a polars Date.
fn date_at(column: &Column, idx: usize) -> Option<NaiveDate> {
    if let Ok(s) = column.str() {
        s.get(idx)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    } else if let Ok(d) = column.date() {
        d.get(idx).and_then(date_from_days)
    } else {
        None
    }
}

fn time_at(column: &Column, idx: usize) -> Option<NaiveTime> {
    let s = column.str().ok()?.get(idx)?;
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

fn decimal_at(column: &Column, idx: usize) -> Option<Decimal> {
    let v = column.f64().ok()?.get(idx)?;
    Decimal::from_f64(v).map(|d| d.normalize())
}

fn int_at(column: &Column, idx: usize) -> i64 {
    column.i64().ok().and_then(|c| c.get(idx)).unwrap_or(0)
}

/// Group rows into one snapshot per (trade_date, time).
///
/// Rows with an unreadable date, time, expiry, strike or option type are
/// dropped and counted.
fn dataframe_to_snapshots(df: &DataFrame, symbol: &str) -> Result<Vec<MarketSnapshot>, LoaderError> {
    for name in EXPECTED_COLUMNS {
        if df.column(name).is_err() {
            return Err(LoaderError::InvalidData(format!(
                "{} data is missing column {}",
                symbol, name
            )));
        }
    }

    let date_col = df.column("trade_date")?;
    let time_col = df.column("time")?;
    let expiry_col = df.column("expiry")?;
    let strike_col = df.column("strike")?;
    let opt_type_col = df.column("option_type")?;
    let underlying_col = df.column("underlying")?;
    let close_col = df.column("close")?;
    let volume_col = df.column("volume")?;
    let oi_col = df.column("open_interest")?;

    let mut snapshots: BTreeMap<(NaiveDate, NaiveTime), MarketSnapshot> = BTreeMap::new();
    let mut dropped = 0usize;

    for idx in 0..df.height() {
        let (Some(date), Some(time), Some(expiry), Some(strike)) = (
            date_at(date_col, idx),
            time_at(time_col, idx),
            date_at(expiry_col, idx),
            decimal_at(strike_col, idx),
        ) else {
            dropped += 1;
            continue;
        };

        let Some(option_type) = opt_type_col
            .str()
            .ok()
            .and_then(|c| c.get(idx))
            .and_then(OptionType::from_str)
        else {
            dropped += 1;
            continue;
        };

        let underlying = decimal_at(underlying_col, idx).unwrap_or_default();
        let snapshot = snapshots
            .entry((date, time))
            .or_insert_with(|| MarketSnapshot::new(symbol, date, time, underlying));
        if snapshot.underlying_price.is_zero() {
            snapshot.underlying_price = underlying;
        }

        snapshot.add_quote(OptionQuote {
            expiry,
            strike,
            option_type,
            price: decimal_at(close_col, idx).unwrap_or_default(),
            volume: int_at(volume_col, idx),
            open_interest: int_at(oi_col, idx),
        });
    }

    if dropped > 0 {
        warn!("Dropped {} unreadable {} rows", dropped, symbol);
    }

    Ok(snapshots.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_date_from_days() {
        let date = date_from_days(18262);
        assert_eq!(date, NaiveDate::from_ymd_opt(2020, 1, 1));
    }

    #[test]
    fn test_parquet_path() {
        let loader = DataLoader::new("data");
        let path = loader.parquet_path("NIFTY", 2025);
        assert_eq!(path, "data/options/NIFTY/NIFTY_2025.parquet");
    }

    #[test]
    fn test_missing_directory_has_no_years() {
        let loader = DataLoader::new("does/not/exist");
        assert!(loader.available_years("NIFTY").unwrap().is_empty());
        assert!(matches!(
            loader.load_lazy("NIFTY", 2025),
            Err(LoaderError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_dataframe_to_snapshots_groups_by_timestamp() {
        let df = df!(
            "trade_date" => ["2025-06-02", "2025-06-02", "2025-06-02", "bad"],
            "time" => ["09:20:00", "09:20:00", "09:21:00", "09:20:00"],
            "expiry" => ["2025-06-05", "2025-06-05", "2025-06-05", "2025-06-05"],
            "strike" => [24700.0, 24750.0, 24700.0, 24700.0],
            "option_type" => ["CE", "PE", "CE", "CE"],
            "underlying" => [24731.5, 24731.5, 24740.0, 24731.5],
            "close" => [120.5, 98.0, 125.0, 1.0],
            "volume" => [10i64, 20, 30, 40],
            "open_interest" => [1000i64, 2000, 3000, 4000]
        )
        .unwrap();

        let snaps = dataframe_to_snapshots(&df, "NIFTY").unwrap();
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].time, NaiveTime::from_hms_opt(9, 20, 0).unwrap());
        assert_eq!(snaps[0].total_quotes(), 2);
        assert_eq!(snaps[0].underlying_price, dec!(24731.5));
        assert_eq!(snaps[1].underlying_price, dec!(24740));

        let expiry = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        let calls = snaps[0].ladder(expiry, OptionType::Call).unwrap();
        assert_eq!(calls.get(&dec!(24700)).unwrap().price, dec!(120.5));
    }

    #[test]
    fn test_missing_column_is_invalid_data() {
        let df = df!("trade_date" => ["2025-06-02"]).unwrap();
        assert!(matches!(
            dataframe_to_snapshots(&df, "NIFTY"),
            Err(LoaderError::InvalidData(_))
        ));
    }
}
