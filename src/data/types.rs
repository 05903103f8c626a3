//! Core market data types.
//!
//! A [`MarketSnapshot`] is the option board for one underlying at one
//! intraday timestamp: the underlying price plus, for every listed
//! (expiry, option type), an ordered ladder of strikes.

use std::collections::{BTreeMap, HashMap};

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CE" | "CALL" => Some(Self::Call),
            "P" | "PE" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Suffix used in exchange trading symbols.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }
}

/// A single option quote at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Contract expiry date
    pub expiry: NaiveDate,

    /// Strike price
    pub strike: Decimal,

    /// Option type (call or put)
    pub option_type: OptionType,

    /// Last traded / bar close price
    pub price: Decimal,

    /// Traded volume in the bar
    pub volume: i64,

    /// Open interest
    pub open_interest: i64,
}

/// Strikes of one (expiry, option type), ordered by strike.
pub type StrikeLadder = BTreeMap<Decimal, OptionQuote>;

/// Option board for one underlying at one timestamp.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    /// Underlying symbol
    pub index: String,

    /// Trading date
    pub date: NaiveDate,

    /// Intraday timestamp of the snapshot
    pub time: NaiveTime,

    /// Underlying spot/futures price at `time`
    pub underlying_price: Decimal,

    /// Strike ladders keyed by expiry and side
    ladders: HashMap<(NaiveDate, OptionType), StrikeLadder>,
}

impl MarketSnapshot {
    /// Create a new empty snapshot.
    pub fn new(index: &str, date: NaiveDate, time: NaiveTime, underlying_price: Decimal) -> Self {
        Self {
            index: index.trim().to_uppercase(),
            date,
            time,
            underlying_price,
            ladders: HashMap::new(),
        }
    }

    /// Add a quote to the ladder of its expiry and side.
    ///
    /// A later quote for the same strike replaces the earlier one.
    pub fn add_quote(&mut self, quote: OptionQuote) {
        self.ladders
            .entry((quote.expiry, quote.option_type))
            .or_default()
            .insert(quote.strike, quote);
    }

    /// Ladder for an expiry and side, if any strikes were observed.
    pub fn ladder(&self, expiry: NaiveDate, option_type: OptionType) -> Option<&StrikeLadder> {
        self.ladders
            .get(&(expiry, option_type))
            .filter(|ladder| !ladder.is_empty())
    }

    /// Distinct expiries present in the snapshot.
    pub fn expiries(&self) -> Vec<NaiveDate> {
        let mut expiries: Vec<_> = self.ladders.keys().map(|(e, _)| *e).collect();
        expiries.sort();
        expiries.dedup();
        expiries
    }

    /// Total number of option quotes in this snapshot.
    pub fn total_quotes(&self) -> usize {
        self.ladders.values().map(|l| l.len()).sum()
    }
}

/// Point-in-time snapshot lookup.
///
/// Implementations are read-only; absence of data is `None`, never an error.
pub trait SnapshotSource {
    fn snapshot(&self, index: &str, date: NaiveDate, time: NaiveTime) -> Option<&MarketSnapshot>;
}

/// In-memory snapshot source keyed by (index, date, time).
#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    snapshots: HashMap<(String, NaiveDate, NaiveTime), MarketSnapshot>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, snapshot: MarketSnapshot) {
        let key = (snapshot.index.clone(), snapshot.date, snapshot.time);
        self.snapshots.insert(key, snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl Extend<MarketSnapshot> for SnapshotStore {
    fn extend<T: IntoIterator<Item = MarketSnapshot>>(&mut self, iter: T) {
        for snapshot in iter {
            self.insert(snapshot);
        }
    }
}

impl FromIterator<MarketSnapshot> for SnapshotStore {
    fn from_iter<T: IntoIterator<Item = MarketSnapshot>>(iter: T) -> Self {
        let mut store = Self::new();
        store.extend(iter);
        store
    }
}

impl SnapshotSource for SnapshotStore {
    fn snapshot(&self, index: &str, date: NaiveDate, time: NaiveTime) -> Option<&MarketSnapshot> {
        self.snapshots.get(&(index.to_string(), date, time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn quote(strike: Decimal, option_type: OptionType) -> OptionQuote {
        OptionQuote {
            expiry: NaiveDate::from_ymd_opt(2025, 6, 5).unwrap(),
            strike,
            option_type,
            price: dec!(100),
            volume: 10,
            open_interest: 1000,
        }
    }

    #[test]
    fn test_option_type_parsing() {
        assert_eq!(OptionType::from_str("CE"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("pe"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("call"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("PUT"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("X"), None);
    }

    #[test]
    fn test_snapshot_ladders() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let time = NaiveTime::from_hms_opt(9, 20, 0).unwrap();
        let mut snap = MarketSnapshot::new("nifty", date, time, dec!(24_730));
        snap.add_quote(quote(dec!(24_750), OptionType::Call));
        snap.add_quote(quote(dec!(24_700), OptionType::Call));
        snap.add_quote(quote(dec!(24_700), OptionType::Put));

        let expiry = NaiveDate::from_ymd_opt(2025, 6, 5).unwrap();
        let calls = snap.ladder(expiry, OptionType::Call).unwrap();
        let strikes: Vec<_> = calls.keys().copied().collect();
        assert_eq!(strikes, vec![dec!(24_700), dec!(24_750)]);
        assert_eq!(snap.expiries(), vec![expiry]);
        assert_eq!(snap.total_quotes(), 3);
        assert!(snap.ladder(date, OptionType::Call).is_none());
    }

    #[test]
    fn test_store_lookup() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let time = NaiveTime::from_hms_opt(9, 20, 0).unwrap();
        let store: SnapshotStore =
            std::iter::once(MarketSnapshot::new("NIFTY", date, time, dec!(24_730))).collect();
        assert_eq!(store.len(), 1);
        assert!(store.snapshot("NIFTY", date, time).is_some());
        assert!(store
            .snapshot("NIFTY", date, NaiveTime::from_hms_opt(9, 21, 0).unwrap())
            .is_none());
        assert!(store.snapshot("BANKNIFTY", date, time).is_none());
    }
}
