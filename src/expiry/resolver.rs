//! Expiry resolver.
//!
//! Maps (instrument, reference date) to the contract expiry that applies on
//! that date. Every returned expiry is a session of the supplied calendar;
//! `None` means the expiry cannot be determined from the loaded reference data.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::calendar::trading::last_day_of_month;
use crate::calendar::{Exchange, TradingCalendar};

use super::instrument::{ExpiryCycle, Instrument};

/// A (year, month) contract period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractMonth {
    pub year: i32,
    pub month: u32,
}

impl ContractMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Contract month containing a date.
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for ContractMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for ContractMonth {
    type Err = String;

    /// Parses `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (y, m) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {}", s))?;
        let year = y.parse::<i32>().map_err(|e| format!("bad year in {}: {}", s, e))?;
        let month = m.parse::<u32>().map_err(|e| format!("bad month in {}: {}", s, e))?;
        Self::new(year, month).ok_or_else(|| format!("month out of range in {}", s))
    }
}

/// Expiry reference data and resolution rules.
#[derive(Debug, Clone)]
pub struct ExpiryResolver {
    /// Weekly expiry weekday per exchange.
    weekly_days: HashMap<Exchange, Weekday>,
    /// Per-symbol weekly weekday overrides (e.g. BANKNIFTY on Wednesday).
    weekly_overrides: HashMap<String, Weekday>,
    /// Listed monthly expiries per symbol.
    monthly_expiries: HashMap<String, BTreeMap<ContractMonth, NaiveDate>>,
}

impl Default for ExpiryResolver {
    fn default() -> Self {
        let mut weekly_days = HashMap::new();
        weekly_days.insert(Exchange::Nse, Weekday::Thu);
        weekly_days.insert(Exchange::Bse, Weekday::Fri);
        Self {
            weekly_days,
            weekly_overrides: HashMap::new(),
            monthly_expiries: HashMap::new(),
        }
    }
}

impl ExpiryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weekly expiry weekday for an exchange.
    pub fn with_weekly_expiry(mut self, exchange: Exchange, weekday: Weekday) -> Self {
        self.weekly_days.insert(exchange, weekday);
        self
    }

    /// Override the weekly expiry weekday for one symbol.
    pub fn with_symbol_weekday(mut self, symbol: &str, weekday: Weekday) -> Self {
        self.weekly_overrides
            .insert(symbol.trim().to_uppercase(), weekday);
        self
    }

    /// Register a listed monthly expiry.
    ///
    /// Once a symbol has any listed expiry, months missing from its table
    /// resolve to `None` instead of falling back to the last session.
    pub fn with_monthly_expiry(mut self, symbol: &str, month: ContractMonth, expiry: NaiveDate) -> Self {
        self.monthly_expiries
            .entry(symbol.trim().to_uppercase())
            .or_default()
            .insert(month, expiry);
        self
    }

    /// Weekly expiry weekday in force for an instrument.
    pub fn weekday_for(&self, instrument: &Instrument) -> Weekday {
        self.weekly_overrides
            .get(instrument.symbol())
            .or_else(|| self.weekly_days.get(&instrument.exchange()))
            .copied()
            .unwrap_or(Weekday::Thu)
    }

    /// Expiry applicable to `date` for an instrument: the nearest contract
    /// expiring on or after `date`.
    ///
    /// Monthly contracts roll to the next month once the current month's
    /// expiry has passed, so every session belongs to exactly one cycle.
    pub fn resolve(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
        calendar: &TradingCalendar,
    ) -> Option<NaiveDate> {
        match instrument.cycle() {
            ExpiryCycle::Weekly => {
                resolve_weekly(self.weekday_for(instrument), date, calendar)
            }
            ExpiryCycle::Monthly => self.resolve_nth(instrument, date, 0, calendar),
        }
    }

    /// The `n`-th unexpired contract on `date` (0 = nearest).
    pub fn resolve_nth(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
        n: usize,
        calendar: &TradingCalendar,
    ) -> Option<NaiveDate> {
        match instrument.cycle() {
            ExpiryCycle::Weekly => {
                let weekday = self.weekday_for(instrument);
                let mut expiry = resolve_weekly(weekday, date, calendar)?;
                for _ in 0..n {
                    expiry = resolve_weekly(weekday, expiry.succ_opt()?, calendar)?;
                }
                Some(expiry)
            }
            ExpiryCycle::Monthly => {
                let symbol = instrument.symbol();
                let mut month = ContractMonth::of(date);
                let mut expiry = self.resolve_monthly(symbol, month, calendar)?;
                if expiry < date {
                    month = month.next();
                    expiry = self.resolve_monthly(symbol, month, calendar)?;
                }
                for _ in 0..n {
                    month = month.next();
                    expiry = self.resolve_monthly(symbol, month, calendar)?;
                }
                Some(expiry)
            }
        }
    }

    fn resolve_monthly(
        &self,
        symbol: &str,
        month: ContractMonth,
        calendar: &TradingCalendar,
    ) -> Option<NaiveDate> {
        match self.monthly_expiries.get(symbol) {
            Some(table) => {
                let listed = *table.get(&month)?;
                if listed > calendar.last() {
                    return None;
                }
                calendar.prev_on_or_before(listed)
            }
            None => {
                let month_end = last_day_of_month(month.year, month.month)?;
                if !calendar.spans_through(month_end) {
                    return None;
                }
                calendar.last_in_month(month.year, month.month)
            }
        }
    }
}

/// Nearest expiry weekday on/after `date`, snapped back over holidays.
fn resolve_weekly(weekday: Weekday, date: NaiveDate, calendar: &TradingCalendar) -> Option<NaiveDate> {
    let ahead = (7 + weekday.num_days_from_monday() as i64
        - date.weekday().num_days_from_monday() as i64)
        % 7;
    let mut theoretical = date + Duration::days(ahead);

    // Past the last session we cannot tell whether the weekday is a holiday
    while theoretical <= calendar.last() {
        if let Some(snapped) = calendar.prev_on_or_before(theoretical) {
            if snapped >= date {
                return Some(snapped);
            }
        }
        theoretical += Duration::days(7);
    }
    None
}
