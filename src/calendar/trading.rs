//! Trading calendar for a single exchange.
//!
//! Built once from historical session dates (usually the distinct trade dates
//! found in the option data) and shared read-only across evaluations.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exchange a calendar (and an instrument) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Exchange {
    /// National Stock Exchange (index and equity derivatives).
    Nse,
    /// Bombay Stock Exchange.
    Bse,
    /// Multi Commodity Exchange.
    Mcx,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nse => "NSE",
            Self::Bse => "BSE",
            Self::Mcx => "MCX",
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NSE" => Ok(Self::Nse),
            "BSE" => Ok(Self::Bse),
            "MCX" => Ok(Self::Mcx),
            other => Err(format!("unknown exchange: {}", other)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Trading calendar for {0} has no dates")]
    Empty(Exchange),

    #[error("Date not found in trading calendar: {0}")]
    DateNotFound(NaiveDate),

    #[error("Calendar index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered, deduplicated trading sessions of one exchange.
#[derive(Debug, Clone)]
pub struct TradingCalendar {
    exchange: Exchange,
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build a calendar from session dates in any order.
    ///
    /// Duplicates are dropped. An empty input is rejected since nothing
    /// downstream can be evaluated against it.
    pub fn new<I>(exchange: Exchange, dates: I) -> Result<Self, CalendarError>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut dates: Vec<NaiveDate> = dates.into_iter().collect();
        dates.sort();
        dates.dedup();

        if dates.is_empty() {
            return Err(CalendarError::Empty(exchange));
        }

        Ok(Self { exchange, dates })
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// All sessions in order.
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn first(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Whether `date` lies within the loaded span (not necessarily a session).
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.first() && date <= self.last()
    }

    /// Whether every weekday up to `date` is known: `date` is inside the
    /// span, or only weekend days fall between the last session and `date`.
    pub fn spans_through(&self, date: NaiveDate) -> bool {
        let last = self.last();
        date <= last
            || last
                .iter_days()
                .skip(1)
                .take_while(|d| *d <= date)
                .all(|d| matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.binary_search(&date).is_ok()
    }

    /// Index of a session date.
    pub fn position_of(&self, date: NaiveDate) -> Result<usize, CalendarError> {
        self.dates
            .binary_search(&date)
            .map_err(|_| CalendarError::DateNotFound(date))
    }

    /// Session date at an index.
    pub fn date_at(&self, index: usize) -> Result<NaiveDate, CalendarError> {
        self.dates
            .get(index)
            .copied()
            .ok_or(CalendarError::IndexOutOfRange {
                index,
                len: self.dates.len(),
            })
    }

    /// First session on or after `date`.
    pub fn next_on_or_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.dates.partition_point(|d| *d < date);
        self.dates.get(idx).copied()
    }

    /// Last session on or before `date`.
    pub fn prev_on_or_before(&self, date: NaiveDate) -> Option<NaiveDate> {
        let idx = self.dates.partition_point(|d| *d <= date);
        if idx == 0 {
            None
        } else {
            Some(self.dates[idx - 1])
        }
    }

    /// Last session of a calendar month, if the month has any sessions.
    pub fn last_in_month(&self, year: i32, month: u32) -> Option<NaiveDate> {
        let month_end = last_day_of_month(year, month)?;
        self.prev_on_or_before(month_end)
            .filter(|d| d.year() == year && d.month() == month)
    }

    /// Sessions within `[start, end]`.
    pub fn range(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        if start > end {
            return &[];
        }
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        &self.dates[lo..hi]
    }

    /// Signed number of sessions from `from` to `to`. Both must be sessions.
    pub fn sessions_between(&self, from: NaiveDate, to: NaiveDate) -> Result<i64, CalendarError> {
        let a = self.position_of(from)? as i64;
        let b = self.position_of(to)? as i64;
        Ok(b - a)
    }
}

/// Last calendar day of a month.
pub(crate) fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    first_of_next.pred_opt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    /// Weekday sessions between two dates, minus the given holidays.
    pub(crate) fn weekday_calendar(
        exchange: Exchange,
        start: NaiveDate,
        end: NaiveDate,
        holidays: &[NaiveDate],
    ) -> TradingCalendar {
        let dates = start
            .iter_days()
            .take_while(|x| *x <= end)
            .filter(|x| !matches!(x.weekday(), Weekday::Sat | Weekday::Sun))
            .filter(|x| !holidays.contains(x));
        TradingCalendar::new(exchange, dates).unwrap()
    }

    #[test]
    fn test_new_sorts_and_dedups() {
        let cal = TradingCalendar::new(
            Exchange::Nse,
            vec![d(2025, 6, 3), d(2025, 6, 2), d(2025, 6, 3), d(2025, 6, 4)],
        )
        .unwrap();
        assert_eq!(cal.dates(), &[d(2025, 6, 2), d(2025, 6, 3), d(2025, 6, 4)]);
        assert_eq!(cal.exchange(), Exchange::Nse);
    }

    #[test]
    fn test_empty_calendar_rejected() {
        let err = TradingCalendar::new(Exchange::Mcx, Vec::new()).unwrap_err();
        assert_eq!(err, CalendarError::Empty(Exchange::Mcx));
    }

    #[test]
    fn test_position_lookup() {
        let cal = weekday_calendar(Exchange::Nse, d(2025, 6, 2), d(2025, 6, 30), &[]);
        assert_eq!(cal.position_of(d(2025, 6, 2)), Ok(0));
        assert_eq!(cal.position_of(d(2025, 6, 9)), Ok(5));
        assert_eq!(cal.date_at(5), Ok(d(2025, 6, 9)));
    }

    #[test]
    fn test_lookup_outside_range_fails() {
        let cal = weekday_calendar(Exchange::Nse, d(2025, 6, 2), d(2025, 6, 30), &[]);
        assert_eq!(
            cal.position_of(d(2025, 7, 1)),
            Err(CalendarError::DateNotFound(d(2025, 7, 1)))
        );
        assert_eq!(
            cal.position_of(d(2025, 5, 30)),
            Err(CalendarError::DateNotFound(d(2025, 5, 30)))
        );
        // Weekend inside the span is not a session either
        assert_eq!(
            cal.position_of(d(2025, 6, 7)),
            Err(CalendarError::DateNotFound(d(2025, 6, 7)))
        );
        assert_eq!(
            cal.date_at(cal.len()),
            Err(CalendarError::IndexOutOfRange {
                index: cal.len(),
                len: cal.len()
            })
        );
    }

    #[test]
    fn test_neighbour_queries() {
        let holiday = d(2025, 6, 12);
        let cal = weekday_calendar(Exchange::Nse, d(2025, 6, 2), d(2025, 6, 30), &[holiday]);
        assert_eq!(cal.prev_on_or_before(holiday), Some(d(2025, 6, 11)));
        assert_eq!(cal.next_on_or_after(holiday), Some(d(2025, 6, 13)));
        assert_eq!(cal.prev_on_or_before(d(2025, 6, 8)), Some(d(2025, 6, 6)));
        assert_eq!(cal.prev_on_or_before(d(2025, 6, 1)), None);
        assert_eq!(cal.next_on_or_after(d(2025, 7, 1)), None);
    }

    #[test]
    fn test_last_in_month() {
        let cal = weekday_calendar(Exchange::Mcx, d(2025, 5, 1), d(2025, 7, 31), &[]);
        // May 31 2025 is a Saturday
        assert_eq!(cal.last_in_month(2025, 5), Some(d(2025, 5, 30)));
        assert_eq!(cal.last_in_month(2025, 6), Some(d(2025, 6, 30)));
        assert_eq!(cal.last_in_month(2025, 8), None);
    }

    #[test]
    fn test_covers_and_spans_through() {
        // Fri 30-May to Fri 27-Jun
        let cal = weekday_calendar(Exchange::Mcx, d(2025, 5, 30), d(2025, 6, 27), &[]);
        assert!(cal.covers(d(2025, 6, 7)));
        assert!(!cal.covers(d(2025, 5, 29)));
        assert!(!cal.covers(d(2025, 6, 28)));

        assert!(cal.spans_through(d(2025, 6, 20)));
        assert!(cal.spans_through(d(2025, 6, 29)));
        assert!(!cal.spans_through(d(2025, 6, 30)));
    }

    #[test]
    fn test_range_and_sessions_between() {
        let cal = weekday_calendar(Exchange::Nse, d(2025, 6, 2), d(2025, 6, 30), &[]);
        let week = cal.range(d(2025, 6, 7), d(2025, 6, 13));
        assert_eq!(week.len(), 5);
        assert_eq!(week[0], d(2025, 6, 9));
        assert!(cal.range(d(2025, 6, 13), d(2025, 6, 9)).is_empty());
        assert_eq!(cal.sessions_between(d(2025, 6, 2), d(2025, 6, 16)), Ok(10));
        assert_eq!(cal.sessions_between(d(2025, 6, 16), d(2025, 6, 2)), Ok(-10));
    }

    #[test]
    fn test_exchange_parsing() {
        assert_eq!("mcx".parse::<Exchange>(), Ok(Exchange::Mcx));
        assert_eq!("NSE".parse::<Exchange>(), Ok(Exchange::Nse));
        assert!("LSE".parse::<Exchange>().is_err());
    }
}
