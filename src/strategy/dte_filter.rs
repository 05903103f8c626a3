//! Days-to-expiry day filter.
//!
//! Decides whether a strategy is evaluated on a given trading date:
//! 1. No DTE configured -> every day
//! 2. Expiry cannot be resolved -> skip the day
//! 3. Monthly instrument with DTE >= 30 -> every day
//! 4. Otherwise fire only when the trading-day distance to expiry equals the
//!    configured DTE exactly

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calendar::{CalendarError, TradingCalendar};
use crate::expiry::{ExpiryCycle, ExpiryResolver};

use super::types::Strategy;

/// Monthly-cycle DTE at or above which every day is included.
pub const MONTHLY_ALL_DAYS_DTE: u32 = 30;

/// Outcome of the DTE filter for one (strategy, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DteDecision {
    /// Strategy has no DTE filter.
    NoFilter,
    /// Monthly instrument in all-days mode.
    AllDays { expiry: NaiveDate },
    /// Distance to expiry equals the configured DTE.
    Match { expiry: NaiveDate, actual_dte: i64 },
    /// Distance to expiry differs from the configured DTE.
    Mismatch { expiry: NaiveDate, actual_dte: i64 },
    /// Expiry could not be resolved for this date.
    NoExpiry,
    /// A date needed for the distance is not a calendar session.
    DateNotFound { date: NaiveDate },
}

impl DteDecision {
    pub fn should_evaluate(&self) -> bool {
        matches!(self, Self::NoFilter | Self::AllDays { .. } | Self::Match { .. })
    }

    /// Whether the day was dropped for missing reference data rather than
    /// by the filter itself.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::NoExpiry | Self::DateNotFound { .. })
    }

    /// Resolved expiry, when one was computed.
    pub fn expiry(&self) -> Option<NaiveDate> {
        match self {
            Self::AllDays { expiry } | Self::Match { expiry, .. } | Self::Mismatch { expiry, .. } => {
                Some(*expiry)
            }
            _ => None,
        }
    }
}

/// Trading-day distance from `date` to `expiry`.
pub fn actual_dte(
    calendar: &TradingCalendar,
    date: NaiveDate,
    expiry: NaiveDate,
) -> Result<i64, CalendarError> {
    calendar.sessions_between(date, expiry)
}

/// Run the DTE filter and report why.
pub fn decide(
    strategy: &Strategy,
    date: NaiveDate,
    calendar: &TradingCalendar,
    resolver: &ExpiryResolver,
) -> DteDecision {
    let Some(dte) = strategy.dte() else {
        return DteDecision::NoFilter;
    };

    let instrument = strategy.instrument();
    let Some(expiry) = resolver.resolve(instrument, date, calendar) else {
        return DteDecision::NoExpiry;
    };

    if instrument.cycle() == ExpiryCycle::Monthly && dte >= MONTHLY_ALL_DAYS_DTE {
        return DteDecision::AllDays { expiry };
    }

    match actual_dte(calendar, date, expiry) {
        Ok(actual_dte) if actual_dte == i64::from(dte) => DteDecision::Match { expiry, actual_dte },
        Ok(actual_dte) => DteDecision::Mismatch { expiry, actual_dte },
        Err(CalendarError::DateNotFound(missing)) => DteDecision::DateNotFound { date: missing },
        Err(_) => DteDecision::DateNotFound { date },
    }
}

/// Whether the strategy should be evaluated on `date`.
pub fn should_evaluate(
    strategy: &Strategy,
    date: NaiveDate,
    calendar: &TradingCalendar,
    resolver: &ExpiryResolver,
) -> bool {
    decide(strategy, date, calendar, resolver).should_evaluate()
}
