//! Strategy and leg definitions.
//!
//! Strategies are built once from configuration and validated up front, so
//! per-day evaluation never has to deal with a malformed definition.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::OptionType;
use crate::expiry::Instrument;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    #[error("Strategy {0} has no legs")]
    NoLegs(String),

    #[error("Strategy {name}: start date {start} is after end date {end}")]
    InvalidDateRange {
        name: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error("Invalid strike rule: {0}")]
    InvalidStrikeRule(String),

    #[error("Invalid expiry rule: {0}")]
    InvalidExpiryRule(String),
}

/// Strike selection relative to ATM, in strike steps.
///
/// Parsed from `ATM`, `ATM+N` or `ATM-N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StrikeRule {
    pub offset_steps: i32,
}

impl StrikeRule {
    pub fn atm() -> Self {
        Self { offset_steps: 0 }
    }

    pub fn offset(steps: i32) -> Self {
        Self { offset_steps: steps }
    }

    /// Raw target strike for a given ATM and strike step.
    pub fn target(&self, atm: Decimal, step: Decimal) -> Decimal {
        atm + step * Decimal::from(self.offset_steps)
    }
}

impl fmt::Display for StrikeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset_steps {
            0 => write!(f, "ATM"),
            n if n > 0 => write!(f, "ATM+{}", n),
            n => write!(f, "ATM{}", n),
        }
    }
}

impl FromStr for StrikeRule {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let upper = compact.to_uppercase();
        let rest = upper
            .strip_prefix("ATM")
            .ok_or_else(|| StrategyError::InvalidStrikeRule(s.to_string()))?;

        if rest.is_empty() {
            return Ok(Self::atm());
        }

        let (sign, digits) = if let Some(digits) = rest.strip_prefix('+') {
            (1, digits)
        } else if let Some(digits) = rest.strip_prefix('-') {
            (-1, digits)
        } else {
            return Err(StrategyError::InvalidStrikeRule(s.to_string()));
        };
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StrategyError::InvalidStrikeRule(s.to_string()));
        }
        let steps = digits
            .parse::<i32>()
            .map_err(|_| StrategyError::InvalidStrikeRule(s.to_string()))?;
        Ok(Self::offset(sign * steps))
    }
}

/// Which contract a leg trades, relative to the trading date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryRule {
    /// Nearest unexpired contract.
    #[default]
    Current,
    /// The contract after the nearest one.
    Next,
}

impl ExpiryRule {
    /// Position among unexpired contracts (0 = nearest).
    pub fn index(&self) -> usize {
        match self {
            Self::Current => 0,
            Self::Next => 1,
        }
    }
}

impl FromStr for ExpiryRule {
    type Err = StrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "current" | "current_week" | "current_month" | "near" => Ok(Self::Current),
            "next" | "next_week" | "next_month" | "far" => Ok(Self::Next),
            _ => Err(StrategyError::InvalidExpiryRule(s.to_string())),
        }
    }
}

/// One option position definition within a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leg {
    pub name: String,
    pub option_type: OptionType,
    pub strike: StrikeRule,
    pub expiry: ExpiryRule,
}

impl Leg {
    pub fn new(name: &str, option_type: OptionType, strike: StrikeRule, expiry: ExpiryRule) -> Self {
        Self {
            name: name.to_string(),
            option_type,
            strike,
            expiry,
        }
    }
}

/// A configured strategy. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    name: String,
    instrument: Instrument,
    dte: Option<u32>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    entry_time: NaiveTime,
    legs: Vec<Leg>,
}

impl Strategy {
    /// Validate and build a strategy.
    pub fn new(
        name: &str,
        instrument: Instrument,
        dte: Option<u32>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        entry_time: NaiveTime,
        legs: Vec<Leg>,
    ) -> Result<Self, StrategyError> {
        if legs.is_empty() {
            return Err(StrategyError::NoLegs(name.to_string()));
        }
        if start_date > end_date {
            return Err(StrategyError::InvalidDateRange {
                name: name.to_string(),
                start: start_date,
                end: end_date,
            });
        }

        Ok(Self {
            name: name.to_string(),
            instrument,
            dte,
            start_date,
            end_date,
            entry_time,
            legs,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Configured days-to-expiry; `None` evaluates every day.
    pub fn dte(&self) -> Option<u32> {
        self.dte
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    /// Time of day at which legs are priced.
    pub fn entry_time(&self) -> NaiveTime {
        self.entry_time
    }

    pub fn legs(&self) -> &[Leg] {
        &self.legs
    }
}
