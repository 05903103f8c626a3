//! TOML configuration.
//!
//! Everything the core needs (sessions, expiry reference data, strike steps
//! and enabled strategies) is resolved here, before any evaluation runs. A
//! malformed file fails the whole load.
//!
//! ```toml
//! [sessions]
//! mcx = "09:00"
//!
//! [weekly_expiry]
//! nse = "Thu"
//! overrides = { BANKNIFTY = "Wed" }
//!
//! [monthly_expiries.CRUDEOIL]
//! "2025-06" = "2025-06-16"
//!
//! [strike_steps]
//! CRUDEOIL = 50
//!
//! [[strategies]]
//! name = "crude_monthly"
//! instrument = "CRUDEOIL"
//! dte = 10
//! start_date = "2025-06-01"
//! end_date = "2025-06-30"
//! entry_time = "10:00"
//!
//! [[strategies.legs]]
//! name = "ce"
//! option_type = "CE"
//! strike = "ATM+1"
//! expiry = "current"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{NaiveDate, NaiveTime, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::calendar::Exchange;
use crate::data::OptionType;
use crate::expiry::{instrument::default_strike_step, ContractMonth, ExpiryResolver, Instrument};
use crate::strategy::{ExpiryRule, Leg, Strategy, StrikeRule};
use crate::strikes::MarketSessions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Strategy {name}: {reason}")]
    InvalidStrategy { name: String, reason: String },

    #[error("Invalid {field}: {value}")]
    InvalidRule { field: String, value: String },

    #[error("Invalid contract month for {symbol}: {reason}")]
    InvalidContractMonth { symbol: String, reason: String },

    #[error("No trading calendar loaded for exchange {0}")]
    MissingCalendar(Exchange),

    #[error("No strike step known for {0}; add it under [strike_steps]")]
    UnknownStrikeStep(String),
}

/// Market-open overrides, `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub nse: Option<String>,
    pub bse: Option<String>,
    pub mcx: Option<String>,
}

/// Weekly expiry weekdays (`Mon`..`Sun`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyExpirySettings {
    pub nse: Option<String>,
    pub bse: Option<String>,
    pub mcx: Option<String>,
    /// Per-symbol weekday overrides.
    pub overrides: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegSettings {
    pub name: Option<String>,
    pub option_type: String,
    #[serde(default = "default_strike")]
    pub strike: String,
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_strike() -> String {
    "ATM".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySettings {
    pub name: String,
    pub instrument: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Days to expiry; omit to evaluate every day.
    #[serde(default)]
    pub dte: Option<u32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub entry_time: String,
    pub legs: Vec<LegSettings>,
}

fn default_true() -> bool {
    true
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    pub sessions: SessionSettings,
    pub weekly_expiry: WeeklyExpirySettings,
    /// Listed monthly expiries: symbol -> `YYYY-MM` -> expiry date.
    pub monthly_expiries: HashMap<String, BTreeMap<String, NaiveDate>>,
    /// Strike step overrides per symbol.
    pub strike_steps: HashMap<String, Decimal>,
    pub strategies: Vec<StrategySettings>,
}

impl BacktestSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let settings = Self::from_toml_str(&contents)?;
        info!(
            "Loaded config {} ({} strategies)",
            path.display(),
            settings.strategies.len()
        );
        Ok(settings)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Market-open times with configured overrides applied.
    pub fn market_sessions(&self) -> Result<MarketSessions, ConfigError> {
        let mut sessions = MarketSessions::default();
        for (exchange, value) in per_exchange(&self.sessions.nse, &self.sessions.bse, &self.sessions.mcx) {
            sessions = sessions.with_open(exchange, parse_time("session open", value)?);
        }
        Ok(sessions)
    }

    /// Expiry resolver seeded with weekly weekdays and listed monthly expiries.
    pub fn expiry_resolver(&self) -> Result<ExpiryResolver, ConfigError> {
        let weekly = &self.weekly_expiry;
        let mut resolver = ExpiryResolver::new();

        for (exchange, value) in per_exchange(&weekly.nse, &weekly.bse, &weekly.mcx) {
            resolver = resolver.with_weekly_expiry(exchange, parse_weekday(value)?);
        }
        for (symbol, value) in &weekly.overrides {
            resolver = resolver.with_symbol_weekday(symbol, parse_weekday(value)?);
        }

        for (symbol, table) in &self.monthly_expiries {
            for (month, expiry) in table {
                let month = month
                    .parse::<ContractMonth>()
                    .map_err(|reason| ConfigError::InvalidContractMonth {
                        symbol: symbol.clone(),
                        reason,
                    })?;
                if ContractMonth::of(*expiry) != month {
                    return Err(ConfigError::InvalidContractMonth {
                        symbol: symbol.clone(),
                        reason: format!("expiry {} is outside contract month {}", expiry, month),
                    });
                }
                resolver = resolver.with_monthly_expiry(symbol, month, *expiry);
            }
        }

        Ok(resolver)
    }

    /// Instrument for a symbol, using `[strike_steps]` before the built-in table.
    pub fn instrument(&self, symbol: &str) -> Result<Instrument, ConfigError> {
        let symbol = symbol.trim().to_uppercase();
        let configured = self
            .strike_steps
            .iter()
            .find(|(s, _)| s.trim().eq_ignore_ascii_case(&symbol))
            .map(|(_, step)| *step);

        match configured.or_else(|| default_strike_step(&symbol)) {
            Some(step) if step > Decimal::ZERO => Ok(Instrument::with_strike_step(&symbol, step)),
            Some(step) => Err(ConfigError::InvalidRule {
                field: format!("strike step for {}", symbol),
                value: step.to_string(),
            }),
            None => Err(ConfigError::UnknownStrikeStep(symbol)),
        }
    }

    /// Build every enabled strategy. Disabled entries are dropped.
    pub fn strategies(&self) -> Result<Vec<Strategy>, ConfigError> {
        let mut strategies = Vec::new();
        for settings in &self.strategies {
            if !settings.enabled {
                debug!("Skipping disabled strategy {}", settings.name);
                continue;
            }
            strategies.push(self.build_strategy(settings)?);
        }
        Ok(strategies)
    }

    fn build_strategy(&self, settings: &StrategySettings) -> Result<Strategy, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidStrategy {
            name: settings.name.clone(),
            reason,
        };

        let instrument = self.instrument(&settings.instrument)?;
        let entry_time = parse_time("entry_time", &settings.entry_time).map_err(|e| invalid(e.to_string()))?;

        let mut legs = Vec::with_capacity(settings.legs.len());
        for (i, leg) in settings.legs.iter().enumerate() {
            let option_type = OptionType::from_str(&leg.option_type)
                .ok_or_else(|| invalid(format!("unknown option type {}", leg.option_type)))?;
            let strike = leg
                .strike
                .parse::<StrikeRule>()
                .map_err(|e| invalid(e.to_string()))?;
            let expiry = match &leg.expiry {
                Some(rule) => rule.parse::<ExpiryRule>().map_err(|e| invalid(e.to_string()))?,
                None => ExpiryRule::default(),
            };
            let name = leg
                .name
                .clone()
                .unwrap_or_else(|| format!("leg{}", i + 1));
            legs.push(Leg::new(&name, option_type, strike, expiry));
        }

        Strategy::new(
            &settings.name,
            instrument,
            settings.dte,
            settings.start_date,
            settings.end_date,
            entry_time,
            legs,
        )
        .map_err(|e| invalid(e.to_string()))
    }
}

fn per_exchange<'a>(
    nse: &'a Option<String>,
    bse: &'a Option<String>,
    mcx: &'a Option<String>,
) -> impl Iterator<Item = (Exchange, &'a str)> {
    [(Exchange::Nse, nse), (Exchange::Bse, bse), (Exchange::Mcx, mcx)]
        .into_iter()
        .filter_map(|(exchange, value)| value.as_deref().map(|v| (exchange, v)))
}

fn parse_time(field: &str, value: &str) -> Result<NaiveTime, ConfigError> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| ConfigError::InvalidRule {
            field: field.to_string(),
            value: value.to_string(),
        })
}

fn parse_weekday(value: &str) -> Result<Weekday, ConfigError> {
    value.trim().parse::<Weekday>().map_err(|_| ConfigError::InvalidRule {
        field: "weekday".to_string(),
        value: value.to_string(),
    })
}
