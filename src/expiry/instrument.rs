//! Instrument reference data.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calendar::Exchange;

/// MCX commodities with monthly option expiries.
///
/// This is the only place the membership list lives; everything else asks
/// [`Instrument::cycle`].
pub const MCX_COMMODITIES: &[&str] = &[
    "CRUDEOIL",
    "CRUDEOILM",
    "NATURALGAS",
    "NATGASMINI",
    "GOLD",
    "GOLDM",
    "GOLDPETAL",
    "SILVER",
    "SILVERM",
    "SILVERMIC",
    "COPPER",
    "ZINC",
    "ALUMINIUM",
    "LEAD",
    "NICKEL",
    "MENTHAOIL",
    "COTTON",
];

/// Index options listed on BSE rather than NSE.
const BSE_INDICES: &[&str] = &["SENSEX", "BANKEX", "SENSEX50"];

/// Built-in strike intervals as (symbol, mantissa, scale).
const DEFAULT_STRIKE_STEPS: &[(&str, i64, u32)] = &[
    ("NIFTY", 50, 0),
    ("BANKNIFTY", 100, 0),
    ("FINNIFTY", 50, 0),
    ("MIDCPNIFTY", 25, 0),
    ("NIFTYNXT50", 100, 0),
    ("SENSEX", 100, 0),
    ("BANKEX", 100, 0),
    ("SENSEX50", 100, 0),
    ("CRUDEOIL", 50, 0),
    ("CRUDEOILM", 50, 0),
    ("NATURALGAS", 5, 0),
    ("NATGASMINI", 5, 0),
    ("GOLD", 100, 0),
    ("GOLDM", 100, 0),
    ("GOLDPETAL", 10, 0),
    ("SILVER", 250, 0),
    ("SILVERM", 250, 0),
    ("SILVERMIC", 250, 0),
    ("COPPER", 5, 0),
    ("ZINC", 25, 1),
    ("ALUMINIUM", 25, 1),
    ("LEAD", 25, 1),
    ("NICKEL", 10, 0),
    ("MENTHAOIL", 10, 0),
    ("COTTON", 100, 0),
];

/// How often an instrument's option contracts expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryCycle {
    Weekly,
    Monthly,
}

/// An optionable underlying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    symbol: String,
    exchange: Exchange,
    cycle: ExpiryCycle,
    strike_step: Decimal,
}

impl Instrument {
    /// Build an instrument using the built-in strike interval.
    ///
    /// Returns `None` when the symbol has no known interval; use
    /// [`Instrument::with_strike_step`] for those.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let symbol = normalize(symbol);
        let step = default_strike_step(&symbol)?;
        Some(Self::with_strike_step(&symbol, step))
    }

    /// Build an instrument with an explicit strike interval.
    pub fn with_strike_step(symbol: &str, strike_step: Decimal) -> Self {
        let symbol = normalize(symbol);
        let (exchange, cycle) = classify(&symbol);
        Self {
            symbol,
            exchange,
            cycle,
            strike_step,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn exchange(&self) -> Exchange {
        self.exchange
    }

    pub fn cycle(&self) -> ExpiryCycle {
        self.cycle
    }

    /// Distance between adjacent listed strikes.
    pub fn strike_step(&self) -> Decimal {
        self.strike_step
    }

    pub fn is_monthly(&self) -> bool {
        self.cycle == ExpiryCycle::Monthly
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Exchange and expiry cycle for a normalized symbol.
fn classify(symbol: &str) -> (Exchange, ExpiryCycle) {
    if MCX_COMMODITIES.contains(&symbol) {
        (Exchange::Mcx, ExpiryCycle::Monthly)
    } else if BSE_INDICES.contains(&symbol) {
        (Exchange::Bse, ExpiryCycle::Weekly)
    } else {
        (Exchange::Nse, ExpiryCycle::Weekly)
    }
}

/// Built-in strike interval for a normalized symbol.
pub fn default_strike_step(symbol: &str) -> Option<Decimal> {
    DEFAULT_STRIKE_STEPS
        .iter()
        .find(|(s, _, _)| *s == symbol)
        .map(|(_, mantissa, scale)| Decimal::new(*mantissa, *scale))
}
