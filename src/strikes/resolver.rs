//! Strike resolver.
//!
//! Turns a raw target strike (usually ATM plus an offset) into a strike that
//! is actually listed in the snapshot for the requested expiry and side.
//!
//! Rules:
//! - Timestamps before the exchange's market open are unavailable without
//!   touching the data source
//! - An exact listed strike is returned unchanged
//! - Otherwise the closest listed strike wins; equal distance picks the lower
//!   strike
//! - Missing snapshots or ladders are `NoData`, never an error

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::calendar::Exchange;
use crate::data::{OptionQuote, OptionType, SnapshotSource, StrikeLadder};
use crate::expiry::Instrument;

/// Why a strike could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrikeUnavailable {
    /// Requested timestamp predates the exchange open.
    BeforeMarketOpen,
    /// No snapshot, ladder or underlying price for the key.
    NoData,
}

/// A strike that exists in the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedStrike {
    /// Strike that was asked for.
    pub requested: Decimal,
    /// Listed strike that was found.
    pub strike: Decimal,
    /// Whether `strike == requested`.
    pub exact: bool,
    /// Quote at the resolved strike.
    pub quote: OptionQuote,
}

/// Market-open time per exchange.
#[derive(Debug, Clone)]
pub struct MarketSessions {
    opens: HashMap<Exchange, NaiveTime>,
}

impl Default for MarketSessions {
    fn default() -> Self {
        let mut opens = HashMap::new();
        if let Some(t) = NaiveTime::from_hms_opt(9, 15, 0) {
            opens.insert(Exchange::Nse, t);
            opens.insert(Exchange::Bse, t);
        }
        if let Some(t) = NaiveTime::from_hms_opt(9, 0, 0) {
            opens.insert(Exchange::Mcx, t);
        }
        Self { opens }
    }
}

impl MarketSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_open(mut self, exchange: Exchange, open: NaiveTime) -> Self {
        self.opens.insert(exchange, open);
        self
    }

    /// Market open for an exchange (midnight if unconfigured).
    pub fn market_open(&self, exchange: Exchange) -> NaiveTime {
        self.opens.get(&exchange).copied().unwrap_or(NaiveTime::MIN)
    }

    pub fn is_before_open(&self, exchange: Exchange, time: NaiveTime) -> bool {
        time < self.market_open(exchange)
    }
}

/// Resolves strikes against a snapshot source.
pub struct StrikeResolver<'a, S: SnapshotSource + ?Sized> {
    source: &'a S,
    sessions: &'a MarketSessions,
}

impl<'a, S: SnapshotSource + ?Sized> StrikeResolver<'a, S> {
    pub fn new(source: &'a S, sessions: &'a MarketSessions) -> Self {
        Self { source, sessions }
    }

    /// Nearest listed strike to `raw_target` for (instrument, date, time,
    /// expiry, option type).
    pub fn resolve_strike(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
        time: NaiveTime,
        expiry: NaiveDate,
        raw_target: Decimal,
        option_type: OptionType,
    ) -> Result<ResolvedStrike, StrikeUnavailable> {
        if self.sessions.is_before_open(instrument.exchange(), time) {
            return Err(StrikeUnavailable::BeforeMarketOpen);
        }

        let snapshot = self
            .source
            .snapshot(instrument.symbol(), date, time)
            .ok_or(StrikeUnavailable::NoData)?;
        let ladder = snapshot
            .ladder(expiry, option_type)
            .ok_or(StrikeUnavailable::NoData)?;
        let (strike, quote) = nearest_strike(ladder, raw_target).ok_or(StrikeUnavailable::NoData)?;

        Ok(ResolvedStrike {
            requested: raw_target,
            strike,
            exact: strike == raw_target,
            quote: quote.clone(),
        })
    }

    /// At-the-money strike implied by the snapshot's underlying price,
    /// rounded to the instrument's strike step.
    pub fn atm_strike(
        &self,
        instrument: &Instrument,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Decimal, StrikeUnavailable> {
        if self.sessions.is_before_open(instrument.exchange(), time) {
            return Err(StrikeUnavailable::BeforeMarketOpen);
        }

        let snapshot = self
            .source
            .snapshot(instrument.symbol(), date, time)
            .ok_or(StrikeUnavailable::NoData)?;
        if snapshot.underlying_price <= Decimal::ZERO {
            return Err(StrikeUnavailable::NoData);
        }

        Ok(round_to_step(snapshot.underlying_price, instrument.strike_step()))
    }
}

/// Closest strike in a ladder; ties go to the lower strike.
pub fn nearest_strike(ladder: &StrikeLadder, target: Decimal) -> Option<(Decimal, &OptionQuote)> {
    let below = ladder.range(..=target).next_back();
    let above = ladder.range(target..).next();

    match (below, above) {
        (Some((b, bq)), Some((a, aq))) => {
            if *a - target < target - *b {
                Some((*a, aq))
            } else {
                Some((*b, bq))
            }
        }
        (Some((b, bq)), None) => Some((*b, bq)),
        (None, Some((a, aq))) => Some((*a, aq)),
        (None, None) => None,
    }
}

/// Round a price to the nearest multiple of `step`, midpoints going down.
pub fn round_to_step(price: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return price;
    }
    (price / step).round_dp_with_strategy(0, RoundingStrategy::MidpointTowardZero) * step
}
