//! Leg evaluator.
//!
//! Materializes each leg of a fired strategy into a concrete contract
//! (expiry, strike, option type) or an explicit skip with a reason. Missing
//! data is never an error at this level.

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::calendar::TradingCalendar;
use crate::data::{OptionType, SnapshotSource};
use crate::expiry::ExpiryResolver;
use crate::strikes::{StrikeResolver, StrikeUnavailable};

use super::types::{Leg, Strategy};

/// Why a leg was not materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    NoExpiry,
    NoStrikeData,
    BeforeMarketOpen,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoExpiry => "no_expiry",
            Self::NoStrikeData => "no_strike_data",
            Self::BeforeMarketOpen => "before_market_open",
        }
    }
}

impl From<StrikeUnavailable> for SkipReason {
    fn from(reason: StrikeUnavailable) -> Self {
        match reason {
            StrikeUnavailable::BeforeMarketOpen => Self::BeforeMarketOpen,
            StrikeUnavailable::NoData => Self::NoStrikeData,
        }
    }
}

/// A tradeable leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLeg {
    pub leg: String,
    pub option_type: OptionType,
    pub expiry: NaiveDate,
    pub strike: Decimal,
    /// Strike implied by the leg's rule before snapping to a listed strike.
    pub requested_strike: Decimal,
    pub exact: bool,
    /// Quote price at the entry time.
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LegResult {
    Resolved(ResolvedLeg),
    Skipped { leg: String, reason: SkipReason },
}

impl LegResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped { reason, .. } => Some(*reason),
            Self::Resolved(_) => None,
        }
    }

    fn skipped(leg: &Leg, reason: SkipReason) -> Self {
        Self::Skipped {
            leg: leg.name.clone(),
            reason,
        }
    }
}

/// Everything a leg needs from the strategy and trading date.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub strategy: &'a Strategy,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub calendar: &'a TradingCalendar,
    pub expiries: &'a ExpiryResolver,
}

impl<'a> StrategyContext<'a> {
    /// Context at the strategy's entry time.
    pub fn at_entry(
        strategy: &'a Strategy,
        date: NaiveDate,
        calendar: &'a TradingCalendar,
        expiries: &'a ExpiryResolver,
    ) -> Self {
        Self {
            strategy,
            date,
            time: strategy.entry_time(),
            calendar,
            expiries,
        }
    }
}

/// Resolve one leg to a concrete contract or a skip.
pub fn evaluate_leg<S: SnapshotSource + ?Sized>(
    leg: &Leg,
    ctx: &StrategyContext<'_>,
    strikes: &StrikeResolver<'_, S>,
) -> LegResult {
    let instrument = ctx.strategy.instrument();

    let Some(expiry) = ctx
        .expiries
        .resolve_nth(instrument, ctx.date, leg.expiry.index(), ctx.calendar)
    else {
        return LegResult::skipped(leg, SkipReason::NoExpiry);
    };

    let atm = match strikes.atm_strike(instrument, ctx.date, ctx.time) {
        Ok(atm) => atm,
        Err(reason) => return LegResult::skipped(leg, reason.into()),
    };
    let target = leg.strike.target(atm, instrument.strike_step());

    match strikes.resolve_strike(instrument, ctx.date, ctx.time, expiry, target, leg.option_type) {
        Ok(resolved) => LegResult::Resolved(ResolvedLeg {
            leg: leg.name.clone(),
            option_type: leg.option_type,
            expiry,
            strike: resolved.strike,
            requested_strike: resolved.requested,
            exact: resolved.exact,
            price: resolved.quote.price,
        }),
        Err(reason) => LegResult::skipped(leg, reason.into()),
    }
}

/// Evaluate every leg of the context's strategy, in definition order.
pub fn evaluate_legs<S: SnapshotSource + ?Sized>(
    ctx: &StrategyContext<'_>,
    strikes: &StrikeResolver<'_, S>,
) -> Vec<LegResult> {
    ctx.strategy
        .legs()
        .iter()
        .map(|leg| evaluate_leg(leg, ctx, strikes))
        .collect()
}
