//! Strategy runner.
//!
//! For every configured strategy and every trading date in its range:
//! 1. Run the DTE filter
//! 2. On fired days, evaluate each leg at the strategy's entry time
//! 3. Record the outcome and roll it into the strategy's summary
//!
//! (strategy, date) pairs are independent, so they are evaluated in parallel.
//! Unresolvable days and legs are counted, never fatal.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::calendar::{Exchange, TradingCalendar};
use crate::config::ConfigError;
use crate::data::{MarketSnapshot, SnapshotSource};
use crate::expiry::ExpiryResolver;
use crate::strategy::{
    decide, evaluate_legs, DteDecision, LegResult, SkipReason, Strategy, StrategyContext,
};
use crate::strikes::{MarketSessions, StrikeResolver};

/// Result of one (strategy, date) evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayOutcome {
    pub strategy: String,
    pub date: NaiveDate,
    pub decision: DteDecision,
    /// Leg results in definition order; empty when the day did not fire or
    /// in scan mode.
    pub legs: Vec<LegResult>,
}

impl DayOutcome {
    pub fn fired(&self) -> bool {
        self.decision.should_evaluate()
    }

    /// Fired with every leg resolved.
    pub fn is_complete(&self) -> bool {
        self.fired() && !self.legs.is_empty() && self.legs.iter().all(LegResult::is_resolved)
    }
}

/// Per-strategy counts over a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub instrument: String,
    /// Calendar sessions inside the strategy's date range.
    pub days_in_range: usize,
    pub days_fired: usize,
    /// Resolved days whose DTE did not match.
    pub days_filtered: usize,
    pub days_no_expiry: usize,
    pub days_date_not_found: usize,
    /// Fired days with every leg resolved.
    pub days_complete: usize,
    pub legs_resolved: usize,
    pub legs_no_expiry: usize,
    pub legs_no_strike_data: usize,
    pub legs_before_open: usize,
}

impl StrategySummary {
    fn new(strategy: &Strategy) -> Self {
        Self {
            strategy: strategy.name().to_string(),
            instrument: strategy.instrument().to_string(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: &DayOutcome) {
        self.days_in_range += 1;
        match outcome.decision {
            DteDecision::NoFilter | DteDecision::AllDays { .. } | DteDecision::Match { .. } => {
                self.days_fired += 1
            }
            DteDecision::Mismatch { .. } => self.days_filtered += 1,
            DteDecision::NoExpiry => self.days_no_expiry += 1,
            DteDecision::DateNotFound { .. } => self.days_date_not_found += 1,
        }
        if outcome.is_complete() {
            self.days_complete += 1;
        }

        for leg in &outcome.legs {
            match leg.skip_reason() {
                None => self.legs_resolved += 1,
                Some(SkipReason::NoExpiry) => self.legs_no_expiry += 1,
                Some(SkipReason::NoStrikeData) => self.legs_no_strike_data += 1,
                Some(SkipReason::BeforeMarketOpen) => self.legs_before_open += 1,
            }
        }
    }

    /// Days dropped for missing reference data.
    pub fn days_skipped(&self) -> usize {
        self.days_no_expiry + self.days_date_not_found
    }

    pub fn legs_skipped(&self) -> usize {
        self.legs_no_expiry + self.legs_no_strike_data + self.legs_before_open
    }
}

/// Output of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResult {
    /// Outcomes grouped by strategy (configuration order), then by date.
    pub outcomes: Vec<DayOutcome>,
    pub summaries: Vec<StrategySummary>,
    /// Whether legs were evaluated (false in scan mode).
    pub legs_evaluated: bool,
}

impl RunResult {
    /// Outcomes for fired days only.
    pub fn fired(&self) -> impl Iterator<Item = &DayOutcome> {
        self.outcomes.iter().filter(|o| o.fired())
    }

    pub fn outcomes_for<'a>(&'a self, strategy: &'a str) -> impl Iterator<Item = &'a DayOutcome> + 'a {
        self.outcomes.iter().filter(move |o| o.strategy == strategy)
    }

    /// Generate summary string.
    pub fn summary(&self) -> String {
        let mut out = String::from("Run Results\n----------------------------------------\n");
        for s in &self.summaries {
            out.push_str(&format!(
                "{} ({})\n  \
                 Days in range: {}\n  \
                 Fired: {}  Filtered: {}  Skipped: {} (no expiry: {}, date not found: {})\n",
                s.strategy,
                s.instrument,
                s.days_in_range,
                s.days_fired,
                s.days_filtered,
                s.days_skipped(),
                s.days_no_expiry,
                s.days_date_not_found,
            ));
            if self.legs_evaluated {
                out.push_str(&format!(
                    "  Complete days: {}\n  \
                     Legs resolved: {}  Skipped: {} (no expiry: {}, no strike data: {}, before open: {})\n",
                    s.days_complete,
                    s.legs_resolved,
                    s.legs_skipped(),
                    s.legs_no_expiry,
                    s.legs_no_strike_data,
                    s.legs_before_open,
                ));
            }
        }
        out
    }
}

/// Evaluates configured strategies over their trading calendars.
pub struct BacktestRunner {
    strategies: Vec<Strategy>,
    calendars: HashMap<Exchange, TradingCalendar>,
    expiries: ExpiryResolver,
    sessions: MarketSessions,
}

impl BacktestRunner {
    /// Build a runner, failing if any strategy's exchange has no calendar.
    pub fn new(
        strategies: Vec<Strategy>,
        calendars: impl IntoIterator<Item = TradingCalendar>,
        expiries: ExpiryResolver,
        sessions: MarketSessions,
    ) -> Result<Self, ConfigError> {
        let calendars: HashMap<Exchange, TradingCalendar> = calendars
            .into_iter()
            .map(|cal| (cal.exchange(), cal))
            .collect();

        for strategy in &strategies {
            let exchange = strategy.instrument().exchange();
            let calendar = calendars
                .get(&exchange)
                .ok_or(ConfigError::MissingCalendar(exchange))?;
            if !calendar.covers(strategy.start_date()) || !calendar.covers(strategy.end_date()) {
                warn!(
                    "Strategy {} range {} to {} extends past the {} calendar ({} to {})",
                    strategy.name(),
                    strategy.start_date(),
                    strategy.end_date(),
                    exchange,
                    calendar.first(),
                    calendar.last()
                );
            }
        }

        Ok(Self {
            strategies,
            calendars,
            expiries,
            sessions,
        })
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn calendar(&self, exchange: Exchange) -> Option<&TradingCalendar> {
        self.calendars.get(&exchange)
    }

    /// DTE decisions only; no snapshots needed.
    pub fn scan(&self) -> RunResult {
        info!("Scanning {} strategies", self.strategies.len());
        self.execute(None::<&NoSnapshots>)
    }

    /// Full run: DTE filter plus leg evaluation against `source`.
    pub fn run<S: SnapshotSource + Sync + ?Sized>(&self, source: &S) -> RunResult {
        info!("Running {} strategies", self.strategies.len());
        self.execute(Some(source))
    }

    fn execute<S: SnapshotSource + Sync + ?Sized>(&self, source: Option<&S>) -> RunResult {
        let work = self.work_items();
        info!("Evaluating {} (strategy, date) pairs", work.len());

        let outcomes: Vec<DayOutcome> = work
            .par_iter()
            .map(|(idx, date)| {
                let strategy = &self.strategies[*idx];
                self.evaluate_day(strategy, *date, source)
            })
            .collect();

        let mut summaries: Vec<StrategySummary> =
            self.strategies.iter().map(StrategySummary::new).collect();
        for ((idx, _), outcome) in work.iter().zip(&outcomes) {
            summaries[*idx].record(outcome);
        }

        for s in &summaries {
            info!(
                "{}: {} days, {} fired, {} filtered, {} skipped",
                s.strategy,
                s.days_in_range,
                s.days_fired,
                s.days_filtered,
                s.days_skipped()
            );
        }

        RunResult {
            outcomes,
            summaries,
            legs_evaluated: source.is_some(),
        }
    }

    /// (strategy index, date) for every session in each strategy's range.
    fn work_items(&self) -> Vec<(usize, NaiveDate)> {
        self.strategies
            .iter()
            .enumerate()
            .flat_map(|(idx, strategy)| {
                self.calendars
                    .get(&strategy.instrument().exchange())
                    .map(|cal| cal.range(strategy.start_date(), strategy.end_date()))
                    .unwrap_or_default()
                    .iter()
                    .map(move |date| (idx, *date))
            })
            .collect()
    }

    fn evaluate_day<S: SnapshotSource + ?Sized>(
        &self,
        strategy: &Strategy,
        date: NaiveDate,
        source: Option<&S>,
    ) -> DayOutcome {
        let mut outcome = DayOutcome {
            strategy: strategy.name().to_string(),
            date,
            decision: DteDecision::NoExpiry,
            legs: Vec::new(),
        };

        // Checked in new()
        let Some(calendar) = self.calendars.get(&strategy.instrument().exchange()) else {
            return outcome;
        };

        outcome.decision = decide(strategy, date, calendar, &self.expiries);
        if outcome.decision.is_unresolved() {
            debug!("{} {}: skipped ({:?})", strategy.name(), date, outcome.decision);
        }

        if !outcome.decision.should_evaluate() {
            return outcome;
        }
        if let Some(source) = source {
            let strikes = StrikeResolver::new(source, &self.sessions);
            let ctx = StrategyContext::at_entry(strategy, date, calendar, &self.expiries);
            outcome.legs = evaluate_legs(&ctx, &strikes);
            for leg in &outcome.legs {
                if let LegResult::Skipped { leg, reason } = leg {
                    debug!("{} {} leg {}: skipped ({})", strategy.name(), date, leg, reason.as_str());
                }
            }
        }

        outcome
    }
}

/// Placeholder source for scan mode; never queried.
struct NoSnapshots;

impl SnapshotSource for NoSnapshots {
    fn snapshot(
        &self,
        _index: &str,
        _date: NaiveDate,
        _time: NaiveTime,
    ) -> Option<&MarketSnapshot> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::trading::tests::weekday_calendar;
    use crate::data::{OptionQuote, OptionType, SnapshotStore};
    use crate::expiry::{ContractMonth, Instrument};
    use crate::strategy::{ExpiryRule, Leg, StrikeRule};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn crude_strategy(name: &str, dte: Option<u32>, entry: NaiveTime) -> Strategy {
        Strategy::new(
            name,
            Instrument::from_symbol("CRUDEOIL").unwrap(),
            dte,
            d(2025, 6, 1),
            d(2025, 6, 30),
            entry,
            vec![
                Leg::new("ce", OptionType::Call, StrikeRule::atm(), ExpiryRule::Current),
                Leg::new("pe", OptionType::Put, StrikeRule::atm(), ExpiryRule::Current),
            ],
        )
        .unwrap()
    }

    fn crude_expiries() -> ExpiryResolver {
        ExpiryResolver::new()
            .with_monthly_expiry("CRUDEOIL", ContractMonth::new(2025, 6).unwrap(), d(2025, 6, 16))
            .with_monthly_expiry("CRUDEOIL", ContractMonth::new(2025, 7).unwrap(), d(2025, 7, 17))
    }

    fn mcx_calendar() -> TradingCalendar {
        weekday_calendar(Exchange::Mcx, d(2025, 6, 2), d(2025, 7, 31), &[])
    }

    /// A snapshot with ATM call and put on the given date.
    fn crude_snapshot(date: NaiveDate, expiry: NaiveDate) -> MarketSnapshot {
        let mut snap = MarketSnapshot::new("CRUDEOIL", date, t(10, 0), dec!(5_430));
        for (option_type, price) in [(OptionType::Call, dec!(140)), (OptionType::Put, dec!(125))] {
            snap.add_quote(OptionQuote {
                expiry,
                strike: dec!(5_450),
                option_type,
                price,
                volume: 10,
                open_interest: 100,
            });
        }
        snap
    }

    #[test]
    fn test_missing_calendar_fails_fast() {
        let result = BacktestRunner::new(
            vec![crude_strategy("crude", Some(1), t(10, 0))],
            vec![weekday_calendar(Exchange::Nse, d(2025, 6, 2), d(2025, 7, 31), &[])],
            crude_expiries(),
            MarketSessions::default(),
        );
        assert!(matches!(result, Err(ConfigError::MissingCalendar(Exchange::Mcx))));
    }

    #[test]
    fn test_scan_counts_decisions() {
        let runner = BacktestRunner::new(
            vec![
                crude_strategy("all_days", Some(35), t(10, 0)),
                crude_strategy("dte_10", Some(10), t(10, 0)),
            ],
            vec![mcx_calendar()],
            crude_expiries(),
            MarketSessions::default(),
        )
        .unwrap();

        let result = runner.scan();
        assert!(!result.legs_evaluated);
        assert_eq!(result.summaries.len(), 2);

        let all_days = &result.summaries[0];
        assert_eq!(all_days.days_in_range, 21);
        assert_eq!(all_days.days_fired, 21);

        let dte_10 = &result.summaries[1];
        assert_eq!(dte_10.days_fired, 1);
        assert_eq!(dte_10.days_filtered, 20);
        let fired: Vec<NaiveDate> = result.outcomes_for("dte_10").filter(|o| o.fired()).map(|o| o.date).collect();
        assert_eq!(fired, vec![d(2025, 6, 2)]);
        assert!(result.outcomes.iter().all(|o| o.legs.is_empty()));
    }

    #[test]
    fn test_outcomes_keep_date_order() {
        let runner = BacktestRunner::new(
            vec![crude_strategy("all_days", None, t(10, 0))],
            vec![mcx_calendar()],
            crude_expiries(),
            MarketSessions::default(),
        )
        .unwrap();

        let result = runner.scan();
        let dates: Vec<NaiveDate> = result.outcomes.iter().map(|o| o.date).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(dates.first(), Some(&d(2025, 6, 2)));
        assert_eq!(dates.last(), Some(&d(2025, 6, 30)));
    }

    #[test]
    fn test_run_resolves_legs_and_counts_missing_data() {
        let runner = BacktestRunner::new(
            vec![crude_strategy("crude", Some(35), t(10, 0))],
            vec![mcx_calendar()],
            crude_expiries(),
            MarketSessions::default(),
        )
        .unwrap();

        // Data only for two June days
        let store: SnapshotStore = [
            crude_snapshot(d(2025, 6, 2), d(2025, 6, 16)),
            crude_snapshot(d(2025, 6, 3), d(2025, 6, 16)),
        ]
        .into_iter()
        .collect();

        let result = runner.run(&store);
        assert!(result.legs_evaluated);
        let summary = &result.summaries[0];
        assert_eq!(summary.days_fired, 21);
        assert_eq!(summary.days_complete, 2);
        assert_eq!(summary.legs_resolved, 4);
        assert_eq!(summary.legs_no_strike_data, 38);

        let first = &result.outcomes[0];
        assert!(first.is_complete());
        match &first.legs[0] {
            LegResult::Resolved(leg) => {
                assert_eq!(leg.strike, dec!(5_450));
                assert_eq!(leg.expiry, d(2025, 6, 16));
                assert_eq!(leg.price, dec!(140));
            }
            other => panic!("expected resolved leg, got {:?}", other),
        }
    }

    #[test]
    fn test_after_expiry_day_and_leg_use_next_month() {
        let runner = BacktestRunner::new(
            vec![crude_strategy("crude", Some(35), t(10, 0))],
            vec![mcx_calendar()],
            crude_expiries(),
            MarketSessions::default(),
        )
        .unwrap();
        let store: SnapshotStore = std::iter::once(crude_snapshot(d(2025, 6, 20), d(2025, 7, 17))).collect();

        let result = runner.run(&store);
        let outcome = result
            .outcomes
            .iter()
            .find(|o| o.date == d(2025, 6, 20))
            .unwrap();
        // Day selection and the traded leg agree on the July contract
        assert_eq!(outcome.decision.expiry(), Some(d(2025, 7, 17)));
        match &outcome.legs[0] {
            LegResult::Resolved(leg) => assert_eq!(leg.expiry, d(2025, 7, 17)),
            other => panic!("expected resolved leg, got {:?}", other),
        }
    }

    #[test]
    fn test_before_open_entry_skips_every_leg() {
        let runner = BacktestRunner::new(
            vec![crude_strategy("early", Some(1), t(8, 30))],
            vec![mcx_calendar()],
            crude_expiries(),
            MarketSessions::default(),
        )
        .unwrap();
        let store = SnapshotStore::new();

        let result = runner.run(&store);
        let summary = &result.summaries[0];
        assert_eq!(summary.days_fired, 1);
        assert_eq!(summary.legs_before_open, 2);
        assert_eq!(summary.days_complete, 0);
    }

    #[test]
    fn test_unresolved_days_are_counted_not_fatal() {
        // July is not listed, so days after the June expiry cannot resolve one
        let expiries = ExpiryResolver::new()
            .with_monthly_expiry("CRUDEOIL", ContractMonth::new(2025, 6).unwrap(), d(2025, 6, 16));
        let strategy = Strategy::new(
            "crude",
            Instrument::from_symbol("CRUDEOIL").unwrap(),
            Some(5),
            d(2025, 6, 1),
            d(2025, 7, 31),
            t(10, 0),
            vec![Leg::new("ce", OptionType::Call, StrikeRule::atm(), ExpiryRule::Current)],
        )
        .unwrap();
        let runner =
            BacktestRunner::new(vec![strategy], vec![mcx_calendar()], expiries, MarketSessions::default())
                .unwrap();

        let result = runner.scan();
        let summary = &result.summaries[0];
        assert_eq!(summary.days_in_range, 44);
        assert_eq!(summary.days_fired, 1);
        // 17-Jun..30-Jun plus all of July
        assert_eq!(summary.days_no_expiry, 33);
        assert_eq!(summary.days_filtered, 10);
        assert!(result.summary().contains("no expiry: 33"));
    }

    #[test]
    fn test_summary_lists_every_strategy() {
        let runner = BacktestRunner::new(
            vec![
                crude_strategy("first", Some(1), t(10, 0)),
                crude_strategy("second", None, t(10, 0)),
            ],
            vec![mcx_calendar()],
            crude_expiries(),
            MarketSessions::default(),
        )
        .unwrap();
        let text = runner.run(&SnapshotStore::new()).summary();
        assert!(text.contains("first (MCX:CRUDEOIL)"));
        assert!(text.contains("second (MCX:CRUDEOIL)"));
        assert!(text.contains("Legs resolved: 0"));
    }
}
