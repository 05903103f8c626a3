//! Strategy definitions, the DTE day filter and leg evaluation.

pub mod dte_filter;
pub mod leg_evaluator;
pub mod types;

pub use dte_filter::{actual_dte, decide, should_evaluate, DteDecision, MONTHLY_ALL_DAYS_DTE};
pub use leg_evaluator::{
    evaluate_leg, evaluate_legs, LegResult, ResolvedLeg, SkipReason, StrategyContext,
};
pub use types::{ExpiryRule, Leg, Strategy, StrategyError, StrikeRule};
