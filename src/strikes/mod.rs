//! Strike resolution against point-in-time option snapshots.

pub mod resolver;

pub use resolver::{
    nearest_strike, round_to_step, MarketSessions, ResolvedStrike, StrikeResolver, StrikeUnavailable,
};
