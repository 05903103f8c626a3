pub mod backtest;
pub mod calendar;
pub mod config;
pub mod data;
pub mod expiry;
pub mod strategy;
pub mod strikes;

// Re-export commonly used types
pub use backtest::{BacktestRunner, DayOutcome, RunResult, StrategySummary};
pub use calendar::{CalendarError, Exchange, TradingCalendar};
pub use config::{BacktestSettings, ConfigError};
pub use data::{DataLoader, MarketSnapshot, OptionQuote, OptionType, SnapshotSource, SnapshotStore};
pub use expiry::{ContractMonth, ExpiryCycle, ExpiryResolver, Instrument};
pub use strategy::{DteDecision, Leg, LegResult, SkipReason, Strategy, StrikeRule};
pub use strikes::{MarketSessions, StrikeResolver, StrikeUnavailable};
