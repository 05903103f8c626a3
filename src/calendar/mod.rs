//! Exchange trading calendars.
//!
//! A calendar is the ordered set of sessions an exchange was open, used to
//! measure day distances in trading-day units.

pub mod trading;

pub use trading::{CalendarError, Exchange, TradingCalendar};
