//! Contract expiry resolution.
//!
//! Instruments expire on one of two cycles:
//! - Weekly: NSE/BSE index and equity options
//! - Monthly: MCX commodity options
//!
//! The resolver keeps the two cycles as separate branches keyed by
//! [`ExpiryCycle`].

pub mod instrument;
pub mod resolver;

pub use instrument::{ExpiryCycle, Instrument, MCX_COMMODITIES};
pub use resolver::{ContractMonth, ExpiryResolver};
