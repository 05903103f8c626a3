pub mod loader;
pub mod types;

pub use loader::{DataLoader, LoaderError, EXPECTED_COLUMNS};
pub use types::{MarketSnapshot, OptionQuote, OptionType, SnapshotSource, SnapshotStore, StrikeLadder};
