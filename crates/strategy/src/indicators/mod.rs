pub mod atr;
pub mod supertrend;

pub use atr::{average_true_range, true_range};
pub use supertrend::{supertrend, IndicatorRow, SupertrendIndicator, Trend};
