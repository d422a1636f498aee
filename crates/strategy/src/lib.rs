pub mod alert;
pub mod config;
pub mod indicators;

pub use alert::{render, AlertPolicy};
pub use config::WatchlistConfig;
pub use indicators::{average_true_range, supertrend, IndicatorRow, SupertrendIndicator, Trend};
