pub mod config;
pub mod error;
pub mod providers;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use providers::{MarketDataProvider, Notifier};
pub use types::*;
