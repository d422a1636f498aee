use async_trait::async_trait;

use crate::{Bar, Result};

/// Source of recent OHLCV bars.
///
/// `BinanceClient` in `crates/engine` implements this against the public
/// klines endpoint. Tests substitute in-memory fakes.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the `limit` most recent bars for `symbol` on `timeframe`,
    /// oldest first. Fails with `Error::DataFetch`.
    async fn fetch_bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>>;
}

/// Outbound plain-text message channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `destination`. Fails with `Error::Notify`.
    async fn send_message(&self, destination: &str, text: &str) -> Result<()>;
}
