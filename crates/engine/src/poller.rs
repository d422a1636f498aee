use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use common::{Alert, Error, MarketDataProvider, Notifier, Result};
use strategy::{render, AlertPolicy, SupertrendIndicator, WatchlistConfig};

/// A symbol whose processing failed during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFailure {
    pub symbol: String,
    pub error: String,
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Symbols that completed fetch, compute and (if any) dispatch.
    pub processed: usize,
    pub alerts_sent: usize,
    pub failures: Vec<SymbolFailure>,
}

/// Runs one fetch -> Supertrend -> alert -> notify pass over the watchlist.
///
/// Symbols are handled sequentially. A failure on one symbol is logged and
/// recorded in the report; the remaining symbols are still processed.
pub struct Poller {
    market: Arc<dyn MarketDataProvider>,
    notifier: Arc<dyn Notifier>,
    destination: String,
    symbols: Vec<String>,
    timeframe: String,
    limit: usize,
    indicator: SupertrendIndicator,
    policy: AlertPolicy,
    request_timeout: Duration,
}

impl Poller {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        notifier: Arc<dyn Notifier>,
        destination: impl Into<String>,
        watchlist: &WatchlistConfig,
    ) -> Result<Self> {
        Ok(Self {
            market,
            notifier,
            destination: destination.into(),
            symbols: watchlist.symbols.clone(),
            timeframe: watchlist.timeframe.clone(),
            limit: watchlist.limit,
            indicator: watchlist.indicator()?,
            policy: watchlist.alert_policy,
            request_timeout: watchlist.request_timeout(),
        })
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub async fn run_cycle(&self) -> CycleReport {
        info!(symbols = self.symbols.len(), timeframe = %self.timeframe, "Poll cycle started");
        let mut report = CycleReport::default();

        for symbol in &self.symbols {
            match self.process_symbol(symbol).await {
                Ok(sent) => {
                    report.processed += 1;
                    if sent {
                        report.alerts_sent += 1;
                    }
                }
                Err(e) => {
                    error!(symbol = %symbol, error = %e, "Symbol processing failed");
                    report.failures.push(SymbolFailure {
                        symbol: symbol.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            alerts_sent = report.alerts_sent,
            failures = report.failures.len(),
            "Poll cycle finished"
        );
        report
    }

    /// Returns whether an alert was dispatched.
    async fn process_symbol(&self, symbol: &str) -> Result<bool> {
        let bars = with_timeout(
            self.request_timeout,
            self.market.fetch_bars(symbol, &self.timeframe, self.limit),
            Error::DataFetch,
        )
        .await?;

        if bars.len() < 2 {
            return Err(Error::InsufficientData {
                symbol: symbol.to_string(),
                bars: bars.len(),
            });
        }

        let rows = self.indicator.compute(&bars)?;
        if let Some(last) = rows.last() {
            debug!(
                symbol,
                close = last.close,
                supertrend = last.supertrend,
                trend = last.trend.sign(),
                "Supertrend computed"
            );
        }

        let Some(alert) = self.policy.evaluate_last_two(symbol, &rows) else {
            debug!(symbol, policy = %self.policy, "No alert");
            return Ok(false);
        };

        self.dispatch(&alert).await?;
        Ok(true)
    }

    async fn dispatch(&self, alert: &Alert) -> Result<()> {
        let text = render(alert);
        with_timeout(
            self.request_timeout,
            self.notifier.send_message(&self.destination, &text),
            Error::Notify,
        )
        .await?;
        info!(
            symbol = %alert.symbol,
            direction = %alert.direction,
            price = alert.current_price,
            "Alert sent"
        );
        Ok(())
    }
}

/// Bound a provider call; expiry maps to the call's own error kind.
async fn with_timeout<T, F>(limit: Duration, fut: F, on_timeout: fn(String) -> Error) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout = ?limit, "Provider call timed out");
            Err(on_timeout(format!("timed out after {limit:?}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use common::Bar;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Serves the same series for every symbol (a steady rise unless
    /// `series` is set), except those marked as failing or hanging.
    #[derive(Default)]
    struct FakeMarket {
        failing: HashSet<String>,
        hanging: HashSet<String>,
        bar_count: Option<usize>,
        series: Option<Vec<Bar>>,
        requests: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MarketDataProvider for FakeMarket {
        async fn fetch_bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
            assert_eq!(timeframe, "15m");
            self.requests.lock().unwrap().push(symbol.to_string());
            if self.failing.contains(symbol) {
                return Err(Error::DataFetch("exchange unavailable".into()));
            }
            if self.hanging.contains(symbol) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if let Some(series) = &self.series {
                return Ok(series.clone());
            }
            Ok(rising_bars(self.bar_count.unwrap_or(limit)))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        fail: bool,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send_message(&self, destination: &str, text: &str) -> Result<()> {
            if self.fail {
                return Err(Error::Notify("unauthorized".into()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((destination.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn rising_bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Bar {
                    timestamp: start + ChronoDuration::minutes(15 * i as i64),
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.5,
                    volume: 1.0,
                }
            })
            .collect()
    }

    /// Sideways bars that break out upward on the sixth bar. With ATR(3) and
    /// a 2.0 multiplier the trend flips up there and continues on the last bar.
    fn breakout_bars() -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let high = [10.0, 11.0, 12.0, 11.0, 13.0, 15.0, 16.0];
        let low = [9.0, 10.0, 9.0, 9.0, 11.0, 13.5, 14.0];
        let close = [9.5, 10.5, 10.0, 10.5, 12.5, 14.5, 15.5];
        (0..high.len())
            .map(|i| Bar {
                timestamp: start + ChronoDuration::minutes(15 * i as i64),
                open: if i == 0 { low[0] } else { close[i - 1] },
                high: high[i],
                low: low[i],
                close: close[i],
                volume: 1.0,
            })
            .collect()
    }

    fn watchlist(policy: AlertPolicy) -> WatchlistConfig {
        WatchlistConfig {
            alert_policy: policy,
            limit: 20,
            ..WatchlistConfig::default()
        }
    }

    fn poller(
        market: Arc<FakeMarket>,
        notifier: Arc<FakeNotifier>,
        policy: AlertPolicy,
    ) -> Poller {
        Poller::new(market, notifier, "-1001", &watchlist(policy)).unwrap()
    }

    #[tokio::test]
    async fn always_long_sends_one_alert_per_symbol() {
        let market = Arc::new(FakeMarket::default());
        let notifier = Arc::new(FakeNotifier::default());
        let report = poller(market.clone(), notifier.clone(), AlertPolicy::AlwaysLong)
            .run_cycle()
            .await;

        assert_eq!(report.processed, 4);
        assert_eq!(report.alerts_sent, 4);
        assert!(report.failures.is_empty());

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[0].0, "-1001");
        assert!(sent[0].1.starts_with("RECOMMENDATION: BUY (Long)\nBTC/USDT\n"));
        assert!(sent[3].1.contains("BNB/USDT"));
    }

    #[tokio::test]
    async fn data_fetch_failure_does_not_stop_other_symbols() {
        let market = Arc::new(FakeMarket {
            failing: HashSet::from(["ETH/USDT".to_string()]),
            ..FakeMarket::default()
        });
        let notifier = Arc::new(FakeNotifier::default());
        let report = poller(market.clone(), notifier.clone(), AlertPolicy::AlwaysLong)
            .run_cycle()
            .await;

        assert_eq!(market.requests.lock().unwrap().len(), 4);
        assert_eq!(report.processed, 3);
        assert_eq!(report.alerts_sent, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "ETH/USDT");

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(_, text)| !text.contains("ETH/USDT")));
    }

    #[tokio::test]
    async fn notify_failure_is_recorded_per_symbol() {
        let market = Arc::new(FakeMarket::default());
        let notifier = Arc::new(FakeNotifier {
            fail: true,
            ..FakeNotifier::default()
        });
        let report = poller(market.clone(), notifier, AlertPolicy::AlwaysLong)
            .run_cycle()
            .await;

        assert_eq!(market.requests.lock().unwrap().len(), 4);
        assert_eq!(report.processed, 0);
        assert_eq!(report.failures.len(), 4);
        assert!(report.failures[0].error.contains("Notification error"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_fetch_times_out_and_cycle_continues() {
        let market = Arc::new(FakeMarket {
            hanging: HashSet::from(["BTC/USDT".to_string()]),
            ..FakeMarket::default()
        });
        let notifier = Arc::new(FakeNotifier::default());
        let report = poller(market, notifier.clone(), AlertPolicy::AlwaysLong)
            .run_cycle()
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].symbol, "BTC/USDT");
        assert!(report.failures[0].error.contains("timed out"));
        assert_eq!(notifier.sent.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn trend_change_policy_stays_quiet_during_a_steady_trend() {
        // A steady rise is already a continued up trend on both of the last
        // two rows, so nothing new starts.
        let market = Arc::new(FakeMarket::default());
        let notifier = Arc::new(FakeNotifier::default());
        let report = poller(market, notifier.clone(), AlertPolicy::TrendChange)
            .run_cycle()
            .await;

        assert_eq!(report.processed, 4);
        assert_eq!(report.alerts_sent, 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn trend_change_policy_sends_long_when_a_continued_up_trend_starts() {
        let market = Arc::new(FakeMarket {
            series: Some(breakout_bars()),
            ..FakeMarket::default()
        });
        let notifier = Arc::new(FakeNotifier::default());
        let watchlist = WatchlistConfig {
            symbols: vec!["BTC/USDT".into()],
            atr_length: 3,
            multiplier: 2.0,
            alert_policy: AlertPolicy::TrendChange,
            ..WatchlistConfig::default()
        };
        let report = Poller::new(market, notifier.clone(), "-1001", &watchlist)
            .unwrap()
            .run_cycle()
            .await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.alerts_sent, 1);
        assert!(report.failures.is_empty());

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "-1001");
        assert_eq!(
            sent[0].1,
            "RECOMMENDATION: BUY (Long)\nBTC/USDT\nCURRENT PRICE: 15.50\nTP: 15.81\nSL: 14.43"
        );
    }

    #[tokio::test]
    async fn trend_change_policy_is_quiet_on_the_flip_bar_itself() {
        // Stop one bar early: the trend has flipped up but does not yet continue.
        let mut bars = breakout_bars();
        bars.pop();
        let market = Arc::new(FakeMarket {
            series: Some(bars),
            ..FakeMarket::default()
        });
        let notifier = Arc::new(FakeNotifier::default());
        let watchlist = WatchlistConfig {
            symbols: vec!["BTC/USDT".into()],
            atr_length: 3,
            multiplier: 2.0,
            ..WatchlistConfig::default()
        };
        let report = Poller::new(market, notifier.clone(), "-1001", &watchlist)
            .unwrap()
            .run_cycle()
            .await;

        assert_eq!(report.processed, 1);
        assert_eq!(report.alerts_sent, 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn too_few_bars_is_a_symbol_failure() {
        let market = Arc::new(FakeMarket {
            bar_count: Some(1),
            ..FakeMarket::default()
        });
        let notifier = Arc::new(FakeNotifier::default());
        let report = poller(market, notifier, AlertPolicy::AlwaysLong)
            .run_cycle()
            .await;

        assert_eq!(report.failures.len(), 4);
        assert!(report.failures[0].error.contains("Not enough bars"));
    }
}
