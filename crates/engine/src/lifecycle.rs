use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

use common::{EngineCommand, EngineState};

use crate::poller::{CycleReport, Poller};

/// Cloneable handle for controlling a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    pub async fn send(&self, cmd: EngineCommand) {
        if self.command_tx.send(cmd).await.is_err() {
            warn!(command = ?cmd, "Engine is gone, command dropped");
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }
}

/// The scheduler: fires a poll cycle every `period` and serves commands.
///
/// Cycles run inline in the engine task and only start from `Idle`, so two
/// cycles never overlap. Ticks missed while a cycle is running are skipped,
/// not queued. A command waiting in the channel is always served before a
/// due tick, so `Shutdown` stops the engine once the in-flight cycle ends.
pub struct Engine {
    poller: Poller,
    period: Duration,
    state: Arc<RwLock<EngineState>>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(poller: Poller, period: Duration) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(8);
        let state = Arc::new(RwLock::new(EngineState::Idle));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
        };

        let engine = Engine {
            poller,
            period,
            state,
            command_rx,
        };

        (engine, handle)
    }

    /// Run until `Shutdown` arrives or every handle is dropped.
    /// Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            period = ?self.period,
            symbols = ?self.poller.symbols(),
            "Engine started, first cycle after one interval"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            // Commands are polled first so a queued Shutdown wins over a tick
            // that came due while the previous cycle was running.
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => match cmd {
                    Some(EngineCommand::RunNow) => {
                        info!("Manual poll requested");
                        self.poll_once().await;
                    }
                    Some(EngineCommand::Shutdown) => {
                        info!("Engine shutting down");
                        break;
                    }
                    None => {
                        warn!("Engine command channel closed, shutting down");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }

        *self.state.write().await = EngineState::Stopped;
    }

    /// Run one cycle unless one is already in flight.
    async fn poll_once(&self) -> Option<CycleReport> {
        {
            let mut state = self.state.write().await;
            let current = *state;
            if current != EngineState::Idle {
                warn!(state = %current, "Poll skipped, engine not idle");
                return None;
            }
            *state = EngineState::Polling;
        }

        let report = self.poller.run_cycle().await;

        *self.state.write().await = EngineState::Idle;
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use common::{Bar, MarketDataProvider, Notifier, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use strategy::{AlertPolicy, WatchlistConfig};

    /// Counts fetches. A non-zero `delay` makes every fetch take that long.
    #[derive(Default)]
    struct CountingMarket {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl MarketDataProvider for CountingMarket {
        async fn fetch_bars(&self, _symbol: &str, _timeframe: &str, _limit: usize) -> Result<Vec<Bar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            Ok(vec![
                Bar {
                    timestamp: t0,
                    open: 1.0,
                    high: 2.0,
                    low: 1.0,
                    close: 1.5,
                    volume: 1.0,
                },
                Bar {
                    timestamp: t0 + chrono::Duration::minutes(15),
                    open: 1.5,
                    high: 2.5,
                    low: 1.5,
                    close: 2.0,
                    volume: 1.0,
                },
            ])
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send_message(&self, _destination: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn engine(period: Duration) -> (Engine, EngineHandle, Arc<CountingMarket>) {
        engine_with_market(period, CountingMarket::default())
    }

    fn engine_with_market(
        period: Duration,
        market: CountingMarket,
    ) -> (Engine, EngineHandle, Arc<CountingMarket>) {
        let market = Arc::new(market);
        let watchlist = WatchlistConfig {
            symbols: vec!["BTC/USDT".into()],
            alert_policy: AlertPolicy::AlwaysLong,
            request_timeout_secs: 60,
            ..WatchlistConfig::default()
        };
        let poller = Poller::new(market.clone(), Arc::new(NullNotifier), "1", &watchlist).unwrap();
        let (engine, handle) = Engine::new(poller, period);
        (engine, handle, market)
    }

    #[tokio::test]
    async fn run_now_then_shutdown() {
        let (engine, handle, market) = engine(Duration::from_secs(3600));
        let task = tokio::spawn(engine.run());

        handle.send(EngineCommand::RunNow).await;
        handle.send(EngineCommand::Shutdown).await;
        task.await.unwrap();

        assert_eq!(market.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state().await, EngineState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_drive_cycles_after_each_interval() {
        let (engine, handle, market) = engine(Duration::from_secs(900));
        let task = tokio::spawn(engine.run());

        // Nothing runs before the first interval elapses.
        tokio::time::sleep(Duration::from_secs(899)).await;
        assert_eq!(market.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(900 * 2)).await;
        assert_eq!(market.calls.load(Ordering::SeqCst), 2);

        handle.send(EngineCommand::Shutdown).await;
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn queued_shutdown_beats_a_tick_that_came_due_during_a_cycle() {
        // Each cycle outlasts the period, so a tick is already due when the
        // manual cycle returns. The queued Shutdown must still win, every time.
        for _ in 0..20 {
            let (engine, handle, market) = engine_with_market(
                Duration::from_secs(10),
                CountingMarket {
                    delay: Duration::from_secs(15),
                    ..CountingMarket::default()
                },
            );

            handle.send(EngineCommand::RunNow).await;
            handle.send(EngineCommand::Shutdown).await;
            tokio::spawn(engine.run()).await.unwrap();

            assert_eq!(market.calls.load(Ordering::SeqCst), 1);
            assert_eq!(handle.state().await, EngineState::Stopped);
        }
    }

    #[tokio::test]
    async fn poll_is_skipped_while_another_cycle_is_in_flight() {
        let (engine, _handle, market) = engine(Duration::from_secs(3600));

        *engine.state.write().await = EngineState::Polling;
        assert!(engine.poll_once().await.is_none());
        assert_eq!(market.calls.load(Ordering::SeqCst), 0);

        *engine.state.write().await = EngineState::Idle;
        let report = engine.poll_once().await.unwrap();
        assert_eq!(report.alerts_sent, 1);
        assert_eq!(*engine.state.read().await, EngineState::Idle);
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_engine() {
        let (engine, handle, _market) = engine(Duration::from_secs(3600));
        let state = engine.state.clone();
        drop(handle);
        engine.run().await;
        assert_eq!(*state.read().await, EngineState::Stopped);
    }
}
