use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, MarketDataProvider, Notifier};
use engine::{BinanceClient, Engine, Poller};
use strategy::{AlertPolicy, WatchlistConfig};
use telegram_notify::TelegramNotifier;

#[tokio::main]
async fn main() -> ExitCode {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };
    let watchlist = match WatchlistConfig::load(cfg.watchlist_config_path.as_deref()) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };

    info!(
        symbols = ?watchlist.symbols,
        timeframe = %watchlist.timeframe,
        limit = watchlist.limit,
        atr_length = watchlist.atr_length,
        multiplier = watchlist.multiplier,
        policy = %watchlist.alert_policy,
        "TrendBot starting"
    );
    if watchlist.alert_policy == AlertPolicy::AlwaysLong {
        warn!("alert_policy = always_long: a LONG alert is sent for every symbol on every cycle, regardless of trend");
    }

    // ── Providers ─────────────────────────────────────────────────────────────
    let market: Arc<dyn MarketDataProvider> =
        match BinanceClient::new(watchlist.request_timeout()) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!(error = %e, "Startup failed");
                return ExitCode::FAILURE;
            }
        };
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(cfg.telegram_token.clone()));

    // ── Engine ────────────────────────────────────────────────────────────────
    let poller = match Poller::new(market, notifier, cfg.telegram_chat_id.clone(), &watchlist) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "Startup failed");
            return ExitCode::FAILURE;
        }
    };
    let (engine, handle) = Engine::new(poller, watchlist.poll_interval());
    let engine_task = tokio::spawn(engine.run());

    if watchlist.run_on_startup {
        handle.send(EngineCommand::RunNow).await;
    }

    // ── Shutdown ──────────────────────────────────────────────────────────────
    info!("Engine running. Waiting for shutdown signal.");
    let signal = shutdown_signal().await;
    let state = handle.state().await;
    info!(signal, state = %state, "Shutdown signal received, letting any in-flight cycle finish");
    handle.send(EngineCommand::Shutdown).await;

    if let Err(e) = engine_task.await {
        error!(error = %e, "Engine task ended abnormally");
        return ExitCode::FAILURE;
    }
    info!("Exiting.");
    ExitCode::SUCCESS
}

/// Resolves on Ctrl-C, or on SIGTERM where the platform has it, and names the
/// signal. A listener that cannot be installed is logged and never fires.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
