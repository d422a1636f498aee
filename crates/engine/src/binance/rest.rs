use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

use common::{Bar, Error, MarketDataProvider, Result};

const BASE_URL: &str = "https://api.binance.com";
const KLINES_PATH: &str = "/api/v3/klines";

/// REST client for Binance public market data. Only unsigned endpoints are
/// used, so no API key is needed.
pub struct BinanceClient {
    base_url: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(BASE_URL, timeout)
    }

    /// Point the client at another host (tests, regional mirrors).
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn klines_url(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Url> {
        let limit = limit.to_string();
        Url::parse_with_params(
            &format!("{}{KLINES_PATH}", self.base_url),
            &[
                ("symbol", exchange_symbol(symbol).as_str()),
                ("interval", timeframe),
                ("limit", limit.as_str()),
            ],
        )
        .map_err(|e| Error::DataFetch(format!("Invalid klines URL: {e}")))
    }
}

/// `BTC/USDT` -> `BTCUSDT`.
pub fn exchange_symbol(symbol: &str) -> String {
    symbol
        .chars()
        .filter(|c| *c != '/' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

#[async_trait]
impl MarketDataProvider for BinanceClient {
    async fn fetch_bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let url = self.klines_url(symbol, timeframe, limit)?;
        debug!(symbol, timeframe, limit, "Fetching klines from Binance");

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::DataFetch(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::DataFetch(e.to_string()))?;

        if !status.is_success() {
            return Err(Error::DataFetch(format!("HTTP {status}: {body}")));
        }

        parse_klines(&body)
    }
}

/// Parse a klines response body: an array of
/// `[openTime, open, high, low, close, volume, closeTime, ...]` arrays with
/// prices as decimal strings.
pub fn parse_klines(body: &str) -> Result<Vec<Bar>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)
        .map_err(|e| Error::DataFetch(format!("Malformed klines response: {e}")))?;

    let bars: Vec<Bar> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| parse_kline(row).map_err(|e| Error::DataFetch(format!("kline {i}: {e}"))))
        .collect::<Result<_>>()?;

    if bars
        .windows(2)
        .any(|w| w[1].timestamp <= w[0].timestamp)
    {
        return Err(Error::DataFetch(
            "klines are not in strictly increasing time order".into(),
        ));
    }

    Ok(bars)
}

fn parse_kline(row: &[Value]) -> std::result::Result<Bar, String> {
    if row.len() < 6 {
        return Err(format!("expected at least 6 fields, got {}", row.len()));
    }

    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| format!("open time is not an integer: {}", row[0]))?;
    let timestamp = DateTime::<Utc>::from_timestamp_millis(open_ms)
        .ok_or_else(|| format!("open time out of range: {open_ms}"))?;

    Ok(Bar {
        timestamp,
        open: decimal(&row[1], "open")?,
        high: decimal(&row[2], "high")?,
        low: decimal(&row[3], "low")?,
        close: decimal(&row[4], "close")?,
        volume: decimal(&row[5], "volume")?,
    })
}

fn decimal(value: &Value, field: &str) -> std::result::Result<f64, String> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(format!("invalid {field}: {value}")),
    }
}
