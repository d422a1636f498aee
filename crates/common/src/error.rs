use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Market data error: {0}")]
    DataFetch(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Indicator input is empty: at least one bar is required")]
    EmptySeries,

    #[error("Indicator input length mismatch: {bars} bars but {atr} ATR values")]
    LengthMismatch { bars: usize, atr: usize },

    #[error("Invalid indicator parameter: {0}")]
    InvalidParameter(String),

    #[error("Not enough bars for {symbol}: got {bars}, need at least 2")]
    InsufficientData { symbol: String, bars: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
