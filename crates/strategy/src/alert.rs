use serde::{Deserialize, Serialize};

use common::{Alert, Direction};

use crate::indicators::IndicatorRow;

const LONG_TAKE_PROFIT: f64 = 1.02;
const LONG_STOP_LOSS: f64 = 0.995;
const SHORT_TAKE_PROFIT: f64 = 0.98;
const SHORT_STOP_LOSS: f64 = 1.005;

/// Decides whether the last two indicator rows of a symbol produce an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPolicy {
    /// LONG when a continued up trend starts on the latest row, SHORT when a
    /// continued down trend starts. Otherwise nothing.
    #[default]
    TrendChange,
    /// LONG on every cycle regardless of trend. Compatibility mode for the
    /// behavior earlier deployments shipped with.
    AlwaysLong,
}

impl AlertPolicy {
    /// Evaluate `prev` and `curr` (the last two rows, oldest first).
    pub fn evaluate(&self, symbol: &str, prev: &IndicatorRow, curr: &IndicatorRow) -> Option<Alert> {
        match self {
            AlertPolicy::AlwaysLong => Some(build(Direction::Long, symbol, prev, curr)),
            AlertPolicy::TrendChange => {
                if curr.continues_up_trend && !prev.continues_up_trend {
                    Some(build(Direction::Long, symbol, prev, curr))
                } else if curr.continues_down_trend && !prev.continues_down_trend {
                    Some(build(Direction::Short, symbol, prev, curr))
                } else {
                    None
                }
            }
        }
    }

    /// Evaluate the tail of a row sequence. Returns `None` with fewer than two rows.
    pub fn evaluate_last_two(&self, symbol: &str, rows: &[IndicatorRow]) -> Option<Alert> {
        match rows {
            [.., prev, curr] => self.evaluate(symbol, prev, curr),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertPolicy::TrendChange => write!(f, "trend_change"),
            AlertPolicy::AlwaysLong => write!(f, "always_long"),
        }
    }
}

fn build(direction: Direction, symbol: &str, prev: &IndicatorRow, curr: &IndicatorRow) -> Alert {
    let (tp, sl) = match direction {
        Direction::Long => (LONG_TAKE_PROFIT, LONG_STOP_LOSS),
        Direction::Short => (SHORT_TAKE_PROFIT, SHORT_STOP_LOSS),
    };
    Alert {
        direction,
        symbol: symbol.to_string(),
        current_price: curr.close,
        take_profit: curr.close * tp,
        stop_loss: prev.close * sl,
    }
}

/// Plain-text message for an alert, prices rounded to two decimals.
pub fn render(alert: &Alert) -> String {
    let headline = match alert.direction {
        Direction::Long => "RECOMMENDATION: BUY (Long)",
        Direction::Short => "RECOMMENDATION: SELL (Short)",
    };
    format!(
        "{headline}\n{}\nCURRENT PRICE: {:.2}\nTP: {:.2}\nSL: {:.2}",
        alert.symbol, alert.current_price, alert.take_profit, alert.stop_loss
    )
}
