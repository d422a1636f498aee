use chrono::{DateTime, Utc};
use common::{Bar, Error, Result};

use super::atr::average_true_range;

/// Trend classification of a single row.
///
/// `Neutral` only ever appears on the first row, which has no predecessor to
/// ratchet against. It is not interchangeable with `Down`: the recurrence
/// treats anything other than `Up` on the previous row the same way, but
/// callers comparing consecutive rows must not read `Neutral` as a trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trend {
    #[default]
    Neutral,
    Up,
    Down,
}

impl Trend {
    /// `+1` for up, `-1` for down, `0` for the bootstrap row.
    pub fn sign(self) -> i8 {
        match self {
            Trend::Up => 1,
            Trend::Down => -1,
            Trend::Neutral => 0,
        }
    }
}

/// A bar annotated with its Supertrend state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorRow {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub true_range: f64,
    pub atr: f64,
    pub basic_upper_band: f64,
    pub basic_lower_band: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub supertrend: f64,
    pub trend: Trend,
    /// Up on this row and the previous one.
    pub continues_up_trend: bool,
    /// Down on this row and the previous one.
    pub continues_down_trend: bool,
}

impl IndicatorRow {
    pub fn is_up_trend(&self) -> bool {
        self.trend == Trend::Up
    }

    pub fn is_down_trend(&self) -> bool {
        self.trend == Trend::Down
    }
}

/// State carried from one row to the next.
#[derive(Debug, Clone, Copy)]
struct Carry {
    upper_band: f64,
    lower_band: f64,
    close: f64,
    trend: Trend,
}

/// Run the Supertrend recurrence over `bars` with a precomputed ATR series.
///
/// Row 0 is a bootstrap row: bands, supertrend value and trend are all zero /
/// `Neutral`. From row 1 on, the upper band only moves down unless the
/// previous close broke above it, the lower band only moves up unless the
/// previous close broke below it, and the trend flips when the close crosses
/// the band on the opposite side.
///
/// Fails with `Error::LengthMismatch` if `atr` and `bars` differ in length,
/// `Error::EmptySeries` for no bars, and `Error::InvalidParameter` unless
/// `multiplier` is positive and finite.
pub fn supertrend(bars: &[Bar], atr: &[f64], multiplier: f64) -> Result<Vec<IndicatorRow>> {
    if bars.len() != atr.len() {
        return Err(Error::LengthMismatch {
            bars: bars.len(),
            atr: atr.len(),
        });
    }
    if bars.is_empty() {
        return Err(Error::EmptySeries);
    }
    validate_multiplier(multiplier)?;

    let true_ranges = super::atr::true_range(bars);
    let mut rows: Vec<IndicatorRow> = Vec::with_capacity(bars.len());
    let mut carry: Option<Carry> = None;

    for (i, bar) in bars.iter().enumerate() {
        let mid = bar.mid();
        let basic_upper_band = mid + multiplier * atr[i];
        let basic_lower_band = mid - multiplier * atr[i];

        let (upper_band, lower_band, trend) = match carry {
            None => (0.0, 0.0, Trend::Neutral),
            Some(prev) => {
                let upper_band =
                    if basic_upper_band < prev.upper_band || prev.close > prev.upper_band {
                        basic_upper_band
                    } else {
                        prev.upper_band
                    };
                let lower_band =
                    if basic_lower_band > prev.lower_band || prev.close < prev.lower_band {
                        basic_lower_band
                    } else {
                        prev.lower_band
                    };
                let trend = match prev.trend {
                    Trend::Up if bar.close > lower_band => Trend::Up,
                    Trend::Up => Trend::Down,
                    Trend::Neutral | Trend::Down if bar.close < upper_band => Trend::Down,
                    Trend::Neutral | Trend::Down => Trend::Up,
                };
                (upper_band, lower_band, trend)
            }
        };

        let supertrend = match trend {
            Trend::Up => lower_band,
            Trend::Down => upper_band,
            Trend::Neutral => 0.0,
        };
        let prev_trend = carry.map(|c| c.trend);

        rows.push(IndicatorRow {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            true_range: true_ranges[i],
            atr: atr[i],
            basic_upper_band,
            basic_lower_band,
            upper_band,
            lower_band,
            supertrend,
            trend,
            continues_up_trend: trend == Trend::Up && prev_trend == Some(Trend::Up),
            continues_down_trend: trend == Trend::Down && prev_trend == Some(Trend::Down),
        });

        carry = Some(Carry {
            upper_band,
            lower_band,
            close: bar.close,
            trend,
        });
    }

    Ok(rows)
}

fn validate_multiplier(multiplier: f64) -> Result<()> {
    if multiplier.is_finite() && multiplier > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidParameter(format!(
            "Supertrend multiplier must be positive and finite, got {multiplier}"
        )))
    }
}

/// Supertrend parameters bundled with the ATR step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupertrendIndicator {
    pub atr_length: usize,
    pub multiplier: f64,
}

impl SupertrendIndicator {
    pub fn new(atr_length: usize, multiplier: f64) -> Result<Self> {
        if atr_length == 0 {
            return Err(Error::InvalidParameter("ATR length must be >= 1".into()));
        }
        validate_multiplier(multiplier)?;
        Ok(Self {
            atr_length,
            multiplier,
        })
    }

    /// ATR then Supertrend over `bars` (oldest first).
    pub fn compute(&self, bars: &[Bar]) -> Result<Vec<IndicatorRow>> {
        let atr = average_true_range(bars, self.atr_length)?;
        supertrend(bars, &atr, self.multiplier)
    }
}
