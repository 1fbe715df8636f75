use magi_models::{Bar, IndicatorSnapshot, Trend};

use crate::error::{require, IndicatorError};
use crate::series::{atr, change_pct, rsi, sma, volume_ratio};

/// Bars needed for a full snapshot (20-day change needs 21 closes).
pub const SNAPSHOT_MIN_BARS: usize = 21;

/// Compute every indicator for a symbol from its recent daily bars.
pub fn compute_snapshot(symbol: &str, bars: &[Bar]) -> Result<IndicatorSnapshot, IndicatorError> {
    require(SNAPSHOT_MIN_BARS, bars.len())?;

    let sma5 = sma(bars, 5)?;
    let sma20 = sma(bars, 20)?;
    let close = bars[bars.len() - 1].close;

    Ok(IndicatorSnapshot {
        symbol: symbol.to_string(),
        sma5,
        sma20,
        rsi14: rsi(bars, 14)?,
        atr14: atr(bars, 14)?,
        change_pct_1d: change_pct(bars, 1)?,
        change_pct_5d: change_pct(bars, 5)?,
        change_pct_20d: change_pct(bars, 20)?,
        volume_ratio: volume_ratio(bars)?,
        trend: classify_trend(close, sma5, sma20),
    })
}

pub fn classify_trend(close: f64, sma5: f64, sma20: f64) -> Trend {
    if sma5 > sma20 && close >= sma20 {
        Trend::Uptrend
    } else if sma5 < sma20 && close <= sma20 {
        Trend::Downtrend
    } else {
        Trend::Sideways
    }
}
