//! Numeric indicators over daily bars ordered oldest first.
//!
//! Every function checks its lookback before computing and returns
//! `IndicatorError::InsufficientData` for short windows.

use magi_models::Bar;

use crate::error::{require, IndicatorError};

/// Arithmetic mean of the last `period` closes.
pub fn sma(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    require(period, bars.len())?;
    let window = &bars[bars.len() - period..];
    Ok(window.iter().map(|b| b.close).sum::<f64>() / period as f64)
}

/// RSI over the last `period` close-to-close deltas.
///
/// Average loss of zero yields 100.
pub fn rsi(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    require(period + 1, bars.len())?;

    let window = &bars[bars.len() - (period + 1)..];
    let (mut gains, mut losses) = (0.0f64, 0.0f64);
    for pair in window.windows(2) {
        let delta = pair[1].close - pair[0].close;
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;
    if avg_loss == 0.0 {
        return Ok(100.0);
    }
    let rs = avg_gain / avg_loss;
    Ok((100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0))
}

/// max(high - low, |high - prev_close|, |low - prev_close|)
pub fn true_range(bar: &Bar, prev_close: f64) -> f64 {
    (bar.high - bar.low)
        .max((bar.high - prev_close).abs())
        .max((bar.low - prev_close).abs())
}

/// Wilder ATR: seeded with the mean of the first `period` true ranges,
/// then `atr = (atr * (period - 1) + tr) / period` for the rest.
pub fn atr(bars: &[Bar], period: usize) -> Result<f64, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    require(period + 1, bars.len())?;

    let ranges: Vec<f64> = bars
        .windows(2)
        .map(|pair| true_range(&pair[1], pair[0].close))
        .collect();

    let mut value = ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Ok(value.max(0.0))
}

/// Latest volume over the mean volume of the whole window.
pub fn volume_ratio(bars: &[Bar]) -> Result<f64, IndicatorError> {
    require(1, bars.len())?;
    let mean = bars.iter().map(|b| b.volume).sum::<f64>() / bars.len() as f64;
    if mean <= 0.0 {
        return Err(IndicatorError::Degenerate("average volume is zero"));
    }
    let latest = bars[bars.len() - 1].volume;
    Ok(latest / mean)
}

/// Percent change of the latest close versus the close `lookback` bars earlier.
pub fn change_pct(bars: &[Bar], lookback: usize) -> Result<f64, IndicatorError> {
    if lookback == 0 {
        return Err(IndicatorError::InvalidPeriod);
    }
    require(lookback + 1, bars.len())?;
    let latest = bars[bars.len() - 1].close;
    let base = bars[bars.len() - 1 - lookback].close;
    if base <= 0.0 {
        return Err(IndicatorError::Degenerate("base close is not positive"));
    }
    Ok((latest - base) / base * 100.0)
}
