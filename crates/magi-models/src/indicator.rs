use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Uptrend,
    Downtrend,
    Sideways,
}

/// Derived indicator values for one symbol, recomputed on every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub sma5: f64,
    pub sma20: f64,
    pub rsi14: f64,
    pub atr14: f64,
    pub change_pct_1d: f64,
    pub change_pct_5d: f64,
    pub change_pct_20d: f64,
    pub volume_ratio: f64,
    pub trend: Trend,
}
