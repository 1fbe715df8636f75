//! Technical indicators derived from daily price bars.
//!
//! All functions are pure and deterministic. Short windows produce
//! `IndicatorError::InsufficientData`, never a placeholder number.

pub mod error;
pub mod outcome;
pub mod series;
pub mod signal;
pub mod snapshot;
pub mod surge;

pub use series::{atr, change_pct, rsi, sma, true_range, volume_ratio};
pub use error::IndicatorError;
pub use outcome::{classify_outcome, return_pct, OutcomeThresholds};
pub use signal::{momentum_signal, MomentumSignal, MomentumThresholds, SignalBias, SignalFlag};
pub use snapshot::{classify_trend, compute_snapshot, SNAPSHOT_MIN_BARS};
pub use surge::{detect_surge, SurgeAlert, SurgeDirection};
