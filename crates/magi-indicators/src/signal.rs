use magi_models::IndicatorSnapshot;
use serde::{Deserialize, Serialize};

/// Cutoffs for the momentum/whale signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MomentumThresholds {
    pub daily_move_pct: f64,
    pub weekly_move_pct: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    /// Minimum SMA5/SMA20 gap, in percent of SMA20.
    pub sma_divergence_pct: f64,
    pub volume_spike_ratio: f64,
}

impl Default for MomentumThresholds {
    fn default() -> Self {
        Self {
            daily_move_pct: 2.0,
            weekly_move_pct: 5.0,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            sma_divergence_pct: 2.0,
            volume_spike_ratio: 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalFlag {
    DailySurge,
    DailyDrop,
    WeeklyRally,
    WeeklySlide,
    Overbought,
    Oversold,
    SmaBullishSpread,
    SmaBearishSpread,
    VolumeSpike,
}

impl SignalFlag {
    /// +1 bullish, -1 bearish, 0 for direction-less flags.
    fn vote(&self) -> i32 {
        match self {
            SignalFlag::DailySurge
            | SignalFlag::WeeklyRally
            | SignalFlag::SmaBullishSpread
            | SignalFlag::Oversold => 1,
            SignalFlag::DailyDrop
            | SignalFlag::WeeklySlide
            | SignalFlag::SmaBearishSpread
            | SignalFlag::Overbought => -1,
            SignalFlag::VolumeSpike => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalBias {
    Bullish,
    Bearish,
    Neutral,
}

/// Categorical read of a snapshot. A suggestion for the model, not a trade decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MomentumSignal {
    pub bias: SignalBias,
    pub flags: Vec<SignalFlag>,
    pub suggestion: String,
}

pub fn momentum_signal(snap: &IndicatorSnapshot, th: &MomentumThresholds) -> MomentumSignal {
    let mut flags = Vec::new();

    if snap.change_pct_1d >= th.daily_move_pct {
        flags.push(SignalFlag::DailySurge);
    } else if snap.change_pct_1d <= -th.daily_move_pct {
        flags.push(SignalFlag::DailyDrop);
    }

    if snap.change_pct_5d >= th.weekly_move_pct {
        flags.push(SignalFlag::WeeklyRally);
    } else if snap.change_pct_5d <= -th.weekly_move_pct {
        flags.push(SignalFlag::WeeklySlide);
    }

    if snap.rsi14 >= th.rsi_overbought {
        flags.push(SignalFlag::Overbought);
    } else if snap.rsi14 <= th.rsi_oversold {
        flags.push(SignalFlag::Oversold);
    }

    if snap.sma20 > 0.0 {
        let spread_pct = (snap.sma5 - snap.sma20) / snap.sma20 * 100.0;
        if spread_pct >= th.sma_divergence_pct {
            flags.push(SignalFlag::SmaBullishSpread);
        } else if spread_pct <= -th.sma_divergence_pct {
            flags.push(SignalFlag::SmaBearishSpread);
        }
    }

    let spike = snap.volume_ratio >= th.volume_spike_ratio;
    if spike {
        flags.push(SignalFlag::VolumeSpike);
    }

    let score: i32 = flags.iter().map(SignalFlag::vote).sum();
    let bias = match score {
        s if s > 0 => SignalBias::Bullish,
        s if s < 0 => SignalBias::Bearish,
        _ => SignalBias::Neutral,
    };

    let suggestion = match (bias, spike) {
        (SignalBias::Bullish, true) => format!(
            "WHALE ACCUMULATION on {}: {:.1}x volume behind an upside move, momentum long favored",
            snap.symbol, snap.volume_ratio
        ),
        (SignalBias::Bearish, true) => format!(
            "WHALE DISTRIBUTION on {}: {:.1}x volume behind a downside move, avoid longs",
            snap.symbol, snap.volume_ratio
        ),
        (SignalBias::Neutral, true) => format!(
            "VOLUME SPIKE on {} without direction, wait for confirmation",
            snap.symbol
        ),
        (SignalBias::Bullish, false) => format!("BULLISH momentum on {}, consider BUY", snap.symbol),
        (SignalBias::Bearish, false) => format!("BEARISH momentum on {}, consider SELL", snap.symbol),
        (SignalBias::Neutral, false) => format!("NEUTRAL on {}, no clear edge", snap.symbol),
    };

    MomentumSignal {
        bias,
        flags,
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magi_models::Trend;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot {
            symbol: "TSLA".to_string(),
            sma5: 200.0,
            sma20: 200.0,
            rsi14: 50.0,
            atr14: 6.0,
            change_pct_1d: 0.3,
            change_pct_5d: 1.0,
            change_pct_20d: 2.0,
            volume_ratio: 1.1,
            trend: Trend::Sideways,
        }
    }

    #[test]
    fn quiet_tape_is_neutral() {
        let signal = momentum_signal(&snapshot(), &MomentumThresholds::default());
        assert_eq!(signal.bias, SignalBias::Neutral);
        assert!(signal.flags.is_empty());
        assert!(signal.suggestion.starts_with("NEUTRAL"));
    }

    #[test]
    fn whale_accumulation() {
        let snap = IndicatorSnapshot {
            change_pct_1d: 2.5,
            change_pct_5d: 6.0,
            sma5: 210.0,
            volume_ratio: 3.4,
            ..snapshot()
        };
        let signal = momentum_signal(&snap, &MomentumThresholds::default());
        assert_eq!(signal.bias, SignalBias::Bullish);
        assert!(signal.flags.contains(&SignalFlag::DailySurge));
        assert!(signal.flags.contains(&SignalFlag::WeeklyRally));
        assert!(signal.flags.contains(&SignalFlag::SmaBullishSpread));
        assert!(signal.flags.contains(&SignalFlag::VolumeSpike));
        assert!(signal.suggestion.starts_with("WHALE ACCUMULATION"));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let snap = IndicatorSnapshot {
            change_pct_1d: -2.0,
            rsi14: 70.0,
            ..snapshot()
        };
        let signal = momentum_signal(&snap, &MomentumThresholds::default());
        assert_eq!(signal.flags, vec![SignalFlag::DailyDrop, SignalFlag::Overbought]);
        assert_eq!(signal.bias, SignalBias::Bearish);
    }

    #[test]
    fn oversold_counts_bullish() {
        let snap = IndicatorSnapshot {
            rsi14: 25.0,
            ..snapshot()
        };
        let signal = momentum_signal(&snap, &MomentumThresholds::default());
        assert_eq!(signal.bias, SignalBias::Bullish);
        assert_eq!(signal.flags, vec![SignalFlag::Oversold]);
    }
}
