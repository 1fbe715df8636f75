use magi_models::{Side, TradeOutcome};

/// ATR multiples that separate a win or a loss from noise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutcomeThresholds {
    pub win_atr_multiplier: f64,
    pub lose_atr_multiplier: f64,
}

impl Default for OutcomeThresholds {
    fn default() -> Self {
        Self {
            win_atr_multiplier: 2.0,
            lose_atr_multiplier: 1.5,
        }
    }
}

/// Classify a closed trade relative to the volatility at entry.
///
/// Returns `None` when entry price or ATR is not positive.
pub fn classify_outcome(
    side: Side,
    entry: f64,
    exit: f64,
    atr_at_execution: f64,
    th: &OutcomeThresholds,
) -> Option<TradeOutcome> {
    if entry <= 0.0 || atr_at_execution <= 0.0 {
        return None;
    }
    let pnl = match side {
        Side::Buy => exit - entry,
        Side::Sell => entry - exit,
    };
    let outcome = if pnl >= atr_at_execution * th.win_atr_multiplier {
        TradeOutcome::Win
    } else if pnl <= -(atr_at_execution * th.lose_atr_multiplier) {
        TradeOutcome::Lose
    } else {
        TradeOutcome::Hold
    };
    Some(outcome)
}

/// Price return in percent, rounded to two decimals. Side-agnostic.
pub fn return_pct(entry: f64, exit: f64) -> Option<f64> {
    if entry <= 0.0 {
        return None;
    }
    Some(((exit - entry) / entry * 100.0 * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_outcomes() {
        let th = OutcomeThresholds::default();
        assert_eq!(classify_outcome(Side::Buy, 100.0, 104.0, 2.0, &th), Some(TradeOutcome::Win));
        assert_eq!(classify_outcome(Side::Buy, 100.0, 97.0, 2.0, &th), Some(TradeOutcome::Lose));
        assert_eq!(classify_outcome(Side::Buy, 100.0, 101.0, 2.0, &th), Some(TradeOutcome::Hold));
    }

    #[test]
    fn sell_mirrors_sign() {
        let th = OutcomeThresholds::default();
        assert_eq!(classify_outcome(Side::Sell, 100.0, 96.0, 2.0, &th), Some(TradeOutcome::Win));
        assert_eq!(classify_outcome(Side::Sell, 100.0, 103.0, 2.0, &th), Some(TradeOutcome::Lose));
    }

    #[test]
    fn unusable_inputs() {
        let th = OutcomeThresholds::default();
        assert_eq!(classify_outcome(Side::Buy, 100.0, 110.0, 0.0, &th), None);
        assert_eq!(classify_outcome(Side::Buy, 0.0, 110.0, 2.0, &th), None);
        assert_eq!(return_pct(0.0, 1.0), None);
    }

    #[test]
    fn return_pct_rounds() {
        assert_eq!(return_pct(150.0, 151.2345), Some(0.82));
        assert_eq!(return_pct(100.0, 90.0), Some(-10.0));
    }
}
