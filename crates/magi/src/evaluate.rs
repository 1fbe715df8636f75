//! Scores aged trades against the current price. The results feed the
//! direction guard and the per-symbol history in the kickoff prompt.

use chrono::{DateTime, Duration, Utc};
use magi_agents::Brokerage;
use magi_indicators::{classify_outcome, return_pct, OutcomeThresholds};
use magi_models::{EvaluationConfig, TradeOutcome};
use magi_store::{PendingTrade, SqliteStore, StoreError};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EvaluationSummary {
    pub pending: usize,
    pub wins: usize,
    pub losses: usize,
    pub holds: usize,
    pub skipped: usize,
}

impl EvaluationSummary {
    pub fn evaluated(&self) -> usize {
        self.wins + self.losses + self.holds
    }

    pub(crate) fn count(&mut self, outcome: TradeOutcome) {
        match outcome {
            TradeOutcome::Win => self.wins += 1,
            TradeOutcome::Lose => self.losses += 1,
            TradeOutcome::Hold => self.holds += 1,
        }
    }
}

/// Evaluate every unscored trade recorded at least `min_age_hours` before `now`.
///
/// Trades without a fill price or a positive ATR are left unscored, as are
/// trades whose symbol cannot be quoted right now.
pub async fn evaluate_pending(
    store: &SqliteStore,
    broker: &dyn Brokerage,
    config: &EvaluationConfig,
    now: DateTime<Utc>,
) -> Result<EvaluationSummary, StoreError> {
    let cutoff = now - Duration::hours(config.min_age_hours);
    let pending = store.pending_evaluations(cutoff)?;
    let thresholds = OutcomeThresholds {
        win_atr_multiplier: config.win_atr_multiplier,
        lose_atr_multiplier: config.lose_atr_multiplier,
    };

    let mut summary = EvaluationSummary {
        pending: pending.len(),
        ..Default::default()
    };

    for PendingTrade { row_id, trade } in pending {
        let (Some(entry), Some(atr)) = (trade.filled_price, trade.atr_at_execution) else {
            debug!(row_id, symbol = %trade.symbol, "Missing fill price or ATR");
            summary.skipped += 1;
            continue;
        };
        let exit = match broker.get_quote(&trade.symbol).await {
            Ok(quote) => quote.price,
            Err(e) => {
                warn!(row_id, symbol = %trade.symbol, error = %e, "Quote unavailable, leaving trade pending");
                summary.skipped += 1;
                continue;
            }
        };

        let entry_f = entry.to_f64().unwrap_or(0.0);
        let exit_f = exit.to_f64().unwrap_or(0.0);
        let Some(outcome) = classify_outcome(trade.side, entry_f, exit_f, atr, &thresholds) else {
            summary.skipped += 1;
            continue;
        };

        store.record_outcome(row_id, outcome, return_pct(entry_f, exit_f), exit)?;
        info!(
            row_id,
            symbol = %trade.symbol,
            side = trade.side.as_str(),
            outcome = outcome.as_str(),
            "Trade evaluated"
        );
        summary.count(outcome);
    }

    Ok(summary)
}
