//! Ledger repair jobs: fill in ATR for trades logged without one, and
//! rescore every evaluated trade under the current multipliers.

use chrono::{DateTime, Utc};
use magi_agents::Brokerage;
use magi_indicators::{atr, classify_outcome, return_pct, OutcomeThresholds};
use magi_models::EvaluationConfig;
use magi_store::{EvaluatedTrade, PendingTrade, SqliteStore, StoreError};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::evaluate::EvaluationSummary;

const ATR_PERIOD: usize = 14;

/// Daily bars are fetched back this far past the trade date.
const ATR_WINDOW_DAYS: i64 = 40;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillSummary {
    pub candidates: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Bars needed so the window ending at `recorded_at` is still covered.
fn bars_limit(recorded_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now - recorded_at).num_days().max(0) + ATR_WINDOW_DAYS;
    u32::try_from(days).unwrap_or(u32::MAX)
}

/// Compute the 14-period ATR as of each trade's own date and store it.
///
/// Bars after the trade are ignored, so the value matches what would have
/// been recorded at execution. Trades without enough history are skipped.
pub async fn backfill_atr(
    store: &SqliteStore,
    broker: &dyn Brokerage,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<BackfillSummary, StoreError> {
    let candidates = store.trades_missing_atr(limit)?;
    let mut summary = BackfillSummary {
        candidates: candidates.len(),
        ..Default::default()
    };

    for PendingTrade { row_id, trade } in candidates {
        let bars = match broker
            .get_daily_bars(&trade.symbol, bars_limit(trade.recorded_at, now))
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                warn!(row_id, symbol = %trade.symbol, error = %e, "Bars unavailable");
                summary.skipped += 1;
                continue;
            }
        };
        let cutoff = trade.recorded_at.date_naive();
        let history: Vec<_> = bars
            .into_iter()
            .filter(|b| b.timestamp.date_naive() <= cutoff)
            .collect();

        match atr(&history, ATR_PERIOD) {
            Ok(value) if value > 0.0 => {
                store.set_trade_atr(row_id, value)?;
                info!(row_id, symbol = %trade.symbol, atr = value, "ATR backfilled");
                summary.updated += 1;
            }
            Ok(_) => {
                debug!(row_id, symbol = %trade.symbol, "Zero ATR, skipping");
                summary.skipped += 1;
            }
            Err(e) => {
                debug!(row_id, symbol = %trade.symbol, error = %e, "Not enough history");
                summary.skipped += 1;
            }
        }
    }

    Ok(summary)
}

/// Rescore every trade that already has an exit price, overwriting its
/// previous result. Exit prices are reused, so no quotes are fetched.
pub fn reevaluate_all(
    store: &SqliteStore,
    config: &EvaluationConfig,
) -> Result<EvaluationSummary, StoreError> {
    let trades = store.evaluated_trades()?;
    let thresholds = OutcomeThresholds {
        win_atr_multiplier: config.win_atr_multiplier,
        lose_atr_multiplier: config.lose_atr_multiplier,
    };
    let mut summary = EvaluationSummary {
        pending: trades.len(),
        ..Default::default()
    };

    for EvaluatedTrade {
        row_id,
        trade,
        exit_price,
    } in trades
    {
        let (Some(entry), Some(atr)) = (trade.filled_price, trade.atr_at_execution) else {
            summary.skipped += 1;
            continue;
        };
        let entry_f = entry.to_f64().unwrap_or(0.0);
        let exit_f = exit_price.to_f64().unwrap_or(0.0);
        let Some(outcome) = classify_outcome(trade.side, entry_f, exit_f, atr, &thresholds) else {
            summary.skipped += 1;
            continue;
        };
        store.record_outcome(row_id, outcome, return_pct(entry_f, exit_f), exit_price)?;
        summary.count(outcome);
    }

    info!(
        rescored = summary.evaluated(),
        skipped = summary.skipped,
        "Re-evaluation complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_grows_with_trade_age() {
        let now = Utc::now();
        assert_eq!(bars_limit(now, now), 40);
        assert_eq!(bars_limit(now - Duration::days(10), now), 50);
        assert_eq!(bars_limit(now + Duration::days(3), now), 40);
    }
}
