use magi_indicators::{compute_snapshot, momentum_signal, IndicatorError, MomentumThresholds};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;

use super::args::{required_symbol, Args};
use super::{ToolError, ToolOutput};
use crate::collaborators::Brokerage;
use crate::context::SessionContext;

pub async fn get_price(broker: &dyn Brokerage, args: &Args) -> Result<ToolOutput, ToolError> {
    let symbol = required_symbol(args)?;
    let quote = broker
        .get_quote(&symbol)
        .await
        .map_err(|e| ToolError::upstream(format!("quote for {symbol}: {e}")))?;
    Ok(ToolOutput::data(json!({
        "symbol": quote.symbol,
        "price": quote.price,
    })))
}

/// Account figures plus the slice of equity this provider may trade with.
pub async fn get_account(
    broker: &dyn Brokerage,
    ctx: &SessionContext,
) -> Result<ToolOutput, ToolError> {
    let account = broker
        .get_account()
        .await
        .map_err(|e| ToolError::upstream(format!("account: {e}")))?;
    let share = Decimal::from_f64(ctx.allocation_share).unwrap_or(Decimal::ZERO);
    let budget = (account.equity * share).round_dp(2);
    Ok(ToolOutput::data(json!({
        "equity": account.equity,
        "cash": account.cash,
        "buying_power": account.buying_power,
        "allocation_share": ctx.allocation_share,
        "budget": budget,
        "mode": ctx.mode,
    })))
}

pub async fn get_positions(broker: &dyn Brokerage) -> Result<ToolOutput, ToolError> {
    let positions = broker
        .get_positions()
        .await
        .map_err(|e| ToolError::upstream(format!("positions: {e}")))?;
    Ok(ToolOutput::data(json!({
        "count": positions.len(),
        "positions": positions,
    })))
}

/// Snapshot and momentum signal from recent daily bars.
///
/// A window too short for the snapshot is reported to the model as
/// `insufficient_data`, not as an error.
pub async fn get_indicators(
    broker: &dyn Brokerage,
    args: &Args,
    bars_lookback: u32,
    thresholds: &MomentumThresholds,
) -> Result<ToolOutput, ToolError> {
    let symbol = required_symbol(args)?;
    let bars = broker
        .get_daily_bars(&symbol, bars_lookback)
        .await
        .map_err(|e| ToolError::upstream(format!("bars for {symbol}: {e}")))?;

    match compute_snapshot(&symbol, &bars) {
        Ok(snapshot) => {
            let signal = momentum_signal(&snapshot, thresholds);
            Ok(ToolOutput::data(json!({
                "symbol": symbol,
                "status": "ok",
                "indicators": snapshot,
                "signal": signal,
            })))
        }
        Err(e @ IndicatorError::InsufficientData { .. }) => Ok(ToolOutput::data(json!({
            "symbol": symbol,
            "status": "insufficient_data",
            "message": e.to_string(),
        }))),
        Err(e) => Err(ToolError::upstream(format!("indicators for {symbol}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{daily_bars, MockBrokerage};
    use magi_models::{ProviderKind, Session, TradeMode};
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn symbol_args(symbol: &str) -> Args {
        let mut args = Args::new();
        args.insert("symbol".into(), Value::String(symbol.into()));
        args
    }

    #[tokio::test]
    async fn price_is_uppercased_and_returned() {
        let broker = MockBrokerage::new().with_quote("MSFT", dec!(410.25));
        let out = get_price(&broker, &symbol_args("msft")).await.unwrap();
        assert_eq!(out.payload["symbol"], "MSFT");
        assert_eq!(out.payload["price"], "410.25");
    }

    #[tokio::test]
    async fn missing_quote_is_upstream_failure() {
        let broker = MockBrokerage::new();
        let err = get_price(&broker, &symbol_args("ZZZ")).await.unwrap_err();
        assert!(matches!(err, ToolError::UpstreamFailure { .. }));
    }

    #[tokio::test]
    async fn account_reports_budget() {
        let broker = MockBrokerage::new();
        let session = Session::open("gemini", TradeMode::Paper, dec!(0));
        let ctx = SessionContext::new(&session, ProviderKind::Gemini, 0.25, vec![]);
        let out = get_account(&broker, &ctx).await.unwrap();
        assert_eq!(out.payload["budget"], "25000.00");
        assert_eq!(out.payload["mode"], "paper");
    }

    #[tokio::test]
    async fn indicators_report_short_history() {
        let broker = MockBrokerage::new().with_bars("AMD", daily_bars(&[100.0; 10]));
        let out = get_indicators(&broker, &symbol_args("AMD"), 30, &MomentumThresholds::default())
            .await
            .unwrap();
        assert_eq!(out.payload["status"], "insufficient_data");
    }

    #[tokio::test]
    async fn indicators_on_full_history() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let broker = MockBrokerage::new().with_bars("NVDA", daily_bars(&closes));
        let out = get_indicators(&broker, &symbol_args("NVDA"), 30, &MomentumThresholds::default())
            .await
            .unwrap();
        assert_eq!(out.payload["status"], "ok");
        assert_eq!(out.payload["indicators"]["sma5"], 127.0);
        assert!(out.payload["signal"]["suggestion"].is_string());
    }
}
