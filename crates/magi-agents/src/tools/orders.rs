use std::time::Duration;

use chrono::Utc;
use magi_indicators::atr;
use magi_models::{GuardConfig, Side, TradeRecord};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{debug, info, warn};

use super::args::{optional_str, required_qty, required_side, required_symbol, Args};
use super::guard::{evaluate_guard, GuardVerdict};
use super::{ToolEffect, ToolError, ToolOutput};
use crate::collaborators::{Brokerage, StatsSource};
use crate::context::SessionContext;

const ATR_PERIOD: usize = 14;

/// Bounded wait for a fill price after an order is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillPolling {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for FillPolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            max_attempts: 10,
        }
    }
}

pub(crate) struct OrderDeps<'a> {
    pub broker: &'a dyn Brokerage,
    pub stats: &'a dyn StatsSource,
    pub guard: &'a GuardConfig,
    pub fill_polling: FillPolling,
    pub bars_lookback: u32,
}

struct OrderRequest {
    symbol: String,
    side: Side,
    qty: Decimal,
    reason: String,
}

impl OrderRequest {
    /// All required fields are checked before any collaborator is called.
    fn from_args(args: &Args) -> Result<Self, ToolError> {
        Ok(Self {
            symbol: required_symbol(args)?,
            side: required_side(args)?,
            qty: required_qty(args)?,
            reason: optional_str(args, "reason").unwrap_or_default(),
        })
    }
}

pub(crate) async fn place_order(
    deps: OrderDeps<'_>,
    ctx: &SessionContext,
    args: &Args,
) -> Result<ToolOutput, ToolError> {
    let order = OrderRequest::from_args(args)?;

    check_direction(deps.stats, deps.guard, ctx.provider_id(), order.side).await?;

    let atr_at_execution = atr_at_execution(deps.broker, &order.symbol, deps.bars_lookback).await;

    let ack = deps
        .broker
        .place_order(&order.symbol, order.qty, order.side)
        .await
        .map_err(|e| ToolError::upstream(format!("order for {}: {e}", order.symbol)))?;

    let order_id = match ack.order_id.filter(|id| !id.trim().is_empty()) {
        Some(id) => id,
        None => {
            return Err(ToolError::upstream(format!(
                "brokerage returned no order id for {} {} {}",
                order.side, order.qty, order.symbol
            )));
        }
    };

    let filled_price = match ack.filled_price {
        Some(price) => Some(price),
        None => resolve_fill_price(deps.broker, &order_id, &order.symbol, deps.fill_polling).await,
    };

    info!(
        order_id = %order_id,
        symbol = %order.symbol,
        side = %order.side,
        qty = %order.qty,
        filled_price = ?filled_price,
        "Order placed"
    );

    let record = TradeRecord {
        session_id: ctx.session_id,
        order_id: order_id.clone(),
        symbol: order.symbol.clone(),
        side: order.side,
        qty: order.qty,
        filled_price,
        reason: order.reason,
        provider_id: ctx.provider_id().to_string(),
        mode: ctx.mode,
        atr_at_execution,
        recorded_at: Utc::now(),
    };

    Ok(ToolOutput {
        payload: json!({
            "status": "placed",
            "order_id": order_id,
            "symbol": order.symbol,
            "side": order.side,
            "qty": order.qty,
            "filled_price": filled_price,
        }),
        effect: ToolEffect::Trade(record),
    })
}

/// Recomputed from current aggregates on every order. A stats outage
/// lets the order through.
async fn check_direction(
    stats: &dyn StatsSource,
    guard: &GuardConfig,
    provider_id: &str,
    side: Side,
) -> Result<(), ToolError> {
    if !guard.enabled {
        return Ok(());
    }
    let direction = match stats.direction_stats(provider_id, side).await {
        Ok(direction) => direction,
        Err(e) => {
            warn!(provider = provider_id, side = %side, error = %e, "Direction stats unavailable, allowing order");
            return Ok(());
        }
    };

    match evaluate_guard(&direction, guard) {
        GuardVerdict::Allow => Ok(()),
        GuardVerdict::Block { win_rate } => {
            warn!(
                provider = provider_id,
                side = %side,
                win_rate,
                wins = direction.wins,
                losses = direction.losses,
                "Direction blocked"
            );
            Err(ToolError::DirectionBlocked {
                side,
                win_rate,
                wins: direction.wins,
                losses: direction.losses,
            })
        }
    }
}

async fn atr_at_execution(broker: &dyn Brokerage, symbol: &str, bars_lookback: u32) -> Option<f64> {
    let bars = match broker.get_daily_bars(symbol, bars_lookback).await {
        Ok(bars) => bars,
        Err(e) => {
            debug!(symbol, error = %e, "No bars for ATR at execution");
            return None;
        }
    };
    atr(&bars, ATR_PERIOD).ok()
}

/// Poll the order until it reports a fill price, then fall back to the
/// latest quote, then to nothing.
pub async fn resolve_fill_price(
    broker: &dyn Brokerage,
    order_id: &str,
    symbol: &str,
    polling: FillPolling,
) -> Option<Decimal> {
    for attempt in 1..=polling.max_attempts {
        tokio::time::sleep(polling.interval).await;
        match broker.get_order_status(order_id).await {
            Ok(status) => {
                if let Some(price) = status.filled_price {
                    debug!(order_id, attempt, %price, "Fill price resolved");
                    return Some(price);
                }
            }
            Err(e) => debug!(order_id, attempt, error = %e, "Order status poll failed"),
        }
    }

    match broker.get_quote(symbol).await {
        Ok(quote) => {
            warn!(order_id, symbol, "No fill price after polling, using latest quote");
            Some(quote.price)
        }
        Err(e) => {
            warn!(order_id, symbol, error = %e, "No fill price or quote, recording without price");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{daily_bars, MemoryStore, MockBrokerage};
    use magi_models::{ProviderKind, Session, TradeMode};
    use rust_decimal_macros::dec;
    use serde_json::Value;

    fn ctx() -> SessionContext {
        let session = Session::open("groq", TradeMode::Paper, dec!(50000));
        SessionContext::new(&session, ProviderKind::Groq, 0.5, vec!["AAPL".into()])
    }

    fn order_args(symbol: &str, side: &str, qty: Value) -> Args {
        let mut args = Args::new();
        args.insert("symbol".into(), Value::String(symbol.into()));
        args.insert("side".into(), Value::String(side.into()));
        args.insert("qty".into(), qty);
        args
    }

    fn instant() -> FillPolling {
        FillPolling {
            interval: Duration::ZERO,
            max_attempts: 3,
        }
    }

    async fn run(broker: &MockBrokerage, store: &MemoryStore, args: &Args) -> Result<ToolOutput, ToolError> {
        let guard = GuardConfig::default();
        let deps = OrderDeps {
            broker,
            stats: store,
            guard: &guard,
            fill_polling: instant(),
            bars_lookback: 30,
        };
        place_order(deps, &ctx(), args).await
    }

    #[tokio::test]
    async fn fill_from_polling_with_atr() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let broker = MockBrokerage::new()
            .with_quote("AAPL", dec!(190))
            .with_bars("AAPL", daily_bars(&closes))
            .with_fill_after_polls(2, dec!(189.5));
        let store = MemoryStore::new();

        let out = run(&broker, &store, &order_args("aapl", "buy", Value::from(5))).await.unwrap();
        let ToolEffect::Trade(record) = out.effect else {
            panic!("expected a trade effect");
        };
        assert_eq!(record.symbol, "AAPL");
        assert_eq!(record.qty, dec!(5));
        assert_eq!(record.filled_price, Some(dec!(189.5)));
        assert_eq!(record.provider_id, "groq");
        assert!(record.atr_at_execution.unwrap() > 0.0);
        assert_eq!(broker.status_polls(), 2);
        assert_eq!(out.payload["status"], "placed");
    }

    #[tokio::test]
    async fn falls_back_to_quote_then_null() {
        let broker = MockBrokerage::new().with_quote("AAPL", dec!(191.1));
        let store = MemoryStore::new();
        let out = run(&broker, &store, &order_args("AAPL", "sell", Value::from(1))).await.unwrap();
        let ToolEffect::Trade(record) = out.effect else {
            panic!("expected a trade effect");
        };
        assert_eq!(record.filled_price, Some(dec!(191.1)));
        assert_eq!(record.atr_at_execution, None);
        assert_eq!(broker.status_polls(), 3);

        let no_quote = MockBrokerage::new();
        let out = run(&no_quote, &store, &order_args("MSFT", "buy", Value::from(1))).await.unwrap();
        let ToolEffect::Trade(record) = out.effect else {
            panic!("expected a trade effect");
        };
        assert_eq!(record.filled_price, None);
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_brokerage() {
        let broker = MockBrokerage::new();
        let store = MemoryStore::new();
        let mut missing_side = order_args("AAPL", "buy", Value::from(1));
        missing_side.remove("side");

        let err = run(&broker, &store, &missing_side).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        let err = run(&broker, &store, &order_args("AAPL", "buy", Value::from(0))).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
        assert_eq!(broker.orders_placed(), 0);
    }

    #[tokio::test]
    async fn missing_order_id_is_not_a_trade() {
        let broker = MockBrokerage::new().rejecting_orders();
        let store = MemoryStore::new();
        let err = run(&broker, &store, &order_args("AAPL", "buy", Value::from(1))).await.unwrap_err();
        assert!(matches!(err, ToolError::UpstreamFailure { .. }));
        assert_eq!(broker.orders_placed(), 1);
    }

    #[tokio::test]
    async fn stats_outage_allows_order() {
        let broker = MockBrokerage::new().with_quote("AAPL", dec!(190));
        let store = MemoryStore::new().failing_stats();
        assert!(run(&broker, &store, &order_args("AAPL", "buy", Value::from(1))).await.is_ok());
    }
}
