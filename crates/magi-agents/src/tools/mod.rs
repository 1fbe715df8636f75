//! The tools the model can call, and the single place their arguments are
//! validated before touching a collaborator.

pub mod analysis;
pub mod args;
pub mod catalogue;
pub mod guard;
pub mod market;
pub mod orders;

use std::sync::Arc;
use std::time::Duration;

use magi_indicators::MomentumThresholds;
use magi_models::{AnalysisRecord, GuardConfig, Side, ToolDescriptor, TradeRecord};
use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::collaborators::{Brokerage, StatsSource};
use crate::context::SessionContext;

pub use catalogue::{tool_catalogue, ToolKind};
pub use guard::{evaluate_guard, GuardVerdict};
pub use orders::FillPolling;

/// A tool failure, always returned to the model as data.
#[derive(Error, Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("{side} orders blocked: win rate {win_rate:.2} over {wins} wins and {losses} losses")]
    DirectionBlocked {
        side: Side,
        win_rate: f64,
        wins: u32,
        losses: u32,
    },

    #[error("upstream failure: {message}")]
    UpstreamFailure { message: String },
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        ToolError::UpstreamFailure {
            message: message.into(),
        }
    }

    /// The `ToolResult` payload the model sees.
    pub fn to_payload(&self) -> Value {
        let detail = serde_json::to_value(self).unwrap_or(Value::Null);
        json!({
            "error": detail,
            "message": self.to_string(),
        })
    }
}

/// Side effect of a successful tool call that the loop must record.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    None,
    Trade(TradeRecord),
    Analysis(AnalysisRecord),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub payload: Value,
    pub effect: ToolEffect,
}

impl ToolOutput {
    pub fn data(payload: Value) -> Self {
        Self {
            payload,
            effect: ToolEffect::None,
        }
    }
}

pub struct ToolRegistry {
    catalogue: Vec<ToolDescriptor>,
    broker: Arc<dyn Brokerage>,
    stats: Arc<dyn StatsSource>,
    guard: GuardConfig,
    fill_polling: FillPolling,
    bars_lookback: u32,
    momentum: MomentumThresholds,
}

impl ToolRegistry {
    pub fn new(broker: Arc<dyn Brokerage>, stats: Arc<dyn StatsSource>) -> Self {
        Self {
            catalogue: tool_catalogue(),
            broker,
            stats,
            guard: GuardConfig::default(),
            fill_polling: FillPolling::default(),
            bars_lookback: 30,
            momentum: MomentumThresholds::default(),
        }
    }

    pub fn with_guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    pub fn with_fill_polling(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.fill_polling = FillPolling {
            interval,
            max_attempts,
        };
        self
    }

    pub fn with_bars_lookback(mut self, bars_lookback: u32) -> Self {
        self.bars_lookback = bars_lookback;
        self
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.catalogue
    }

    pub async fn dispatch(
        &self,
        ctx: &SessionContext,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ToolOutput, ToolError> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        debug!(tool = name, "Dispatching tool call");

        let result = match kind {
            ToolKind::GetPrice => market::get_price(self.broker.as_ref(), arguments).await,
            ToolKind::GetAccount => market::get_account(self.broker.as_ref(), ctx).await,
            ToolKind::GetPositions => market::get_positions(self.broker.as_ref()).await,
            ToolKind::GetIndicators => {
                market::get_indicators(
                    self.broker.as_ref(),
                    arguments,
                    self.bars_lookback,
                    &self.momentum,
                )
                .await
            }
            ToolKind::PlaceOrder => {
                orders::place_order(
                    orders::OrderDeps {
                        broker: self.broker.as_ref(),
                        stats: self.stats.as_ref(),
                        guard: &self.guard,
                        fill_polling: self.fill_polling,
                        bars_lookback: self.bars_lookback,
                    },
                    ctx,
                    arguments,
                )
                .await
            }
            ToolKind::LogAnalysis => analysis::log_analysis(ctx, arguments),
        };

        if let Err(e) = &result {
            warn!(tool = name, error = %e, "Tool call failed");
        }
        result
    }
}
