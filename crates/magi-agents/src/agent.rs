use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use magi_models::{Conversation, Message, ProviderResponse, Session, TradeRecord, Usage};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::collaborators::{notify_best_effort, Brokerage, Notifier};
use crate::context::SessionContext;
use crate::error::AgentError;
use crate::ledger::{SessionLedger, TurnMetrics};
use crate::prompts::NUDGE_MESSAGE;
use crate::providers::{fresh_call_id, ChatProvider};
use crate::tools::{ToolEffect, ToolRegistry};
use crate::transport::RetryingTransport;

/// Where the loop is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingResponse,
    HasToolCalls,
    NoToolCalls,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Done,
    Failed { reason: String },
}

impl LoopOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, LoopOutcome::Failed { .. })
    }

    pub fn state(&self) -> LoopState {
        match self {
            LoopOutcome::Done => LoopState::Done,
            LoopOutcome::Failed { .. } => LoopState::Failed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopReport {
    pub outcome: LoopOutcome,
    pub turns: u32,
    pub trades: u32,
    pub usage: Usage,
    pub cost_usd: f64,
    pub session: Session,
    pub conversation: Conversation,
}

/// Mutable state owned by one run.
struct RunState {
    conversation: Conversation,
    turns: u32,
    trades: u32,
    usage: Usage,
    cost_usd: f64,
}

/// Drives one provider through one trading session.
pub struct AgentLoop {
    provider: Arc<dyn ChatProvider>,
    transport: RetryingTransport,
    registry: ToolRegistry,
    ledger: SessionLedger,
    broker: Arc<dyn Brokerage>,
    notifier: Arc<dyn Notifier>,
    max_turns: u32,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        registry: ToolRegistry,
        ledger: SessionLedger,
        broker: Arc<dyn Brokerage>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            provider,
            transport: RetryingTransport::default(),
            registry,
            ledger,
            broker,
            notifier,
            max_turns: 8,
        }
    }

    pub fn with_transport(mut self, transport: RetryingTransport) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Run to completion. Finalization (closing the session and the final
    /// notification) happens exactly once, whatever the outcome.
    pub async fn run(
        &self,
        session: Session,
        ctx: &SessionContext,
        conversation: Conversation,
    ) -> LoopReport {
        let mut state = RunState {
            conversation,
            turns: 0,
            trades: 0,
            usage: Usage::default(),
            cost_usd: 0.0,
        };

        let outcome = match self.drive(ctx, &mut state).await {
            Ok(()) => LoopOutcome::Done,
            Err(e) => {
                error!(
                    session_id = %ctx.session_id,
                    provider = ctx.provider_id(),
                    turn = state.turns,
                    error = %e,
                    "Agent loop failed"
                );
                LoopOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        let session = self.finalize(session, ctx, &outcome, &state).await;

        LoopReport {
            outcome,
            turns: state.turns,
            trades: state.trades,
            usage: state.usage,
            cost_usd: state.cost_usd,
            session,
            conversation: state.conversation,
        }
    }

    async fn drive(&self, ctx: &SessionContext, state: &mut RunState) -> Result<(), AgentError> {
        for turn in 1..=self.max_turns {
            state.turns = turn;
            debug!(turn, state = ?LoopState::AwaitingResponse, "Requesting turn");

            let started = Instant::now();
            let response = self
                .transport
                .send(
                    self.provider.as_ref(),
                    state.conversation.messages(),
                    self.registry.descriptors(),
                )
                .await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            self.account_turn(ctx, state, turn, response.usage, elapsed_ms).await;

            let response = dedupe_call_ids(&state.conversation, response);
            let calls = response.tool_calls.clone();
            let (message, _) = response.into_message();
            state.conversation.push(message)?;

            if calls.is_empty() {
                debug!(turn, state = ?LoopState::NoToolCalls, trades = state.trades, "No tool calls");
                if state.trades == 0 && turn < self.max_turns {
                    state.conversation.push(Message::user(NUDGE_MESSAGE))?;
                    continue;
                }
                return Ok(());
            }

            debug!(turn, state = ?LoopState::HasToolCalls, calls = calls.len(), "Dispatching tool calls");
            for call in calls {
                let payload = match self.registry.dispatch(ctx, &call.name, &call.arguments).await {
                    Ok(output) => {
                        match output.effect {
                            ToolEffect::Trade(record) => {
                                state.trades += 1;
                                self.ledger.record_trade(&record).await;
                                notify_best_effort(self.notifier.as_ref(), &trade_notice(&record)).await;
                            }
                            ToolEffect::Analysis(record) => {
                                self.ledger.record_analysis(&record).await;
                            }
                            ToolEffect::None => {}
                        }
                        output.payload
                    }
                    Err(e) => e.to_payload(),
                };
                state
                    .conversation
                    .push(Message::tool_result(call.id, call.name, payload))?;
            }
        }

        info!(
            max_turns = self.max_turns,
            trades = state.trades,
            "Turn budget exhausted"
        );
        Ok(())
    }

    async fn account_turn(
        &self,
        ctx: &SessionContext,
        state: &mut RunState,
        turn: u32,
        usage: Usage,
        elapsed_ms: u64,
    ) {
        let cost = self.provider.estimate_cost(usage);
        state.usage.add(usage);
        state.cost_usd += cost;

        let metrics = TurnMetrics::new(
            ctx.session_id,
            self.provider.vendor(),
            self.provider.model(),
            turn,
            usage,
            elapsed_ms,
            cost,
        );
        self.ledger.record_metrics(&metrics).await;
    }

    async fn finalize(
        &self,
        session: Session,
        ctx: &SessionContext,
        outcome: &LoopOutcome,
        state: &RunState,
    ) -> Session {
        let ending_equity_share = match self.broker.get_account().await {
            Ok(account) => Decimal::from_f64(ctx.allocation_share)
                .map(|share| (account.equity * share).round_dp(2)),
            Err(e) => {
                warn!(error = %e, "Could not read ending equity");
                None
            }
        };

        let closed = self.ledger.close_session(session, ending_equity_share).await;

        info!(
            session_id = %closed.id,
            provider = ctx.provider_id(),
            outcome = ?outcome.state(),
            turns = state.turns,
            trades = state.trades,
            input_units = state.usage.input_units,
            output_units = state.usage.output_units,
            cost_usd = state.cost_usd,
            "Session closed"
        );

        let text = final_notice(ctx, &closed, outcome, state);
        notify_best_effort(self.notifier.as_ref(), &text).await;
        closed
    }
}

/// Replace call ids the conversation has already seen, or that repeat
/// within the response, so results stay addressable.
fn dedupe_call_ids(conversation: &Conversation, mut response: ProviderResponse) -> ProviderResponse {
    let mut seen = HashSet::new();
    for call in &mut response.tool_calls {
        if conversation.find_call(&call.id).is_some() || !seen.insert(call.id.clone()) {
            let replacement = fresh_call_id();
            warn!(old = %call.id, new = %replacement, "Duplicate tool call id reassigned");
            call.id = replacement.clone();
            seen.insert(replacement);
        }
    }
    response
}

fn trade_notice(record: &TradeRecord) -> String {
    let price = record
        .filled_price
        .map(|p| format!(" @ {p}"))
        .unwrap_or_default();
    format!(
        "[{}] {} {} {}{} ({})",
        record.provider_id.to_uppercase(),
        record.side.as_str().to_uppercase(),
        record.qty,
        record.symbol,
        price,
        record.mode
    )
}

fn final_notice(
    ctx: &SessionContext,
    session: &Session,
    outcome: &LoopOutcome,
    state: &RunState,
) -> String {
    let status = match outcome {
        LoopOutcome::Done => "completed".to_string(),
        LoopOutcome::Failed { reason } => format!("FAILED: {reason}"),
    };
    let ending = session
        .ending_equity_share
        .map(|e| e.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "[{}] session {} {} | turns {} | trades {} | equity share {} -> {} | cost ${:.4}",
        ctx.provider_id().to_uppercase(),
        session.id,
        status,
        state.turns,
        state.trades,
        session.starting_equity_share,
        ending,
        state.cost_usd
    )
}
