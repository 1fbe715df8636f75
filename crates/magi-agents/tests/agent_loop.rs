//! End-to-end runs of the agent loop against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use magi_agents::ledger::{ANALYSES_TABLE, METRICS_TABLE, SESSIONS_TABLE, TRADES_TABLE};
use magi_agents::prompts::NUDGE_MESSAGE;
use magi_agents::test_support::{
    args, MemoryStore, MockBrokerage, RecordingNotifier, ScriptedProvider,
};
use magi_agents::{
    AgentLoop, LoopOutcome, RetryPolicy, RetryingTransport, SessionContext, SessionLedger,
    ToolRegistry,
};
use magi_models::{
    Conversation, Message, ProviderKind, Session, Side, ToolCallRequest, TradeMode, Usage,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

struct Harness {
    provider: Arc<ScriptedProvider>,
    broker: Arc<MockBrokerage>,
    store: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new(script: Vec<Result<magi_models::ProviderResponse, magi_agents::ProviderError>>) -> Self {
        Self::with(script, MockBrokerage::new().with_quote("AAPL", dec!(187.20)), MemoryStore::new())
    }

    fn with(
        script: Vec<Result<magi_models::ProviderResponse, magi_agents::ProviderError>>,
        broker: MockBrokerage,
        store: MemoryStore,
    ) -> Self {
        Self {
            provider: Arc::new(ScriptedProvider::new(script)),
            broker: Arc::new(broker),
            store: Arc::new(store),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    async fn run(&self, max_turns: u32) -> magi_agents::LoopReport {
        let registry = ToolRegistry::new(self.broker.clone(), self.store.clone())
            .with_fill_polling(Duration::ZERO, 2);
        let agent = AgentLoop::new(
            self.provider.clone(),
            registry,
            SessionLedger::new(self.store.clone()),
            self.broker.clone(),
            self.notifier.clone(),
        )
        .with_transport(RetryingTransport::new(RetryPolicy {
            max_attempts: 3,
            delay: Duration::ZERO,
        }))
        .with_max_turns(max_turns);

        let session = Session::open("groq", TradeMode::Paper, dec!(50000));
        let ctx = SessionContext::new(
            &session,
            ProviderKind::Groq,
            0.5,
            vec!["AAPL".into(), "NVDA".into()],
        );
        let conversation = Conversation::seeded("persona", "kickoff");
        agent.run(session, &ctx, conversation).await
    }

    fn closed_session_rows(&self) -> usize {
        self.store
            .rows(SESSIONS_TABLE)
            .iter()
            .filter(|row| !row["ended_at"].is_null())
            .count()
    }
}

fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    let arguments = match arguments {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    ToolCallRequest::new(id, name, arguments)
}

fn buy_aapl(id: &str) -> ToolCallRequest {
    call(id, "place_order", json!({"symbol": "AAPL", "side": "buy", "qty": 2, "reason": "trend"}))
}

fn tool_results(conversation: &Conversation) -> Vec<(String, Value)> {
    conversation
        .messages()
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult {
                tool_call_id,
                payload,
                ..
            } => Some((tool_call_id.clone(), payload.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn two_calls_produce_ordered_results_and_one_trade() {
    let harness = Harness::new(vec![
        Ok(ScriptedProvider::calls(vec![
            call("c1", "get_price", json!({"symbol": "AAPL"})),
            buy_aapl("c2"),
        ])),
        Ok(ScriptedProvider::text("Bought AAPL.", Usage::new(50, 5))),
    ]);

    let report = harness.run(8).await;

    assert_eq!(report.outcome, LoopOutcome::Done);
    assert_eq!(report.turns, 2);
    assert_eq!(report.trades, 1);

    let results = tool_results(&report.conversation);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "c1");
    assert_eq!(results[0].1["price"], "187.20");
    assert_eq!(results[1].0, "c2");
    assert_eq!(results[1].1["order_id"], "order-1");

    // system, user, assistant, tool, tool, assistant
    assert_eq!(report.conversation.len(), 6);
    assert_eq!(harness.broker.orders_placed(), 1);
    assert_eq!(harness.store.rows(TRADES_TABLE).len(), 1);
    assert_eq!(harness.store.rows(TRADES_TABLE)[0]["filled_price"], "187.20");
    assert_eq!(harness.store.rows(METRICS_TABLE).len(), 2);
    assert_eq!(harness.closed_session_rows(), 1);
    assert_eq!(report.usage, Usage::new(150, 25));
}

#[tokio::test]
async fn no_order_id_means_no_trade() {
    let harness = Harness::with(
        vec![
            Ok(ScriptedProvider::calls(vec![buy_aapl("c1")])),
            Ok(ScriptedProvider::text("", Usage::default())),
            Ok(ScriptedProvider::text("", Usage::default())),
        ],
        MockBrokerage::new().rejecting_orders(),
        MemoryStore::new(),
    );

    let report = harness.run(3).await;

    assert_eq!(report.trades, 0);
    assert_eq!(tool_results(&report.conversation)[0].1["error"]["kind"], "upstream_failure");
    assert!(harness.store.rows(TRADES_TABLE).is_empty());
}

#[tokio::test]
async fn silent_turn_is_nudged_and_loop_continues() {
    let harness = Harness::new(vec![
        Ok(ScriptedProvider::calls(vec![call("c1", "get_account", json!({}))])),
        Ok(ScriptedProvider::text("Markets look calm.", Usage::default())),
        Ok(ScriptedProvider::calls(vec![buy_aapl("c2")])),
        Ok(ScriptedProvider::text("Done for today.", Usage::default())),
    ]);

    let report = harness.run(8).await;

    assert_eq!(report.outcome, LoopOutcome::Done);
    assert_eq!(report.turns, 4);
    assert_eq!(report.trades, 1);
    assert_eq!(harness.provider.call_count(), 4);

    let third_request = &harness.provider.requests()[2];
    assert_eq!(third_request.last(), Some(&Message::user(NUDGE_MESSAGE)));
}

#[tokio::test]
async fn turn_budget_ends_without_trade() {
    let harness = Harness::new(vec![
        Ok(ScriptedProvider::text("no", Usage::default())),
        Ok(ScriptedProvider::text("still no", Usage::default())),
        Ok(ScriptedProvider::text("never", Usage::default())),
    ]);

    let report = harness.run(3).await;

    assert_eq!(report.outcome, LoopOutcome::Done);
    assert_eq!(report.turns, 3);
    assert_eq!(report.trades, 0);
    let nudges = report
        .conversation
        .messages()
        .iter()
        .filter(|m| **m == Message::user(NUDGE_MESSAGE))
        .count();
    assert_eq!(nudges, 2);
    assert_eq!(harness.closed_session_rows(), 1);
}

#[tokio::test]
async fn exhausted_rate_limit_retries_fail_and_finalize_once() {
    let harness = Harness::new(vec![
        Err(ScriptedProvider::rate_limited()),
        Err(ScriptedProvider::rate_limited()),
        Err(ScriptedProvider::rate_limited()),
    ]);

    let report = harness.run(8).await;

    assert!(report.outcome.is_failed());
    assert_eq!(harness.provider.call_count(), 3);
    assert_eq!(report.conversation.len(), 2);
    assert!(report.session.is_closed());
    assert_eq!(report.session.ending_equity_share, Some(dec!(50000.00)));
    assert_eq!(harness.closed_session_rows(), 1);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains("FAILED"));
}

#[tokio::test]
async fn losing_direction_is_blocked() {
    let harness = Harness::with(
        vec![
            Ok(ScriptedProvider::calls(vec![buy_aapl("c1")])),
            Ok(ScriptedProvider::text("ok", Usage::default())),
        ],
        MockBrokerage::new().with_quote("AAPL", dec!(187.20)),
        MemoryStore::new().with_direction_stats(Side::Buy, 1, 4),
    );

    let report = harness.run(2).await;

    let results = tool_results(&report.conversation);
    assert_eq!(results[0].1["error"]["kind"], "direction_blocked");
    assert_eq!(results[0].1["error"]["win_rate"], 0.2);
    assert_eq!(harness.broker.orders_placed(), 0);
    assert_eq!(report.trades, 0);
}

#[tokio::test]
async fn winning_direction_is_allowed() {
    let harness = Harness::with(
        vec![
            Ok(ScriptedProvider::calls(vec![buy_aapl("c1")])),
            Ok(ScriptedProvider::text("ok", Usage::default())),
        ],
        MockBrokerage::new().with_quote("AAPL", dec!(187.20)),
        MemoryStore::new().with_direction_stats(Side::Buy, 7, 3),
    );

    let report = harness.run(2).await;

    assert_eq!(report.trades, 1);
    assert_eq!(harness.broker.orders_placed(), 1);
}

#[tokio::test]
async fn malformed_order_never_reaches_brokerage() {
    let harness = Harness::new(vec![
        Ok(ScriptedProvider::calls(vec![
            call("c1", "place_order", json!({"symbol": "AAPL", "qty": 1})),
            call("c2", "place_order", json!({"side": "buy", "qty": 1})),
            call("c3", "launch_rocket", json!({})),
        ])),
        Ok(ScriptedProvider::text("giving up", Usage::default())),
    ]);

    let report = harness.run(2).await;

    let results = tool_results(&report.conversation);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].1["error"]["kind"], "invalid_arguments");
    assert_eq!(results[1].1["error"]["kind"], "invalid_arguments");
    assert_eq!(results[2].1["error"]["kind"], "unknown_tool");
    assert_eq!(harness.broker.orders_placed(), 0);
    assert_eq!(report.outcome, LoopOutcome::Done);
}

#[tokio::test]
async fn analysis_is_logged_leniently() {
    let harness = Harness::new(vec![
        Ok(ScriptedProvider::calls(vec![call(
            "c1",
            "log_analysis",
            json!({"reasoning": "NVDA looks bullish, worth a buy"}),
        )])),
        Ok(ScriptedProvider::calls(vec![buy_aapl("c2")])),
        Ok(ScriptedProvider::text("done", Usage::default())),
    ]);

    harness.run(4).await;

    let analyses = harness.store.rows(ANALYSES_TABLE);
    assert_eq!(analyses.len(), 1);
    assert_eq!(analyses[0]["symbol"], "NVDA");
    assert_eq!(analyses[0]["action"], "BUY");
    assert_eq!(analyses[0]["inferred"], true);
}

#[tokio::test]
async fn persistence_outage_does_not_stop_trading() {
    let harness = Harness::with(
        vec![
            Ok(ScriptedProvider::calls(vec![buy_aapl("c1")])),
            Ok(ScriptedProvider::text("done", Usage::default())),
        ],
        MockBrokerage::new().with_quote("AAPL", dec!(187.20)),
        MemoryStore::new().failing_writes(),
    );

    let report = harness.run(4).await;

    assert_eq!(report.outcome, LoopOutcome::Done);
    assert_eq!(report.trades, 1);
    assert!(report.session.is_closed());
    // trade notice and final status
    assert_eq!(harness.notifier.sent().len(), 2);
}
