//! One trading session for one provider: open, seed, run, close.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use magi_agents::prompts::{default_system_prompt, kickoff_message};
use magi_agents::{
    notify_best_effort, AgentLoop, Brokerage, ChatProvider, LoopReport, Notifier, Persistence,
    RetryPolicy, RetryingTransport, SessionContext, SessionLedger, StatsSource, ToolRegistry,
};
use magi_models::{BudgetAllocation, Conversation, MagiConfig, ProviderKind, Session, TradeMode};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Collaborators a session runs against.
pub struct SessionDeps {
    pub provider: Arc<dyn ChatProvider>,
    pub broker: Arc<dyn Brokerage>,
    pub persistence: Arc<dyn Persistence>,
    pub stats: Arc<dyn StatsSource>,
    pub notifier: Arc<dyn Notifier>,
}

/// Tells the operator a session never started, then hands the error back.
pub async fn report_startup_failure(
    notifier: &dyn Notifier,
    kind: ProviderKind,
    mode: TradeMode,
    err: anyhow::Error,
) -> anyhow::Error {
    let text = format!(
        "[{}/{}] Session failed to start: {err:#}",
        kind.as_str(),
        mode.as_str()
    );
    notify_best_effort(notifier, &text).await;
    err
}

/// Run one session to completion.
///
/// Errors here are startup failures: nothing has been written to the
/// ledger yet, and the notifier has already been told. Once the session
/// is open the loop always finishes with a report, `Failed` included.
pub async fn run_session(config: &MagiConfig, deps: SessionDeps) -> Result<LoopReport> {
    let kind = config.provider.kind;
    let mode = config.trading.mode;

    let allocation = match BudgetAllocation::from_weights(&config.budget.weights)
        .context("Invalid [budget] weights")
    {
        Ok(allocation) => allocation,
        Err(e) => return Err(report_startup_failure(deps.notifier.as_ref(), kind, mode, e).await),
    };
    let share = allocation.get_allocation(kind, mode);
    if share <= 0.0 {
        warn!(provider = kind.as_str(), mode = mode.as_str(), "No budget allocated for this provider and mode");
    }

    let account = match deps
        .broker
        .get_account()
        .await
        .context("Failed to read brokerage account")
    {
        Ok(account) => account,
        Err(e) => return Err(report_startup_failure(deps.notifier.as_ref(), kind, mode, e).await),
    };
    let starting_share = Decimal::from_f64(share)
        .map(|s| (account.equity * s).round_dp(2))
        .unwrap_or(Decimal::ZERO);

    let session = Session::open(kind.as_str(), mode, starting_share);
    let ctx = SessionContext::new(&session, kind, share, config.trading.watchlist.clone());
    let ledger = SessionLedger::new(deps.persistence.clone());
    ledger.open_session(&session).await;
    info!(
        session_id = %session.id,
        provider = kind.as_str(),
        mode = mode.as_str(),
        starting_equity_share = %starting_share,
        "Session opened"
    );

    let history = deps
        .stats
        .symbol_stats(ctx.provider_id())
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Symbol history unavailable");
            Vec::new()
        });

    let system_prompt = match &config.agent.system_prompt_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path, error = %e, "Persona file unreadable, using built-in prompt");
                default_system_prompt(&ctx)
            }
        },
        None => default_system_prompt(&ctx),
    };
    let conversation = Conversation::seeded(system_prompt, kickoff_message(&ctx, &history));

    let registry = ToolRegistry::new(deps.broker.clone(), deps.stats.clone())
        .with_guard(config.guard.clone())
        .with_fill_polling(
            Duration::from_millis(config.agent.fill_poll_interval_ms),
            config.agent.fill_poll_max_attempts,
        )
        .with_bars_lookback(config.trading.bars_lookback);

    let transport = RetryingTransport::new(RetryPolicy {
        max_attempts: config.agent.retry_max_attempts.max(1),
        delay: Duration::from_secs(config.agent.retry_delay_seconds),
    });

    let agent = AgentLoop::new(deps.provider, registry, ledger, deps.broker, deps.notifier)
        .with_transport(transport)
        .with_max_turns(config.agent.max_turns);

    Ok(agent.run(session, &ctx, conversation).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use magi_agents::ledger::{METRICS_TABLE, SESSIONS_TABLE, TRADES_TABLE};
    use magi_agents::test_support::{
        daily_bars, MemoryStore, MockBrokerage, RecordingNotifier, ScriptedProvider,
    };
    use magi_agents::LoopOutcome;
    use magi_models::{BudgetWeight, Message, ProviderKind, ToolCallRequest, TradeMode, Usage};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn config() -> MagiConfig {
        let toml_str = r#"
[provider]
kind = "openai"

[agent]
retry_delay_seconds = 0
fill_poll_interval_ms = 1
fill_poll_max_attempts = 2

[[budget.weights]]
provider = "openai"
mode = "paper"
weight = 1.0

[[budget.weights]]
provider = "gemini"
mode = "paper"
weight = 3.0
"#;
        toml::from_str(toml_str).unwrap()
    }

    fn deps(
        provider: ScriptedProvider,
        broker: MockBrokerage,
        store: Arc<MemoryStore>,
        notifier: Arc<RecordingNotifier>,
    ) -> SessionDeps {
        SessionDeps {
            provider: Arc::new(provider),
            broker: Arc::new(broker),
            persistence: store.clone(),
            stats: store,
            notifier,
        }
    }

    #[tokio::test]
    async fn session_opens_trades_and_closes() {
        let broker = MockBrokerage::new()
            .with_equity(dec!(100000))
            .with_quote("AMD", dec!(150))
            .with_bars("AMD", daily_bars(&[140.0; 30]));
        let provider = ScriptedProvider::new(vec![
            Ok(ScriptedProvider::calls(vec![ToolCallRequest::new(
                "c1",
                "place_order",
                magi_agents::test_support::args(&[
                    ("symbol", json!("AMD")),
                    ("side", json!("buy")),
                    ("qty", json!(2)),
                    ("reason", json!("breakout")),
                ]),
            )])),
            Ok(ScriptedProvider::text("Done for today.", Usage::new(50, 10))),
        ]);
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let report = run_session(&config(), deps(provider, broker, store.clone(), notifier.clone()))
            .await
            .unwrap();

        assert_eq!(report.outcome, LoopOutcome::Done);
        assert_eq!(report.trades, 1);
        // 1 of 4 weight units goes to openai/paper.
        assert_eq!(report.session.starting_equity_share, dec!(25000));
        assert!(report.session.is_closed());

        let sessions = store.rows(SESSIONS_TABLE);
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0]["ended_at"].is_null());
        assert!(!sessions[1]["ended_at"].is_null());
        assert_eq!(store.rows(TRADES_TABLE).len(), 1);
        assert_eq!(store.rows(METRICS_TABLE).len(), 2);
        assert!(!notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn kickoff_carries_symbol_history() {
        let store = Arc::new(MemoryStore::new().with_symbol_stats(vec![magi_models::SymbolStats {
            symbol: "NVDA".into(),
            wins: 3,
            losses: 1,
            holds: 0,
        }]));
        let provider = ScriptedProvider::new(vec![Ok(ScriptedProvider::text(
            "Nothing to do.",
            Usage::default(),
        ))]);
        let provider = Arc::new(provider);
        let deps = SessionDeps {
            provider: provider.clone(),
            broker: Arc::new(MockBrokerage::new()),
            persistence: store.clone(),
            stats: store,
            notifier: Arc::new(RecordingNotifier::new()),
        };

        let mut config = config();
        config.agent.max_turns = 1;
        run_session(&config, deps).await.unwrap();

        let first = provider.requests().remove(0);
        match &first[1] {
            Message::User { text } => assert!(text.contains("NVDA: 3 wins, 1 losses")),
            other => panic!("expected kickoff, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_budget_fails_before_opening() {
        let store = Arc::new(MemoryStore::new());
        let mut config = config();
        config.budget.weights = vec![BudgetWeight {
            provider: ProviderKind::OpenAi,
            mode: TradeMode::Paper,
            weight: 0.0,
        }];
        let provider = ScriptedProvider::new(vec![]);

        let result = run_session(
            &config,
            deps(provider, MockBrokerage::new(), store.clone(), Arc::new(RecordingNotifier::new())),
        )
        .await;

        assert!(result.is_err());
        assert!(store.rows(SESSIONS_TABLE).is_empty());
    }

    #[tokio::test]
    async fn unreachable_account_is_reported_once() {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let provider = ScriptedProvider::new(vec![]);

        let result = run_session(
            &config(),
            deps(provider, MockBrokerage::new().failing_account(), store.clone(), notifier.clone()),
        )
        .await;

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("account endpoint down"));
        assert!(store.rows(SESSIONS_TABLE).is_empty());

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("[openai/paper] Session failed to start"));
        assert!(sent[0].contains("brokerage account"));
    }
}
