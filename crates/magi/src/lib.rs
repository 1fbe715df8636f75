//! MAGI - multi-vendor LLM trading agents
//!
//! Several LLM vendors trade independently against a shared brokerage
//! account, each through the same tool catalogue and within its own budget
//! share. This crate wires the library crates to the real collaborators:
//! an Alpaca brokerage, a Telegram notifier and the SQLite ledger.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use magi::models::{MagiConfig, ProviderKind, TradeMode};
//! use magi::agents::{AgentLoop, ToolRegistry, SessionLedger};
//! use magi::indicators::compute_snapshot;
//! use magi::store::SqliteStore;
//! ```

pub use magi_agents as agents;
pub use magi_indicators as indicators;
pub use magi_models as models;
pub use magi_store as store;

pub mod alpaca;
pub mod config;
pub mod evaluate;
pub mod maintenance;
pub mod session;
pub mod surge;
pub mod telegram;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use magi_agents::{adapter_for, HttpProvider, NoopNotifier, Notifier};
use magi_models::{MagiConfig, TradeMode};
use magi_store::SqliteStore;
use tracing::{info, warn};

use crate::alpaca::{AlpacaClient, AlpacaCredentials};
use crate::config::{provider_api_key, secret};
use crate::session::SessionDeps;
use crate::telegram::TelegramNotifier;

const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP provider for the configured vendor.
pub fn build_provider(config: &MagiConfig) -> Result<HttpProvider, anyhow::Error> {
    let api_key = provider_api_key(config)?;
    let adapter = adapter_for(
        config.provider.kind,
        api_key,
        config.provider.model.clone(),
        config.provider.base_url.clone(),
    );
    let timeout = Duration::from_secs(config.provider.request_timeout_seconds);
    Ok(HttpProvider::new(adapter, timeout)?)
}

/// Brokerage client for the configured trade mode.
pub fn build_brokerage(config: &MagiConfig) -> Result<AlpacaClient, anyhow::Error> {
    let broker = &config.broker;
    let credentials = AlpacaCredentials {
        key_id: secret(&broker.key_id_env)?,
        secret_key: secret(&broker.secret_key_env)?,
    };
    let trading_url = match config.trading.mode {
        TradeMode::Paper => &broker.paper_url,
        TradeMode::Live => &broker.live_url,
    };
    Ok(AlpacaClient::new(
        trading_url,
        &broker.data_url,
        credentials,
        COLLABORATOR_TIMEOUT,
    )?)
}

/// Telegram notifier, or a no-op when notifications are disabled or the
/// bot credentials are not set.
pub fn build_notifier(config: &MagiConfig) -> Arc<dyn Notifier> {
    let notify = &config.notify;
    if !notify.enabled {
        return Arc::new(NoopNotifier);
    }
    let (token, chat_id) = match (secret(&notify.bot_token_env), secret(&notify.chat_id_env)) {
        (Ok(token), Ok(chat_id)) => (token, chat_id),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Notifications disabled");
            return Arc::new(NoopNotifier);
        }
    };
    match TelegramNotifier::new(&notify.api_url, &token, &chat_id, COLLABORATOR_TIMEOUT) {
        Ok(notifier) => Arc::new(notifier),
        Err(e) => {
            warn!(error = %e, "Notifications disabled");
            Arc::new(NoopNotifier)
        }
    }
}

pub fn open_store(config: &MagiConfig) -> Result<SqliteStore, anyhow::Error> {
    let path = &config.store.sqlite_path;
    let store = SqliteStore::open(path).with_context(|| format!("Failed to open store: {path}"))?;
    info!(path = %path, "Store opened");
    Ok(store)
}

/// Assemble the production collaborators for `magi run`.
pub fn build_session_deps(config: &MagiConfig) -> Result<SessionDeps, anyhow::Error> {
    let provider = build_provider(config).context("Failed to build provider")?;
    let broker = build_brokerage(config).context("Failed to build brokerage client")?;
    let store = Arc::new(open_store(config)?);
    Ok(SessionDeps {
        provider: Arc::new(provider),
        broker: Arc::new(broker),
        persistence: store.clone(),
        stats: store,
        notifier: build_notifier(config),
    })
}
