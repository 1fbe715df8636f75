//! Boundaries to the systems the agent drives but does not own.
//!
//! Every trait is mockable; `test_support` has in-memory versions.

use async_trait::async_trait;
use magi_models::{
    Account, Bar, DirectionStats, OrderAck, OrderStatus, Position, Quote, Side, SymbolStats,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

use crate::error::{CollaboratorError, PersistenceError};

#[async_trait]
pub trait Brokerage: Send + Sync {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, CollaboratorError>;

    async fn get_account(&self) -> Result<Account, CollaboratorError>;

    async fn get_positions(&self) -> Result<Vec<Position>, CollaboratorError>;

    async fn place_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: Side,
    ) -> Result<OrderAck, CollaboratorError>;

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, CollaboratorError>;

    /// Most recent `limit` daily bars, oldest first.
    async fn get_daily_bars(&self, symbol: &str, limit: u32) -> Result<Vec<Bar>, CollaboratorError>;
}

/// Append-only row sink. Not idempotent: a retried insert may duplicate rows.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), PersistenceError>;
}

/// Read-only aggregates over evaluated trades.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn direction_stats(
        &self,
        provider_id: &str,
        side: Side,
    ) -> Result<DirectionStats, CollaboratorError>;

    async fn symbol_stats(&self, provider_id: &str) -> Result<Vec<SymbolStats>, CollaboratorError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, text: &str) -> Result<(), CollaboratorError>;
}

/// Send a notification, logging instead of propagating a failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, text: &str) -> bool {
    match notifier.notify(text).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Notification failed");
            false
        }
    }
}

/// Notifier for deployments without a notification channel.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _text: &str) -> Result<(), CollaboratorError> {
        Ok(())
    }
}
