//! Durable, best-effort record of a session.
//!
//! Every write returns whether it landed. A failed write is logged and
//! never interrupts trading.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use magi_models::{AnalysisRecord, Session, TradeRecord, Usage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collaborators::Persistence;

pub const SESSIONS_TABLE: &str = "sessions";
pub const TRADES_TABLE: &str = "trades";
pub const ANALYSES_TABLE: &str = "analyses";
pub const METRICS_TABLE: &str = "llm_metrics";

/// Telemetry for one provider round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnMetrics {
    pub session_id: Uuid,
    pub provider: String,
    pub model: String,
    pub turn: u32,
    pub input_units: u64,
    pub output_units: u64,
    pub response_time_ms: u64,
    pub cost_usd: f64,
    pub recorded_at: DateTime<Utc>,
}

impl TurnMetrics {
    pub fn new(
        session_id: Uuid,
        provider: &str,
        model: &str,
        turn: u32,
        usage: Usage,
        response_time_ms: u64,
        cost_usd: f64,
    ) -> Self {
        Self {
            session_id,
            provider: provider.to_string(),
            model: model.to_string(),
            turn,
            input_units: usage.input_units,
            output_units: usage.output_units,
            response_time_ms,
            cost_usd,
            recorded_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct SessionLedger {
    store: Arc<dyn Persistence>,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn Persistence>) -> Self {
        Self { store }
    }

    pub async fn open_session(&self, session: &Session) -> bool {
        self.write(SESSIONS_TABLE, session).await
    }

    /// Consumes the open session; the closed form is returned whether or
    /// not the write lands.
    pub async fn close_session(&self, session: Session, ending_equity_share: Option<Decimal>) -> Session {
        let closed = session.close(ending_equity_share);
        self.write(SESSIONS_TABLE, &closed).await;
        closed
    }

    pub async fn record_trade(&self, trade: &TradeRecord) -> bool {
        self.write(TRADES_TABLE, trade).await
    }

    pub async fn record_analysis(&self, analysis: &AnalysisRecord) -> bool {
        self.write(ANALYSES_TABLE, analysis).await
    }

    pub async fn record_metrics(&self, metrics: &TurnMetrics) -> bool {
        self.write(METRICS_TABLE, metrics).await
    }

    async fn write<T: Serialize>(&self, table: &str, record: &T) -> bool {
        let row: Value = match serde_json::to_value(record) {
            Ok(row) => row,
            Err(e) => {
                warn!(table, error = %e, "Could not serialize ledger row");
                return false;
            }
        };
        match self.store.insert(table, &[row]).await {
            Ok(()) => {
                debug!(table, "Ledger row written");
                true
            }
            Err(e) => {
                warn!(table, error = %e, "Ledger write failed");
                false
            }
        }
    }
}
