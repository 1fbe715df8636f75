use magi_models::{ProviderKind, Session, TradeMode};
use uuid::Uuid;

/// Per-session facts that tools need but the model never supplies.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub provider: ProviderKind,
    pub mode: TradeMode,
    /// This provider's fraction of account equity, in `[0, 1]`.
    pub allocation_share: f64,
    pub watchlist: Vec<String>,
}

impl SessionContext {
    pub fn new(
        session: &Session,
        provider: ProviderKind,
        allocation_share: f64,
        watchlist: Vec<String>,
    ) -> Self {
        Self {
            session_id: session.id,
            provider,
            mode: session.trade_mode,
            allocation_share,
            watchlist,
        }
    }

    pub fn provider_id(&self) -> &'static str {
        self.provider.as_str()
    }
}
