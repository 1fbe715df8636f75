pub mod allocation;
pub mod config;
pub mod conversation;
pub mod indicator;
pub mod market;
pub mod tool;
pub mod trade;

pub use allocation::{AllocationError, BudgetAllocation};
pub use config::{
    AgentConfig, BrokerConfig, BudgetConfig, BudgetWeight, EvaluationConfig, GuardConfig,
    MagiConfig, NotifyConfig, ProviderConfig, ProviderKind, StoreConfig, TradingConfig,
};
pub use conversation::{
    Conversation, ConversationError, Message, ProviderResponse, ToolCallRequest, Usage,
};
pub use indicator::{IndicatorSnapshot, Trend};
pub use market::{Account, Bar, OrderAck, OrderStatus, Position, Quote, Side};
pub use tool::ToolDescriptor;
pub use trade::{
    AnalysisAction, AnalysisRecord, DirectionStats, Session, SymbolStats, TradeMode,
    TradeOutcome, TradeRecord,
};
