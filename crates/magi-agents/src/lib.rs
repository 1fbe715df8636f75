pub mod agent;
pub mod collaborators;
pub mod context;
pub mod error;
pub mod ledger;
pub mod parser;
pub mod prompts;
pub mod providers;
pub mod tools;
pub mod transport;

pub mod test_support;

pub use agent::{AgentLoop, LoopOutcome, LoopReport, LoopState};
pub use collaborators::{
    notify_best_effort, Brokerage, NoopNotifier, Notifier, Persistence, StatsSource,
};
pub use context::SessionContext;
pub use error::{AgentError, CollaboratorError, PersistenceError};
pub use ledger::{SessionLedger, TurnMetrics};
pub use providers::{
    adapter_for, ChatProvider, CostRates, HttpProvider, ProviderAdapter, ProviderError,
    WireRequest,
};
pub use tools::{ToolEffect, ToolError, ToolOutput, ToolRegistry};
pub use transport::{RetryPolicy, RetryingTransport};
