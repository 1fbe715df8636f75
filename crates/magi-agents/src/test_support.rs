//! In-memory collaborators and a scripted provider for exercising the
//! agent loop without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use magi_models::{
    Account, Bar, DirectionStats, Message, OrderAck, OrderStatus, Position, ProviderResponse,
    Quote, Side, SymbolStats, ToolCallRequest, ToolDescriptor, Usage,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::collaborators::{Brokerage, Notifier, Persistence, StatsSource};
use crate::error::{CollaboratorError, PersistenceError};
use crate::providers::{ChatProvider, CostRates, ProviderError};

/// Daily bars ending today, one per close. High and low sit one point
/// either side of the close.
pub fn daily_bars(closes: &[f64]) -> Vec<Bar> {
    let start = Utc::now() - Duration::days(closes.len() as i64);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            timestamp: start + Duration::days(i as i64 + 1),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000_000.0,
        })
        .collect()
}

/// Build an argument map from `(key, value)` pairs.
pub fn args(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Replays a fixed script of responses, one per `complete` call.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    seen: Mutex<Vec<Vec<Message>>>,
    rates: CostRates,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            seen: Mutex::new(Vec::new()),
            rates: CostRates::new(1.0, 2.0),
        }
    }

    pub fn rate_limited() -> ProviderError {
        ProviderError::Status {
            vendor: "scripted".to_string(),
            status_code: 429,
            raw_body: "rate limit exceeded".to_string(),
        }
    }

    pub fn text(text: &str, usage: Usage) -> ProviderResponse {
        ProviderResponse {
            assistant_text: text.to_string(),
            tool_calls: Vec::new(),
            usage,
        }
    }

    pub fn calls(calls: Vec<ToolCallRequest>) -> ProviderResponse {
        ProviderResponse {
            assistant_text: String::new(),
            tool_calls: calls,
            usage: Usage::new(100, 20),
        }
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Conversations as they were sent, one per call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn vendor(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    fn estimate_cost(&self, usage: Usage) -> f64 {
        self.rates.estimate(usage)
    }

    async fn complete(
        &self,
        conversation: &[Message],
        _tools: &[ToolDescriptor],
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(conversation.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| {
            Err(ProviderError::Transport {
                vendor: "scripted".to_string(),
                message: "script exhausted".to_string(),
            })
        })
    }
}

/// Brokerage with canned quotes and bars, counting calls.
pub struct MockBrokerage {
    account: Account,
    quotes: HashMap<String, Decimal>,
    bars: HashMap<String, Vec<Bar>>,
    positions: Vec<Position>,
    reject_orders: bool,
    fail_account: bool,
    fill_after_polls: Option<(u32, Decimal)>,
    orders: AtomicU32,
    polls: AtomicU32,
    placed: Mutex<Vec<(String, Decimal, Side)>>,
}

impl Default for MockBrokerage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrokerage {
    pub fn new() -> Self {
        Self {
            account: Account {
                equity: Decimal::from(100_000),
                cash: Decimal::from(60_000),
                buying_power: Decimal::from(120_000),
            },
            quotes: HashMap::new(),
            bars: HashMap::new(),
            positions: Vec::new(),
            reject_orders: false,
            fail_account: false,
            fill_after_polls: None,
            orders: AtomicU32::new(0),
            polls: AtomicU32::new(0),
            placed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_equity(mut self, equity: Decimal) -> Self {
        self.account.equity = equity;
        self
    }

    pub fn with_quote(mut self, symbol: &str, price: Decimal) -> Self {
        self.quotes.insert(symbol.to_string(), price);
        self
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<Bar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.push(position);
        self
    }

    /// Orders are accepted without an order id.
    pub fn rejecting_orders(mut self) -> Self {
        self.reject_orders = true;
        self
    }

    /// Account reads fail as if the brokerage were down.
    pub fn failing_account(mut self) -> Self {
        self.fail_account = true;
        self
    }

    /// Order status reports `price` from the `polls`-th poll on.
    pub fn with_fill_after_polls(mut self, polls: u32, price: Decimal) -> Self {
        self.fill_after_polls = Some((polls, price));
        self
    }

    pub fn orders_placed(&self) -> u32 {
        self.orders.load(Ordering::SeqCst)
    }

    pub fn status_polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn placed(&self) -> Vec<(String, Decimal, Side)> {
        self.placed.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Brokerage for MockBrokerage {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, CollaboratorError> {
        self.quotes
            .get(symbol)
            .map(|price| Quote {
                symbol: symbol.to_string(),
                price: *price,
            })
            .ok_or_else(|| CollaboratorError::Unavailable(format!("no quote for {symbol}")))
    }

    async fn get_account(&self) -> Result<Account, CollaboratorError> {
        if self.fail_account {
            return Err(CollaboratorError::Unavailable("account endpoint down".into()));
        }
        Ok(self.account.clone())
    }

    async fn get_positions(&self) -> Result<Vec<Position>, CollaboratorError> {
        Ok(self.positions.clone())
    }

    async fn place_order(
        &self,
        symbol: &str,
        qty: Decimal,
        side: Side,
    ) -> Result<OrderAck, CollaboratorError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut placed) = self.placed.lock() {
            placed.push((symbol.to_string(), qty, side));
        }
        let order_id = if self.reject_orders {
            None
        } else {
            Some(format!("order-{n}"))
        };
        Ok(OrderAck {
            order_id,
            filled_price: None,
        })
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<OrderStatus, CollaboratorError> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let filled_price = match self.fill_after_polls {
            Some((after, price)) if poll >= after => Some(price),
            _ => None,
        };
        Ok(OrderStatus { filled_price })
    }

    async fn get_daily_bars(&self, symbol: &str, limit: u32) -> Result<Vec<Bar>, CollaboratorError> {
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| CollaboratorError::Unavailable(format!("no bars for {symbol}")))?;
        let skip = bars.len().saturating_sub(limit as usize);
        Ok(bars[skip..].to_vec())
    }
}

/// Table rows in memory, plus canned statistics.
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<(String, Value)>>,
    direction: HashMap<Side, (u32, u32)>,
    symbols: Vec<SymbolStats>,
    fail_writes: bool,
    fail_stats: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_direction_stats(mut self, side: Side, wins: u32, losses: u32) -> Self {
        self.direction.insert(side, (wins, losses));
        self
    }

    pub fn with_symbol_stats(mut self, stats: Vec<SymbolStats>) -> Self {
        self.symbols = stats;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn failing_stats(mut self) -> Self {
        self.fail_stats = true;
        self
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.rows
            .lock()
            .map(|rows| {
                rows.iter()
                    .filter(|(t, _)| t == table)
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn insert(&self, table: &str, rows: &[Value]) -> Result<(), PersistenceError> {
        if self.fail_writes {
            return Err(PersistenceError::new(table, "store offline"));
        }
        let mut stored = self
            .rows
            .lock()
            .map_err(|e| PersistenceError::new(table, e.to_string()))?;
        stored.extend(rows.iter().map(|row| (table.to_string(), row.clone())));
        Ok(())
    }
}

#[async_trait]
impl StatsSource for MemoryStore {
    async fn direction_stats(
        &self,
        provider_id: &str,
        side: Side,
    ) -> Result<DirectionStats, CollaboratorError> {
        if self.fail_stats {
            return Err(CollaboratorError::Unavailable("stats offline".to_string()));
        }
        let (wins, losses) = self.direction.get(&side).copied().unwrap_or((0, 0));
        Ok(DirectionStats {
            provider_id: provider_id.to_string(),
            side,
            wins,
            losses,
        })
    }

    async fn symbol_stats(&self, _provider_id: &str) -> Result<Vec<SymbolStats>, CollaboratorError> {
        if self.fail_stats {
            return Err(CollaboratorError::Unavailable("stats offline".to_string()));
        }
        Ok(self.symbols.clone())
    }
}

/// Keeps every notification it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> Result<(), CollaboratorError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(text.to_string());
        }
        if self.fail {
            return Err(CollaboratorError::Unavailable("chat offline".to_string()));
        }
        Ok(())
    }
}
