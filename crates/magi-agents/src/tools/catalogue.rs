use magi_models::ToolDescriptor;
use serde_json::json;

pub const GET_PRICE: &str = "get_price";
pub const GET_ACCOUNT: &str = "get_account";
pub const GET_POSITIONS: &str = "get_positions";
pub const GET_INDICATORS: &str = "get_indicators";
pub const PLACE_ORDER: &str = "place_order";
pub const LOG_ANALYSIS: &str = "log_analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    GetPrice,
    GetAccount,
    GetPositions,
    GetIndicators,
    PlaceOrder,
    LogAnalysis,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::GetPrice,
        ToolKind::GetAccount,
        ToolKind::GetPositions,
        ToolKind::GetIndicators,
        ToolKind::PlaceOrder,
        ToolKind::LogAnalysis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::GetPrice => GET_PRICE,
            ToolKind::GetAccount => GET_ACCOUNT,
            ToolKind::GetPositions => GET_POSITIONS,
            ToolKind::GetIndicators => GET_INDICATORS,
            ToolKind::PlaceOrder => PLACE_ORDER,
            ToolKind::LogAnalysis => LOG_ANALYSIS,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        match self {
            ToolKind::GetPrice => ToolDescriptor::new(
                GET_PRICE,
                "Latest traded price for a stock symbol.",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string", "description": "Ticker, e.g. AAPL"}
                    },
                    "required": ["symbol"]
                }),
            ),
            ToolKind::GetAccount => ToolDescriptor::new(
                GET_ACCOUNT,
                "Account equity, cash, buying power, and the budget allotted to you.",
                json!({"type": "object", "properties": {}}),
            ),
            ToolKind::GetPositions => ToolDescriptor::new(
                GET_POSITIONS,
                "Currently open positions.",
                json!({"type": "object", "properties": {}}),
            ),
            ToolKind::GetIndicators => ToolDescriptor::new(
                GET_INDICATORS,
                "Technical indicators (SMA5, SMA20, RSI14, ATR14, percent changes, volume ratio, trend) and a momentum signal for a symbol.",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string", "description": "Ticker, e.g. NVDA"}
                    },
                    "required": ["symbol"]
                }),
            ),
            ToolKind::PlaceOrder => ToolDescriptor::new(
                PLACE_ORDER,
                "Submit a market order. Orders in a direction with a poor track record may be refused.",
                json!({
                    "type": "object",
                    "properties": {
                        "symbol": {"type": "string"},
                        "side": {"type": "string", "enum": ["buy", "sell"]},
                        "qty": {"type": "number", "description": "Number of shares, greater than zero"},
                        "reason": {"type": "string", "description": "Why this trade"}
                    },
                    "required": ["symbol", "side", "qty"]
                }),
            ),
            ToolKind::LogAnalysis => ToolDescriptor::new(
                LOG_ANALYSIS,
                "Record your market analysis and the action you favour.",
                json!({
                    "type": "object",
                    "properties": {
                        "reasoning": {"type": "string"},
                        "symbol": {"type": "string"},
                        "action": {"type": "string", "enum": ["BUY", "SELL", "HOLD"]},
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1}
                    },
                    "required": ["reasoning"]
                }),
            ),
        }
    }
}

pub fn tool_catalogue() -> Vec<ToolDescriptor> {
    ToolKind::ALL.iter().map(ToolKind::descriptor).collect()
}
