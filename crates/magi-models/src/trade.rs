use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::Side;

/// Whether orders go to the paper or the live brokerage account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    #[default]
    Paper,
    Live,
}

impl TradeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeMode::Paper => "paper",
            TradeMode::Live => "live",
        }
    }
}

impl fmt::Display for TradeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(TradeMode::Paper),
            "live" => Ok(TradeMode::Live),
            other => Err(format!("unknown trade mode: {other}")),
        }
    }
}

/// One agent run. Opened once at process start and closed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Account equity multiplied by this run's budget allocation.
    pub starting_equity_share: Decimal,
    pub ending_equity_share: Option<Decimal>,
    pub provider_id: String,
    pub trade_mode: TradeMode,
}

impl Session {
    pub fn open(provider_id: &str, trade_mode: TradeMode, starting_equity_share: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            starting_equity_share,
            ending_equity_share: None,
            provider_id: provider_id.to_string(),
            trade_mode,
        }
    }

    /// Consume the open session and produce its closed form.
    pub fn close(mut self, ending_equity_share: Option<Decimal>) -> Self {
        self.ended_at = Some(Utc::now());
        self.ending_equity_share = ending_equity_share;
        self
    }

    pub fn is_closed(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// A confirmed fill. Never created for rejected or failed orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeRecord {
    pub session_id: Uuid,
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: Decimal,
    pub filled_price: Option<Decimal>,
    pub reason: String,
    pub provider_id: String,
    pub mode: TradeMode,
    pub atr_at_execution: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisAction {
    Buy,
    Sell,
    Hold,
}

impl FromStr for AnalysisAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(AnalysisAction::Buy),
            "SELL" => Ok(AnalysisAction::Sell),
            "HOLD" => Ok(AnalysisAction::Hold),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Free-form reasoning the model logged through the analysis tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRecord {
    pub session_id: Uuid,
    pub symbol: Option<String>,
    pub action: AnalysisAction,
    pub reasoning: String,
    pub confidence: Option<f64>,
    /// True when symbol or action was inferred from the reasoning text.
    pub inferred: bool,
    pub provider_id: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeOutcome {
    Win,
    Lose,
    Hold,
}

impl TradeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeOutcome::Win => "WIN",
            TradeOutcome::Lose => "LOSE",
            TradeOutcome::Hold => "HOLD",
        }
    }
}

/// Historical win/loss counts for one (provider, side) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectionStats {
    pub provider_id: String,
    pub side: Side,
    pub wins: u32,
    pub losses: u32,
}

impl DirectionStats {
    /// Wins over decided trades, or `None` with no decided trades.
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        if decided == 0 {
            None
        } else {
            Some(self.wins as f64 / decided as f64)
        }
    }
}

/// Historical outcome counts for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SymbolStats {
    pub symbol: String,
    pub wins: u32,
    pub losses: u32,
    pub holds: u32,
}

impl SymbolStats {
    pub fn win_rate(&self) -> Option<f64> {
        let decided = self.wins + self.losses;
        (decided > 0).then(|| self.wins as f64 / decided as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn session_close_sets_end_fields() {
        let session = Session::open("gemini", TradeMode::Paper, dec!(5000));
        assert!(!session.is_closed());

        let closed = session.close(Some(dec!(5120.50)));
        assert!(closed.is_closed());
        assert_eq!(closed.ending_equity_share, Some(dec!(5120.50)));
    }

    #[test]
    fn direction_win_rate() {
        let stats = DirectionStats {
            provider_id: "groq".to_string(),
            side: Side::Buy,
            wins: 1,
            losses: 4,
        };
        assert_eq!(stats.win_rate(), Some(0.2));

        let empty = DirectionStats {
            wins: 0,
            losses: 0,
            ..stats
        };
        assert_eq!(empty.win_rate(), None);
    }

    #[test]
    fn analysis_action_from_str() {
        assert_eq!("buy".parse::<AnalysisAction>().unwrap(), AnalysisAction::Buy);
        assert!("maybe".parse::<AnalysisAction>().is_err());
    }

    #[test]
    fn trade_mode_roundtrip() {
        assert_eq!("LIVE".parse::<TradeMode>().unwrap(), TradeMode::Live);
        assert_eq!(serde_json::to_string(&TradeMode::Paper).unwrap(), "\"paper\"");
    }
}
