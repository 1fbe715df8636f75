//! `log_analysis` is lenient: a missing symbol or action is inferred from
//! the reasoning text instead of rejected.

use chrono::Utc;
use magi_models::{AnalysisAction, AnalysisRecord};
use serde_json::json;

use super::args::{normalize_symbol, optional_f64, optional_str, Args};
use super::{ToolEffect, ToolError, ToolOutput};
use crate::context::SessionContext;

const BUY_KEYWORDS: &[&str] = &["buy", "long", "bullish", "accumulate", "upside", "買"];
const SELL_KEYWORDS: &[&str] = &["sell", "short", "bearish", "exit", "downside", "売"];

pub(crate) fn log_analysis(ctx: &SessionContext, args: &Args) -> Result<ToolOutput, ToolError> {
    let reasoning = optional_str(args, "reasoning").unwrap_or_default();

    let mut inferred = false;

    let symbol = match optional_str(args, "symbol").and_then(|s| normalize_symbol(&s).ok()) {
        Some(symbol) => Some(symbol),
        None => {
            let guess = infer_symbol(&reasoning, &ctx.watchlist);
            inferred |= guess.is_some();
            guess
        }
    };

    let action = match optional_str(args, "action").and_then(|a| a.parse::<AnalysisAction>().ok()) {
        Some(action) => action,
        None => {
            inferred = true;
            infer_action(&reasoning)
        }
    };

    let confidence = optional_f64(args, "confidence").map(|c| c.clamp(0.0, 1.0));

    let record = AnalysisRecord {
        session_id: ctx.session_id,
        symbol: symbol.clone(),
        action,
        reasoning,
        confidence,
        inferred,
        provider_id: ctx.provider_id().to_string(),
        recorded_at: Utc::now(),
    };

    Ok(ToolOutput {
        payload: json!({
            "logged": true,
            "symbol": symbol,
            "action": action,
            "inferred": inferred,
        }),
        effect: ToolEffect::Analysis(record),
    })
}

/// The watchlist symbol mentioned earliest in the text. Plain substring
/// match, so a ticker embedded in a longer word also counts.
pub fn infer_symbol(text: &str, watchlist: &[String]) -> Option<String> {
    let upper = text.to_uppercase();
    watchlist
        .iter()
        .filter_map(|symbol| {
            let needle = symbol.to_uppercase();
            upper.find(&needle).map(|pos| (pos, needle))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, symbol)| symbol)
}

/// Occurrences of `keyword` in `text`. ASCII keywords only count as whole
/// words; others (Japanese) match anywhere.
fn keyword_hits(text: &str, keyword: &str) -> usize {
    if !keyword.is_ascii() {
        return text.matches(keyword).count();
    }
    text.match_indices(keyword)
        .filter(|(start, _)| {
            let before = text[..*start].chars().next_back();
            let after = text[start + keyword.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .count()
}

/// Majority vote of buy and sell keywords. Ties and silence are `Hold`.
pub fn infer_action(text: &str) -> AnalysisAction {
    let lower = text.to_lowercase();
    let count = |keywords: &[&str]| -> usize {
        keywords.iter().map(|k| keyword_hits(&lower, k)).sum()
    };
    let buys = count(BUY_KEYWORDS);
    let sells = count(SELL_KEYWORDS);

    if buys > sells {
        AnalysisAction::Buy
    } else if sells > buys {
        AnalysisAction::Sell
    } else {
        AnalysisAction::Hold
    }
}
