use magi_models::SymbolStats;

use crate::context::SessionContext;

/// Injected when a turn ends without tool calls and nothing has traded yet.
pub const NUDGE_MESSAGE: &str = "You have not placed a trade yet. Analyze the watchlist with \
     get_indicators, record your view with log_analysis, then place at least one order with \
     place_order within your budget.";

pub fn default_system_prompt(ctx: &SessionContext) -> String {
    format!(
        "You are {provider}, one of several independent trading agents sharing a brokerage \
         account. You trade US equities in {mode} mode.\n\n\
         ## TOOLS\n\n\
         - get_account: equity, cash, and your budget (allocation share {share:.2} of equity)\n\
         - get_positions: open positions\n\
         - get_price: latest price for a symbol\n\
         - get_indicators: SMA5/SMA20, RSI14, ATR14, 1/5/20-day change, volume ratio, trend, \
         and a momentum signal\n\
         - log_analysis: record your reasoning, the symbol, and BUY/SELL/HOLD\n\
         - place_order: market order with symbol, side (buy/sell), qty, reason\n\n\
         ## RULES\n\n\
         - Never spend more than your budget.\n\
         - Check indicators before trading; log your analysis before each order.\n\
         - A direction with a poor track record may be blocked. If an order is refused, \
         reconsider instead of retrying the same order.\n\
         - Tool errors come back as JSON with an `error` field. Read them and adapt.\n\n\
         Watchlist: {watchlist}",
        provider = ctx.provider_id().to_uppercase(),
        mode = ctx.mode,
        share = ctx.allocation_share,
        watchlist = ctx.watchlist.join(", "),
    )
}

/// First user message, with per-symbol history when any exists.
pub fn kickoff_message(ctx: &SessionContext, stats: &[SymbolStats]) -> String {
    let mut message = format!(
        "Trading session {} is open. Review the market and make your trades.",
        ctx.session_id
    );

    let relevant: Vec<&SymbolStats> = stats
        .iter()
        .filter(|s| s.wins + s.losses + s.holds > 0)
        .collect();
    if relevant.is_empty() {
        return message;
    }

    message.push_str("\n\nYour evaluated history by symbol:");
    for s in relevant {
        let rate = s
            .win_rate()
            .map(|r| format!("{:.0}%", r * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        message.push_str(&format!(
            "\n- {}: {} wins, {} losses, {} holds (win rate {})",
            s.symbol, s.wins, s.losses, s.holds, rate
        ));
    }
    message
}
