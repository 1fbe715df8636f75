use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SurgeDirection {
    Surge,
    Crash,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurgeAlert {
    pub symbol: String,
    pub change_pct: f64,
    pub current_price: f64,
    pub prev_close: f64,
    pub direction: SurgeDirection,
}

impl SurgeAlert {
    /// One line for a notification message.
    pub fn summary(&self) -> String {
        format!(
            "{} {}: {:+.2}% (${:.2})",
            match self.direction {
                SurgeDirection::Surge => "SURGE",
                SurgeDirection::Crash => "CRASH",
            },
            self.symbol,
            self.change_pct,
            self.current_price
        )
    }
}

/// Flag a move of at least `threshold_pct` against the previous close.
pub fn detect_surge(
    symbol: &str,
    prev_close: f64,
    current_price: f64,
    threshold_pct: f64,
) -> Option<SurgeAlert> {
    if prev_close <= 0.0 || current_price <= 0.0 {
        return None;
    }
    let change_pct = (current_price - prev_close) / prev_close * 100.0;
    let direction = if change_pct >= threshold_pct {
        SurgeDirection::Surge
    } else if change_pct <= -threshold_pct {
        SurgeDirection::Crash
    } else {
        return None;
    };

    Some(SurgeAlert {
        symbol: symbol.to_string(),
        change_pct,
        current_price,
        prev_close,
        direction,
    })
}
