//! Typed extraction of model-supplied arguments.

use magi_models::Side;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::ToolError;

pub type Args = Map<String, Value>;

/// A present, non-blank string argument.
pub fn optional_str(args: &Args, key: &str) -> Option<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn required_str(args: &Args, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Err(ToolError::invalid(format!(
            "missing required argument: {key}"
        ))),
        Some(Value::String(_)) => optional_str(args, key)
            .ok_or_else(|| ToolError::invalid(format!("argument {key} must not be empty"))),
        Some(_) => Err(ToolError::invalid(format!("argument {key} must be a string"))),
    }
}

/// Upper-cased ticker. Letters, digits, `.` and `-` only.
pub fn normalize_symbol(raw: &str) -> Result<String, ToolError> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid = !symbol.is_empty()
        && symbol.len() <= 10
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(symbol)
    } else {
        Err(ToolError::invalid(format!("invalid symbol: {raw}")))
    }
}

pub fn required_symbol(args: &Args) -> Result<String, ToolError> {
    normalize_symbol(&required_str(args, "symbol")?)
}

pub fn required_side(args: &Args) -> Result<Side, ToolError> {
    required_str(args, "side")?
        .parse::<Side>()
        .map_err(ToolError::invalid)
}

/// Strictly positive quantity, given as a JSON number or a numeric string.
pub fn required_qty(args: &Args) -> Result<Decimal, ToolError> {
    let qty = match args.get("qty") {
        None | Some(Value::Null) => {
            return Err(ToolError::invalid("missing required argument: qty"));
        }
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        Some(Value::String(s)) => s.trim().parse::<Decimal>().ok(),
        Some(_) => None,
    };

    match qty {
        Some(q) if q > Decimal::ZERO => Ok(q.normalize()),
        Some(q) => Err(ToolError::invalid(format!("qty must be positive, got {q}"))),
        None => Err(ToolError::invalid("qty must be a number")),
    }
}

pub fn optional_f64(args: &Args, key: &str) -> Option<f64> {
    match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
