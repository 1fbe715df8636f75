use std::collections::HashMap;

use thiserror::Error;

use crate::config::{BudgetWeight, ProviderKind};
use crate::trade::TradeMode;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("budget weight table is empty")]
    Empty,

    #[error("budget weight for {provider}/{mode} must be positive and finite, got {weight}")]
    InvalidWeight {
        provider: ProviderKind,
        mode: TradeMode,
        weight: f64,
    },
}

/// Normalized share of account equity per (provider, mode).
///
/// Built once at startup; all known keys sum to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetAllocation {
    shares: HashMap<(ProviderKind, TradeMode), f64>,
}

impl BudgetAllocation {
    /// Normalize `weight / sum(weights)`. Duplicate keys accumulate.
    pub fn from_weights(weights: &[BudgetWeight]) -> Result<Self, AllocationError> {
        if weights.is_empty() {
            return Err(AllocationError::Empty);
        }

        let mut raw: HashMap<(ProviderKind, TradeMode), f64> = HashMap::new();
        for w in weights {
            if !w.weight.is_finite() || w.weight <= 0.0 {
                return Err(AllocationError::InvalidWeight {
                    provider: w.provider,
                    mode: w.mode,
                    weight: w.weight,
                });
            }
            *raw.entry((w.provider, w.mode)).or_insert(0.0) += w.weight;
        }

        let total: f64 = raw.values().sum();
        let shares = raw
            .into_iter()
            .map(|(key, weight)| (key, weight / total))
            .collect();
        Ok(Self { shares })
    }

    /// Share for a key; zero for keys absent from the table.
    pub fn get_allocation(&self, provider: ProviderKind, mode: TradeMode) -> f64 {
        self.shares.get(&(provider, mode)).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.shares.values().sum()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }
}
