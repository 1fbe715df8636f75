use magi_models::Usage;

/// USD per million units, input and output priced separately.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRates {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Gemini 1.5 Flash pricing, shared by the native and compatibility dialects.
pub const GEMINI_RATES: CostRates = CostRates::new(0.5, 1.5);

impl CostRates {
    pub const fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn estimate(&self, usage: Usage) -> f64 {
        (usage.input_units as f64 * self.input_per_million
            + usage.output_units as f64 * self.output_per_million)
            / 1_000_000.0
    }
}
