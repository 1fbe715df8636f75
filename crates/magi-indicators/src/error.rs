use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("period must be at least 1")]
    InvalidPeriod,

    #[error("degenerate input: {0}")]
    Degenerate(&'static str),
}

impl IndicatorError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, IndicatorError::InsufficientData { .. })
    }
}

pub(crate) fn require(required: usize, available: usize) -> Result<(), IndicatorError> {
    if available < required {
        Err(IndicatorError::InsufficientData {
            required,
            available,
        })
    } else {
        Ok(())
    }
}
