use thiserror::Error;
use time::Date;

pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors raised while building a portfolio or computing its statistics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalyzerError {
    #[error("start date {start} cannot be after end date {end}")]
    InvalidRange { start: Date, end: Date },

    #[error("no price data for '{identifier}': {reason}")]
    DataUnavailable { identifier: String, reason: String },

    #[error("need at least 2 aligned dates, got {observations}")]
    InsufficientHistory { observations: usize },

    #[error("division by zero in {operation}")]
    DivisionUndefined { operation: String },

    #[error("basket has no holdings")]
    EmptyBasket,

    #[error("missing required field: {field}")]
    MissingField { field: String },
}

impl AnalyzerError {
    pub(crate) fn unavailable(identifier: impl Into<String>, reason: impl ToString) -> Self {
        AnalyzerError::DataUnavailable {
            identifier: identifier.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn undefined(operation: &str) -> Self {
        AnalyzerError::DivisionUndefined {
            operation: operation.to_string(),
        }
    }
}
