use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Failure to obtain a dataset. Fatal to the load that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("Source {source_ref} is unreachable: {reason}")]
    Unreachable { source_ref: String, reason: String },

    #[error("Source {source_ref} is malformed: {details}")]
    Malformed { source_ref: String, details: String },
}

impl SourceError {
    pub fn unreachable(source_ref: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            source_ref: source_ref.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(source_ref: impl Into<String>, details: impl ToString) -> Self {
        Self::Malformed {
            source_ref: source_ref.into(),
            details: details.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum BudgetError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Unknown reporting period: {0}")]
    UnknownPeriod(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Rollup mismatch at '{label}' for {period}: children sum to {expected}, node holds {actual}")]
    RollupMismatch {
        label: String,
        period: String,
        expected: Decimal,
        actual: Decimal,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BudgetError>;

/// A cell that should hold an amount but does not parse. Recovered by counting it as 0.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Line {line}: '{raw}' in column '{column}' is not a number, counted as 0")]
pub struct ValueParseWarning {
    pub column: String,
    pub raw: String,
    pub line: u64,
}

/// A join key with no chart-of-accounts entry. Recovered by classifying the row as `Unknown`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Line {line}: key '{key}' has no lookup entry, classified as Unknown")]
pub struct UnknownKeyWarning {
    pub key: String,
    pub line: u64,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineWarning {
    #[error(transparent)]
    ValueParse(#[from] ValueParseWarning),

    #[error(transparent)]
    UnknownKey(#[from] UnknownKeyWarning),
}
