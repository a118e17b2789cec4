use crate::join::KeyRule;
use crate::record::Record;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Selects the records a rollup is computed over, e.g. one fund's accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum RecordFilter {
    /// The key extracted by `key` equals `value`.
    KeyEquals { key: KeyRule, value: String },
    /// The trimmed cell equals `value`.
    ColumnEquals { column: String, value: String },
    /// The cell is present and not blank.
    NonBlank { column: String },
    /// Every inner filter matches.
    All { filters: Vec<RecordFilter> },
}

impl RecordFilter {
    /// Accounts of one fund, e.g. `"010"` for the General Fund.
    pub fn fund(code: impl Into<String>) -> Self {
        RecordFilter::KeyEquals {
            key: KeyRule::fund_code(),
            value: code.into(),
        }
    }

    pub fn non_blank(column: impl Into<String>) -> Self {
        RecordFilter::NonBlank {
            column: column.into(),
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self {
            RecordFilter::KeyEquals { key, value } => key.extract(record) == Some(value.trim()),
            RecordFilter::ColumnEquals { column, value } => {
                record.get(column).map(str::trim) == Some(value.trim())
            }
            RecordFilter::NonBlank { column } => record.field(column).value().is_some(),
            RecordFilter::All { filters } => filters.iter().all(|f| f.matches(record)),
        }
    }

    pub fn select(&self, records: &[Record]) -> Vec<Record> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}

/// Applies an optional filter; `None` keeps everything.
pub fn select(filter: Option<&RecordFilter>, records: &[Record]) -> Vec<Record> {
    match filter {
        Some(filter) => filter.select(records),
        None => records.to_vec(),
    }
}
