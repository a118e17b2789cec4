use crate::chart_of_accounts::{Classification, LookupTable};
use crate::error::{PipelineWarning, UnknownKeyWarning};
use crate::record::Record;
use crate::schema::Period;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Column holding the fund-department-object account string, e.g. `010-42-5100`.
pub const ACCOUNT_NUMBER_COLUMN: &str = "Account Number";

/// How the join key is pulled out of a primary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum KeyRule {
    /// The whole (trimmed) cell is the key.
    Column { column: String },
    /// The cell is split on `delimiter` and the trimmed segment at `index` is the key.
    Segment {
        column: String,
        delimiter: char,
        index: usize,
    },
}

impl KeyRule {
    /// Department code: the second dash-separated segment of the account number.
    pub fn department_code() -> Self {
        Self::account_segment(1)
    }

    /// Fund code: the first dash-separated segment of the account number.
    pub fn fund_code() -> Self {
        Self::account_segment(0)
    }

    pub fn account_segment(index: usize) -> Self {
        KeyRule::Segment {
            column: ACCOUNT_NUMBER_COLUMN.to_string(),
            delimiter: '-',
            index,
        }
    }

    /// The key, or `None` when the cell or segment is missing or blank.
    pub fn extract<'a>(&self, record: &'a Record) -> Option<&'a str> {
        let key = match self {
            KeyRule::Column { column } => record.get(column)?,
            KeyRule::Segment {
                column,
                delimiter,
                index,
            } => record.get(column)?.split(*delimiter).nth(*index)?,
        };
        Some(key.trim()).filter(|k| !k.is_empty())
    }
}

/// A primary record with its classification resolved and its period
/// columns parsed, one amount per configured period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRecord {
    record: Record,
    key: Option<String>,
    classification: Classification,
    amounts: Vec<Decimal>,
}

impl EnrichedRecord {
    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn amounts(&self) -> &[Decimal] {
        &self.amounts
    }

    pub fn amount(&self, period: usize) -> Decimal {
        self.amounts.get(period).copied().unwrap_or(Decimal::ZERO)
    }
}

/// Output of a join: every input record, plus what was recovered on the way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Joined {
    pub records: Vec<EnrichedRecord>,
    pub warnings: Vec<PipelineWarning>,
}

impl Joined {
    pub fn unknown_key_count(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, PipelineWarning::UnknownKey(_)))
            .count()
    }
}

/// Joins `primary` against `lookup` by the key `key_rule` extracts.
///
/// Keys missing from the lookup classify the record as `Unknown` in every
/// field; the record is kept. Each distinct unmapped key is reported once.
pub fn join(
    primary: &[Record],
    lookup: &LookupTable,
    key_rule: &KeyRule,
    periods: &[Period],
) -> Joined {
    let unknown = Classification::unknown(Arc::clone(lookup.fields()));
    let mut reported: HashSet<String> = HashSet::new();
    let mut joined = Joined {
        records: Vec::with_capacity(primary.len()),
        warnings: Vec::new(),
    };

    for record in primary {
        let key = key_rule.extract(record);
        let classification = match key.and_then(|k| lookup.get(k)) {
            Some(found) => found.clone(),
            None => {
                let missing = key.unwrap_or_default();
                if reported.insert(missing.to_string()) {
                    let warning = UnknownKeyWarning {
                        key: missing.to_string(),
                        line: record.line(),
                    };
                    warn!("{}", warning);
                    joined.warnings.push(warning.into());
                }
                unknown.clone()
            }
        };

        let amounts = parse_periods(record, periods, &mut joined.warnings);
        joined.records.push(EnrichedRecord {
            record: record.clone(),
            key: key.map(str::to_string),
            classification,
            amounts,
        });
    }

    info!(
        "Joined {} records against {} lookup keys ({} unmapped keys)",
        joined.records.len(),
        lookup.len(),
        reported.len()
    );
    joined
}

/// Parses period amounts for records that need no lookup.
pub fn enrich(records: &[Record], periods: &[Period]) -> Joined {
    let mut joined = Joined {
        records: Vec::with_capacity(records.len()),
        warnings: Vec::new(),
    };

    for record in records {
        let amounts = parse_periods(record, periods, &mut joined.warnings);
        joined.records.push(EnrichedRecord {
            record: record.clone(),
            key: None,
            classification: Classification::empty(),
            amounts,
        });
    }

    joined
}

fn parse_periods(
    record: &Record,
    periods: &[Period],
    warnings: &mut Vec<PipelineWarning>,
) -> Vec<Decimal> {
    periods
        .iter()
        .map(|period| {
            let (value, warning) = record.amount(&period.column);
            if let Some(warning) = warning {
                debug!("{}", warning);
                warnings.push(warning.into());
            }
            value
        })
        .collect()
}
