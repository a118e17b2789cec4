//! Schema-on-read rows parsed from a published sheet.

use crate::error::ValueParseWarning;
use crate::normalize::try_parse_amount;
use log::debug;
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Column names of one dataset, shared by all of its records.
///
/// When the header repeats a name, lookups by that name resolve to the last
/// occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Columns {
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (position, name) in names.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                debug!("Duplicate column '{}': the last occurrence wins", name);
            }
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// The outcome of reading one named cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Value(&'a str),
    /// The column exists but the cell is empty or whitespace.
    Blank,
    /// The dataset has no such column.
    Missing,
}

impl<'a> Field<'a> {
    pub fn value(self) -> Option<&'a str> {
        match self {
            Field::Value(text) => Some(text),
            Field::Blank | Field::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<Columns>,
    values: Vec<String>,
    line: u64,
}

impl Record {
    /// Short rows are padded with empty cells, cells past the header are dropped.
    pub fn new(columns: Arc<Columns>, mut values: Vec<String>, line: u64) -> Self {
        if values.len() > columns.len() {
            debug!(
                "Line {}: {} cells for {} columns, extra cells ignored",
                line,
                values.len(),
                columns.len()
            );
        }
        values.resize(columns.len(), String::new());
        Self {
            columns,
            values,
            line,
        }
    }

    /// Builds a standalone record from `(column, value)` pairs.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (names, values): (Vec<String>, Vec<String>) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self::new(Arc::new(Columns::new(names)), values, 0)
    }

    pub fn columns(&self) -> &Arc<Columns> {
        &self.columns
    }

    /// 1-based line of the source text this record came from (0 when built in memory).
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Raw cell text, `None` when the column does not exist.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .position(column)
            .map(|position| self.values[position].as_str())
    }

    /// Raw cell text, empty when the column does not exist.
    pub fn text(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn field(&self, column: &str) -> Field<'_> {
        match self.get(column) {
            None => Field::Missing,
            Some(text) if text.trim().is_empty() => Field::Blank,
            Some(text) => Field::Value(text.trim()),
        }
    }

    /// First non-blank cell among `columns`, in order.
    pub fn first_value<'a, S: AsRef<str>>(&'a self, columns: &[S]) -> Option<&'a str> {
        columns
            .iter()
            .find_map(|column| self.field(column.as_ref()).value())
    }

    /// The cell as an amount. Missing, blank and unparseable cells are 0; the
    /// unparseable case is reported as a warning.
    pub fn amount(&self, column: &str) -> (Decimal, Option<ValueParseWarning>) {
        let raw = self.text(column);
        match try_parse_amount(raw) {
            Some(value) => (value, None),
            None => (
                Decimal::ZERO,
                Some(ValueParseWarning {
                    column: column.to_string(),
                    raw: raw.to_string(),
                    line: self.line,
                }),
            ),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
    }

    pub fn is_blank(&self) -> bool {
        self.values.iter().all(|v| v.trim().is_empty())
    }
}

/// Serializes as a JSON object of the cells in column order.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// All records parsed from one source, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    source_ref: String,
    columns: Arc<Columns>,
    records: Vec<Record>,
}

impl Dataset {
    pub fn new(source_ref: impl Into<String>, columns: Arc<Columns>, records: Vec<Record>) -> Self {
        Self {
            source_ref: source_ref.into(),
            columns,
            records,
        }
    }

    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
