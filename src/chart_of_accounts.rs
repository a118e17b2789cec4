//! The chart of accounts: a lookup from department code to the labels the
//! budget is classified by (function, department, ...).

use crate::normalize::{Casing, UNKNOWN_LABEL};
use crate::record::Dataset;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One classification label read from the chart of accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LookupField {
    /// Name the label is known by downstream, e.g. `"function"`.
    pub name: String,
    /// Columns tried in order; the first non-blank one supplies the label.
    pub columns: Vec<String>,
    #[serde(default)]
    pub casing: Casing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LookupSpec {
    /// Column holding the join key, e.g. `"DEPT CODE"`.
    pub key_column: String,
    pub fields: Vec<LookupField>,
}

/// Labels for one key, one per lookup field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    fields: Arc<[String]>,
    labels: Vec<String>,
}

impl Classification {
    /// Every field labelled [`UNKNOWN_LABEL`].
    pub fn unknown(fields: Arc<[String]>) -> Self {
        let labels = vec![UNKNOWN_LABEL.to_string(); fields.len()];
        Self { fields, labels }
    }

    pub fn empty() -> Self {
        Self {
            fields: Arc::from(Vec::<String>::new()),
            labels: Vec::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .position(|name| name == field)
            .map(|position| self.labels[position].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(String::as_str)
            .zip(self.labels.iter().map(String::as_str))
    }
}

/// Immutable key -> [`Classification`] map. Keys keep the order in which they
/// first appeared; a repeated key takes the labels of its last row.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable {
    fields: Arc<[String]>,
    entries: Vec<(String, Classification)>,
    index: HashMap<String, usize>,
}

impl LookupTable {
    /// Builds the table from a chart-of-accounts dataset. Rows with a blank
    /// key are skipped.
    pub fn build(dataset: &Dataset, spec: &LookupSpec) -> Self {
        let field_names: Vec<&str> = spec.fields.iter().map(|f| f.name.as_str()).collect();
        let mut table = Self::new(&field_names);
        let mut skipped = 0usize;

        for record in dataset.records() {
            let key = record.text(&spec.key_column).trim();
            if key.is_empty() {
                skipped += 1;
                continue;
            }

            let labels = spec
                .fields
                .iter()
                .map(|field| field.casing.label_or_unknown(record.first_value(field.columns.as_slice())))
                .collect();
            table.insert(key, labels);
        }

        info!(
            "Chart of accounts: {} keys from {} rows ({} without a key)",
            table.len(),
            dataset.len(),
            skipped
        );
        table
    }

    /// Builds a table directly from `(key, labels)` rows.
    pub fn from_rows<K, L>(fields: &[&str], rows: impl IntoIterator<Item = (K, Vec<L>)>) -> Self
    where
        K: AsRef<str>,
        L: Into<String>,
    {
        let mut table = Self::new(fields);
        for (key, labels) in rows {
            let labels = labels.into_iter().map(Into::into).collect();
            table.insert(key.as_ref().trim(), labels);
        }
        table
    }

    fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| f.to_string()).collect(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn insert(&mut self, key: &str, mut labels: Vec<String>) {
        labels.resize(self.fields.len(), UNKNOWN_LABEL.to_string());
        let classification = Classification {
            fields: Arc::clone(&self.fields),
            labels,
        };

        match self.index.get(key).copied() {
            Some(position) => {
                debug!("Duplicate lookup key '{}': the last row wins", key);
                self.entries[position].1 = classification;
            }
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), classification));
            }
        }
    }

    pub fn fields(&self) -> &Arc<[String]> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Classification> {
        self.index
            .get(key)
            .map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Classification)> {
        self.entries.iter().map(|(key, c)| (key.as_str(), c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys grouped under one field's label and named by another's, e.g.
    /// departments listed per function for a navigation outline.
    pub fn outline(&self, group_field: &str, name_field: &str) -> Vec<OutlineGroup> {
        let mut groups: Vec<OutlineGroup> = Vec::new();

        for (key, classification) in self.iter() {
            let group = classification.get(group_field).unwrap_or(UNKNOWN_LABEL);
            let name = classification.get(name_field).unwrap_or(UNKNOWN_LABEL);
            let entry = OutlineEntry {
                key: key.to_string(),
                name: name.to_string(),
            };

            match groups.iter_mut().find(|g| g.label == group) {
                Some(existing) => existing.entries.push(entry),
                None => groups.push(OutlineGroup {
                    label: group.to_string(),
                    entries: vec![entry],
                }),
            }
        }

        groups
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineGroup {
    pub label: String,
    pub entries: Vec<OutlineEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    pub key: String,
    pub name: String,
}
