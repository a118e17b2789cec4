use crate::change::{delta, Change};
use crate::error::{BudgetError, Result};
use crate::join::{EnrichedRecord, KeyRule};
use crate::normalize::{Casing, UNKNOWN_LABEL};
use crate::schema::Period;
use log::debug;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub const GRAND_TOTAL_LABEL: &str = "Grand Total";

/// Maps a record to its group label at one level of the hierarchy.
///
/// `None` or an empty label puts the record in the `Unknown` group.
pub trait Classify {
    fn classify(&self, record: &EnrichedRecord) -> Option<String>;
}

impl<T: Classify + ?Sized> Classify for &T {
    fn classify(&self, record: &EnrichedRecord) -> Option<String> {
        (**self).classify(record)
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn classify(&self, record: &EnrichedRecord) -> Option<String> {
        (**self).classify(record)
    }
}

/// Adapts a closure into a [`Classify`].
pub struct ClassifyFn<F>(pub F);

impl<F> Classify for ClassifyFn<F>
where
    F: Fn(&EnrichedRecord) -> Option<String>,
{
    fn classify(&self, record: &EnrichedRecord) -> Option<String> {
        (self.0)(record)
    }
}

/// Configurable grouping levels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Classifier {
    #[schemars(description = "A label resolved through the chart of accounts, e.g. 'function'")]
    Lookup { field: String },

    #[schemars(
        description = "The first non-blank of the listed columns of the record itself"
    )]
    Column {
        columns: Vec<String>,
        #[serde(default)]
        casing: Casing,
    },

    #[schemars(description = "A key extracted from the record, e.g. the fund segment")]
    Key {
        rule: KeyRule,
        #[serde(default)]
        casing: Casing,
    },

    #[schemars(description = "The key the record was joined on")]
    JoinKey,
}

impl Classifier {
    pub fn lookup(field: impl Into<String>) -> Self {
        Classifier::Lookup {
            field: field.into(),
        }
    }

    pub fn column(column: impl Into<String>, casing: Casing) -> Self {
        Classifier::Column {
            columns: vec![column.into()],
            casing,
        }
    }
}

impl Classify for Classifier {
    fn classify(&self, record: &EnrichedRecord) -> Option<String> {
        match self {
            Classifier::Lookup { field } => record.classification().get(field).map(str::to_string),
            Classifier::Column { columns, casing } => {
                record.record().first_value(columns.as_slice()).map(|v| casing.apply(v))
            }
            Classifier::Key { rule, casing } => rule.extract(record.record()).map(|k| casing.apply(k)),
            Classifier::JoinKey => record.key().map(str::to_string),
        }
    }
}

/// One group in a rollup. Leaves hold the records they summarize; every
/// other node holds child groups whose values sum to its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateNode {
    label: String,
    values: Vec<Decimal>,
    count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<AggregateNode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    records: Vec<EnrichedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Largest value in the given period first; ties keep their order.
    ByValueDescending(usize),
    /// Numeric labels such as fiscal years first, in numeric order, then the
    /// rest alphabetically.
    ByLabelAscending,
}

impl AggregateNode {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn values(&self) -> &[Decimal] {
        &self.values
    }

    pub fn value(&self, period: usize) -> Decimal {
        self.values.get(period).copied().unwrap_or(Decimal::ZERO)
    }

    /// Number of records under this node.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn children(&self) -> &[AggregateNode] {
        &self.children
    }

    /// Records of a leaf group; empty for inner nodes.
    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, label: &str) -> Option<&AggregateNode> {
        self.children.iter().find(|c| c.label == label)
    }

    /// Follows child labels down from this node.
    pub fn find<S: AsRef<str>>(&self, path: &[S]) -> Option<&AggregateNode> {
        path.iter()
            .try_fold(self, |node, label| node.child(label.as_ref()))
    }

    /// All records under this node, in aggregation order.
    pub fn all_records(&self) -> Vec<&EnrichedRecord> {
        let mut out = Vec::with_capacity(self.count);
        self.collect_records(&mut out);
        out
    }

    fn collect_records<'a>(&'a self, out: &mut Vec<&'a EnrichedRecord>) {
        out.extend(self.records.iter());
        for child in &self.children {
            child.collect_records(out);
        }
    }

    /// The child with the largest value in `period`. Ties go to the child
    /// seen first.
    pub fn largest_child(&self, period: usize) -> Option<&AggregateNode> {
        let mut best: Option<&AggregateNode> = None;
        for child in &self.children {
            match best {
                Some(current) if child.value(period) <= current.value(period) => {}
                _ => best = Some(child),
            }
        }
        best
    }

    /// A copy with children re-ordered at every level.
    pub fn sorted(&self, key: SortKey) -> AggregateNode {
        let mut children: Vec<AggregateNode> = self.children.iter().map(|c| c.sorted(key)).collect();
        match key {
            SortKey::ByValueDescending(period) => {
                children.sort_by(|a, b| b.value(period).cmp(&a.value(period)))
            }
            SortKey::ByLabelAscending => children.sort_by(|a, b| compare_labels(&a.label, &b.label)),
        }
        AggregateNode {
            label: self.label.clone(),
            values: self.values.clone(),
            count: self.count,
            children,
            records: self.records.clone(),
        }
    }
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// Build-time group: children in first-appearance order, indexed by label.
struct Bucket {
    label: String,
    children: Vec<Bucket>,
    index: HashMap<String, usize>,
    records: Vec<EnrichedRecord>,
}

impl Bucket {
    fn new(label: String) -> Self {
        Self {
            label,
            children: Vec::new(),
            index: HashMap::new(),
            records: Vec::new(),
        }
    }

    fn child_mut(&mut self, label: String) -> &mut Bucket {
        let position = match self.index.get(&label).copied() {
            Some(position) => position,
            None => {
                let position = self.children.len();
                self.index.insert(label.clone(), position);
                self.children.push(Bucket::new(label));
                position
            }
        };
        &mut self.children[position]
    }

    fn fold(self, period_count: usize) -> AggregateNode {
        let mut values = vec![Decimal::ZERO; period_count];

        if self.children.is_empty() {
            for record in &self.records {
                for (period, total) in values.iter_mut().enumerate() {
                    *total += record.amount(period);
                }
            }
            return AggregateNode {
                label: self.label,
                values,
                count: self.records.len(),
                children: Vec::new(),
                records: self.records,
            };
        }

        let children: Vec<AggregateNode> = self
            .children
            .into_iter()
            .map(|c| c.fold(period_count))
            .collect();
        let mut count = 0;
        for child in &children {
            count += child.count;
            for (period, total) in values.iter_mut().enumerate() {
                *total += child.value(period);
            }
        }
        AggregateNode {
            label: self.label,
            values,
            count,
            children,
            records: Vec::new(),
        }
    }
}

fn group_label<C: Classify>(level: &C, record: &EnrichedRecord) -> String {
    level
        .classify(record)
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}

/// Groups `records` level by level and sums `period_count` amounts bottom-up.
///
/// Every record lands in exactly one leaf; nothing is dropped.
pub fn aggregate<C: Classify>(
    records: &[EnrichedRecord],
    levels: &[C],
    period_count: usize,
) -> AggregateNode {
    let mut root = Bucket::new(GRAND_TOTAL_LABEL.to_string());

    for record in records {
        let mut bucket = &mut root;
        for level in levels {
            bucket = bucket.child_mut(group_label(level, record));
        }
        bucket.records.push(record.clone());
    }

    let node = root.fold(period_count);
    debug!(
        "Aggregated {} records into {} top-level groups",
        node.count,
        node.children.len()
    );
    node
}

/// An aggregate tree plus the period labels its values are indexed by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollup {
    periods: Vec<String>,
    root: AggregateNode,
}

impl Rollup {
    pub fn new<C: Classify>(records: &[EnrichedRecord], levels: &[C], periods: &[Period]) -> Self {
        Self {
            periods: periods.iter().map(|p| p.label.clone()).collect(),
            root: aggregate(records, levels, periods.len()),
        }
    }

    pub fn periods(&self) -> &[String] {
        &self.periods
    }

    pub fn root(&self) -> &AggregateNode {
        &self.root
    }

    pub fn period_index(&self, label: &str) -> Result<usize> {
        self.periods
            .iter()
            .position(|p| p == label)
            .ok_or_else(|| BudgetError::UnknownPeriod(label.to_string()))
    }

    pub fn value(&self, node: &AggregateNode, period: &str) -> Result<Decimal> {
        Ok(node.value(self.period_index(period)?))
    }

    /// Grand total for one period.
    pub fn total(&self, period: &str) -> Result<Decimal> {
        self.value(&self.root, period)
    }

    pub fn largest_child(&self, period: &str) -> Result<Option<&AggregateNode>> {
        Ok(self.root.largest_child(self.period_index(period)?))
    }

    pub fn change(&self, node: &AggregateNode, prior: &str, current: &str) -> Result<Change> {
        let prior = self.value(node, prior)?;
        let current = self.value(node, current)?;
        Ok(delta(prior, current))
    }

    /// Checks that every node's value equals the sum of its children (or of
    /// its records, for leaves) in every period.
    pub fn verify(&self) -> Result<()> {
        self.verify_node(&self.root)
    }

    fn verify_node(&self, node: &AggregateNode) -> Result<()> {
        for (period, label) in self.periods.iter().enumerate() {
            let expected: Decimal = if node.is_leaf() {
                node.records.iter().map(|r| r.amount(period)).sum()
            } else {
                node.children.iter().map(|c| c.value(period)).sum()
            };
            let actual = node.value(period);
            if expected != actual {
                return Err(BudgetError::RollupMismatch {
                    label: node.label.clone(),
                    period: label.clone(),
                    expected,
                    actual,
                });
            }
        }
        node.children.iter().try_for_each(|c| self.verify_node(c))
    }

    /// Checks the grand total against a direct sum over `records`.
    pub fn reconcile(&self, records: &[EnrichedRecord]) -> Result<()> {
        for (period, label) in self.periods.iter().enumerate() {
            let expected: Decimal = records.iter().map(|r| r.amount(period)).sum();
            let actual = self.root.value(period);
            if expected != actual {
                return Err(BudgetError::RollupMismatch {
                    label: self.root.label.clone(),
                    period: label.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}
