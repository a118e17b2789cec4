//! Serializable projections of a [`Rollup`] for charts, tables and summary
//! tiles. Nothing here renders; a front end consumes these as data.

use crate::change::{delta, Change};
use crate::engine::{AggregateNode, Rollup, GRAND_TOTAL_LABEL};
use crate::error::Result;
use crate::join::EnrichedRecord;
use crate::utils::{abbreviate, format_percent};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: Decimal,
    /// Percent of the parent's value; zero when the parent total is zero or the
    /// share is out of range.
    pub share: Decimal,
}

/// One slice per child of `node`, valued in `period`.
pub fn pie_slices(node: &AggregateNode, period: usize) -> Vec<PieSlice> {
    let total = node.value(period);
    node.children()
        .iter()
        .map(|child| {
            let value = child.value(period);
            let share = value
                .checked_div(total)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::ZERO);
            PieSlice {
                label: child.label().to_string(),
                value,
                share,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackedSeries {
    pub label: String,
    /// One value per period, in period order.
    pub values: Vec<Decimal>,
}

/// One series per child of `node`, for stacked bar charts across periods.
pub fn stacked_series(node: &AggregateNode) -> Vec<StackedSeries> {
    node.children()
        .iter()
        .map(|child| StackedSeries {
            label: child.label().to_string(),
            values: child.values().to_vec(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowKind {
    Detail,
    Subtotal,
    /// A group's own row in a [`TableLayout::Summary`] table.
    Group,
    GrandTotal,
}

/// Which rows [`table_rows`] emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// Each group's records, then its subtotal.
    #[default]
    DrillDown,
    /// One row per group, parents before their children. No record rows.
    Summary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub kind: RowKind,
    /// 1 for top-level groups; 0 for the grand total.
    pub depth: usize,
    pub label: String,
    /// Detail columns, copied from the record. Empty for total rows.
    pub cells: Vec<String>,
    pub values: Vec<Decimal>,
    pub change: Change,
    /// Link target for subtotal rows, e.g. `Fire-Public_Safety`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,
}

/// Flattens the rollup into table rows with a grand total row last.
///
/// In a [`TableLayout::DrillDown`] table each group lists its records
/// (showing `detail_columns`) followed by its subtotal. A
/// [`TableLayout::Summary`] table has one row per group and ignores
/// `detail_columns`. Change columns compare `prior` with `current`.
pub fn table_rows<S: AsRef<str>>(
    rollup: &Rollup,
    prior: &str,
    current: &str,
    layout: TableLayout,
    detail_columns: &[S],
) -> Result<Vec<TableRow>> {
    let prior = rollup.period_index(prior)?;
    let current = rollup.period_index(current)?;
    let mut rows = Vec::with_capacity(rollup.root().count() * 2 + 1);
    let mut path = Vec::new();

    match layout {
        TableLayout::DrillDown => {
            for child in rollup.root().children() {
                push_group(child, 1, &mut path, prior, current, detail_columns, &mut rows);
            }
            if rollup.root().is_leaf() {
                for record in rollup.root().records() {
                    rows.push(detail_row(record, 1, prior, current, detail_columns));
                }
            }
        }
        TableLayout::Summary => {
            for child in rollup.root().children() {
                push_summary(child, 1, &mut path, prior, current, &mut rows);
            }
        }
    }

    let root = rollup.root();
    rows.push(TableRow {
        kind: RowKind::GrandTotal,
        depth: 0,
        label: GRAND_TOTAL_LABEL.to_string(),
        cells: Vec::new(),
        values: root.values().to_vec(),
        change: delta(root.value(prior), root.value(current)),
        anchor: None,
    });
    Ok(rows)
}

fn push_group<'a, S: AsRef<str>>(
    node: &'a AggregateNode,
    depth: usize,
    path: &mut Vec<&'a str>,
    prior: usize,
    current: usize,
    detail_columns: &[S],
    rows: &mut Vec<TableRow>,
) {
    path.push(node.label());
    for child in node.children() {
        push_group(child, depth + 1, path, prior, current, detail_columns, rows);
    }
    for record in node.records() {
        rows.push(detail_row(record, depth + 1, prior, current, detail_columns));
    }
    rows.push(TableRow {
        kind: RowKind::Subtotal,
        depth,
        label: format!("Subtotal - {}", node.label()),
        cells: Vec::new(),
        values: node.values().to_vec(),
        change: delta(node.value(prior), node.value(current)),
        anchor: Some(anchor(path)),
    });
    path.pop();
}

fn push_summary<'a>(
    node: &'a AggregateNode,
    depth: usize,
    path: &mut Vec<&'a str>,
    prior: usize,
    current: usize,
    rows: &mut Vec<TableRow>,
) {
    path.push(node.label());
    rows.push(TableRow {
        kind: RowKind::Group,
        depth,
        label: node.label().to_string(),
        cells: Vec::new(),
        values: node.values().to_vec(),
        change: delta(node.value(prior), node.value(current)),
        anchor: Some(anchor(path)),
    });
    for child in node.children() {
        push_summary(child, depth + 1, path, prior, current, rows);
    }
    path.pop();
}

fn detail_row<S: AsRef<str>>(
    record: &EnrichedRecord,
    depth: usize,
    prior: usize,
    current: usize,
    detail_columns: &[S],
) -> TableRow {
    TableRow {
        kind: RowKind::Detail,
        depth,
        label: String::new(),
        cells: detail_columns
            .iter()
            .map(|c| record.record().text(c.as_ref()).trim().to_string())
            .collect(),
        values: record.amounts().to_vec(),
        change: delta(record.amount(prior), record.amount(current)),
        anchor: None,
    }
}

/// Innermost label first, whitespace runs replaced by `_`, joined by `-`.
pub fn anchor(path: &[&str]) -> String {
    path.iter()
        .rev()
        .map(|label| label.split_whitespace().collect::<Vec<_>>().join("_"))
        .collect::<Vec<_>>()
        .join("-")
}

/// The four headline figures shown above a rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTiles {
    pub period: String,
    pub total: Decimal,
    /// Top-level group with the largest value in `period`.
    pub largest: Option<String>,
    pub change: Change,
}

impl SummaryTiles {
    pub fn new(rollup: &Rollup, prior: &str, current: &str) -> Result<Self> {
        Ok(Self {
            period: current.to_string(),
            total: rollup.total(current)?,
            largest: rollup
                .largest_child(current)?
                .map(|node| node.label().to_string()),
            change: rollup.change(rollup.root(), prior, current)?,
        })
    }

    /// Display strings: total, largest group, dollar change, percent change.
    pub fn formatted(&self) -> [String; 4] {
        [
            abbreviate(self.total),
            self.largest.clone().unwrap_or_else(|| "N/A".to_string()),
            abbreviate(self.change.absolute),
            format_percent(self.change.percent),
        ]
    }
}

/// "Show More" state for a long list: collapsed, only the last `max_rows`
/// items are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShowMore {
    pub max_rows: usize,
    pub expanded: bool,
}

impl Default for ShowMore {
    fn default() -> Self {
        Self::new(10)
    }
}

impl ShowMore {
    pub fn new(max_rows: usize) -> Self {
        Self {
            max_rows,
            expanded: false,
        }
    }

    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        if self.expanded || items.len() <= self.max_rows {
            items
        } else {
            &items[items.len() - self.max_rows..]
        }
    }

    pub fn toggle(&mut self) {
        self.expanded = !self.expanded;
    }

    /// Whether a toggle is worth offering for `len` items.
    pub fn is_needed(&self, len: usize) -> bool {
        len > self.max_rows
    }

    pub fn label(&self) -> &'static str {
        if self.expanded {
            "Show Fewer"
        } else {
            "Show More"
        }
    }
}
