//! Reserve fund balances measured against the prior year's operating budget.

use crate::normalize::parse_amount;
use crate::record::Record;
use rust_decimal::Decimal;
use serde::Serialize;

pub const FISCAL_YEAR_COLUMN: &str = "FISCAL YEAR";
pub const FREE_CASH_COLUMN: &str = "CERTIFIED FREE CASH";
pub const STABILIZATION_COLUMN: &str = "GENERAL STABILIZATION";
pub const BASELINE_COLUMN: &str = "PRIOR YEAR OPERATING BUDGET";

/// How many of the most recent years the reserve charts show.
pub const CHART_YEARS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservePoint {
    pub fiscal_year: String,
    pub amount: Decimal,
    pub prior_budget: Decimal,
    /// `amount / prior_budget`, as a fraction.
    pub ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReserveSeries {
    pub column: String,
    pub points: Vec<ReservePoint>,
}

impl ReserveSeries {
    /// Points for `column` in sheet order. Rows without a fiscal year, rows
    /// where either the balance or the baseline budget is zero, and rows whose
    /// ratio is out of range are left out.
    pub fn from_records(records: &[Record], column: &str) -> Self {
        let points = records
            .iter()
            .filter_map(|record| {
                let fiscal_year = record.field(FISCAL_YEAR_COLUMN).value()?;
                let amount = parse_amount(record.text(column));
                let prior_budget = parse_amount(record.text(BASELINE_COLUMN));
                if amount.is_zero() || prior_budget.is_zero() {
                    return None;
                }
                Some(ReservePoint {
                    fiscal_year: fiscal_year.to_string(),
                    amount,
                    prior_budget,
                    ratio: amount.checked_div(prior_budget)?,
                })
            })
            .collect();

        Self {
            column: column.to_string(),
            points,
        }
    }

    pub fn free_cash(records: &[Record]) -> Self {
        Self::from_records(records, FREE_CASH_COLUMN)
    }

    pub fn stabilization(records: &[Record]) -> Self {
        Self::from_records(records, STABILIZATION_COLUMN)
    }

    /// The last `n` points.
    pub fn recent(&self, n: usize) -> &[ReservePoint] {
        &self.points[self.points.len().saturating_sub(n)..]
    }

    /// Ratio as a percent, for chart axes.
    pub fn percents(&self, n: usize) -> Vec<Decimal> {
        self.recent(n)
            .iter()
            .map(|p| p.ratio.saturating_mul(Decimal::ONE_HUNDRED))
            .collect()
    }
}
