//! Headline figures for the capital projects sheet.

use crate::filter::RecordFilter;
use crate::normalize::{parse_amount, Casing};
use crate::record::Record;
use rust_decimal::Decimal;
use serde::Serialize;

pub const FISCAL_YEAR_COLUMN: &str = "FISCAL YEAR";
pub const DEPARTMENT_COLUMN: &str = "DEPARTMENT";
pub const FUNDING_SOURCE_COLUMN: &str = "FUNDING SOURCE";
pub const PURPOSE_COLUMN: &str = "PURPOSE";
pub const AMOUNT_COLUMN: &str = "AMOUNT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearTotal {
    pub year: i32,
    pub total: Decimal,
    /// The year's projects in sheet order.
    pub projects: Vec<CapitalProject>,
}

/// Rows that name both a fiscal year and an amount. Anything else is a
/// spacer or note row and is left out of every capital figure.
pub fn complete_rows() -> RecordFilter {
    RecordFilter::All {
        filters: vec![
            RecordFilter::non_blank(FISCAL_YEAR_COLUMN),
            RecordFilter::non_blank(AMOUNT_COLUMN),
        ],
    }
}

/// One line of a year's project list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapitalProject {
    pub department: String,
    pub purpose: String,
    pub amount: Decimal,
    pub funding_source: String,
}

impl CapitalProject {
    fn from_record(record: &Record) -> Self {
        Self {
            department: label(record, DEPARTMENT_COLUMN),
            purpose: record.text(PURPOSE_COLUMN).trim().to_string(),
            amount: parse_amount(record.text(AMOUNT_COLUMN)),
            funding_source: label(record, FUNDING_SOURCE_COLUMN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapitalSummary {
    /// Highest fiscal year present; `None` when no row has a numeric year.
    pub latest_year: Option<i32>,
    /// Sum over every row, whatever its year.
    pub total: Decimal,
    pub latest_year_total: Decimal,
    /// Department with the largest total across all years.
    pub top_department: Option<(String, Decimal)>,
    /// Funding source named on the most projects.
    pub top_funding_source: Option<String>,
    /// Ascending by year.
    pub by_year: Vec<YearTotal>,
}

// Insertion-ordered tally so ties resolve to the first label seen.
fn tally<V: Copy + std::ops::AddAssign>(tallies: &mut Vec<(String, V)>, label: &str, value: V) {
    match tallies.iter_mut().find(|(l, _)| l == label) {
        Some((_, total)) => *total += value,
        None => tallies.push((label.to_string(), value)),
    }
}

fn largest<V: Copy + PartialOrd>(tallies: Vec<(String, V)>) -> Option<(String, V)> {
    let mut best: Option<(String, V)> = None;
    for (label, value) in tallies {
        match &best {
            Some((_, current)) if value <= *current => {}
            _ => best = Some((label, value)),
        }
    }
    best
}

fn label(record: &Record, column: &str) -> String {
    Casing::Preserve.label_or_unknown(record.field(column).value())
}

fn fiscal_year(record: &Record) -> Option<i32> {
    record.field(FISCAL_YEAR_COLUMN).value()?.parse().ok()
}

impl CapitalSummary {
    /// Summarizes the rows passing [`complete_rows`]. Blank departments and
    /// funding sources are tallied as `Unknown`.
    pub fn from_records(records: &[Record]) -> Self {
        let filter = complete_rows();
        let records: Vec<&Record> = records.iter().filter(|r| filter.matches(r)).collect();
        let latest_year = records.iter().copied().filter_map(fiscal_year).max();

        let mut total = Decimal::ZERO;
        let mut latest_year_total = Decimal::ZERO;
        let mut departments: Vec<(String, Decimal)> = Vec::new();
        let mut sources: Vec<(String, usize)> = Vec::new();
        let mut years: Vec<YearTotal> = Vec::new();

        for record in records {
            let amount = parse_amount(record.text(AMOUNT_COLUMN));
            let year = fiscal_year(record);
            total += amount;
            if year.is_some() && year == latest_year {
                latest_year_total += amount;
            }

            tally(&mut departments, &label(record, DEPARTMENT_COLUMN), amount);
            tally(&mut sources, &label(record, FUNDING_SOURCE_COLUMN), 1usize);

            if let Some(year) = year {
                let project = CapitalProject::from_record(record);
                match years.iter_mut().find(|y| y.year == year) {
                    Some(entry) => {
                        entry.total += amount;
                        entry.projects.push(project);
                    }
                    None => years.push(YearTotal {
                        year,
                        total: amount,
                        projects: vec![project],
                    }),
                }
            }
        }

        years.sort_by_key(|y| y.year);

        Self {
            latest_year,
            total,
            latest_year_total,
            top_department: largest(departments),
            top_funding_source: largest(sources).map(|(label, _)| label),
            by_year: years,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::{parse_csv, CsvOptions};
    use crate::normalize::UNKNOWN_LABEL;
    use rust_decimal_macros::dec;

    const CAPITAL: &str = "\
FISCAL YEAR,DEPARTMENT,PURPOSE,AMOUNT,FUNDING SOURCE
2024,DPW,Plow truck,\"250,000\",Free Cash
2025,Fire,Engine,\"900,000\",Borrowing
2025,DPW,Sidewalks,\"120,000\",Free Cash
2023,Schools,Roof,\"400,000\",Borrowing
2025,Library,Shelving,\"15,000\",Free Cash
";

    #[test]
    fn test_summary() {
        let dataset = parse_csv("capital", CAPITAL, &CsvOptions::default()).unwrap();
        let summary = CapitalSummary::from_records(dataset.records());

        assert_eq!(summary.latest_year, Some(2025));
        assert_eq!(summary.total, dec!(1685000));
        assert_eq!(summary.latest_year_total, dec!(1035000));
        assert_eq!(
            summary.top_department,
            Some(("Fire".to_string(), dec!(900000)))
        );
        assert_eq!(summary.top_funding_source.as_deref(), Some("Free Cash"));

        let years: Vec<i32> = summary.by_year.iter().map(|y| y.year).collect();
        assert_eq!(years, vec![2023, 2024, 2025]);
        assert_eq!(summary.by_year[1].total, dec!(250000));

        let purposes: Vec<&str> = summary.by_year[2]
            .projects
            .iter()
            .map(|p| p.purpose.as_str())
            .collect();
        assert_eq!(purposes, vec!["Engine", "Sidewalks", "Shelving"]);
        assert_eq!(summary.by_year[2].projects[0].funding_source, "Borrowing");
    }

    #[test]
    fn test_blank_labels_tally_as_unknown() {
        let records = vec![
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", ""), ("AMOUNT", "500"), ("FUNDING SOURCE", "")]),
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", "  "), ("AMOUNT", "500"), ("FUNDING SOURCE", " ")]),
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", "Fire"), ("AMOUNT", "100"), ("FUNDING SOURCE", "Free Cash")]),
        ];
        let summary = CapitalSummary::from_records(&records);

        assert_eq!(
            summary.top_department,
            Some((UNKNOWN_LABEL.to_string(), dec!(1000)))
        );
        assert_eq!(summary.top_funding_source.as_deref(), Some(UNKNOWN_LABEL));
        assert_eq!(summary.by_year[0].projects[0].department, UNKNOWN_LABEL);
    }

    #[test]
    fn test_rows_without_year_or_amount_are_skipped() {
        let records = vec![
            Record::from_pairs([("FISCAL YEAR", ""), ("DEPARTMENT", "Schools"), ("AMOUNT", "5000")]),
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", "Schools"), ("AMOUNT", "")]),
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", "Fire"), ("AMOUNT", "100")]),
        ];
        let summary = CapitalSummary::from_records(&records);

        assert_eq!(summary.total, dec!(100));
        assert_eq!(summary.top_department.map(|(d, _)| d).as_deref(), Some("Fire"));
        assert_eq!(summary.by_year.len(), 1);
        assert_eq!(summary.by_year[0].projects.len(), 1);
    }

    #[test]
    fn test_empty() {
        let summary = CapitalSummary::from_records(&[]);
        assert_eq!(summary.latest_year, None);
        assert_eq!(summary.total, Decimal::ZERO);
        assert_eq!(summary.top_department, None);
        assert!(summary.by_year.is_empty());
    }

    #[test]
    fn test_department_ties_go_to_first_seen() {
        let records = vec![
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", "Parks"), ("AMOUNT", "10")]),
            Record::from_pairs([("FISCAL YEAR", "2025"), ("DEPARTMENT", "DPW"), ("AMOUNT", "10")]),
        ];
        let summary = CapitalSummary::from_records(&records);
        assert_eq!(summary.top_department.map(|(d, _)| d).as_deref(), Some("Parks"));
    }
}
