use crate::chart_of_accounts::{LookupField, LookupSpec};
use crate::engine::Classifier;
use crate::error::{BudgetError, Result};
use crate::filter::RecordFilter;
use crate::ingestion::{CsvOptions, SourceRef};
use crate::join::KeyRule;
use crate::normalize::Casing;
use crate::present::TableLayout;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const CHART_OF_ACCOUNTS_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vRezgn-Gen4lhkuO13Jm_y1QhYP4UovUyDKuLvGGrKqo1JwqnzSVdsSOr26epUKCkNuWdIQd-mu46sW/pub?output=csv";
pub const EXPENSE_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vTQI0lHBLQexriYO48j0pv5wbmy0e3osDh1m9QPZB9xBkq5KRqqxFrZFroAK5Gg0_NIaTht7c7RPcWQ/pub?output=csv";
pub const REVENUE_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vQ1YaxCko649QeAXcYP83nDoDk7n_9FPX7vL7QwzcyDR9DMHBKsep5S-7tphpwlzQ-yZY5s-KOhYEPO/pub?gid=0&single=true&output=csv";
pub const CAPITAL_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vTdidCA9TjVUF9UrGHvavut7QMw0hXaRBNgN9J1FnPhB26XtOnsJ4Mupmr7KLKrq1d5aJDPobCXKvZX/pub?gid=0&single=true&output=csv";
pub const RESERVES_SHEET_URL: &str = "https://docs.google.com/spreadsheets/d/e/2PACX-1vTJcnqu3eiVpo6TWbbCtptfBwAgM5XXM1hP4t94MuhxvDW2Hb2tOhG-Cxei4WGDJ9G66DgfnLttzlwO/pub?gid=0&single=true&output=csv";

/// The General Fund.
pub const GENERAL_FUND: &str = "010";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Period {
    #[schemars(description = "Short display label, e.g. 'FY26'. Must be unique within a config.")]
    pub label: String,

    #[schemars(description = "Column holding this period's amounts, e.g. '2026 BUDGET'")]
    pub column: String,
}

impl Period {
    pub fn new(label: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            column: column.into(),
        }
    }
}

/// The two periods year-over-year change is reported between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Comparison {
    #[schemars(description = "Label of the earlier period")]
    pub prior: String,

    #[schemars(description = "Label of the later period")]
    pub current: String,
}

impl Comparison {
    pub fn new(prior: impl Into<String>, current: impl Into<String>) -> Self {
        Self {
            prior: prior.into(),
            current: current.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LookupConfig {
    #[schemars(description = "Where the chart of accounts is published")]
    pub source: SourceRef,

    #[schemars(description = "How lookup rows are keyed and which labels they provide")]
    pub spec: LookupSpec,

    #[schemars(description = "How the join key is extracted from each primary record")]
    pub key_rule: KeyRule,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    #[schemars(description = "Name used in logs, e.g. 'expenses'")]
    pub name: String,

    #[schemars(description = "Where the primary sheet is published")]
    pub source: SourceRef,

    #[serde(default)]
    #[schemars(description = "CSV dialect shared by the primary and lookup sources")]
    pub csv: CsvOptions,

    #[serde(default)]
    #[schemars(description = "Optional chart of accounts joined onto every primary record")]
    pub lookup: Option<LookupConfig>,

    #[schemars(description = "Amount columns, in display order")]
    pub periods: Vec<Period>,

    #[serde(default)]
    #[schemars(
        description = "Grouping levels from the top of the rollup down. Empty means a single grand total."
    )]
    pub levels: Vec<Classifier>,

    #[serde(default)]
    #[schemars(description = "Records outside this filter are left out of the rollup")]
    pub filter: Option<RecordFilter>,

    #[serde(default)]
    #[schemars(description = "Periods compared in summary tiles and tables")]
    pub comparison: Option<Comparison>,

    #[serde(default)]
    #[schemars(
        description = "Grouping levels for tables when they differ from the chart levels. Defaults to `levels`."
    )]
    pub table_levels: Option<Vec<Classifier>>,

    #[serde(default)]
    #[schemars(description = "Whether tables list every record under its group or one row per group")]
    pub table: TableLayout,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.periods.is_empty() {
            return Err(BudgetError::InvalidConfig(format!(
                "'{}' names no period columns",
                self.name
            )));
        }

        let mut labels = HashSet::new();
        for period in &self.periods {
            if !labels.insert(period.label.as_str()) {
                return Err(BudgetError::InvalidConfig(format!(
                    "Duplicate period label '{}'",
                    period.label
                )));
            }
        }

        if let Some(comparison) = &self.comparison {
            for label in [&comparison.prior, &comparison.current] {
                if !labels.contains(label.as_str()) {
                    return Err(BudgetError::UnknownPeriod(label.clone()));
                }
            }
        }

        self.validate_levels(&self.levels)?;
        if let Some(levels) = &self.table_levels {
            self.validate_levels(levels)?;
        }

        if self.csv.delimiter.len_utf8() != 1 {
            return Err(BudgetError::InvalidConfig(format!(
                "Delimiter '{}' is not a single-byte character",
                self.csv.delimiter
            )));
        }

        Ok(())
    }

    fn validate_levels(&self, levels: &[Classifier]) -> Result<()> {
        for level in levels {
            match level {
                Classifier::Lookup { field } => {
                    let known = self
                        .lookup
                        .as_ref()
                        .is_some_and(|l| l.spec.fields.iter().any(|f| &f.name == field));
                    if !known {
                        return Err(BudgetError::InvalidConfig(format!(
                            "Level uses lookup field '{}' which no lookup provides",
                            field
                        )));
                    }
                }
                Classifier::JoinKey if self.lookup.is_none() => {
                    return Err(BudgetError::InvalidConfig(
                        "Level groups by join key but no lookup is configured".to_string(),
                    ));
                }
                Classifier::Column { columns, .. } if columns.is_empty() => {
                    return Err(BudgetError::InvalidConfig(
                        "Column level lists no columns".to_string(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn period(&self, label: &str) -> Option<&Period> {
        self.periods.iter().find(|p| p.label == label)
    }

    /// Levels tables are grouped by.
    pub fn table_levels(&self) -> &[Classifier] {
        self.table_levels.as_deref().unwrap_or(&self.levels)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PipelineConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    /// Expenses of one fund, by function then department, FY23 actuals
    /// through the FY26 budget.
    pub fn expenses(fund: &str) -> Self {
        Self {
            name: format!("expenses-{}", fund),
            source: SourceRef::Url(EXPENSE_SHEET_URL.to_string()),
            csv: CsvOptions::default(),
            lookup: Some(chart_of_accounts()),
            periods: vec![
                Period::new("FY23", "2023 ACTUAL"),
                Period::new("FY24", "2024 ACTUAL"),
                Period::new("FY25", "2025 BUDGET"),
                Period::new("FY26", "2026 BUDGET"),
            ],
            levels: vec![Classifier::lookup("function"), Classifier::lookup("department")],
            filter: Some(RecordFilter::fund(fund)),
            comparison: Some(Comparison::new("FY25", "FY26")),
            table_levels: None,
            table: TableLayout::DrillDown,
        }
    }

    /// The landing page overview: General Fund expenses by function only,
    /// one table row per function.
    pub fn home_expenses() -> Self {
        Self {
            name: "home-expenses".to_string(),
            levels: vec![Classifier::lookup("function")],
            table: TableLayout::Summary,
            ..Self::expenses(GENERAL_FUND)
        }
    }

    /// The landing page revenue overview: FY25 actuals against the FY26
    /// budget for rows with an FY26 budget. The chart is by category; the
    /// table has one row per sub-category, or per category where the
    /// sub-category is blank. Both are title-cased so a fallback row reads
    /// like its chart slice.
    pub fn home_revenues() -> Self {
        Self {
            name: "home-revenues".to_string(),
            source: SourceRef::Url(REVENUE_SHEET_URL.to_string()),
            csv: CsvOptions::default(),
            lookup: None,
            periods: vec![
                Period::new("FY25", "2025 ACTUAL"),
                Period::new("FY26", "2026 BUDGET"),
            ],
            levels: vec![Classifier::column("REV_CATEGORY_1", Casing::Title)],
            filter: Some(RecordFilter::non_blank("2026 BUDGET")),
            comparison: Some(Comparison::new("FY25", "FY26")),
            table_levels: Some(vec![Classifier::Column {
                columns: vec!["REV_CATEGORY_2".to_string(), "REV_CATEGORY_1".to_string()],
                casing: Casing::Title,
            }]),
            table: TableLayout::Summary,
        }
    }

    /// Revenues by category then sub-category. Rows without a description
    /// are dropped; a blank sub-category falls back to the description.
    pub fn revenues() -> Self {
        Self {
            name: "revenues".to_string(),
            source: SourceRef::Url(REVENUE_SHEET_URL.to_string()),
            csv: CsvOptions::default(),
            lookup: None,
            periods: vec![
                Period::new("FY23", "2023 ACTUAL"),
                Period::new("FY24", "2024 ACTUAL"),
                Period::new("FY25", "2025 ACTUAL"),
                Period::new("FY26", "2026 BUDGET"),
            ],
            levels: vec![
                Classifier::column("REV_CATEGORY_1", Casing::Title),
                Classifier::Column {
                    columns: vec!["REV_CATEGORY_2".to_string(), "Description".to_string()],
                    casing: Casing::Preserve,
                },
            ],
            filter: Some(RecordFilter::non_blank("Description")),
            comparison: Some(Comparison::new("FY25", "FY26")),
            table_levels: None,
            table: TableLayout::DrillDown,
        }
    }

    /// Capital projects by fiscal year then department.
    pub fn capital() -> Self {
        Self {
            name: "capital".to_string(),
            source: SourceRef::Url(CAPITAL_SHEET_URL.to_string()),
            csv: CsvOptions::default(),
            lookup: None,
            periods: vec![Period::new("Amount", crate::capital::AMOUNT_COLUMN)],
            levels: vec![
                Classifier::column(crate::capital::FISCAL_YEAR_COLUMN, Casing::Preserve),
                Classifier::column(crate::capital::DEPARTMENT_COLUMN, Casing::Preserve),
            ],
            filter: Some(crate::capital::complete_rows()),
            comparison: None,
            table_levels: None,
            table: TableLayout::DrillDown,
        }
    }

    /// Reserve balances and the operating budget they are measured against,
    /// one group per fiscal year.
    pub fn reserves() -> Self {
        Self {
            name: "reserves".to_string(),
            source: SourceRef::Url(RESERVES_SHEET_URL.to_string()),
            csv: CsvOptions::default(),
            lookup: None,
            periods: vec![
                Period::new("Free Cash", crate::reserves::FREE_CASH_COLUMN),
                Period::new("General Stabilization", crate::reserves::STABILIZATION_COLUMN),
                Period::new("Operating Budget", crate::reserves::BASELINE_COLUMN),
            ],
            levels: vec![Classifier::column(
                crate::reserves::FISCAL_YEAR_COLUMN,
                Casing::Preserve,
            )],
            filter: Some(RecordFilter::non_blank(crate::reserves::FISCAL_YEAR_COLUMN)),
            comparison: None,
            table_levels: None,
            table: TableLayout::DrillDown,
        }
    }
}

/// The chart of accounts keyed by department code. Function names are
/// title-cased; department names are shown as published.
pub fn chart_of_accounts() -> LookupConfig {
    LookupConfig {
        source: SourceRef::Url(CHART_OF_ACCOUNTS_URL.to_string()),
        spec: LookupSpec {
            key_column: "DEPT CODE".to_string(),
            fields: vec![
                LookupField {
                    name: "function".to_string(),
                    columns: vec!["FUNCTION_1".to_string(), "FUNCTION_2".to_string()],
                    casing: Casing::Title,
                },
                LookupField {
                    name: "department".to_string(),
                    columns: vec!["DEPARTMENT".to_string()],
                    casing: Casing::Preserve,
                },
            ],
        },
        key_rule: KeyRule::department_code(),
    }
}
