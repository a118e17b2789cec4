use budget_transparency::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const CHART: &str = "\
DEPT CODE,DEPARTMENT,FUNCTION_1,FUNCTION_2
42,Fire,PUBLIC SAFETY,
43,Police,,PUBLIC SAFETY
50,Schools,EDUCATION,
";

const EXPENSES: &str = "\
Account Number,Description,2023 ACTUAL,2024 ACTUAL,2025 BUDGET,2026 BUDGET
010-42-5100,Salaries,\"$900\",\"$950\",\"1,000\",\"1,100\"
010-43-5200,Overtime,\"1,700\",\"1,800\",\"2,000\",\"1,900\"
010-50-5100,Teachers,\"10,000\",\"10,500\",\"11,000\",\"11,550\"
010-88-5100,Unmapped,1,1,1,1
,,,,,
600-42-5100,Enterprise,5,5,5,5
";

fn write_temp_csv(name: &str, contents: &str) -> std::io::Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("budget_transparency_{}_{}", std::process::id(), name));
    let mut file = File::create(&path)?;
    file.write_all(contents.as_bytes())?;
    Ok(path)
}

fn inline_expenses(fund: &str) -> PipelineConfig {
    let mut config = PipelineConfig::expenses(fund);
    config.source = SourceRef::Inline(EXPENSES.to_string());
    if let Some(lookup) = config.lookup.as_mut() {
        lookup.source = SourceRef::Inline(CHART.to_string());
    }
    config
}

fn department_rollup(rows: &[Record], lookup: &LookupTable) -> (Joined, Rollup) {
    let periods = [Period::new("FY25", "2025 BUDGET"), Period::new("FY26", "2026 BUDGET")];
    let joined = join(rows, lookup, &KeyRule::department_code(), &periods);
    let rollup = Rollup::new(&joined.records, &[Classifier::lookup("department")], &periods);
    (joined, rollup)
}

#[test]
fn test_fire_and_police_end_to_end() {
    let rows = vec![
        Record::from_pairs([
            ("Account Number", "010-42-5100"),
            ("2025 BUDGET", "1,000"),
            ("2026 BUDGET", "1,100"),
        ]),
        Record::from_pairs([
            ("Account Number", "010-43-5200"),
            ("2025 BUDGET", "2,000"),
            ("2026 BUDGET", "1,900"),
        ]),
    ];
    let lookup = LookupTable::from_rows(&["department"], [("42", vec!["Fire"]), ("43", vec!["Police"])]);

    let (_, rollup) = department_rollup(&rows, &lookup);
    let root = rollup.root();

    let fire = root.child("Fire").unwrap();
    assert_eq!(fire.values(), &[dec!(1000), dec!(1100)]);
    let police = root.child("Police").unwrap();
    assert_eq!(police.values(), &[dec!(2000), dec!(1900)]);

    assert_eq!(root.values(), &[dec!(3000), dec!(3000)]);
    let change = rollup.change(root, "FY25", "FY26").unwrap();
    assert_eq!(change.absolute, Decimal::ZERO);
    assert_eq!(change.percent, Decimal::ZERO);

    rollup.verify().unwrap();
}

#[test]
fn test_grand_total_reconciles_with_messy_cells() {
    let cells = ["$1,234.56", "-$200", "", "  ", "n/a", "(50)", "1,000,000", "$-3.44"];
    let rows: Vec<Record> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            Record::from_pairs([
                ("Account Number", format!("010-4{}-5100", i % 3)),
                ("2025 BUDGET", cell.to_string()),
                ("2026 BUDGET", "1".to_string()),
            ])
        })
        .collect();
    let lookup = LookupTable::from_rows(&["department"], [("40", vec!["Fire"]), ("41", vec!["Police"])]);

    let (joined, rollup) = department_rollup(&rows, &lookup);

    let raw_sum: Decimal = cells.iter().map(|c| parse_amount(c)).sum();
    assert_eq!(raw_sum, dec!(1001031.12));
    assert_eq!(rollup.total("FY25").unwrap(), raw_sum);
    assert_eq!(rollup.total("FY26").unwrap(), dec!(8));
    rollup.reconcile(&joined.records).unwrap();
    rollup.verify().unwrap();

    // "n/a" and "(50)" are reported; blanks are not
    let parse_warnings = joined
        .warnings
        .iter()
        .filter(|w| matches!(w, PipelineWarning::ValueParse(_)))
        .count();
    assert_eq!(parse_warnings, 2);
}

#[test]
fn test_oversized_cells_do_not_abort_the_rollup() {
    let huge = "79,228,162,514,264,337,593,543,950,335";
    let rows = vec![
        Record::from_pairs([("Account Number", "010-42-5100"), ("2025 BUDGET", huge), ("2026 BUDGET", "10")]),
        Record::from_pairs([("Account Number", "010-42-5200"), ("2025 BUDGET", huge), ("2026 BUDGET", "20")]),
        Record::from_pairs([("Account Number", "010-43-5100"), ("2025 BUDGET", "300"), ("2026 BUDGET", "30")]),
    ];
    let lookup = LookupTable::from_rows(&["department"], [("42", vec!["Fire"]), ("43", vec!["Police"])]);

    let (joined, rollup) = department_rollup(&rows, &lookup);

    assert_eq!(rollup.total("FY25").unwrap(), dec!(300));
    assert_eq!(rollup.total("FY26").unwrap(), dec!(60));
    assert_eq!(joined.warnings.len(), 2);
    rollup.reconcile(&joined.records).unwrap();
    rollup.verify().unwrap();
}

#[test]
fn test_unknown_keys_stay_in_the_grand_total() {
    let rows = vec![
        Record::from_pairs([("Account Number", "010-42-5100"), ("2025 BUDGET", "100"), ("2026 BUDGET", "100")]),
        Record::from_pairs([("Account Number", "010-99-5100"), ("2025 BUDGET", "40"), ("2026 BUDGET", "60")]),
        Record::from_pairs([("Account Number", "garbage"), ("2025 BUDGET", "1"), ("2026 BUDGET", "1")]),
    ];
    let lookup = LookupTable::from_rows(&["department"], [("42", vec!["Fire"])]);

    let (joined, rollup) = department_rollup(&rows, &lookup);

    let unknown = rollup.root().child(UNKNOWN_LABEL).unwrap();
    assert_eq!(unknown.values(), &[dec!(41), dec!(61)]);
    assert_eq!(unknown.count(), 2);
    assert_eq!(rollup.total("FY26").unwrap(), dec!(161));
    assert_eq!(joined.unknown_key_count(), 2);
}

#[test]
fn test_aggregation_is_idempotent() {
    let dataset = parse_csv("expenses", EXPENSES, &CsvOptions::default()).unwrap();
    let chart = parse_csv("chart", CHART, &CsvOptions::default()).unwrap();
    let config = chart_of_accounts();
    let lookup = LookupTable::build(&chart, &config.spec);
    let periods = PipelineConfig::expenses(GENERAL_FUND).periods;
    let levels = [Classifier::lookup("function"), Classifier::lookup("department")];

    let joined = join(dataset.records(), &lookup, &config.key_rule, &periods);
    let first = Rollup::new(&joined.records, &levels, &periods);
    let second = Rollup::new(&joined.records, &levels, &periods);

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn test_parse_amount_examples() {
    assert_eq!(parse_amount("$1,234.50"), dec!(1234.50));
    assert_eq!(parse_amount("-2,000"), dec!(-2000));
    assert_eq!(parse_amount("-$75"), dec!(-75));
    assert_eq!(parse_amount(""), Decimal::ZERO);
    assert_eq!(parse_amount("TBD"), Decimal::ZERO);
    assert_eq!(try_parse_amount("TBD"), None);
}

#[test]
fn test_delta_examples() {
    assert_eq!(delta(dec!(100), dec!(150)), Change { absolute: dec!(50), percent: dec!(50) });
    assert_eq!(delta(dec!(100), dec!(80)), Change { absolute: dec!(-20), percent: dec!(-20) });
    assert_eq!(delta(Decimal::ZERO, dec!(500)), Change { absolute: dec!(500), percent: Decimal::ZERO });
}

#[test]
fn test_schema_generation() {
    let schema_json = PipelineConfig::schema_as_json().unwrap();
    assert!(schema_json.contains("comparison"));
    assert!(schema_json.contains("filter"));
}

#[tokio::test]
async fn test_pipeline_from_files() -> anyhow::Result<()> {
    let chart_path = write_temp_csv("chart.csv", CHART)?;
    let expenses_path = write_temp_csv("expenses.csv", EXPENSES)?;

    let mut config = PipelineConfig::expenses(GENERAL_FUND);
    config.source = SourceRef::Path(expenses_path.to_string_lossy().into_owned());
    if let Some(lookup) = config.lookup.as_mut() {
        lookup.source = SourceRef::Path(chart_path.to_string_lossy().into_owned());
    }

    let pipeline = BudgetPipeline::new(config)?;
    let output = pipeline.run(&LocalFetcher).await?;

    let root = output.rollup.root();
    let functions: Vec<&str> = root.children().iter().map(|c| c.label()).collect();
    assert_eq!(functions, vec!["Public Safety", "Education", UNKNOWN_LABEL]);
    assert_eq!(root.find(&["Public Safety", "Police"]).map(|n| n.count()), Some(1));
    assert_eq!(output.rollup.total("FY26")?, dec!(14551));
    assert_eq!(output.warnings.len(), 1);

    let tiles = pipeline.summary(&output)?.expect("expenses compare FY25 with FY26");
    assert_eq!(tiles.largest.as_deref(), Some("Education"));
    assert_eq!(tiles.change.absolute, dec!(550));

    let rows = pipeline
        .table(&output, &["Account Number", "Description"])?
        .expect("expenses compare FY25 with FY26");
    let last = rows.last().expect("grand total row");
    assert_eq!(last.kind, RowKind::GrandTotal);
    assert_eq!(last.values[3], dec!(14551));

    std::fs::remove_file(chart_path)?;
    std::fs::remove_file(expenses_path)?;
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_unreachable() {
    let mut config = inline_expenses(GENERAL_FUND);
    config.source = SourceRef::Path("/nonexistent/budget.csv".to_string());
    let pipeline = BudgetPipeline::new(config).unwrap();

    let result = pipeline.run(&LocalFetcher).await;
    assert!(matches!(
        result,
        Err(BudgetError::Source(SourceError::Unreachable { .. }))
    ));
}

#[tokio::test]
async fn test_non_utf8_file_is_malformed() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("budget_transparency_{}_latin1.csv", std::process::id()));
    std::fs::write(&path, [0xff, 0xfe, b'\n'])?;
    let source = SourceRef::Path(path.to_string_lossy().into_owned());

    let result = LocalFetcher.fetch(&source).await;
    match result {
        Err(SourceError::Malformed { source_ref, .. }) => {
            assert_eq!(source_ref, path.to_string_lossy());
        }
        other => panic!("expected a malformed source, got {:?}", other),
    }

    let loaded = load(&LocalFetcher, &source, &CsvOptions::default()).await;
    assert!(matches!(loaded, Err(SourceError::Malformed { .. })));

    std::fs::remove_file(path)?;
    Ok(())
}

#[derive(Default)]
struct RecordingPresenter {
    totals: Mutex<Vec<Decimal>>,
    failures: Mutex<Vec<String>>,
}

impl Presenter for RecordingPresenter {
    fn present(&self, output: &PipelineOutput) {
        let total = output.rollup.root().values().last().copied().unwrap_or_default();
        self.totals.lock().unwrap().push(total);
    }

    fn fail(&self, error: &BudgetError) {
        self.failures.lock().unwrap().push(error.to_string());
    }
}

impl RecordingPresenter {
    fn totals(&self) -> Vec<Decimal> {
        self.totals.lock().unwrap().clone()
    }

    fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

/// Serves inline sources, waiting `delays_ms[n]` on the n-th fetch and
/// failing the fetch numbered `fail_on`.
#[derive(Default)]
struct ScriptedFetcher {
    calls: AtomicUsize,
    delays_ms: Vec<u64>,
    fail_on: Option<usize>,
}

impl Fetch for ScriptedFetcher {
    async fn fetch(&self, source: &SourceRef) -> std::result::Result<String, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays_ms.get(call).copied().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if self.fail_on == Some(call) {
            return Err(SourceError::unreachable(source.to_string(), "timed out"));
        }
        LocalFetcher.fetch(source).await
    }
}

fn revenue_config() -> PipelineConfig {
    let mut config = PipelineConfig::revenues();
    config.source = SourceRef::Inline(
        "REV_CATEGORY_1,REV_CATEGORY_2,Description,2023 ACTUAL,2024 ACTUAL,2025 ACTUAL,2026 BUDGET\n\
         TAXES,Property,Real estate,\"90,000\",\"95,000\",\"100,000\",\"104,000\"\n\
         local receipts,,Parking fines,10,20,30,40\n\
         ,,,,,,\n"
            .to_string(),
    );
    config
}

#[tokio::test]
async fn test_revenue_fallback_labels() {
    let pipeline = BudgetPipeline::new(revenue_config()).unwrap();
    let output = pipeline.run(&LocalFetcher).await.unwrap();
    let root = output.rollup.root();

    assert_eq!(root.children()[0].label(), "Taxes");
    assert!(root.find(&["Taxes", "Property"]).is_some());
    assert!(root.find(&["Local Receipts", "Parking fines"]).is_some());
    assert_eq!(output.rollup.total("FY26").unwrap(), dec!(104040));
}

#[tokio::test]
async fn test_stale_load_is_discarded_in_completion_order() {
    let pipeline = BudgetPipeline::new(inline_expenses(GENERAL_FUND)).unwrap();
    let session = BudgetSession::new(pipeline, LocalFetcher, RecordingPresenter::default());

    let first = session.load();
    let second = session.load();

    assert_eq!(second.await, Delivery::Presented);
    assert_eq!(first.await, Delivery::Discarded);
    assert_eq!(session.presenter().totals(), vec![dec!(14551)]);
}

#[tokio::test]
async fn test_slow_stale_response_never_overwrites_fast_one() {
    let pipeline = BudgetPipeline::new(revenue_config()).unwrap();
    let fetcher = ScriptedFetcher {
        delays_ms: vec![80, 0],
        ..Default::default()
    };
    let session = BudgetSession::new(pipeline, fetcher, RecordingPresenter::default());

    let (slow, fast) = tokio::join!(session.load(), session.load());

    assert_eq!(slow, Delivery::Discarded);
    assert_eq!(fast, Delivery::Presented);
    assert_eq!(session.presenter().totals().len(), 1);
}

#[tokio::test]
async fn test_stale_failure_is_not_shown() {
    let pipeline = BudgetPipeline::new(revenue_config()).unwrap();
    let fetcher = ScriptedFetcher {
        delays_ms: vec![50, 0],
        fail_on: Some(0),
        ..Default::default()
    };
    let session = BudgetSession::new(pipeline, fetcher, RecordingPresenter::default());

    let (stale, current) = tokio::join!(session.load(), session.load());

    assert_eq!(stale, Delivery::Discarded);
    assert_eq!(current, Delivery::Presented);
    assert!(session.presenter().failures().is_empty());
}

#[tokio::test]
async fn test_current_failure_reaches_presenter() {
    let pipeline = BudgetPipeline::new(revenue_config()).unwrap();
    let fetcher = ScriptedFetcher {
        fail_on: Some(0),
        ..Default::default()
    };
    let session = BudgetSession::new(pipeline, fetcher, RecordingPresenter::default());

    assert_eq!(session.load().await, Delivery::Failed);
    let failures = session.presenter().failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("timed out"));
    assert!(session.presenter().totals().is_empty());
}

#[tokio::test]
async fn test_refilter_reuses_loaded_sources() {
    let pipeline = BudgetPipeline::new(inline_expenses(GENERAL_FUND)).unwrap();
    let fetcher = ScriptedFetcher::default();
    let session = BudgetSession::new(pipeline, fetcher, RecordingPresenter::default());

    assert_eq!(session.load().await, Delivery::Presented);
    assert_eq!(session.refilter(Some(RecordFilter::fund("600"))).await, Delivery::Presented);

    assert_eq!(session.presenter().totals(), vec![dec!(14551), dec!(5)]);
    assert_eq!(session.filter(), Some(RecordFilter::fund("600")));
}

#[tokio::test]
async fn test_refilter_supersedes_inflight_load() {
    let pipeline = BudgetPipeline::new(inline_expenses(GENERAL_FUND)).unwrap();
    let session = BudgetSession::new(pipeline, LocalFetcher, RecordingPresenter::default());

    let load = session.load();
    let refilter = session.refilter(Some(RecordFilter::fund("600")));

    let (load, refilter) = tokio::join!(load, refilter);
    assert_eq!(load, Delivery::Discarded);
    assert_eq!(refilter, Delivery::Presented);
    assert_eq!(session.presenter().totals(), vec![dec!(5)]);
}

#[test]
fn test_capital_and_reserves_from_text() {
    let capital = parse_csv(
        "capital",
        "FISCAL YEAR,DEPARTMENT,PURPOSE,AMOUNT,FUNDING SOURCE\n\
         2025,Fire,Engine,\"900,000\",Borrowing\n\
         2024,DPW,Truck,\"250,000\",Free Cash\n",
        &CsvOptions::default(),
    )
    .unwrap();
    let summary = CapitalSummary::from_records(capital.records());
    assert_eq!(summary.latest_year, Some(2025));
    assert_eq!(summary.latest_year_total, dec!(900000));

    let reserves = parse_csv(
        "reserves",
        "FISCAL YEAR,CERTIFIED FREE CASH,GENERAL STABILIZATION,PRIOR YEAR OPERATING BUDGET\n\
         2024,\"3,000,000\",\"1,500,000\",\"60,000,000\"\n",
        &CsvOptions::default(),
    )
    .unwrap();
    let free_cash = ReserveSeries::free_cash(reserves.records());
    assert_eq!(free_cash.points[0].ratio, dec!(0.05));
    assert_eq!(free_cash.percents(reserves::CHART_YEARS), vec![dec!(5)]);
}
