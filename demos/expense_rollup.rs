use budget_transparency::*;

const CHART: &str = "\
DEPT CODE,DEPARTMENT,FUNCTION_1,FUNCTION_2
41,Town Manager,GENERAL GOVERNMENT,
42,Fire,PUBLIC SAFETY,
43,Police,PUBLIC SAFETY,
50,Schools,EDUCATION,
60,DPW,,public works
";

const EXPENSES: &str = "\
Account Number,Description,2023 ACTUAL,2024 ACTUAL,2025 BUDGET,2026 BUDGET
010-41-5100,Salaries,\"410,000\",\"425,000\",\"440,000\",\"455,000\"
010-42-5100,Salaries,\"2,100,000\",\"2,250,000\",\"2,400,000\",\"2,520,000\"
010-42-5400,Apparatus maintenance,\"85,000\",\"92,000\",\"95,000\",\"90,000\"
010-43-5100,Salaries,\"2,600,000\",\"2,700,000\",\"2,850,000\",\"2,900,000\"
010-50-5100,Assessment,\"18,000,000\",\"18,900,000\",\"19,800,000\",\"20,600,000\"
010-60-5200,Snow and ice,\"310,000\",\"450,000\",\"300,000\",\"300,000\"
010-77-5100,Unassigned,\"1,000\",\"1,000\",\"1,000\",\"1,000\"
600-60-5100,Water enterprise,\"900,000\",\"950,000\",\"990,000\",\"1,020,000\"
";

/// Pass `--live` (with the `http` feature) to fetch the published sheets
/// instead of the bundled sample.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    println!("📊 General Fund Expense Rollup\n");

    let live = std::env::args().any(|a| a == "--live");
    if live && !cfg!(feature = "http") {
        log::warn!("Built without the `http` feature; using the bundled sample");
    }
    let live = live && cfg!(feature = "http");
    let mut config = PipelineConfig::expenses(GENERAL_FUND);
    if !live {
        config.source = SourceRef::Inline(EXPENSES.to_string());
        if let Some(lookup) = config.lookup.as_mut() {
            lookup.source = SourceRef::Inline(CHART.to_string());
        }
    }

    let pipeline = BudgetPipeline::new(config)?;
    let output = run(&pipeline, live).await?;
    let rollup = &output.rollup;

    if let Some(tiles) = pipeline.summary(&output)? {
        let [total, largest, change, percent] = tiles.formatted();
        println!("FY26 total:        {}", total);
        println!("Largest function:  {}", largest);
        println!("Change from FY25:  {} ({})\n", change, percent);
    }

    let current = rollup.period_index("FY26")?;
    println!("By function (FY26):");
    for slice in pie_slices(&rollup.root().sorted(SortKey::ByValueDescending(current)), current) {
        println!(
            "  {:<22} {:>12} {:>6}",
            slice.label,
            format_currency(slice.value),
            format_percent(slice.share)
        );
    }

    println!("\nDrill-down:");
    let rows = pipeline
        .table(&output, &[ACCOUNT_NUMBER_COLUMN, "Description"])?
        .unwrap_or_default();
    for row in rows {
        let label = match row.kind {
            RowKind::Detail => row.cells.join("  "),
            RowKind::Subtotal | RowKind::Group | RowKind::GrandTotal => row.label.clone(),
        };
        println!(
            "  {:indent$}{:<36} {:>12} {:>12} {:>7}",
            "",
            label,
            format_currency(row.values[2]),
            format_currency(row.values[3]),
            format_percent(row.change.percent),
            indent = row.depth * 2
        );
    }

    if !output.warnings.is_empty() {
        println!("\n⚠️  {} warnings:", output.warnings.len());
        for warning in &output.warnings {
            println!("  {}", warning);
        }
    }

    Ok(())
}

#[cfg(feature = "http")]
async fn run(pipeline: &BudgetPipeline, live: bool) -> Result<PipelineOutput> {
    if live {
        pipeline.run(&HttpFetcher::new()).await
    } else {
        pipeline.run(&LocalFetcher).await
    }
}

#[cfg(not(feature = "http"))]
async fn run(pipeline: &BudgetPipeline, _live: bool) -> Result<PipelineOutput> {
    pipeline.run(&LocalFetcher).await
}
