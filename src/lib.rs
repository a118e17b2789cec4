//! # Budget Transparency
//!
//! A library for turning a town's published budget spreadsheets into
//! hierarchical rollups with year-over-year change, ready for charts and
//! drill-down tables.
//!
//! ## Core Concepts
//!
//! - **Sources**: Published CSV exports (expenses, revenues, capital, reserves) plus a
//!   chart of accounts that maps department codes to functions and departments
//! - **Join**: Every expense row is classified through its account number; unmapped
//!   codes land in an `Unknown` group instead of being dropped
//! - **Rollup**: Records grouped level by level (e.g. function, then department) with
//!   every period summed bottom-up, so each subtotal equals the sum of its parts
//! - **Change**: Absolute and percent change between two periods, zero percent when the
//!   prior amount is zero
//! - **Last request wins**: Overlapping loads on one page never show stale data
//!
//! ## Example
//!
//! ```rust,ignore
//! use budget_transparency::*;
//!
//! let pipeline = BudgetPipeline::new(PipelineConfig::expenses(GENERAL_FUND))?;
//! let output = pipeline.run(&HttpFetcher::new()).await?;
//!
//! let tiles = pipeline.summary(&output)?.unwrap();
//! println!("FY26 total: {}", abbreviate(tiles.total));
//! for slice in pie_slices(output.rollup.root(), 3) {
//!     println!("{}: {}%", slice.label, slice.share.round_dp(1));
//! }
//! ```

pub mod capital;
pub mod change;
pub mod chart_of_accounts;
pub mod engine;
pub mod error;
pub mod filter;
pub mod ingestion;
pub mod join;
pub mod normalize;
pub mod pipeline;
pub mod present;
pub mod record;
pub mod reserves;
pub mod schema;
pub mod session;
pub mod utils;
pub mod view;

pub use capital::{complete_rows, CapitalProject, CapitalSummary, YearTotal};
pub use change::{delta, Change};
pub use chart_of_accounts::{
    Classification, LookupField, LookupSpec, LookupTable, OutlineEntry, OutlineGroup,
};
pub use engine::{
    aggregate, AggregateNode, Classifier, Classify, ClassifyFn, Rollup, SortKey,
    GRAND_TOTAL_LABEL,
};
pub use error::{
    BudgetError, PipelineWarning, Result, SourceError, UnknownKeyWarning, ValueParseWarning,
};
pub use filter::RecordFilter;
pub use ingestion::*;
pub use join::{enrich, join, EnrichedRecord, Joined, KeyRule, ACCOUNT_NUMBER_COLUMN};
pub use normalize::{
    parse_amount, title_case, try_parse_amount, Casing, AMOUNT_LIMIT, UNKNOWN_LABEL,
};
pub use pipeline::{BudgetPipeline, LoadedSources, PipelineOutput};
pub use present::*;
pub use record::{Columns, Dataset, Field, Record};
pub use reserves::{ReservePoint, ReserveSeries};
pub use schema::*;
pub use session::{BudgetSession, Delivery, LoadSequencer, Presenter, Ticket};
pub use utils::*;
pub use view::{ViewHandle, ViewRegion};

use log::{debug, info};

/// Builds a rollup directly from parsed records and checks it before
/// returning: every subtotal must equal its parts and the grand total must
/// equal the plain sum of the records.
pub fn rollup_with_verification<C: Classify>(
    records: &[EnrichedRecord],
    levels: &[C],
    periods: &[Period],
) -> Result<Rollup> {
    info!(
        "Rolling up {} records over {} levels and {} periods",
        records.len(),
        levels.len(),
        periods.len()
    );

    let rollup = Rollup::new(records, levels, periods);
    rollup.verify()?;
    rollup.reconcile(records)?;

    debug!(
        "Rollup verified: {} top-level groups",
        rollup.root().children().len()
    );
    Ok(rollup)
}
