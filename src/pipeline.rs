use crate::chart_of_accounts::LookupTable;
use crate::engine::{Classify, Rollup};
use crate::error::{PipelineWarning, Result};
use crate::filter::{self, RecordFilter};
use crate::ingestion::{self, Fetch};
use crate::join::{self, EnrichedRecord};
use crate::present::{table_rows, SummaryTiles, TableRow};
use crate::record::Dataset;
use crate::schema::PipelineConfig;
use chrono::{DateTime, Utc};
use log::{info, warn};

/// Raw inputs of one load, kept so a new filter can be applied without
/// fetching again.
#[derive(Debug, Clone)]
pub struct LoadedSources {
    pub primary: Dataset,
    pub lookup: Option<LookupTable>,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub rollup: Rollup,
    /// The records the rollup was built from, after filtering.
    pub records: Vec<EnrichedRecord>,
    pub warnings: Vec<PipelineWarning>,
    pub loaded_at: DateTime<Utc>,
}

/// Runs one [`PipelineConfig`]: fetch, join, filter and aggregate.
#[derive(Debug, Clone)]
pub struct BudgetPipeline {
    config: PipelineConfig,
}

impl BudgetPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fetches the primary source and the lookup, if any, concurrently. Fails
    /// if either fails; nothing is joined until both have arrived.
    pub async fn load<F: Fetch>(&self, fetcher: &F) -> Result<LoadedSources> {
        let csv = &self.config.csv;
        let primary = ingestion::load(fetcher, &self.config.source, csv);

        let (primary, lookup) = match &self.config.lookup {
            Some(config) => {
                let lookup = ingestion::load(fetcher, &config.source, csv);
                let (primary, lookup) = futures::try_join!(primary, lookup)?;
                (primary, Some(LookupTable::build(&lookup, &config.spec)))
            }
            None => (primary.await?, None),
        };

        Ok(LoadedSources {
            primary,
            lookup,
            loaded_at: Utc::now(),
        })
    }

    /// Filters, joins and aggregates already-loaded sources. `filter`
    /// replaces the configured filter when given.
    pub fn aggregate(
        &self,
        loaded: &LoadedSources,
        filter: Option<&RecordFilter>,
    ) -> Result<PipelineOutput> {
        let filter = filter.or(self.config.filter.as_ref());
        let selected = filter::select(filter, loaded.primary.records());

        let joined = match (&self.config.lookup, &loaded.lookup) {
            (Some(config), Some(table)) => {
                join::join(&selected, table, &config.key_rule, &self.config.periods)
            }
            _ => join::enrich(&selected, &self.config.periods),
        };

        let rollup = Rollup::new(&joined.records, &self.config.levels, &self.config.periods);
        rollup.reconcile(&joined.records)?;

        if !joined.warnings.is_empty() {
            warn!(
                "{}: {} values or keys could not be read",
                self.config.name,
                joined.warnings.len()
            );
        }
        info!(
            "{}: {} of {} records in rollup",
            self.config.name,
            joined.records.len(),
            loaded.primary.len()
        );

        Ok(PipelineOutput {
            rollup,
            records: joined.records,
            warnings: joined.warnings,
            loaded_at: loaded.loaded_at,
        })
    }

    pub async fn run<F: Fetch>(&self, fetcher: &F) -> Result<PipelineOutput> {
        let loaded = self.load(fetcher).await?;
        self.aggregate(&loaded, None)
    }

    /// Summary tiles for the configured comparison, if one is configured.
    pub fn summary(&self, output: &PipelineOutput) -> Result<Option<SummaryTiles>> {
        self.config
            .comparison
            .as_ref()
            .map(|c| SummaryTiles::new(&output.rollup, &c.prior, &c.current))
            .transpose()
    }

    /// Rolls the records of `output` up again under other levels.
    pub fn regroup<C: Classify>(&self, output: &PipelineOutput, levels: &[C]) -> Result<Rollup> {
        let rollup = Rollup::new(&output.records, levels, &self.config.periods);
        rollup.reconcile(&output.records)?;
        Ok(rollup)
    }

    /// Table rows for the configured comparison, if one is configured, in the
    /// configured layout and grouped by the configured table levels.
    pub fn table<S: AsRef<str>>(
        &self,
        output: &PipelineOutput,
        detail_columns: &[S],
    ) -> Result<Option<Vec<TableRow>>> {
        let Some(comparison) = &self.config.comparison else {
            return Ok(None);
        };

        let regrouped;
        let rollup = match &self.config.table_levels {
            Some(levels) => {
                regrouped = self.regroup(output, levels)?;
                &regrouped
            }
            None => &output.rollup,
        };

        table_rows(
            rollup,
            &comparison.prior,
            &comparison.current,
            self.config.table,
            detail_columns,
        )
        .map(Some)
    }
}
