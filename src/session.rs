//! One page's view of a pipeline. Loads and re-filters can overlap; only the
//! most recently requested one reaches the presenter.

use crate::error::{BudgetError, Result};
use crate::filter::RecordFilter;
use crate::ingestion::Fetch;
use crate::pipeline::{BudgetPipeline, LoadedSources, PipelineOutput};
use log::{debug, warn};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identifies one request. Later tickets compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// Hands out tickets and remembers the newest one.
#[derive(Debug, Default)]
pub struct LoadSequencer {
    latest: AtomicU64,
}

impl LoadSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket.0
    }
}

/// Receives the outcome of the current request.
pub trait Presenter {
    fn present(&self, output: &PipelineOutput);
    fn fail(&self, error: &BudgetError);
}

impl<P: Presenter + ?Sized> Presenter for Arc<P> {
    fn present(&self, output: &PipelineOutput) {
        (**self).present(output)
    }

    fn fail(&self, error: &BudgetError) {
        (**self).fail(error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Presented,
    Failed,
    /// A newer request was issued before this one finished.
    Discarded,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct BudgetSession<F, P> {
    pipeline: BudgetPipeline,
    fetcher: F,
    presenter: P,
    sequencer: LoadSequencer,
    filter: Mutex<Option<RecordFilter>>,
    loaded: Mutex<Option<Arc<LoadedSources>>>,
}

impl<F: Fetch, P: Presenter> BudgetSession<F, P> {
    pub fn new(pipeline: BudgetPipeline, fetcher: F, presenter: P) -> Self {
        let filter = pipeline.config().filter.clone();
        Self {
            pipeline,
            fetcher,
            presenter,
            sequencer: LoadSequencer::new(),
            filter: Mutex::new(filter),
            loaded: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &BudgetPipeline {
        &self.pipeline
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn filter(&self) -> Option<RecordFilter> {
        lock(&self.filter).clone()
    }

    /// Fetches fresh sources. The ticket is taken when this is called, not
    /// when the returned future is first polled.
    pub fn load(&self) -> impl Future<Output = Delivery> + '_ {
        let ticket = self.sequencer.issue();
        async move {
            let result = self.fetch_and_aggregate(ticket).await;
            self.deliver(ticket, result)
        }
    }

    /// Switches the filter, e.g. to another fund. Re-aggregates the sources
    /// already loaded, or loads them if there are none yet.
    pub fn refilter(&self, filter: Option<RecordFilter>) -> impl Future<Output = Delivery> + '_ {
        *lock(&self.filter) = filter;
        let ticket = self.sequencer.issue();
        let cached = lock(&self.loaded).clone();
        async move {
            let result = match cached {
                Some(loaded) => self.pipeline.aggregate(&loaded, self.filter().as_ref()),
                None => self.fetch_and_aggregate(ticket).await,
            };
            self.deliver(ticket, result)
        }
    }

    async fn fetch_and_aggregate(&self, ticket: Ticket) -> Result<PipelineOutput> {
        let loaded = Arc::new(self.pipeline.load(&self.fetcher).await?);
        if self.sequencer.is_current(ticket) {
            *lock(&self.loaded) = Some(Arc::clone(&loaded));
        }
        self.pipeline.aggregate(&loaded, self.filter().as_ref())
    }

    fn deliver(&self, ticket: Ticket, result: Result<PipelineOutput>) -> Delivery {
        let name = &self.pipeline.config().name;
        if !self.sequencer.is_current(ticket) {
            match &result {
                Ok(_) => debug!("{}: discarding stale result of request {}", name, ticket.0),
                Err(e) => debug!("{}: discarding stale failure of request {}: {}", name, ticket.0, e),
            }
            return Delivery::Discarded;
        }

        match result {
            Ok(output) => {
                self.presenter.present(&output);
                Delivery::Presented
            }
            Err(e) => {
                warn!("{}: load failed: {}", name, e);
                self.presenter.fail(&e);
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_the_newest_ticket_is_current() {
        let sequencer = LoadSequencer::new();
        let first = sequencer.issue();
        assert!(sequencer.is_current(first));

        let second = sequencer.issue();
        assert!(second > first);
        assert!(!sequencer.is_current(first));
        assert!(sequencer.is_current(second));
    }
}
