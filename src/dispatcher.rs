//! Bounded fan-out of log retrievals.
//!
//! Candidates are validated first; only well-formed, distinct addresses are
//! dispatched. Retrievals run concurrently on the current task through a
//! `buffer_unordered` stream capped at `max_concurrency`, all sharing one
//! client. Every retrieval runs to completion whatever its siblings do.

use crate::contracts::{select_addresses, ContractAddress};
use crate::error::{IngestError, IngestResult};
use crate::retriever::{LogRetriever, Retrieval, RetrievalStatus};
use crate::rpc::HttpTransport;
use futures_util::stream::{self, StreamExt};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Per-run summary of a dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Final status of every dispatched contract
    pub statuses: BTreeMap<ContractAddress, RetrievalStatus>,
    /// Contracts fetched from the network
    pub fetched: usize,
    /// Contracts skipped with a complete artifact
    pub cached: usize,
    /// Contracts whose artifact was migrated
    pub migrated: usize,
    /// Contracts that failed
    pub failed: usize,
    /// Event records fetched in this run
    pub records: usize,
    /// Inputs that were not valid addresses
    pub excluded: Vec<String>,
}

impl DispatchReport {
    /// Contracts that failed, with their reasons.
    pub fn failures(&self) -> impl Iterator<Item = (&ContractAddress, &str)> {
        self.statuses.iter().filter_map(|(contract, status)| match status {
            RetrievalStatus::Failed(reason) => Some((contract, reason.as_str())),
            _ => None,
        })
    }

    fn record(&mut self, contract: ContractAddress, retrieval: &Retrieval) {
        match retrieval {
            Retrieval::Fetched(records) => {
                self.fetched += 1;
                self.records += records.len();
            }
            Retrieval::Cached => self.cached += 1,
            Retrieval::Migrated => self.migrated += 1,
            Retrieval::Failed(_) => self.failed += 1,
        }
        self.statuses.insert(contract, retrieval.status());
    }
}

/// Runs a [`LogRetriever`] over many contracts with a fixed worker count.
pub struct ConcurrentDispatcher<T> {
    retriever: LogRetriever<T>,
    max_concurrency: usize,
}

impl<T: HttpTransport> ConcurrentDispatcher<T> {
    /// Create a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ConfigError`] if `max_concurrency` is zero.
    pub fn new(retriever: LogRetriever<T>, max_concurrency: usize) -> IngestResult<Self> {
        if max_concurrency == 0 {
            return Err(IngestError::config(
                "Worker count must be greater than zero",
                None,
            ));
        }
        Ok(Self {
            retriever,
            max_concurrency,
        })
    }

    /// The wrapped retriever.
    pub const fn retriever(&self) -> &LogRetriever<T> {
        &self.retriever
    }

    /// Retrieve every valid contract among `candidates`.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len(), workers = self.max_concurrency))]
    pub async fn run<S: AsRef<str>>(&self, candidates: &[S]) -> DispatchReport {
        let selection = select_addresses(candidates);
        let total = selection.valid.len();
        info!(contracts = total, excluded = selection.excluded.len(), "Dispatching retrievals");

        let mut report = DispatchReport {
            excluded: selection.excluded,
            ..DispatchReport::default()
        };

        let mut retrievals = stream::iter(selection.valid)
            .map(|contract| async move { (contract, self.retriever.retrieve(contract).await) })
            .buffer_unordered(self.max_concurrency);

        let mut done = 0_usize;
        while let Some((contract, retrieval)) = retrievals.next().await {
            done += 1;
            report.record(contract, &retrieval);
            if done % 100 == 0 {
                info!(done, total, failed = report.failed, "Retrieval progress");
            }
        }

        if report.failed > 0 {
            warn!(failed = report.failed, total, "Some contracts failed");
        }
        info!(
            fetched = report.fetched,
            cached = report.cached,
            migrated = report.migrated,
            failed = report.failed,
            records = report.records,
            "Dispatch complete"
        );

        report
    }
}
