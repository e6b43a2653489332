//! End-to-end ingestion.
//!
//! # Phases
//!
//! 1. **Markets**: page through every configured listing year into the
//!    bronze cache, then merge all cached pages into `silver/markets.csv`
//! 2. **Buys**: extract market maker contracts from the merged listing,
//!    retrieve each contract's buy history concurrently, then merge all
//!    contract artifacts into `silver/contract_buy.csv`
//!
//! Both phases share one [`RateLimitedClient`]. Every unit of remote work is
//! cached, so rerunning after an interruption only fetches what is missing.

use crate::aggregator::{merge_csv, merge_json_pages, UnitPattern};
use crate::cache::contract::{FILE_PREFIX, FILE_SUFFIX};
use crate::cache::{ContractCache, PageCache};
use crate::categories::CategorySet;
use crate::config::Config;
use crate::contracts::extract_market_makers;
use crate::dataset::Dataset;
use crate::dispatcher::{ConcurrentDispatcher, DispatchReport};
use crate::error::{IngestError, IngestResult};
use crate::pagination::{ListingSource, PagedFetcher};
use crate::retriever::LogRetriever;
use crate::rpc::{ClientStats, HttpTransport, RateLimitedClient, ReqwestTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Merged listing file name.
pub const MARKETS_OUTPUT: &str = "markets.csv";

/// Merged buy history file name.
pub const BUYS_OUTPUT: &str = "contract_buy.csv";

/// One listing year's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    /// Source name, e.g. `markets_2023`
    pub name: String,
    /// Records returned
    pub records: usize,
    /// Pages read
    pub pages: usize,
    /// Pages served from cache
    pub cache_hits: usize,
}

/// Result of the markets phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarketsSummary {
    /// Sources that completed
    pub sources: Vec<SourceSummary>,
    /// Rows in the merged listing
    pub merged_rows: usize,
    /// Merged listing path
    pub output: PathBuf,
}

/// Result of the buys phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuysSummary {
    /// Distinct market maker values found in the listing
    pub candidates: usize,
    /// Per-contract outcomes
    pub report: DispatchReport,
    /// Rows in the merged buy history
    pub merged_rows: usize,
    /// Merged buy history path
    pub output: PathBuf,
}

/// Result of a full run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Markets phase
    pub markets: MarketsSummary,
    /// Buys phase
    pub buys: BuysSummary,
    /// Client counters after the run
    pub stats: ClientStats,
}

/// The ingestion pipeline over a transport.
pub struct Pipeline<T> {
    config: Config,
    client: Arc<RateLimitedClient<T>>,
}

impl Pipeline<ReqwestTransport> {
    /// Pipeline over HTTP with the configured timeout, retry policy and pacing.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> IngestResult<Self> {
        let transport = ReqwestTransport::new(config.http_timeout())?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: HttpTransport> Pipeline<T> {
    /// Pipeline over an arbitrary transport.
    pub fn with_transport(config: Config, transport: T) -> Self {
        let mut client = RateLimitedClient::new(transport, config.retry_policy());
        if let Some(rpm) = config.requests_per_minute() {
            client = client.with_pacing(rpm);
        }
        Self {
            config,
            client: Arc::new(client),
        }
    }

    /// Active configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The shared client.
    pub const fn client(&self) -> &Arc<RateLimitedClient<T>> {
        &self.client
    }

    /// Merged listing path.
    pub fn markets_output(&self) -> PathBuf {
        self.config.silver_dir().join(MARKETS_OUTPUT)
    }

    /// Merged buy history path.
    pub fn buys_output(&self) -> PathBuf {
        self.config.silver_dir().join(BUYS_OUTPUT)
    }

    /// Fetch every listing year and merge the cached pages.
    ///
    /// A source that fails is logged and the remaining years still run.
    /// Everything cached is merged either way, then the first source error
    /// is returned, so an incomplete listing never reaches the buys phase.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid configuration, if any listing source
    /// failed, or if merging fails.
    #[instrument(skip(self), fields(years = ?self.config.years()))]
    pub async fn run_markets(&self) -> IngestResult<MarketsSummary> {
        let fetcher = PagedFetcher::new(
            Arc::clone(&self.client),
            PageCache::new(self.config.bronze_dir()),
        );
        let mut summary = MarketsSummary::default();
        let mut failures: Vec<IngestError> = Vec::new();

        for &year in self.config.years() {
            let source = ListingSource::for_year(self.config.listing_url(), year)?;
            match fetcher.fetch_all(&source, self.config.page_size()).await {
                Ok(outcome) => summary.sources.push(SourceSummary {
                    name: source.name().to_string(),
                    records: outcome.records.len(),
                    pages: outcome.pages,
                    cache_hits: outcome.cache_hits,
                }),
                Err(e @ IngestError::ConfigError { .. }) => return Err(e),
                Err(e) => {
                    error!(source = source.name(), remote = e.is_remote(), error = %e, "Listing source failed");
                    failures.push(e);
                }
            }
        }

        let merged = merge_json_pages(&UnitPattern::new(self.config.bronze_dir(), "markets_", ".json"))?;
        summary.output = self.markets_output();
        merged.write_csv(&summary.output)?;
        summary.merged_rows = merged.len();

        info!(
            rows = summary.merged_rows,
            failed_sources = failures.len(),
            output = %summary.output.display(),
            "Markets phase complete"
        );

        match failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Retrieve buy history for every market maker in the merged listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged listing is missing or unreadable, or if
    /// merging fails. Individual contract failures are in the report.
    #[instrument(skip(self))]
    pub async fn run_buys(&self) -> IngestResult<BuysSummary> {
        let listing = self.load_listing()?;
        self.run_buys_for(&listing).await
    }

    /// [`run_buys`](Self::run_buys) over an already loaded listing.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid worker count or if merging fails.
    pub async fn run_buys_for(&self, listing: &Dataset) -> IngestResult<BuysSummary> {
        let candidates = extract_market_makers(listing);

        let retriever = LogRetriever::new(
            Arc::clone(&self.client),
            ContractCache::new(self.config.bronze_dir()),
            self.config.rpc_url(),
        );
        let dispatcher = ConcurrentDispatcher::new(retriever, self.config.max_concurrency())?;
        let report = dispatcher.run(&candidates).await;

        let merged = merge_csv(&UnitPattern::new(self.config.bronze_dir(), FILE_PREFIX, FILE_SUFFIX))?;
        let output = self.buys_output();
        merged.write_csv(&output)?;

        info!(
            rows = merged.len(),
            failed = report.failed,
            output = %output.display(),
            "Buys phase complete"
        );
        Ok(BuysSummary {
            candidates: candidates.len(),
            report,
            merged_rows: merged.len(),
            output,
        })
    }

    /// Both phases.
    ///
    /// # Errors
    ///
    /// Returns the first phase-level error. A failed listing source stops the
    /// run before the buys phase.
    pub async fn run(&self) -> IngestResult<PipelineSummary> {
        let markets = self.run_markets().await?;
        let buys = self.run_buys().await?;
        Ok(PipelineSummary {
            markets,
            buys,
            stats: self.client.stats(),
        })
    }

    /// Category set of the merged listing.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged listing is missing or unreadable.
    pub fn categories(&self) -> IngestResult<CategorySet> {
        Ok(CategorySet::from_dataset(&self.load_listing()?))
    }

    fn load_listing(&self) -> IngestResult<Dataset> {
        let path = self.markets_output();
        if !path.exists() {
            return Err(IngestError::cache(
                format!("{} not found; run the markets phase first", path.display()),
                None,
            ));
        }
        Dataset::read_csv(&path)
    }
}
