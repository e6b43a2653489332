//! Configuration management for the ingestion pipeline.
//!
//! This module handles loading and validating configuration from environment variables
//! using the `dotenvy` crate. All operations return [`IngestResult`] for comprehensive
//! error handling.
//!
//! ## Environment Variables
//!
//! All optional (with defaults):
//! - `LISTING_API_URL`: Paged market listing endpoint (default: Gamma markets API)
//! - `RPC_URL`: JSON-RPC endpoint for `eth_getLogs` (default: `https://polygon-rpc.com/`)
//! - `DATA_DIR`: Root of the `bronze/` and `silver/` artifact trees (default: `./data`)
//! - `LISTING_YEARS`: Comma-separated listing years (default: `2023,2022,2021`)
//! - `PAGE_SIZE`: Listing page size (default: 50)
//! - `BACKOFF_SECS`: Sleep after an HTTP 429 (default: 10)
//! - `MAX_RETRIES`: Throttled retries before giving up (default: 30)
//! - `BACKOFF_JITTER`: Fraction (0.0 to 1.0) each backoff may be spread by (default: 0)
//! - `MAX_CONCURRENCY`: Simultaneous contract retrievals (default: 16)
//! - `REQUESTS_PER_MINUTE`: Optional client-side pacing quota (default: unset)
//! - `HTTP_TIMEOUT_SECS`: Per-request timeout (default: 30)
//! - `CATEGORY_POLICY`: `flag` or `reject` for unknown labels (default: `flag`)
//! - `RUST_LOG`: Logging level (default: "info")
//!
//! ## Example
//!
//! ```no_run
//! use market_ingest::config::Config;
//! use market_ingest::error::IngestResult;
//!
//! # fn main() -> IngestResult<()> {
//! let config = Config::from_env()?;
//! println!("RPC URL: {}", config.rpc_url());
//! # Ok(())
//! # }
//! ```

use crate::categories::CategoryPolicy;
use crate::error::{IngestError, IngestResult};
use crate::rpc::RetryPolicy;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Default Gamma markets listing endpoint.
pub const DEFAULT_LISTING_URL: &str = "https://gamma-api.polymarket.com/markets";

/// Default public Polygon JSON-RPC endpoint.
pub const DEFAULT_RPC_URL: &str = "https://polygon-rpc.com/";

/// Main configuration struct for the pipeline.
#[derive(Debug, Clone)]
pub struct Config {
    /// Paged listing API URL
    listing_url: String,

    /// JSON-RPC endpoint for log queries
    rpc_url: String,

    /// Root directory for cached and merged artifacts
    data_dir: PathBuf,

    /// Listing years, one listing source per year
    years: Vec<i32>,

    /// Records requested per listing page
    page_size: u64,

    /// Fixed sleep after a throttled response
    backoff: Duration,

    /// Throttled retries allowed per request
    max_retries: u32,

    /// Random spread applied to each backoff, as a fraction of it
    backoff_jitter: f64,

    /// Worker pool size for contract retrieval
    max_concurrency: usize,

    /// Optional proactive pacing quota
    requests_per_minute: Option<u32>,

    /// Per-request HTTP timeout
    http_timeout: Duration,

    /// What to do with category labels outside the known set
    category_policy: CategoryPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This function:
    /// 1. Loads `.env` file using `dotenvy` (if present)
    /// 2. Reads and validates all environment variables
    /// 3. Applies defaults for anything unset
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but malformed.
    pub fn from_env() -> IngestResult<Self> {
        // Load .env file if present (ignore error if file doesn't exist)
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// [`Config::from_env`] delegates here with `std::env::var`.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> IngestResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::for_data_dir(
            lookup("DATA_DIR").unwrap_or_else(|| "./data".to_string()),
        );

        if let Some(url) = lookup("LISTING_API_URL") {
            config.listing_url = url;
        }
        if let Some(url) = lookup("RPC_URL") {
            config.rpc_url = url;
        }

        if let Some(years) = lookup("LISTING_YEARS") {
            config.years = parse_years(&years)?;
        }

        config.page_size = parse_var(&lookup, "PAGE_SIZE", config.page_size)?;
        if config.page_size == 0 {
            return Err(IngestError::config("PAGE_SIZE must be greater than zero", None));
        }

        config.backoff = Duration::from_secs(parse_var(&lookup, "BACKOFF_SECS", 10_u64)?);
        config.max_retries = parse_var(&lookup, "MAX_RETRIES", config.max_retries)?;

        config.backoff_jitter = parse_var(&lookup, "BACKOFF_JITTER", config.backoff_jitter)?;
        if !(0.0..=1.0).contains(&config.backoff_jitter) {
            return Err(IngestError::config(
                "BACKOFF_JITTER must be between 0.0 and 1.0",
                None,
            ));
        }

        config.max_concurrency = parse_var(&lookup, "MAX_CONCURRENCY", config.max_concurrency)?;
        if config.max_concurrency == 0 {
            return Err(IngestError::config(
                "MAX_CONCURRENCY must be greater than zero",
                None,
            ));
        }

        config.requests_per_minute = match lookup("REQUESTS_PER_MINUTE") {
            Some(raw) => {
                let rpm = raw.parse::<u32>().map_err(|e| {
                    IngestError::config(
                        "REQUESTS_PER_MINUTE must be a valid number",
                        Some(Box::new(e)),
                    )
                })?;
                (rpm > 0).then_some(rpm)
            }
            None => None,
        };

        config.http_timeout = Duration::from_secs(parse_var(&lookup, "HTTP_TIMEOUT_SECS", 30_u64)?);

        if let Some(policy) = lookup("CATEGORY_POLICY") {
            config.category_policy = policy.parse()?;
        }

        Ok(config)
    }

    /// Default configuration rooted at `data_dir`.
    #[must_use]
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            listing_url: DEFAULT_LISTING_URL.to_string(),
            rpc_url: DEFAULT_RPC_URL.to_string(),
            data_dir: data_dir.into(),
            years: vec![2023, 2022, 2021],
            page_size: 50,
            backoff: Duration::from_secs(10),
            max_retries: 30,
            backoff_jitter: 0.0,
            max_concurrency: 16,
            requests_per_minute: None,
            http_timeout: Duration::from_secs(30),
            category_policy: CategoryPolicy::Flag,
        }
    }

    /// Override the listing API URL.
    #[must_use]
    pub fn with_listing_url(mut self, url: impl Into<String>) -> Self {
        self.listing_url = url.into();
        self
    }

    /// Override the JSON-RPC URL.
    #[must_use]
    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = url.into();
        self
    }

    /// Override the listing years.
    #[must_use]
    pub fn with_years(mut self, years: Vec<i32>) -> Self {
        self.years = years;
        self
    }

    /// Override the listing page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Override the throttling backoff and retry ceiling.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration, max_retries: u32) -> Self {
        self.backoff = backoff;
        self.max_retries = max_retries;
        self
    }

    /// Override the contract worker pool size.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Get the listing API URL.
    #[must_use]
    pub fn listing_url(&self) -> &str {
        &self.listing_url
    }

    /// Get the JSON-RPC URL.
    #[must_use]
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Get the data root.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding per-unit cache artifacts.
    #[must_use]
    pub fn bronze_dir(&self) -> PathBuf {
        self.data_dir.join("bronze")
    }

    /// Directory holding merged datasets.
    #[must_use]
    pub fn silver_dir(&self) -> PathBuf {
        self.data_dir.join("silver")
    }

    /// Get the listing years.
    #[must_use]
    pub fn years(&self) -> &[i32] {
        &self.years
    }

    /// Get the listing page size.
    #[must_use]
    pub const fn page_size(&self) -> u64 {
        self.page_size
    }

    /// Retry policy for the shared client.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.backoff, self.max_retries).with_jitter(self.backoff_jitter)
    }

    /// Get the contract worker pool size.
    #[must_use]
    pub const fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Get the optional pacing quota.
    #[must_use]
    pub const fn requests_per_minute(&self) -> Option<u32> {
        self.requests_per_minute
    }

    /// Get the per-request timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    /// Get the category label policy.
    #[must_use]
    pub const fn category_policy(&self) -> CategoryPolicy {
        self.category_policy
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> IngestResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            IngestError::config(format!("{key} must be a valid number"), Some(Box::new(e)))
        }),
        None => Ok(default),
    }
}

fn parse_years(raw: &str) -> IngestResult<Vec<i32>> {
    let years = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<i32>().map_err(|e| {
                IngestError::config(
                    format!("LISTING_YEARS contains an invalid year: {part}"),
                    Some(Box::new(e)),
                )
            })
        })
        .collect::<IngestResult<Vec<_>>>()?;

    if years.is_empty() {
        return Err(IngestError::config("LISTING_YEARS must name at least one year", None));
    }
    Ok(years)
}
