//! Offset pagination over a listing source.
//!
//! Pages are requested strictly in order, starting at offset 0 and advancing
//! by the page size. Every page is looked up in the [`PageCache`] before any
//! request is made, so an interrupted run resumes at the first page it never
//! stored. An empty page or a page shorter than the page size ends the
//! stream.

use crate::cache::{DateWindow, Page, PageCache, PageKey};
use crate::error::{IngestError, IngestResult};
use crate::rpc::{HttpRequest, HttpTransport, RateLimitedClient};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Sort key requested from the listing API.
pub const DEFAULT_ORDER: &str = "id";

/// A listing query whose pages share everything but the offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSource {
    name: String,
    url: String,
    order: String,
    ascending: bool,
    window: DateWindow,
}

impl ListingSource {
    /// Create a source.
    #[must_use]
    pub fn new(name: impl Into<String>, url: impl Into<String>, window: DateWindow) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            order: DEFAULT_ORDER.to_string(),
            ascending: true,
            window,
        }
    }

    /// Markets whose start date falls in calendar `year`, named `markets_<year>`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `year` is out of range.
    pub fn for_year(url: impl Into<String>, year: i32) -> IngestResult<Self> {
        Ok(Self::new(
            format!("markets_{year}"),
            url,
            DateWindow::calendar_year(year)?,
        ))
    }

    /// Override the sort order.
    #[must_use]
    pub fn with_order(mut self, order: impl Into<String>, ascending: bool) -> Self {
        self.order = order.into();
        self.ascending = ascending;
        self
    }

    /// Source name, used as the artifact prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Listing endpoint.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Date window.
    #[must_use]
    pub const fn window(&self) -> &DateWindow {
        &self.window
    }

    /// Cache key of the page at `offset`.
    #[must_use]
    pub fn page_key(&self, offset: u64, limit: u64) -> PageKey {
        PageKey::new(self.name.clone(), offset, limit, self.window)
    }

    /// GET request for the page at `offset`.
    #[must_use]
    pub fn page_request(&self, offset: u64, limit: u64) -> HttpRequest {
        let query = vec![
            ("offset".to_string(), offset.to_string()),
            ("limit".to_string(), limit.to_string()),
            ("order".to_string(), self.order.clone()),
            ("ascending".to_string(), self.ascending.to_string()),
            ("start_date_min".to_string(), self.window.start_param()),
            ("start_date_max".to_string(), self.window.end_param()),
        ];
        HttpRequest::get(self.url.clone(), query)
    }
}

/// Outcome of paging through one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// All records, in page order
    pub records: Page,
    /// Pages read (cached or fetched), including the terminal one
    pub pages: usize,
    /// Pages served from the cache
    pub cache_hits: usize,
}

/// Sequential paginator backed by a page cache.
pub struct PagedFetcher<T> {
    client: Arc<RateLimitedClient<T>>,
    cache: PageCache,
}

impl<T: HttpTransport> PagedFetcher<T> {
    /// Create a fetcher sharing `client`.
    pub const fn new(client: Arc<RateLimitedClient<T>>, cache: PageCache) -> Self {
        Self { client, cache }
    }

    /// The page cache.
    pub const fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Every record of `source`, paging by `page_size`.
    ///
    /// # Errors
    ///
    /// - [`IngestError::ConfigError`] if `page_size` is zero
    /// - Any client error for an uncached page; pages stored before the
    ///   failure stay cached for the next run
    /// - [`IngestError::DecodingError`] if a response is not a JSON array
    /// - [`IngestError::CacheError`] if a page cannot be stored
    #[instrument(skip(self, source), fields(source = %source.name(), pages = tracing::field::Empty, records = tracing::field::Empty))]
    pub async fn fetch_all(&self, source: &ListingSource, page_size: u64) -> IngestResult<FetchOutcome> {
        if page_size == 0 {
            return Err(IngestError::config("Page size must be greater than zero", None));
        }

        let mut outcome = FetchOutcome::default();
        let mut offset = 0_u64;

        loop {
            let key = source.page_key(offset, page_size);

            let page = if let Some(page) = self.cache.get(&key)? {
                outcome.cache_hits += 1;
                page
            } else {
                debug!(offset, limit = page_size, "Requesting page");
                let page: Page = self
                    .client
                    .request_json(&source.page_request(offset, page_size))
                    .await?;
                self.cache.put(&key, &page)?;
                page
            };

            outcome.pages += 1;
            let len = page.len();
            outcome.records.extend(page);

            if len == 0 {
                debug!(offset, "Empty page, no more data");
                break;
            }
            if u64::try_from(len).unwrap_or(u64::MAX) < page_size {
                debug!(offset, records = len, "Short page, reached the end");
                break;
            }

            offset += page_size;
        }

        tracing::Span::current().record("pages", outcome.pages);
        tracing::Span::current().record("records", outcome.records.len());
        info!(
            source = source.name(),
            records = outcome.records.len(),
            pages = outcome.pages,
            cache_hits = outcome.cache_hits,
            "Listing source complete"
        );

        Ok(outcome)
    }
}
