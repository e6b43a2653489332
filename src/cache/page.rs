//! Listing page cache.
//!
//! One JSON file per [`PageKey`], named `<source>_offset_<offset>.json`.
//! A file holding `[]` is a cached "no more data" answer and counts as a hit.

use super::write_atomic;
use crate::error::{IngestError, IngestResult};
use chrono::{DateTime, TimeZone, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Raw listing records of one page, in the order the API returned them.
pub type Page = Vec<serde_json::Value>;

/// Half-open time range `[start, end)` a listing source is restricted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// Inclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
}

impl DateWindow {
    /// January 1st of `year` to January 1st of the following year, UTC.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for years chrono cannot represent.
    pub fn calendar_year(year: i32) -> IngestResult<Self> {
        let start = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single();
        let end = year
            .checked_add(1)
            .and_then(|next| Utc.with_ymd_and_hms(next, 1, 1, 0, 0, 0).single());

        match (start, end) {
            (Some(start), Some(end)) => Ok(Self { start, end }),
            _ => Err(IngestError::config(
                format!("Year {year} is out of range"),
                None,
            )),
        }
    }

    /// Lower bound as ISO-8601 (`2023-01-01T00:00:00Z`).
    #[must_use]
    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// Upper bound as ISO-8601.
    #[must_use]
    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

/// Identity of one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageKey {
    source: String,
    offset: u64,
    limit: u64,
    window: DateWindow,
}

impl PageKey {
    /// Create a key.
    #[must_use]
    pub fn new(source: impl Into<String>, offset: u64, limit: u64, window: DateWindow) -> Self {
        Self {
            source: source.into(),
            offset,
            limit,
            window,
        }
    }

    /// Source name, e.g. `markets_2023`.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record offset of the first row on this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Requested page size.
    #[must_use]
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Date window of the source.
    #[must_use]
    pub const fn window(&self) -> &DateWindow {
        &self.window
    }

    /// Artifact file name.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}_offset_{}.json", self.source, self.offset)
    }
}

/// Filesystem-backed page cache.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    /// Cache rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Artifact path for `key`.
    #[must_use]
    pub fn path(&self, key: &PageKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Previously cached page for `key`.
    ///
    /// Returns `None` when no artifact exists. An artifact that is not a JSON
    /// array is logged and also reported as `None` so it gets refetched.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if the file exists but cannot be read.
    pub fn get(&self, key: &PageKey) -> IngestResult<Option<Page>> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).map_err(|e| {
            IngestError::cache(
                format!("Failed to read {}", path.display()),
                Some(Box::new(e)),
            )
        })?;

        match serde_json::from_str::<Page>(&json) {
            Ok(page) => {
                debug!(path = %path.display(), records = page.len(), "Page cache hit");
                Ok(Some(page))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cached page");
                Ok(None)
            }
        }
    }

    /// Persist `page` under `key`, replacing any previous artifact.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if the page cannot be written.
    pub fn put(&self, key: &PageKey, page: &[serde_json::Value]) -> IngestResult<()> {
        let bytes = serde_json::to_vec(page).map_err(|e| {
            IngestError::cache("Failed to serialize page", Some(Box::new(e)))
        })?;
        let path = self.path(key);
        write_atomic(&path, &bytes)?;
        debug!(path = %path.display(), records = page.len(), "Page cached");
        Ok(())
    }
}
