//! Per-contract log cache.
//!
//! Each contract's decoded `FPMMBuy` history is one CSV file named
//! `contract_buy_<address>.csv`. A file that parses and carries the owner
//! column is complete. Files produced by older runs may lack the owner column
//! or carry a leading unnamed index column; those are [`ArtifactState::Stale`]
//! and are repaired in place by [`ContractCache::migrate`] without touching
//! the network.

use super::write_atomic;
use crate::contracts::ContractAddress;
use crate::dataset::Dataset;
use crate::error::{IngestError, IngestResult};
use crate::events::{EventRecord, OWNER_COLUMN};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name prefix of contract artifacts.
pub const FILE_PREFIX: &str = "contract_buy_";

/// File name suffix of contract artifacts.
pub const FILE_SUFFIX: &str = ".csv";

/// Header names older exports used for a positional index column.
pub const LEGACY_INDEX_COLUMNS: [&str; 2] = ["", "Unnamed: 0"];

/// What is on disk for one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactState {
    /// No artifact
    Missing,
    /// Complete artifact, nothing to do
    Valid,
    /// Parseable artifact in an older layout
    Stale {
        /// Owner column absent
        missing_owner: bool,
        /// A legacy index column is present
        legacy_index: bool,
    },
    /// Artifact exists but cannot be parsed; it will be refetched
    Unreadable(String),
}

impl ArtifactState {
    /// Whether the artifact can be used without a network call.
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        matches!(self, Self::Valid | Self::Stale { .. })
    }
}

/// Filesystem-backed contract artifact store.
#[derive(Debug, Clone)]
pub struct ContractCache {
    dir: PathBuf,
}

impl ContractCache {
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

    /// Artifact path for `contract`.
    #[must_use]
    pub fn path(&self, contract: &ContractAddress) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", contract.checksummed()))
    }

    /// Classify the artifact for `contract`.
    #[must_use]
    pub fn inspect(&self, contract: &ContractAddress) -> ArtifactState {
        let path = self.path(contract);
        if !path.exists() {
            return ArtifactState::Missing;
        }

        match Dataset::read_csv(&path) {
            Ok(dataset) => classify(&dataset),
            Err(e) => ArtifactState::Unreadable(e.to_string()),
        }
    }

    /// Bring a stale artifact up to the current layout.
    ///
    /// Legacy index columns are dropped and the owner column is appended with
    /// the checksummed address in every row. Row order and all other columns
    /// are preserved. A valid artifact is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if the artifact cannot be read or
    /// rewritten.
    pub fn migrate(&self, contract: &ContractAddress) -> IngestResult<()> {
        let path = self.path(contract);
        let mut dataset = Dataset::read_csv(&path)?;

        let state = classify(&dataset);
        if state == ArtifactState::Valid {
            debug!(contract = %contract, "Artifact already current");
            return Ok(());
        }

        for column in LEGACY_INDEX_COLUMNS {
            dataset.drop_column(column);
        }
        dataset.add_constant_column(OWNER_COLUMN, &contract.checksummed());

        dataset.write_csv(&path)?;
        info!(contract = %contract, rows = dataset.len(), ?state, "Migrated legacy artifact");
        Ok(())
    }

    /// Persist the decoded logs of `contract`.
    ///
    /// An empty history still produces a header-only file so the contract is
    /// not refetched.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CacheError`] if the artifact cannot be written.
    pub fn write(&self, contract: &ContractAddress, records: &[EventRecord]) -> IngestResult<()> {
        let mut dataset = Dataset::new(EventRecord::COLUMNS.iter().map(|c| (*c).to_string()).collect());
        for record in records {
            dataset.push_row(record.to_row())?;
        }

        let path = self.path(contract);
        dataset.write_csv(&path).map_err(|e| {
            IngestError::cache(
                format!("Failed to store logs for {contract}"),
                Some(Box::new(e)),
            )
        })?;
        debug!(contract = %contract, rows = records.len(), "Contract artifact written");
        Ok(())
    }
}

fn classify(dataset: &Dataset) -> ArtifactState {
    let missing_owner = !dataset.has_column(OWNER_COLUMN);
    let legacy_index = LEGACY_INDEX_COLUMNS
        .iter()
        .any(|column| dataset.has_column(column));

    if missing_owner || legacy_index {
        ArtifactState::Stale {
            missing_owner,
            legacy_index,
        }
    } else {
        ArtifactState::Valid
    }
}
