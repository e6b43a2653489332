//! On-disk caches for fetched units.
//!
//! Every unit of remote work (one listing page, one contract's decoded logs)
//! is persisted as one file under the bronze directory. A unit whose file
//! exists and validates is never fetched again.
//!
//! - [`page`]: listing pages keyed by source name + offset (JSON)
//! - [`contract`]: decoded `FPMMBuy` logs keyed by contract address (CSV)
//!
//! All writes go through [`write_atomic`]: the bytes land in a hidden
//! temporary sibling first and are renamed into place, so an interrupted run
//! can never leave a file that looks complete but is not.

pub mod contract;
pub mod page;

pub use contract::{ArtifactState, ContractCache};
pub use page::{DateWindow, Page, PageCache, PageKey};

use crate::error::{IngestError, IngestResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of in-flight temporary files.
pub const TMP_SUFFIX: &str = ".tmp";

/// Write `bytes` to `path` via a temporary file and rename.
///
/// Parent directories are created as needed.
///
/// # Errors
///
/// Returns [`IngestError::CacheError`] if the directory, temporary file, or
/// rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> IngestResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| {
                IngestError::cache(
                    format!("Failed to create directory {}", parent.display()),
                    Some(Box::new(e)),
                )
            })?;
        }
    }

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, bytes).map_err(|e| {
        IngestError::cache(
            format!("Failed to write {}", tmp_path.display()),
            Some(Box::new(e)),
        )
    })?;
    fs::rename(&tmp_path, path).map_err(|e| {
        IngestError::cache(
            format!("Failed to move {} into place", path.display()),
            Some(Box::new(e)),
        )
    })?;

    Ok(())
}

/// Hidden sibling used while `path` is being written.
#[must_use]
pub fn tmp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}{TMP_SUFFIX}"))
}
