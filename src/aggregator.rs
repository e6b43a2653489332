//! Merging per-unit artifacts into one dataset.
//!
//! A [`UnitPattern`] names a family of artifacts, `<dir>/<prefix>*<suffix>`.
//! Matching files are read in sorted file-name order and concatenated with
//! their rows in file order. Nothing is deduplicated. Hidden files, which
//! includes in-flight temporaries, never match.

use crate::cache::contract::LEGACY_INDEX_COLUMNS;
use crate::cache::{Page, TMP_SUFFIX};
use crate::dataset::Dataset;
use crate::error::{IngestError, IngestResult};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

/// A directory plus a `prefix*suffix` file-name pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPattern {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl UnitPattern {
    /// Create a pattern.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Directory searched.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a file name matches.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        !name.starts_with('.')
            && !name.ends_with(TMP_SUFFIX)
            && name.len() >= self.prefix.len() + self.suffix.len()
            && name.starts_with(&self.prefix)
            && name.ends_with(&self.suffix)
    }

    fn is_json(&self) -> bool {
        self.suffix.ends_with(".json")
    }
}

impl FromStr for UnitPattern {
    type Err = IngestError;

    /// Parse `dir/prefix*suffix`. The file-name part must contain exactly one `*`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = Path::new(s);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| IngestError::config(format!("Pattern has no file name: {s}"), None))?;

        let mut parts = name.splitn(2, '*');
        let prefix = parts.next().unwrap_or_default();
        let Some(suffix) = parts.next().filter(|suffix| !suffix.contains('*')) else {
            return Err(IngestError::config(
                format!("Pattern must contain exactly one '*': {s}"),
                None,
            ));
        };

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self::new(dir, prefix, suffix))
    }
}

impl fmt::Display for UnitPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}*{}", self.dir.display(), self.prefix, self.suffix)
    }
}

/// Files matching `pattern`, sorted by file name.
///
/// A missing directory yields no files.
#[must_use]
pub fn discover(pattern: &UnitPattern) -> Vec<PathBuf> {
    if !pattern.dir.is_dir() {
        debug!(dir = %pattern.dir.display(), "Unit directory does not exist");
        return Vec::new();
    }

    WalkDir::new(&pattern.dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name().to_str().is_some_and(|name| pattern.matches(name)))
        .map(walkdir::DirEntry::into_path)
        .collect()
}

/// Merge every unit matching `pattern`, picking the reader from the suffix:
/// `.json` units are listing pages, anything else is CSV.
///
/// # Errors
///
/// Returns [`IngestError::CacheError`] if a matching file cannot be read or
/// parsed.
pub fn merge_all(pattern: &UnitPattern) -> IngestResult<Dataset> {
    if pattern.is_json() {
        merge_json_pages(pattern)
    } else {
        merge_csv(pattern)
    }
}

/// Merge cached listing pages. Each record becomes one row.
///
/// # Errors
///
/// Returns [`IngestError::CacheError`] if a page cannot be read or is not a
/// JSON array.
#[instrument(skip_all, fields(pattern = %pattern))]
pub fn merge_json_pages(pattern: &UnitPattern) -> IngestResult<Dataset> {
    let files = discover(pattern);
    let mut merged = Dataset::default();
    let mut skipped = 0;

    for path in &files {
        let json = fs::read_to_string(path).map_err(|e| {
            IngestError::cache(format!("Failed to read {}", path.display()), Some(Box::new(e)))
        })?;
        let page: Page = serde_json::from_str(&json).map_err(|e| {
            IngestError::cache(format!("Invalid page {}", path.display()), Some(Box::new(e)))
        })?;

        let (unit, unit_skipped) = Dataset::from_json_records(&page);
        skipped += unit_skipped;
        merged.append(unit);
    }

    if skipped > 0 {
        warn!(skipped, "Ignored listing entries that were not objects");
    }
    info!(files = files.len(), rows = merged.len(), "Merged listing pages");
    Ok(merged)
}

/// Merge CSV units, dropping legacy index columns.
///
/// # Errors
///
/// Returns [`IngestError::CacheError`] if a unit cannot be read or parsed.
#[instrument(skip_all, fields(pattern = %pattern))]
pub fn merge_csv(pattern: &UnitPattern) -> IngestResult<Dataset> {
    let files = discover(pattern);
    let mut merged = Dataset::default();

    for path in &files {
        let mut unit = Dataset::read_csv(path)?;
        for column in LEGACY_INDEX_COLUMNS {
            unit.drop_column(column);
        }
        merged.append(unit);
    }

    info!(files = files.len(), rows = merged.len(), "Merged CSV units");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_pattern_parsing() {
        let pattern: UnitPattern = "data/bronze/contract_buy_*.csv".parse().unwrap();
        assert_eq!(pattern, UnitPattern::new("data/bronze", "contract_buy_", ".csv"));
        assert_eq!(pattern.to_string(), "data/bronze/contract_buy_*.csv");

        let bare: UnitPattern = "markets_*".parse().unwrap();
        assert_eq!(bare.dir(), Path::new("."));

        assert!("data/bronze/contract_buy.csv".parse::<UnitPattern>().is_err());
        assert!("data/*/x*.csv".parse::<UnitPattern>().is_ok());
        assert!("data/a*b*.csv".parse::<UnitPattern>().is_err());
    }

    #[test]
    fn test_matching_excludes_hidden_and_temporary() {
        let pattern = UnitPattern::new(".", "markets_", ".json");
        assert!(pattern.matches("markets_2023_offset_0.json"));
        assert!(!pattern.matches(".markets_2023_offset_0.json.tmp"));
        assert!(!pattern.matches("markets_2023_offset_0.json.tmp"));
        assert!(!pattern.matches("contract_buy_0x1.csv"));
        assert!(!pattern.matches("markets_.jso"));
    }

    #[test]
    fn test_discover_sorted_by_name() {
        let dir = tempdir().unwrap();
        for name in ["b.csv", "a.csv", "c.txt", ".a.csv.tmp"] {
            fs::write(dir.path().join(name), "x\n").unwrap();
        }
        fs::create_dir(dir.path().join("z.csv")).unwrap();

        let files = discover(&UnitPattern::new(dir.path(), "", ".csv"));
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let dir = tempdir().unwrap();
        let pattern = UnitPattern::new(dir.path().join("absent"), "", ".csv");
        assert!(discover(&pattern).is_empty());
    }

    #[test]
    fn test_merge_csv_preserves_file_then_row_order() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("contract_buy_0xB.csv"), "buyer,smartContract\nb1,0xB\nb2,0xB\n").unwrap();
        fs::write(dir.path().join("contract_buy_0xA.csv"), ",buyer,smartContract\n0,a1,0xA\n").unwrap();

        let merged = merge_all(&UnitPattern::new(dir.path(), "contract_buy_", ".csv")).unwrap();

        assert_eq!(merged.columns(), &["buyer", "smartContract"]);
        assert_eq!(merged.column_values("buyer").unwrap(), vec!["a1", "b1", "b2"]);
    }

    #[test]
    fn test_merge_json_pages() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("markets_2023_offset_0.json"),
            r#"[{"id":"1","marketMakerAddress":"0xa"},{"id":"2","marketMakerAddress":"0xb"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("markets_2023_offset_50.json"), "[]").unwrap();
        fs::write(
            dir.path().join("markets_2022_offset_0.json"),
            r#"[{"id":"0","category":"Sports"}]"#,
        )
        .unwrap();

        let merged = merge_all(&UnitPattern::new(dir.path(), "markets_", ".json")).unwrap();

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.column_values("id").unwrap(), vec!["0", "1", "2"]);
        assert_eq!(merged.column_values("category").unwrap(), vec!["Sports", "", ""]);
    }

    #[test]
    fn test_merge_nothing() {
        let dir = tempdir().unwrap();
        let merged = merge_csv(&UnitPattern::new(dir.path(), "contract_buy_", ".csv")).unwrap();
        assert!(merged.is_empty());
        assert!(merged.columns().is_empty());
    }

    #[test]
    fn test_unparseable_unit_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("markets_2023_offset_0.json"), "{").unwrap();
        assert!(merge_json_pages(&UnitPattern::new(dir.path(), "markets_", ".json")).is_err());
    }
}
