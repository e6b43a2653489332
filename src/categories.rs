//! Market category set and label validation.
//!
//! The known categories are whatever the merged listing already uses. Labels
//! assigned downstream are checked against that set; what happens to an
//! unknown label depends on the [`CategoryPolicy`].

use crate::dataset::Dataset;
use crate::error::{IngestError, IngestResult};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Listing column holding the market category.
pub const CATEGORY_COLUMN: &str = "category";

/// Handling of labels outside the known set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryPolicy {
    /// Accept the label and log a warning
    #[default]
    Flag,
    /// Fail with a validation error
    Reject,
}

impl FromStr for CategoryPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flag" => Ok(Self::Flag),
            "reject" => Ok(Self::Reject),
            other => Err(IngestError::config(
                format!("Unknown category policy '{other}' (expected 'flag' or 'reject')"),
                None,
            )),
        }
    }
}

impl fmt::Display for CategoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag => write!(f, "flag"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// Result of checking one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryVerdict {
    /// Label is in the set
    Known,
    /// Label is unknown but was accepted under [`CategoryPolicy::Flag`]
    Flagged,
}

/// Ordered set of known category labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySet {
    labels: Vec<String>,
}

impl CategorySet {
    /// Distinct non-empty labels in first-seen order.
    ///
    /// Labels ending in `-` are placeholders in the listing data and are
    /// skipped.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let labels = labels
            .into_iter()
            .filter_map(|label| {
                let label = label.as_ref().trim();
                (!label.is_empty() && !label.ends_with('-') && seen.insert(label.to_string()))
                    .then(|| label.to_string())
            })
            .collect();
        Self { labels }
    }

    /// Categories used by a merged listing.
    ///
    /// A listing without a category column yields an empty set.
    #[must_use]
    pub fn from_dataset(listing: &Dataset) -> Self {
        listing
            .column_values(CATEGORY_COLUMN)
            .map(Self::from_labels)
            .unwrap_or_default()
    }

    /// Labels in order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of labels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// No labels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Exact membership test.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|known| known == label)
    }

    /// Check `label` under `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ValidationError`] for an unknown label under
    /// [`CategoryPolicy::Reject`].
    pub fn validate(&self, label: &str, policy: CategoryPolicy) -> IngestResult<CategoryVerdict> {
        if self.contains(label) {
            return Ok(CategoryVerdict::Known);
        }

        match policy {
            CategoryPolicy::Flag => {
                warn!(label, known = self.len(), "Label is not a known category");
                Ok(CategoryVerdict::Flagged)
            }
            CategoryPolicy::Reject => Err(IngestError::validation(format!(
                "'{label}' is not a known category"
            ))),
        }
    }
}
