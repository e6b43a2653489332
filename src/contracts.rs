//! Contract address validation and extraction.
//!
//! Market makers come from free-form listing data, so every candidate is
//! checked before any request is issued. Malformed entries are excluded and
//! reported; they never fail the run.

use crate::dataset::Dataset;
use crate::error::{IngestError, IngestResult};
use alloy::primitives::Address;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Listing column holding each market's maker contract.
pub const MARKET_MAKER_COLUMN: &str = "marketMakerAddress";

/// A validated contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractAddress(Address);

impl ContractAddress {
    /// Parse `0x` followed by exactly 40 hex digits (any case).
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::ValidationError`] for anything else.
    pub fn parse(raw: &str) -> IngestResult<Self> {
        let trimmed = raw.trim();
        let is_hex_address = trimmed.len() == 42
            && trimmed.starts_with("0x")
            && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());

        if !is_hex_address {
            return Err(IngestError::validation(format!(
                "not a contract address: {raw:?}"
            )));
        }

        Address::from_str(trimmed)
            .map(Self)
            .map_err(|e| IngestError::validation(format!("not a contract address: {raw:?} ({e})")))
    }

    /// Underlying address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.0
    }

    /// EIP-55 checksummed form used in artifact names and rows.
    #[must_use]
    pub fn checksummed(&self) -> String {
        self.0.to_checksum(None)
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.checksummed())
    }
}

impl FromStr for ContractAddress {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Outcome of validating a batch of candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSelection {
    /// Valid, unique addresses in first-seen order
    pub valid: Vec<ContractAddress>,
    /// Inputs that failed validation, as given
    pub excluded: Vec<String>,
}

/// Validate and deduplicate `candidates`.
///
/// Duplicates (including case variants of the same address) are dropped
/// silently; malformed entries go to [`AddressSelection::excluded`].
#[must_use]
pub fn select_addresses<S: AsRef<str>>(candidates: &[S]) -> AddressSelection {
    let mut seen = HashSet::new();
    let mut selection = AddressSelection::default();

    for candidate in candidates {
        let raw = candidate.as_ref();
        match ContractAddress::parse(raw) {
            Ok(address) => {
                if seen.insert(address) {
                    selection.valid.push(address);
                }
            }
            Err(_) => {
                debug!(candidate = raw, "Excluding malformed contract address");
                selection.excluded.push(raw.to_string());
            }
        }
    }

    if !selection.excluded.is_empty() {
        warn!(
            excluded = selection.excluded.len(),
            valid = selection.valid.len(),
            "Some contract candidates were not addresses"
        );
    }

    selection
}

/// Distinct, non-empty market maker values of a listing, in first-seen order.
///
/// Values are not validated here; pass them through [`select_addresses`].
#[must_use]
pub fn extract_market_makers(listing: &Dataset) -> Vec<String> {
    let Some(values) = listing.column_values(MARKET_MAKER_COLUMN) else {
        warn!(column = MARKET_MAKER_COLUMN, "Listing has no market maker column");
        return Vec::new();
    };

    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}
