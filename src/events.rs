//! `FPMMBuy` event handling with compile-time type safety.
//!
//! Fixed product market makers emit one `FPMMBuy` log per outcome-token
//! purchase. This module uses Alloy's `sol!` macro to generate the event type
//! from its Solidity signature, so topic layout, signature hash and ABI
//! decoding all come from a single declaration.
//!
//! Decoded logs become [`EventRecord`]s: flat rows tagged with the contract
//! that emitted them, ready for the per-contract CSV artifact.
//!
//! ## Example
//!
//! ```
//! use market_ingest::events::{FPMMBuy, FPMM_BUY_SIGNATURE};
//! use alloy::primitives::keccak256;
//! use alloy::sol_types::SolEvent;
//!
//! assert_eq!(FPMMBuy::SIGNATURE_HASH, keccak256(FPMM_BUY_SIGNATURE));
//! ```

use crate::error::{IngestError, IngestResult};
use alloy::primitives::{Address, Bytes, LogData, B256, U256};
use alloy::rpc::types::{BlockNumberOrTag, Filter};
use alloy::sol;
use alloy::sol_types::SolEvent;
use serde::Deserialize;

// Generate the market maker event bindings using the sol! macro.
sol! {
    interface IFixedProductMarketMaker {
        /// Emitted when a trader buys outcome tokens.
        ///
        /// # Fields
        /// - `buyer`: Trader address (indexed)
        /// - `investmentAmount`: Collateral paid in, fee included
        /// - `feeAmount`: Fee portion of the investment
        /// - `outcomeIndex`: Outcome slot bought (indexed)
        /// - `outcomeTokensBought`: Outcome tokens received
        event FPMMBuy(
            address indexed buyer,
            uint256 investmentAmount,
            uint256 feeAmount,
            uint256 indexed outcomeIndex,
            uint256 outcomeTokensBought
        );
    }
}

// Re-export the generated type for easier access
pub use IFixedProductMarketMaker::FPMMBuy;

/// Canonical signature the topic hash is derived from.
pub const FPMM_BUY_SIGNATURE: &str = "FPMMBuy(address,uint256,uint256,uint256,uint256)";

/// Column holding the owning contract in every artifact.
pub const OWNER_COLUMN: &str = "smartContract";

/// One entry of an `eth_getLogs` result.
///
/// Only the fields needed for decoding are kept; block and transaction
/// metadata in the response are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLog {
    /// Emitting contract
    pub address: Address,
    /// Topic 0 is the signature hash, followed by indexed arguments
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed arguments
    pub data: Bytes,
}

/// A decoded `FPMMBuy` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Trader address
    pub buyer: Address,
    /// Collateral paid in
    pub investment_amount: U256,
    /// Fee portion
    pub fee_amount: U256,
    /// Outcome slot bought
    pub outcome_index: U256,
    /// Outcome tokens received
    pub outcome_tokens_bought: U256,
    /// Market maker that emitted the log
    pub contract: Address,
}

impl EventRecord {
    /// CSV header of a contract artifact, in row order.
    pub const COLUMNS: [&'static str; 6] = [
        "buyer",
        "investmentAmount",
        "feeAmount",
        "outcomeIndex",
        "outcomeTokensBought",
        OWNER_COLUMN,
    ];

    /// Flatten a decoded event, tagging it with its contract.
    #[must_use]
    pub fn from_event(event: &FPMMBuy, contract: Address) -> Self {
        Self {
            buyer: event.buyer,
            investment_amount: event.investmentAmount,
            fee_amount: event.feeAmount,
            outcome_index: event.outcomeIndex,
            outcome_tokens_bought: event.outcomeTokensBought,
            contract,
        }
    }

    /// Cells in [`EventRecord::COLUMNS`] order. Amounts are base-10 integers,
    /// addresses are EIP-55 checksummed.
    #[must_use]
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.buyer.to_checksum(None),
            self.investment_amount.to_string(),
            self.fee_amount.to_string(),
            self.outcome_index.to_string(),
            self.outcome_tokens_bought.to_string(),
            self.contract.to_checksum(None),
        ]
    }
}

/// Decode one raw log as an `FPMMBuy` event.
///
/// # Errors
///
/// Returns [`IngestError::DecodingError`] if the signature topic does not
/// match or the topics/data do not fit the event ABI.
pub fn decode_buy_log(log: &RawLog, contract: Address) -> IngestResult<EventRecord> {
    let log_data = LogData::new_unchecked(log.topics.clone(), log.data.clone());

    let event = FPMMBuy::decode_log_data(&log_data, true).map_err(|e| {
        IngestError::decoding(
            format!("Failed to decode FPMMBuy log from {}", log.address),
            Some(Box::new(e)),
        )
    })?;

    Ok(EventRecord::from_event(&event, contract))
}

/// Decode every log of one contract, preserving order.
///
/// Decoding is all-or-nothing: a single malformed log fails the contract.
///
/// # Errors
///
/// Returns the first decoding error encountered.
pub fn decode_buy_logs(logs: &[RawLog], contract: Address) -> IngestResult<Vec<EventRecord>> {
    logs.iter()
        .map(|log| decode_buy_log(log, contract))
        .collect()
}

/// Filter for a contract's entire `FPMMBuy` history (block 0 to latest).
#[must_use]
pub fn create_buy_filter(contract: Address) -> Filter {
    Filter::new()
        .address(contract)
        .event_signature(FPMMBuy::SIGNATURE_HASH)
        .from_block(0_u64)
        .to_block(BlockNumberOrTag::Latest)
}
