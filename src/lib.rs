//! # Prediction Market Ingestion
//!
//! Durable, resumable ingestion of a paged market listing API and of every
//! listed market maker's on-chain `FPMMBuy` history, built on
//! [Alloy](https://github.com/alloy-rs/alloy) for event decoding.
//!
//! ## Features
//!
//! - **Checkpointed pagination**: every listing page is cached; reruns resume
//!   at the first missing page
//! - **Idempotent caching**: one artifact per unit, written atomically
//! - **Bounded 429 backoff** with a retry ceiling and optional pacing
//! - **Bounded fan-out** over thousands of contracts with per-contract fault
//!   isolation
//! - **Type-safe event decoding** using Alloy's `sol!` macro
//!
//! ## Architecture
//!
//! 1. **Transport** ([`rpc`]) - HTTP seam, rate-limited client, JSON-RPC envelopes
//! 2. **Caches** ([`cache`]) - listing pages and contract artifacts on disk
//! 3. **Fetchers** ([`pagination`], [`retriever`]) - one listing source, one contract
//! 4. **Fan-out** ([`dispatcher`]) - concurrent retrievals with a worker cap
//! 5. **Aggregation** ([`aggregator`], [`dataset`]) - merge units into one table
//! 6. **Orchestration** ([`pipeline`], [`cli`]) - the end-to-end run
//!
//! ## Artifacts
//!
//! ```text
//! <DATA_DIR>/bronze/markets_<year>_offset_<n>.json
//! <DATA_DIR>/bronze/contract_buy_<address>.csv
//! <DATA_DIR>/silver/markets.csv
//! <DATA_DIR>/silver/contract_buy.csv
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --release -- run
//! ```
//!
//! ### Using as a Library
//!
//! ```rust,no_run
//! use market_ingest::{config::Config, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let pipeline = Pipeline::new(config)?;
//!
//!     let summary = pipeline.run().await?;
//!     println!("{} buys merged", summary.buys.merged_rows);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`error::IngestResult<T>`](error::IngestResult):
//!
//! ```rust
//! use market_ingest::error::{IngestError, IngestResult};
//!
//! fn example() -> IngestResult<()> {
//!     Err(IngestError::validation("not a contract address"))
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod aggregator;
pub mod cache;
pub mod categories;
pub mod cli;
pub mod config;
pub mod contracts;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod observability;
pub mod pagination;
pub mod pipeline;
pub mod retriever;
pub mod rpc;
