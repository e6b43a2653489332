//! CLI entry point for the market ingestion pipeline.
//!
//! # Architecture Flow
//!
//! ```text
//! main.rs (Runtime + tracing)
//!     ↓
//! CLI Layer (src/cli.rs)
//!     ↓
//! Pipeline (src/pipeline.rs)
//!     ├─ PagedFetcher ──┐
//!     │                 ├─ RateLimitedClient → HttpTransport
//!     ├─ Dispatcher ────┘
//!     │    └─ LogRetriever × N
//!     └─ Aggregator → silver/*.csv
//! ```
//!
//! All errors bubble up via `IngestResult<T>`; per-contract failures are
//! reported, not raised.

use market_ingest::{cli, observability};
use tracing::error;

/// Entry point.
///
/// Logging is configured from the environment:
/// - `RUST_LOG`: filter directives (e.g. `market_ingest=debug`)
/// - `LOG_JSON`: JSON console output (`true`/`false`)
/// - `LOG_FILE`: additional daily-rotated JSON log file
#[tokio::main]
async fn main() {
    let log_file = std::env::var("LOG_FILE").ok().map(std::path::PathBuf::from);
    let json_output = std::env::var("LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    // Held until exit so the file writer flushes
    let guard = match observability::init_tracing(None, log_file, json_output) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize tracing: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = cli::run().await {
        error!(error = %e, "Application error");
        eprintln!("Error: {e}");
        drop(guard);
        std::process::exit(1);
    }
}
