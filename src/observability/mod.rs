//! Observability and structured logging infrastructure.
//!
//! Logging goes through the tracing framework. Every fetch, backoff, cache
//! hit and migration is an event with key-value fields, and the I/O entry
//! points open spans carrying the listing source or contract they work on.
//!
//! # Features
//!
//! - **Structured Logging**: Key-value pairs for machine-parseable logs
//! - **Span Tracking**: Source and contract context across async boundaries
//! - **Multiple Formats**: Console (pretty/JSON) and file output
//! - **Environment Filtering**: `RUST_LOG` variable support
//!
//! # Usage
//!
//! Initialize tracing at application startup and keep the guard alive until
//! exit, so buffered file output is flushed:
//!
//! ```no_run
//! use market_ingest::observability;
//!
//! # fn main() -> market_ingest::error::IngestResult<()> {
//! let _guard = observability::init_tracing(None, None, false)?;
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Configuration
//!
//! ```bash
//! # Component-specific levels
//! RUST_LOG=market_ingest=debug,reqwest=warn market-ingest run
//!
//! # Write JSON logs to a daily-rotated file as well
//! LOG_FILE=./logs/ingest.log market-ingest run
//! ```

use crate::error::{IngestError, IngestResult};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither `RUST_LOG` nor an explicit level is given.
pub const DEFAULT_FILTER: &str = "market_ingest=info,warn";

/// Initialize the tracing subscriber.
///
/// # Arguments
///
/// * `log_level` - Filter directive used when `RUST_LOG` is unset
///   (e.g. `"debug"` or `"market_ingest=trace"`).
/// * `log_file` - Optional file path; enables a daily-rotated JSON log.
/// * `json_output` - JSON console output instead of the pretty format.
///
/// # Defaults
///
/// - Level: `info` for this crate, `warn` for dependencies
/// - Format: Pretty-printed with colors and timestamps
/// - Output: Console only (no file)
///
/// Returns the file writer's guard when file logging is on. Dropping it
/// stops the background writer.
///
/// # Errors
///
/// Returns [`IngestError::ConfigError`] if the log directory cannot be
/// created or a global subscriber is already installed.
pub fn init_tracing(
    log_level: Option<String>,
    log_file: Option<PathBuf>,
    json_output: bool,
) -> IngestResult<Option<WorkerGuard>> {
    let env_filter = build_filter(std::env::var("RUST_LOG").ok(), log_level);

    let console_layer = if json_output {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let (file_layer, guard) = match log_file.as_deref() {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir).map_err(|e| {
                IngestError::config(
                    format!("Cannot create log directory {}", dir.display()),
                    Some(Box::new(e)),
                )
            })?;

            let appender = tracing_appender::rolling::daily(
                dir,
                path.file_name().unwrap_or_else(|| OsStr::new("ingest.log")),
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| IngestError::config("Tracing already initialized", Some(Box::new(e))))?;

    info!(
        json_output,
        file_logging = log_file.is_some(),
        "Tracing initialized"
    );

    Ok(guard)
}

/// `RUST_LOG` wins over the explicit level, which wins over [`DEFAULT_FILTER`].
fn build_filter(rust_log: Option<String>, log_level: Option<String>) -> EnvFilter {
    rust_log
        .or(log_level)
        .map_or_else(|| EnvFilter::new(DEFAULT_FILTER), EnvFilter::new)
}

/// Test subscriber writing through the test harness.
///
/// Safe to call from every test; only the first call installs it.
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_precedence() {
        let filter = build_filter(Some("trace".into()), Some("error".into()));
        assert_eq!(filter.to_string(), "trace");

        let filter = build_filter(None, Some("market_ingest=debug".into()));
        assert_eq!(filter.to_string(), "market_ingest=debug");

        let filter = build_filter(None, None);
        assert!(filter.to_string().contains("market_ingest=info"));
    }

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        init_test_tracing();
        let result = init_tracing(None, None, false);
        assert!(matches!(result, Err(IngestError::ConfigError { .. })));
    }
}
