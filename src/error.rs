//! Error types for the ingestion pipeline.
//!
//! This module provides a unified error type [`IngestError`] covering every
//! failure the pipeline can surface, from configuration loading through
//! remote requests, log decoding and cache I/O.
//!
//! # Design
//!
//! Errors are organized by the unit of work they affect:
//! - [`IngestError::ConfigError`]: Configuration and environment issues
//! - [`IngestError::TransportError`]: Connection-level failures (no HTTP status)
//! - [`IngestError::HttpError`]: Non-retryable HTTP status with the response body
//! - [`IngestError::ThrottledRetryExceeded`]: Rate limiting outlasted the retry ceiling
//! - [`IngestError::RpcError`]: JSON-RPC error envelope returned by the log endpoint
//! - [`IngestError::DecodingError`]: Response or event-log decoding failures
//! - [`IngestError::ValidationError`]: Malformed addresses or rejected labels
//! - [`IngestError::CacheError`]: Artifact read/write failures
//!
//! A failure is fatal only to the unit that raised it (one listing source,
//! one contract). Callers higher up decide whether to abort or to log and
//! continue.
//!
//! # Example
//!
//! ```
//! use market_ingest::error::{IngestError, IngestResult};
//!
//! fn check_page_size(page_size: u64) -> IngestResult<()> {
//!     if page_size == 0 {
//!         return Err(IngestError::config("page size cannot be zero", None));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Result type alias using [`IngestError`].
pub type IngestResult<T> = Result<T, IngestError>;

type BoxedSource = Option<Box<dyn std::error::Error + Send + Sync>>;

/// Unified error type for the ingestion pipeline.
#[derive(Debug)]
pub enum IngestError {
    /// Configuration or environment variable errors.
    ///
    /// Variants include:
    /// - Invalid numeric values
    /// - Unknown policy names
    /// - A zero page size or worker count
    ConfigError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: BoxedSource,
    },

    /// Connection-level failure before any HTTP status was received.
    ///
    /// Variants include:
    /// - Connection refused
    /// - Request timeout
    /// - TLS failures
    TransportError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: BoxedSource,
    },

    /// A non-2xx, non-429 HTTP response. Never retried.
    HttpError {
        /// HTTP status code
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// The remote kept answering 429 past the configured retry ceiling.
    ThrottledRetryExceeded {
        /// Number of requests sent before giving up
        attempts: u32,
        /// Target URL of the throttled request
        url: String,
    },

    /// The JSON-RPC endpoint answered with an `error` member.
    RpcError {
        /// JSON-RPC error code
        code: i64,
        /// JSON-RPC error message
        message: String,
    },

    /// Response body or event-log decoding errors.
    ///
    /// Variants include:
    /// - Listing page that is not a JSON array
    /// - Missing `result` in a JSON-RPC response
    /// - Log topics/data that do not match the event ABI
    DecodingError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: BoxedSource,
    },

    /// Input validation errors.
    ///
    /// Variants include:
    /// - Malformed contract address
    /// - Category label rejected by a strict policy
    ValidationError {
        /// Human-readable error message
        message: String,
    },

    /// Cache artifact read or write errors.
    CacheError {
        /// Human-readable error message
        message: String,
        /// Optional underlying error
        source: BoxedSource,
    },
}

impl IngestError {
    /// Create a new configuration error.
    ///
    /// # Example
    ///
    /// ```
    /// use market_ingest::error::IngestError;
    ///
    /// let err = IngestError::config("PAGE_SIZE must be a number", None);
    /// assert!(matches!(err, IngestError::ConfigError { .. }));
    /// ```
    #[must_use]
    pub fn config(message: impl Into<String>, source: BoxedSource) -> Self {
        Self::ConfigError {
            message: message.into(),
            source,
        }
    }

    /// Create a new transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>, source: BoxedSource) -> Self {
        Self::TransportError {
            message: message.into(),
            source,
        }
    }

    /// Create a new HTTP status error.
    ///
    /// # Example
    ///
    /// ```
    /// use market_ingest::error::IngestError;
    ///
    /// let err = IngestError::http(500, "internal error");
    /// assert_eq!(err.to_string(), "HTTP error 500: internal error");
    /// ```
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::HttpError {
            status,
            body: body.into(),
        }
    }

    /// Create a retry-ceiling error for a throttled request.
    #[must_use]
    pub fn throttled(attempts: u32, url: impl Into<String>) -> Self {
        Self::ThrottledRetryExceeded {
            attempts,
            url: url.into(),
        }
    }

    /// Create a JSON-RPC error from an error envelope.
    #[must_use]
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        Self::RpcError {
            code,
            message: message.into(),
        }
    }

    /// Create a new decoding error.
    ///
    /// # Example
    ///
    /// ```
    /// use market_ingest::error::IngestError;
    ///
    /// let err = IngestError::decoding("Invalid log structure", None);
    /// assert!(matches!(err, IngestError::DecodingError { .. }));
    /// ```
    #[must_use]
    pub fn decoding(message: impl Into<String>, source: BoxedSource) -> Self {
        Self::DecodingError {
            message: message.into(),
            source,
        }
    }

    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Create a new cache error.
    #[must_use]
    pub fn cache(message: impl Into<String>, source: BoxedSource) -> Self {
        Self::CacheError {
            message: message.into(),
            source,
        }
    }

    /// Whether this error came from the remote refusing or rejecting a request,
    /// as opposed to a local problem.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::HttpError { .. } | Self::ThrottledRetryExceeded { .. } | Self::RpcError { .. }
        )
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError { message, .. } => write!(f, "Configuration error: {message}"),
            Self::TransportError { message, .. } => write!(f, "Transport error: {message}"),
            Self::HttpError { status, body } => write!(f, "HTTP error {status}: {body}"),
            Self::ThrottledRetryExceeded { attempts, url } => {
                write!(f, "Still rate limited after {attempts} attempts: {url}")
            }
            Self::RpcError { code, message } => write!(f, "RPC error {code}: {message}"),
            Self::DecodingError { message, .. } => write!(f, "Decoding error: {message}"),
            Self::ValidationError { message } => write!(f, "Validation error: {message}"),
            Self::CacheError { message, .. } => write!(f, "Cache error: {message}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigError { source, .. }
            | Self::TransportError { source, .. }
            | Self::DecodingError { source, .. }
            | Self::CacheError { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &dyn std::error::Error),
            Self::HttpError { .. }
            | Self::ThrottledRetryExceeded { .. }
            | Self::RpcError { .. }
            | Self::ValidationError { .. } => None,
        }
    }
}

/// Convert from `eyre::Report` to `IngestError`.
///
/// Reports have no better home, so they are categorized as transport errors.
impl From<eyre::Report> for IngestError {
    fn from(err: eyre::Report) -> Self {
        Self::TransportError {
            message: err.to_string(),
            source: None,
        }
    }
}
