//! HTTP transport for the listing API and the JSON-RPC log endpoint.
//!
//! The [`HttpTransport`] trait is the seam between the pipeline and the
//! network: it sends one request and hands back the raw status and body
//! without interpreting either. Retry and throttling policy live one layer
//! up in [`RateLimitedClient`](super::RateLimitedClient), so a transport
//! stays stateless and can be swapped for a scripted one in tests.
//!
//! ## Example
//!
//! ```no_run
//! use market_ingest::rpc::{HttpRequest, HttpTransport, ReqwestTransport};
//! use market_ingest::error::IngestResult;
//! use std::time::Duration;
//!
//! # async fn example() -> IngestResult<()> {
//! let transport = ReqwestTransport::new(Duration::from_secs(30))?;
//! let request = HttpRequest::get(
//!     "https://gamma-api.polymarket.com/markets",
//!     vec![("limit".to_string(), "1".to_string())],
//! );
//! let response = transport.send(&request).await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

use crate::error::{IngestError, IngestResult};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP status the remote uses to signal throttling.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// One outbound request, fully described.
///
/// Requests are plain data so the same value can be re-sent verbatim on
/// every retry.
#[derive(Debug, Clone, PartialEq)]
pub enum HttpRequest {
    /// GET with query parameters (listing pages).
    Get {
        /// Target URL
        url: String,
        /// Query parameters, in order
        query: Vec<(String, String)>,
    },
    /// POST with a JSON body (JSON-RPC calls).
    PostJson {
        /// Target URL
        url: String,
        /// Request body
        body: serde_json::Value,
    },
}

impl HttpRequest {
    /// Build a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>, query: Vec<(String, String)>) -> Self {
        Self::Get {
            url: url.into(),
            query,
        }
    }

    /// Build a JSON POST request.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::PostJson {
            url: url.into(),
            body,
        }
    }

    /// Target URL.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Get { url, .. } | Self::PostJson { url, .. } => url,
        }
    }

    /// Look up a query parameter of a GET request.
    #[must_use]
    pub fn query_param(&self, key: &str) -> Option<&str> {
        match self {
            Self::Get { query, .. } => query
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            Self::PostJson { .. } => None,
        }
    }

    /// JSON body of a POST request.
    #[must_use]
    pub const fn json_body(&self) -> Option<&serde_json::Value> {
        match self {
            Self::PostJson { body, .. } => Some(body),
            Self::Get { .. } => None,
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    /// Create a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// The remote asked us to slow down.
    #[must_use]
    pub const fn is_throttled(&self) -> bool {
        self.status == STATUS_TOO_MANY_REQUESTS
    }
}

/// Sends a single request and returns whatever the remote answered.
///
/// Implementations must only fail for connection-level problems; every HTTP
/// status, including errors, is a successful [`RawResponse`].
pub trait HttpTransport: Send + Sync {
    /// Send one request.
    fn send(&self, request: &HttpRequest)
        -> impl Future<Output = IngestResult<RawResponse>> + Send;
}

/// [`HttpTransport`] backed by a pooled `reqwest::Client`.
///
/// Cloning is cheap and shares the connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> IngestResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::transport("Failed to build HTTP client", Some(Box::new(e))))?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    #[instrument(skip(self, request), fields(host = tracing::field::Empty))]
    async fn send(&self, request: &HttpRequest) -> IngestResult<RawResponse> {
        // Paths and query strings can carry keys
        let host = host_of(request.url());
        tracing::Span::current().record("host", host.as_str());

        let builder = match request {
            HttpRequest::Get { url, query } => self.client.get(url).query(query),
            HttpRequest::PostJson { url, body } => self.client.post(url).json(body),
        };

        let response = builder.send().await.map_err(|e| {
            IngestError::transport(format!("Request to {host} failed"), Some(Box::new(e)))
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            IngestError::transport(
                format!("Failed to read response body from {host}"),
                Some(Box::new(e)),
            )
        })?;

        debug!(status, bytes = body.len(), "Response received");

        Ok(RawResponse { status, body })
    }
}

/// Host part of `url`, or `"unknown"` if it does not parse.
fn host_of(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}
