//! Remote access for both sources.
//!
//! # Layers
//!
//! - **Transport** ([`http`]): sends one request, returns raw status and body
//! - **Client** ([`client`]): 429 backoff with a retry ceiling, optional pacing
//! - **JSON-RPC** ([`jsonrpc`]): envelopes for the log endpoint
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ PagedFetcher │   │ LogRetriever │ (× N contracts)
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!        ┌────────▼──────────┐
//!        │ RateLimitedClient │  shared via Arc
//!        └────────┬──────────┘
//!        ┌────────▼──────────┐
//!        │  HttpTransport    │  one reqwest pool
//!        └───────────────────┘
//! ```

pub mod client;
pub mod http;
pub mod jsonrpc;

// Re-export commonly used types
pub use client::{ClientStats, RateLimitedClient, RetryPolicy};
pub use http::{HttpRequest, HttpTransport, RawResponse, ReqwestTransport};
pub use jsonrpc::{JsonRpcRequest, JsonRpcResponse};
