//! Rate-limit-aware request execution.
//!
//! [`RateLimitedClient`] wraps an [`HttpTransport`] and turns raw responses
//! into results:
//!
//! - **2xx**: the response is returned
//! - **429**: sleep for the policy's backoff and resend the same request,
//!   up to `max_retries` times, then fail with
//!   [`IngestError::ThrottledRetryExceeded`]
//! - **anything else**: fail immediately with [`IngestError::HttpError`]
//!
//! The client never touches a cache. It is shared (behind an `Arc`) by the
//! listing fetcher and every log retrieval, so all remote traffic goes
//! through one connection pool and one optional pacing quota.

use super::http::{HttpRequest, HttpTransport, RawResponse};
use crate::error::{IngestError, IngestResult};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Backoff settings applied to throttled responses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    backoff: Duration,
    max_retries: u32,
    jitter: f64,
}

impl RetryPolicy {
    /// Fixed `backoff` after every 429, at most `max_retries` times per request.
    #[must_use]
    pub const fn new(backoff: Duration, max_retries: u32) -> Self {
        Self {
            backoff,
            max_retries,
            jitter: 0.0,
        }
    }

    /// Spread each sleep by up to `±jitter` (a fraction of the backoff).
    ///
    /// Values are clamped to `0.0..=1.0`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Base sleep after a throttled response.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Fraction of the backoff each sleep may be spread by.
    #[must_use]
    pub const fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Throttled retries allowed before giving up.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the next attempt.
    fn delay(&self) -> Duration {
        if self.jitter <= 0.0 {
            return self.backoff;
        }

        let jitter_factor = self.jitter * rand::random::<f64>().mul_add(2.0, -1.0);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let millis = (self.backoff.as_millis() as f64 * (1.0 + jitter_factor)).max(0.0) as u64;
        Duration::from_millis(millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), 30)
    }
}

/// Point-in-time view of the client's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Requests handed to the transport, retries included
    pub requests: u64,
    /// 429 responses received
    pub throttled: u64,
    /// Backoff sleeps taken
    pub backoffs: u64,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    throttled: AtomicU64,
    backoffs: AtomicU64,
}

type Pacer = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP client with bounded backoff on throttling.
pub struct RateLimitedClient<T> {
    transport: T,
    policy: RetryPolicy,
    pacer: Option<Pacer>,
    counters: Counters,
}

impl<T: HttpTransport> RateLimitedClient<T> {
    /// Wrap `transport` with `policy`.
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            pacer: None,
            counters: Counters::default(),
        }
    }

    /// Pace outbound requests to at most `requests_per_minute`.
    ///
    /// Sends are spaced evenly, one every `60 / requests_per_minute` seconds,
    /// with no initial burst. A quota of zero leaves the client unpaced.
    #[must_use]
    pub fn with_pacing(mut self, requests_per_minute: u32) -> Self {
        self.pacer = NonZeroU32::new(requests_per_minute)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm).allow_burst(NonZeroU32::MIN)));
        self
    }

    /// Whether a pacing quota is active.
    pub const fn is_paced(&self) -> bool {
        self.pacer.is_some()
    }

    /// The wrapped transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The active retry policy.
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Snapshot of request counters.
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            requests: self.counters.requests.load(Ordering::Relaxed),
            throttled: self.counters.throttled.load(Ordering::Relaxed),
            backoffs: self.counters.backoffs.load(Ordering::Relaxed),
        }
    }

    /// Send `request`, backing off on 429 until it succeeds or the retry
    /// ceiling is reached.
    ///
    /// # Errors
    ///
    /// - [`IngestError::ThrottledRetryExceeded`] after `max_retries` backoffs
    /// - [`IngestError::HttpError`] for any other non-2xx status
    /// - [`IngestError::TransportError`] if the request never got a response
    #[instrument(skip(self, request), fields(url = %request.url()))]
    pub async fn request(&self, request: &HttpRequest) -> IngestResult<RawResponse> {
        let mut throttled: u32 = 0;

        loop {
            if let Some(pacer) = &self.pacer {
                pacer.until_ready().await;
            }

            self.counters.requests.fetch_add(1, Ordering::Relaxed);
            let response = self.transport.send(request).await?;

            if response.is_success() {
                debug!(status = response.status, "Request succeeded");
                return Ok(response);
            }

            if !response.is_throttled() {
                error!(
                    status = response.status,
                    body = %truncate(&response.body, 256),
                    "Request failed"
                );
                return Err(IngestError::http(response.status, response.body));
            }

            self.counters.throttled.fetch_add(1, Ordering::Relaxed);
            throttled += 1;

            if throttled > self.policy.max_retries {
                error!(
                    attempts = throttled,
                    max_retries = self.policy.max_retries,
                    "Rate limit persisted past retry ceiling"
                );
                return Err(IngestError::throttled(throttled, request.url()));
            }

            let delay = self.policy.delay();
            warn!(
                attempt = throttled,
                max_retries = self.policy.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Rate limit exceeded, backing off"
            );
            self.counters.backoffs.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(delay).await;
        }
    }

    /// [`request`](Self::request), then parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Everything [`request`](Self::request) returns, plus
    /// [`IngestError::DecodingError`] if the body is not valid JSON for `D`.
    pub async fn request_json<D: DeserializeOwned>(&self, request: &HttpRequest) -> IngestResult<D> {
        let response = self.request(request).await?;
        serde_json::from_str(&response.body).map_err(|e| {
            IngestError::decoding(
                format!("Unexpected response body from {}", request.url()),
                Some(Box::new(e)),
            )
        })
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
