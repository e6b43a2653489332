//! Full `FPMMBuy` history of one contract.
//!
//! A retrieval is skip-first: an artifact that is already complete costs no
//! network call, and an artifact in an older layout is migrated in place.
//! Otherwise the whole history is requested with a single `eth_getLogs` call,
//! decoded, and stored. Every failure is reported as
//! [`Retrieval::Failed`] and never escapes to the caller, so one bad contract
//! cannot take its siblings down.
//!
//! Cache reads and writes are blocking file I/O. They run on Tokio's blocking
//! pool so a large artifact does not stall the other retrievals sharing the
//! runtime.

use crate::cache::{ArtifactState, ContractCache};
use crate::contracts::ContractAddress;
use crate::error::{IngestError, IngestResult};
use crate::events::{create_buy_filter, decode_buy_logs, EventRecord, RawLog};
use crate::rpc::{HttpRequest, HttpTransport, JsonRpcRequest, JsonRpcResponse, RateLimitedClient};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Persistent state of one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStatus {
    /// No usable artifact yet
    NotStarted,
    /// Artifact is complete
    Cached,
    /// Last attempt failed
    Failed(String),
}

impl fmt::Display for RetrievalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Cached => write!(f, "cached"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of one [`LogRetriever::retrieve`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Retrieval {
    /// Logs were fetched, decoded and stored
    Fetched(Vec<EventRecord>),
    /// A complete artifact already existed
    Cached,
    /// An older artifact was rewritten to the current layout
    Migrated,
    /// Request, decoding or storage failed
    Failed(String),
}

impl Retrieval {
    /// Resulting contract status.
    #[must_use]
    pub fn status(&self) -> RetrievalStatus {
        match self {
            Self::Fetched(_) | Self::Cached | Self::Migrated => RetrievalStatus::Cached,
            Self::Failed(reason) => RetrievalStatus::Failed(reason.clone()),
        }
    }

    /// Whether a network fetch happened.
    #[must_use]
    pub const fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// Retrieves and caches one contract's buy history.
pub struct LogRetriever<T> {
    client: Arc<RateLimitedClient<T>>,
    cache: ContractCache,
    rpc_url: String,
}

impl<T: HttpTransport> LogRetriever<T> {
    /// Create a retriever sharing `client`.
    pub fn new(client: Arc<RateLimitedClient<T>>, cache: ContractCache, rpc_url: impl Into<String>) -> Self {
        Self {
            client,
            cache,
            rpc_url: rpc_url.into(),
        }
    }

    /// The contract cache.
    pub const fn cache(&self) -> &ContractCache {
        &self.cache
    }

    /// The shared client.
    pub const fn client(&self) -> &Arc<RateLimitedClient<T>> {
        &self.client
    }

    /// Status of `contract` from what is on disk.
    pub fn status(&self, contract: &ContractAddress) -> RetrievalStatus {
        if self.cache.inspect(contract).is_cached() {
            RetrievalStatus::Cached
        } else {
            RetrievalStatus::NotStarted
        }
    }

    /// Make sure `contract` has a complete artifact.
    #[instrument(skip(self), fields(contract = %contract))]
    pub async fn retrieve(&self, contract: ContractAddress) -> Retrieval {
        let state = match on_blocking_pool(&self.cache, move |cache| Ok(cache.inspect(&contract))).await {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "Failed to inspect artifact");
                return Retrieval::Failed(e.to_string());
            }
        };

        match state {
            ArtifactState::Valid => {
                debug!("Artifact already complete, skipping");
                return Retrieval::Cached;
            }
            ArtifactState::Stale { .. } => {
                return match on_blocking_pool(&self.cache, move |cache| cache.migrate(&contract)).await {
                    Ok(()) => Retrieval::Migrated,
                    Err(e) => {
                        error!(error = %e, "Failed to migrate artifact");
                        Retrieval::Failed(e.to_string())
                    }
                };
            }
            ArtifactState::Unreadable(reason) => {
                warn!(%reason, "Artifact unreadable, refetching");
            }
            ArtifactState::Missing => {}
        }

        match self.fetch_and_store(&contract).await {
            Ok(records) => {
                info!(records = records.len(), "Contract history stored");
                Retrieval::Fetched(records)
            }
            Err(e) => {
                error!(error = %e, "Contract retrieval failed");
                Retrieval::Failed(e.to_string())
            }
        }
    }

    async fn fetch_and_store(&self, contract: &ContractAddress) -> IngestResult<Vec<EventRecord>> {
        let body = JsonRpcRequest::new("eth_getLogs", [create_buy_filter(contract.address())]).to_body()?;
        let request = HttpRequest::post_json(self.rpc_url.clone(), body);

        let response: JsonRpcResponse<Vec<RawLog>> = self.client.request_json(&request).await?;
        let logs = response.into_result()?;
        debug!(logs = logs.len(), "Logs received");

        let records = decode_buy_logs(&logs, contract.address())?;
        let contract = *contract;
        on_blocking_pool(&self.cache, move |cache| {
            cache.write(&contract, &records)?;
            Ok(records)
        })
        .await
    }
}

/// Run a cache operation on the blocking pool.
async fn on_blocking_pool<R, F>(cache: &ContractCache, op: F) -> IngestResult<R>
where
    F: FnOnce(&ContractCache) -> IngestResult<R> + Send + 'static,
    R: Send + 'static,
{
    let cache = cache.clone();
    tokio::task::spawn_blocking(move || op(&cache))
        .await
        .map_err(|e| IngestError::cache("Cache task did not complete", Some(Box::new(e))))?
}
