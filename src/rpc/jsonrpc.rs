//! JSON-RPC 2.0 request and response envelopes.

use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};

/// A single JSON-RPC call.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: P,
}

impl<P: Serialize> JsonRpcRequest<P> {
    /// Build a call with id 1.
    pub const fn new(method: &'static str, params: P) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        }
    }

    /// Serialize to a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the params cannot be serialized.
    pub fn to_body(&self) -> IngestResult<serde_json::Value> {
        serde_json::to_value(self).map_err(|e| {
            IngestError::decoding(
                format!("Failed to encode {} request", self.method),
                Some(Box::new(e)),
            )
        })
    }
}

/// Error member of a failed call.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorObject {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
}

/// Response envelope: exactly one of `result` or `error` is expected.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    /// Call result on success
    pub result: Option<T>,
    /// Error on failure
    pub error: Option<JsonRpcErrorObject>,
}

impl<T> JsonRpcResponse<T> {
    /// Unwrap the envelope.
    ///
    /// # Errors
    ///
    /// - [`IngestError::RpcError`] when the endpoint returned an error member
    /// - [`IngestError::DecodingError`] when neither member is present
    pub fn into_result(self) -> IngestResult<T> {
        if let Some(err) = self.error {
            return Err(IngestError::rpc(err.code, err.message));
        }
        self.result
            .ok_or_else(|| IngestError::decoding("JSON-RPC response has no result", None))
    }
}
