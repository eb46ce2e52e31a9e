//! Remote data adapter boundary.
//!
//! The gateway talks to the hosted relational service only through
//! [`DataAdapter`]. Adapters report failure through [`RemoteResponse::error`]
//! rather than by returning `Err`, and the gateway treats any populated error as
//! a failed attempt.

pub mod postgrest;
mod request;

pub use postgrest::PostgrestAdapter;
pub use request::{OrderBy, RemoteRequest, RpcCall, TableAction, TableQuery};

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Error reported by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// HTTP status, absent when the request never got an answer.
    #[serde(skip)]
    pub status: Option<u16>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl From<RemoteError> for GatewayError {
    fn from(err: RemoteError) -> Self {
        GatewayError::RemoteCallFailed {
            message: err.message,
            code: err.code,
            details: err.details,
            hint: err.hint,
            status: err.status,
        }
    }
}

/// Outcome of one remote call: `{data, error, count?}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteResponse {
    pub data: Option<Value>,
    pub error: Option<RemoteError>,
    pub count: Option<u64>,
}

impl RemoteResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    /// Successful response carrying a row count.
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Failed response.
    pub fn failed(error: RemoteError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    /// Convert into a result; a populated `error` wins over any data.
    pub fn into_result(self) -> Result<RemotePayload, GatewayError> {
        match self.error {
            Some(err) => Err(err.into()),
            None => Ok(RemotePayload {
                data: self.data.unwrap_or(Value::Null),
                count: self.count,
            }),
        }
    }
}

/// Successful remote payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemotePayload {
    pub data: Value,
    pub count: Option<u64>,
}

impl RemotePayload {
    /// `{data, count}` as returned by read operations.
    pub fn to_json(&self) -> Value {
        json!({ "data": self.data, "count": self.count })
    }
}

/// Client for the remote relational data service.
#[async_trait]
pub trait DataAdapter: Send + Sync {
    /// Adapter name for logs.
    fn name(&self) -> &'static str;

    /// Execute one request. Failures are reported in the response, never raised.
    async fn execute(&self, request: &RemoteRequest) -> RemoteResponse;
}

/// Shared adapter handle.
pub type SharedAdapter = Arc<dyn DataAdapter>;
