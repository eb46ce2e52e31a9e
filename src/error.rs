//! Error types for the tabular gateway.
//!
//! Every failure a dispatched operation can hit is a [`GatewayError`]. None of
//! them escape the dispatcher: they are converted into the structured error
//! envelope at the boundary.

use serde_json::{json, Value};
use thiserror::Error;

/// Domain-specific errors for the tabular gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Operation name is not one of the known operations
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// Required parameter absent (or null)
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    /// Parameter present but of the wrong shape
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    /// Filter operator outside the supported set
    #[error("Unsupported filter operator: {0}")]
    UnsupportedFilterOperator(String),

    /// Filter value does not fit its operator
    #[error("Invalid value for filter on '{column}' ({operator}): {message}")]
    InvalidFilterValue {
        column: String,
        operator: String,
        message: String,
    },

    /// Table, column or function name rejected before reaching the remote service
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The remote data service reported an error
    #[error("Remote call failed: {message}")]
    RemoteCallFailed {
        message: String,
        code: Option<String>,
        details: Option<String>,
        hint: Option<String>,
        status: Option<u16>,
    },

    /// Terminal form of repeated retryable remote failures
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },

    /// The caller's deadline passed before the operation completed
    #[error("Deadline exceeded after {elapsed_ms} ms")]
    DeadlineExceeded { elapsed_ms: u64 },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create an unknown operation error.
    pub fn unknown_operation(name: impl Into<String>) -> Self {
        Self::UnknownOperation(name.into())
    }

    /// Create a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter(name.into())
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported filter operator error.
    pub fn unsupported_operator(operator: impl Into<String>) -> Self {
        Self::UnsupportedFilterOperator(operator.into())
    }

    /// Create an invalid filter value error.
    pub fn invalid_filter_value(
        column: impl Into<String>,
        operator: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidFilterValue {
            column: column.into(),
            operator: operator.into(),
            message: message.into(),
        }
    }

    /// Create an invalid identifier error.
    pub fn invalid_identifier(msg: impl Into<String>) -> Self {
        Self::InvalidIdentifier(msg.into())
    }

    /// Create a remote failure carrying only a message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteCallFailed {
            message: msg.into(),
            code: None,
            details: None,
            hint: None,
            status: None,
        }
    }

    /// Create a remote failure with an HTTP status.
    pub fn remote_with_status(msg: impl Into<String>, status: u16) -> Self {
        Self::RemoteCallFailed {
            message: msg.into(),
            code: None,
            details: None,
            hint: None,
            status: Some(status),
        }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable name of the variant, reported as `details.kind` in envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownOperation(_) => "UnknownOperation",
            Self::MissingParameter(_) => "MissingParameter",
            Self::InvalidParameter { .. } => "InvalidParameter",
            Self::UnsupportedFilterOperator(_) => "UnsupportedFilterOperator",
            Self::InvalidFilterValue { .. } => "InvalidFilterValue",
            Self::InvalidIdentifier(_) => "InvalidIdentifier",
            Self::RemoteCallFailed { .. } => "RemoteCallFailed",
            Self::RetriesExhausted { .. } => "RetriesExhausted",
            Self::DeadlineExceeded { .. } => "DeadlineExceeded",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "Config",
            Self::Internal(_) => "Internal",
        }
    }

    /// Check if this error was raised while validating the request,
    /// i.e. before any remote call was attempted.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperation(_)
                | Self::MissingParameter(_)
                | Self::InvalidParameter { .. }
                | Self::UnsupportedFilterOperator(_)
                | Self::InvalidFilterValue { .. }
                | Self::InvalidIdentifier(_)
        )
    }

    /// Check if this error is transient and may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RemoteCallFailed { status, code, .. } => {
                // No status means the request never got an HTTP answer
                let status_retryable = match status {
                    None => code.is_none(),
                    Some(s) => is_transient_status(*s),
                };
                status_retryable || code.as_deref().is_some_and(is_transient_pg_code)
            }
            _ => false,
        }
    }

    /// Structured details for the error envelope.
    pub fn details(&self) -> Value {
        match self {
            Self::UnknownOperation(name) => json!({
                "kind": self.kind(),
                "operation": name,
                "known": crate::tools::Operation::names(),
            }),
            Self::MissingParameter(name) => json!({
                "kind": self.kind(),
                "parameter": name,
            }),
            Self::InvalidParameter { name, message } => json!({
                "kind": self.kind(),
                "parameter": name,
                "reason": message,
            }),
            Self::UnsupportedFilterOperator(op) => json!({
                "kind": self.kind(),
                "operator": op,
                "supported": crate::filter::FilterOperator::names(),
            }),
            Self::InvalidFilterValue {
                column, operator, ..
            } => json!({
                "kind": self.kind(),
                "column": column,
                "operator": operator,
            }),
            Self::RemoteCallFailed {
                code,
                details,
                hint,
                status,
                ..
            } => json!({
                "kind": self.kind(),
                "code": code,
                "details": details,
                "hint": hint,
                "status": status,
                "retryable": self.is_retryable(),
            }),
            Self::RetriesExhausted { attempts, last } => json!({
                "kind": self.kind(),
                "attempts": attempts,
                "lastError": {
                    "message": last.to_string(),
                    "details": last.details(),
                },
            }),
            Self::DeadlineExceeded { elapsed_ms } => json!({
                "kind": self.kind(),
                "elapsedMs": elapsed_ms,
            }),
            _ => json!({ "kind": self.kind() }),
        }
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::UnknownOperation(_) => Some("Use one of the operations listed in details.known"),
            Self::MissingParameter(_) => Some("Supply the named parameter"),
            Self::UnsupportedFilterOperator(_) => {
                Some("Use one of the operators listed in details.supported")
            }
            Self::InvalidFilterValue { .. } => {
                Some("'in', 'overlaps' and 'containedBy' take arrays; 'is' takes null or a boolean")
            }
            Self::RetriesExhausted { .. } => {
                Some("The remote service kept failing. Wait and retry.")
            }
            Self::Config(_) => Some("Check your environment variables and configuration"),
            _ => None,
        }
    }
}

/// HTTP statuses worth retrying.
fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504)
}

/// PostgreSQL SQLSTATE codes that indicate a transient condition.
fn is_transient_pg_code(code: &str) -> bool {
    code.starts_with("08")      // connection exception
        || code == "40001"      // serialization failure
        || code == "40P01"      // deadlock detected
        || code.starts_with("53") // insufficient resources
        || code.starts_with("57P") // operator intervention / shutdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote_with_code(code: &str, status: u16) -> GatewayError {
        GatewayError::RemoteCallFailed {
            message: "boom".to_string(),
            code: Some(code.to_string()),
            details: None,
            hint: None,
            status: Some(status),
        }
    }

    #[test]
    fn test_transient_errors() {
        assert!(GatewayError::remote("connection reset").is_retryable());
        assert!(GatewayError::remote_with_status("unavailable", 503).is_retryable());
        assert!(GatewayError::remote_with_status("slow down", 429).is_retryable());
        assert!(remote_with_code("40P01", 409).is_retryable());
        assert!(remote_with_code("08006", 400).is_retryable());
    }

    #[test]
    fn test_non_transient_errors() {
        assert!(!GatewayError::remote_with_status("forbidden", 401).is_retryable());
        assert!(!remote_with_code("23505", 409).is_retryable());
        assert!(!remote_with_code("PGRST116", 406).is_retryable());
        assert!(!GatewayError::missing_parameter("table").is_retryable());
        assert!(!GatewayError::Cancelled.is_retryable());
    }

    #[test]
    fn test_validation_classification() {
        assert!(GatewayError::unknown_operation("nope").is_validation());
        assert!(GatewayError::unsupported_operator("between").is_validation());
        assert!(!GatewayError::remote("x").is_validation());
    }

    #[test]
    fn test_details_carry_kind() {
        let err = GatewayError::missing_parameter("table");
        let details = err.details();
        assert_eq!(details["kind"], "MissingParameter");
        assert_eq!(details["parameter"], "table");
    }

    #[test]
    fn test_retries_exhausted_wraps_last_error() {
        let err = GatewayError::RetriesExhausted {
            attempts: 3,
            last: Box::new(GatewayError::remote_with_status("unavailable", 503)),
        };
        assert!(err.to_string().contains("unavailable"));
        let details = err.details();
        assert_eq!(details["attempts"], 3);
        assert_eq!(details["lastError"]["details"]["status"], 503);
    }

    #[test]
    fn test_error_suggestions() {
        assert!(GatewayError::unknown_operation("x").suggestion().is_some());
        assert!(GatewayError::internal("unknown").suggestion().is_none());
    }
}
