//! Uniform response envelope: `{content: [{type: "text", text}], isError?}`.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One content block of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Response produced exactly once per dispatched operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ResponseEnvelope {
    /// Success envelope wrapping `payload` as pretty-printed JSON text.
    pub fn success(payload: &Value) -> Self {
        Self {
            content: vec![Content::text(pretty(payload))],
            is_error: false,
        }
    }

    /// Error envelope with payload `{error, details}`.
    pub fn error(err: &GatewayError) -> Self {
        Self {
            content: vec![Content::text(pretty(&error_payload(err)))],
            is_error: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.is_error
    }

    /// Parse the JSON payload carried by the first content block.
    pub fn payload(&self) -> Option<Value> {
        self.content
            .first()
            .and_then(|c| serde_json::from_str(&c.text).ok())
    }
}

impl From<Result<Value, GatewayError>> for ResponseEnvelope {
    fn from(result: Result<Value, GatewayError>) -> Self {
        match result {
            Ok(payload) => Self::success(&payload),
            Err(err) => Self::error(&err),
        }
    }
}

/// `{error, details}` payload for a failure; also used for batch item slots.
pub fn error_payload(err: &GatewayError) -> Value {
    let mut details = err.details();
    if let (Some(hint), Value::Object(map)) = (err.suggestion(), &mut details) {
        map.insert("suggestion".to_string(), json!(hint));
    }
    json!({
        "error": err.to_string(),
        "details": details,
    })
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
