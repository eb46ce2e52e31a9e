//! Identifier validation for table, column and function names.
//!
//! Names end up in REST paths and query-string keys of the remote service, so
//! anything that could reshape the URL or smuggle SQL is rejected up front.

use crate::constants::MAX_IDENTIFIER_LENGTH;
use crate::error::GatewayError;
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that never belong in an identifier sent to the remote service.
static FORBIDDEN_CHARS: Lazy<Regex> = Lazy::new(|| {
    let pattern = r#"[\x00-\x1f\x7f'"`;?&#=/\\]"#;
    Regex::new(pattern).unwrap_or_else(|e| {
        panic!("Internal error: invalid regex pattern '{}': {}", pattern, e)
    })
});

/// Validate a single identifier part (no schema qualification).
///
/// # Examples
///
/// ```
/// use tabular_gateway::security::validate_identifier;
///
/// assert!(validate_identifier("users").is_ok());
/// assert!(validate_identifier("created_at").is_ok());
/// assert!(validate_identifier("users;drop").is_err());
/// ```
pub fn validate_identifier(identifier: &str) -> Result<(), GatewayError> {
    if identifier.trim().is_empty() {
        return Err(GatewayError::invalid_identifier("Identifier cannot be empty"));
    }

    if identifier.len() > MAX_IDENTIFIER_LENGTH {
        return Err(GatewayError::invalid_identifier(format!(
            "Identifier '{}' exceeds maximum length of {} characters",
            identifier, MAX_IDENTIFIER_LENGTH
        )));
    }

    for pattern in ["--", "/*", "*/"] {
        if identifier.contains(pattern) {
            return Err(GatewayError::invalid_identifier(format!(
                "Identifier '{}' contains forbidden character sequence: {}",
                identifier, pattern
            )));
        }
    }

    if let Some(m) = FORBIDDEN_CHARS.find(identifier) {
        return Err(GatewayError::invalid_identifier(format!(
            "Identifier '{}' contains forbidden character: {:?}",
            identifier,
            m.as_str()
        )));
    }

    Ok(())
}

/// Validate a table name, optionally schema-qualified (`schema.table`).
pub fn validate_table_name(table: &str) -> Result<(), GatewayError> {
    let (schema, name) = parse_qualified_name(table)?;
    if let Some(schema) = schema {
        validate_identifier(&schema)?;
    }
    validate_identifier(&name)
}

/// Parse a potentially schema-qualified identifier.
///
/// Returns (schema, name) tuple. Schema is None if not specified.
pub fn parse_qualified_name(identifier: &str) -> Result<(Option<String>, String), GatewayError> {
    if identifier.is_empty() {
        return Err(GatewayError::invalid_identifier("Identifier cannot be empty"));
    }

    if let Some((schema, name)) = identifier.split_once('.') {
        if schema.is_empty() || name.is_empty() {
            return Err(GatewayError::invalid_identifier(format!(
                "Malformed qualified name '{}'",
                identifier
            )));
        }
        return Ok((Some(schema.to_string()), name.to_string()));
    }

    Ok((None, identifier.to_string()))
}
