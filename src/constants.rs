//! Centralized constants for the tabular gateway.
//!
//! This module contains all magic numbers and default values used throughout
//! the codebase, making them easy to find, understand, and modify.

use std::time::Duration;

// =============================================================================
// Cache Constants
// =============================================================================

/// Default cache TTL in milliseconds (5 minutes).
pub const DEFAULT_CACHE_TTL_MS: u64 = 300_000;

/// Default cache TTL as Duration.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(DEFAULT_CACHE_TTL_MS);

/// Default maximum cache entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1000;

// =============================================================================
// Retry Constants
// =============================================================================

/// Default number of attempts per remote call (first try included).
pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Default base delay as Duration.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS);

// =============================================================================
// Request Constants
// =============================================================================

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default HTTP request timeout as Duration.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);

/// Page size used when an offset is given without a limit.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Projection used when a query does not name its columns.
pub const DEFAULT_SELECT: &str = "*";

/// Schema inspected by `schema` when no table is named.
pub const DEFAULT_SCHEMA: &str = "public";

// =============================================================================
// Identifier Constants
// =============================================================================

/// Maximum identifier length accepted by PostgreSQL (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

// =============================================================================
// Logging Constants
// =============================================================================

/// Truncation length for parameters echoed into logs.
pub const LOG_PARAMS_TRUNCATE_LENGTH: usize = 200;
