//! # Tabular Gateway
//!
//! A command-dispatch core for table-oriented data operations against a remote
//! PostgREST-compatible (Supabase) data service.
//!
//! This crate provides:
//! - **Operations**: query, insert, update, delete, upsert, rpc, count, batch,
//!   schema introspection and a metrics snapshot
//! - **Filters**: a fixed operator set compiled into remote predicates
//! - **Caching**: in-memory read-result caching with a configurable TTL
//! - **Resilience**: bounded retries with linear backoff, deadlines and cancellation
//! - **Metrics**: process-wide success/failure counters and average response time
//!
//! ## Architecture
//!
//! A [`Gateway`] owns the cache, metrics and a [`DataAdapter`]. Each call to
//! [`Gateway::dispatch`] resolves an operation, validates its parameters,
//! executes it and returns exactly one [`ResponseEnvelope`]. The transport or
//! protocol layer on top is not part of this crate.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod resilience;
pub mod security;
pub mod server;
pub mod telemetry;
pub mod tools;

pub use adapter::{DataAdapter, RemoteError, RemoteRequest, RemoteResponse};
pub use config::Config;
pub use envelope::ResponseEnvelope;
pub use error::GatewayError;
pub use resilience::{CallContext, CancelHandle, RetryPolicy};
pub use server::Gateway;
pub use tools::Operation;
