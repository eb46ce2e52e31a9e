//! Operation dispatch.
//!
//! Every call goes through the same pipeline:
//!
//! 1. sweep stale cache entries
//! 2. resolve the operation name
//! 3. validate parameters and build a [`Plan`]
//! 4. serve cacheable reads from cache when possible
//! 5. run the remote call under the retry policy and the caller's [`CallContext`]
//! 6. record metrics, cache successful reads, wrap the outcome in a [`ResponseEnvelope`]
//!
//! Failures never escape: each call yields exactly one envelope.

use crate::adapter::{RemotePayload, RemoteRequest};
use crate::envelope::{error_payload, ResponseEnvelope};
use crate::error::GatewayError;
use crate::resilience::{execute_with_retry, CallContext};
use crate::server::Gateway;
use crate::telemetry::RequestContext;
use crate::tools::{parse_batch, plan, BatchInput, Operation, Plan};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

impl Gateway {
    /// Dispatch an operation with no deadline and no cancellation.
    pub async fn dispatch(&self, operation: &str, params: Value) -> ResponseEnvelope {
        self.dispatch_with_context(operation, params, &CallContext::unbounded())
            .await
    }

    /// Dispatch an operation under a deadline and/or cancellation signal.
    pub async fn dispatch_with_context(
        &self,
        operation: &str,
        params: Value,
        ctx: &CallContext,
    ) -> ResponseEnvelope {
        let request = RequestContext::new().with_operation(operation);
        let prefix = request.log_prefix();
        info!("{} Dispatching: {}", prefix, truncate_params(&params));

        let swept = self.cache.sweep().await;
        if swept > 0 {
            debug!("{} Swept {} stale cache entries", prefix, swept);
        }

        let result = match operation.parse::<Operation>() {
            Ok(Operation::Batch) => self.run_batch(params, ctx, &prefix).await,
            Ok(op) => self.run_operation(op, params, ctx, &prefix).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => info!("{} Completed in {:?}", prefix, request.elapsed()),
            Err(e) => warn!("{} Failed after {:?}: {}", prefix, request.elapsed(), e),
        }

        ResponseEnvelope::from(result)
    }

    /// Validate, plan and execute one non-batch operation.
    async fn run_operation(
        &self,
        op: Operation,
        params: Value,
        ctx: &CallContext,
        prefix: &str,
    ) -> Result<Value, GatewayError> {
        let plan = plan(op, params, &self.config)?;
        self.execute_plan(plan, ctx, prefix).await
    }

    async fn execute_plan(
        &self,
        plan: Plan,
        ctx: &CallContext,
        prefix: &str,
    ) -> Result<Value, GatewayError> {
        match plan {
            Plan::Read { key, request } => {
                if let Some(payload) = self.cache.get(&key).await {
                    debug!("{} Cache hit", prefix);
                    self.metrics.record_cache_hit();
                    return Ok(payload);
                }
                debug!("{} Cache miss", prefix);

                let started = Instant::now();
                let result = self.call_remote(&request, ctx, prefix).await;
                self.metrics.record(started, result.is_ok());

                let payload = result?.to_json();
                self.cache.set(key, payload.clone()).await;
                Ok(payload)
            }
            Plan::Write { request } => {
                let started = Instant::now();
                let result = self.call_remote(&request, ctx, prefix).await;
                self.metrics.record(started, result.is_ok());

                Ok(json!({ "success": true, "data": result?.data }))
            }
            Plan::Count { request } => {
                let started = Instant::now();
                let result = self.call_remote(&request, ctx, prefix).await;
                self.metrics.record(started, result.is_ok());

                Ok(json!({ "count": result?.count }))
            }
            Plan::Schema { tables, columns } => {
                let started = Instant::now();
                let result = async {
                    let tables = self.call_remote(&tables, ctx, prefix).await?;
                    let columns = self.call_remote(&columns, ctx, prefix).await?;
                    Ok::<_, GatewayError>(json!({
                        "tables": tables.data,
                        "columns": columns.data,
                    }))
                }
                .await;
                self.metrics.record(started, result.is_ok());
                result
            }
            Plan::Metrics => serde_json::to_value(self.metrics.snapshot()).map_err(|e| {
                GatewayError::internal(format!("Failed to serialize metrics: {}", e))
            }),
        }
    }

    /// Execute one remote request under the retry policy.
    async fn call_remote(
        &self,
        request: &RemoteRequest,
        ctx: &CallContext,
        prefix: &str,
    ) -> Result<RemotePayload, GatewayError> {
        debug!("{} Remote call: {}", prefix, request.describe());

        let outcome = execute_with_retry(&self.config.retry, ctx, || async move {
            self.adapter.execute(request).await.into_result()
        })
        .await;

        if outcome.attempts > 1 {
            info!(
                "{} Remote call finished after {} attempts in {:?}",
                prefix, outcome.attempts, outcome.total_duration
            );
        }
        outcome.into_result()
    }

    /// Run every batch item in order; items succeed or fail independently.
    async fn run_batch(
        &self,
        params: Value,
        ctx: &CallContext,
        prefix: &str,
    ) -> Result<Value, GatewayError> {
        let BatchInput { operations } = parse_batch(params)?;
        let total = operations.len();
        let mut results = Vec::with_capacity(total);
        let mut all_ok = true;

        for (index, item) in operations.iter().enumerate() {
            let op = item.operation.operation();
            let item_prefix = format!("{} [{}/{} {}]", prefix, index + 1, total, op);

            match self.run_operation(op, item.params(), ctx, &item_prefix).await {
                Ok(data) => results.push(json!({ "success": true, "data": data })),
                Err(e) => {
                    warn!("{} Batch item failed: {}", item_prefix, e);
                    all_ok = false;
                    results.push(json!({ "success": false, "error": error_payload(&e) }));
                }
            }
        }

        Ok(json!({ "success": all_ok, "results": results }))
    }
}

/// Render parameters for logging, cut to a bounded length.
fn truncate_params(params: &Value) -> String {
    let text = params.to_string();
    let limit = crate::constants::LOG_PARAMS_TRUNCATE_LENGTH;
    match text.char_indices().nth(limit) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text,
    }
}
