//! Tabular gateway driver.
//!
//! Reads one JSON request per line from stdin, `{"operation": "...", "params": {...}}`,
//! and writes the response envelope for each as one JSON line on stdout.
//! Logs go to stderr.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tabular_gateway::{Gateway, GatewayError, ResponseEnvelope};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Request {
    operation: String,
    #[serde(default)]
    params: Value,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout carries responses)
    init_logging();

    let version = env!("CARGO_PKG_VERSION");
    eprintln!("Tabular Gateway v{version} starting...");

    std::panic::set_hook(Box::new(|info| {
        eprintln!("[PANIC] {}", info);
    }));

    let gateway = Gateway::from_env().context("failed to initialize gateway")?;
    eprintln!("Gateway initialized. Reading requests from stdin...");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<Request>(&line) {
            Ok(request) => gateway.dispatch(&request.operation, request.params).await,
            Err(e) => {
                warn!("Malformed request line: {}", e);
                ResponseEnvelope::error(&GatewayError::invalid_parameter("request", e.to_string()))
            }
        };

        let mut out = serde_json::to_string(&envelope)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    let metrics = gateway.metrics();
    info!(
        "Input closed: {} remote operations ({} failed), {} cache hits",
        metrics.total_queries, metrics.failed_queries, metrics.cache_hits
    );

    Ok(())
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,tabular_gateway=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
