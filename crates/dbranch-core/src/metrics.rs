//! Prometheus metrics helpers for the dBranch curator.
//!
//! # Usage
//!
//! ```rust,ignore
//! use dbranch_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     if let Some(handle) = init_metrics() {
//!         start_metrics_server(9090, handle).await.unwrap();
//!     }
//!
//!     metrics::counter!("gossip_messages_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`gossip_`, `ledger_`, `store_`, `index_`)
//! - Suffix: unit or type (`_total`, `_seconds`)
//! - Labels: only for small closed sets such as `list` or `outcome`

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the Prometheus recorder and register metric descriptions.
///
/// Returns `None` if a recorder is already installed for this process.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let handle = try_init_metrics()?;
    register_common_metrics();
    Some(handle)
}

/// Install the Prometheus recorder without registering descriptions.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Serve `/metrics` on the given port from a background task.
///
/// The listener is bound before returning so a port conflict surfaces as an
/// error to the caller.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

fn register_common_metrics() {
    describe_gauge!(
        "curator_running",
        "Whether the curator daemon is running (1=yes, 0=no)"
    );

    // =========================================================================
    // Gossip ingestion
    // =========================================================================

    describe_counter!(
        "gossip_messages_total",
        "Messages received on the gossip channel"
    );
    describe_counter!(
        "gossip_messages_malformed_total",
        "Gossip payloads that were not article announcements"
    );
    describe_counter!(
        "gossip_messages_denied_total",
        "Announcements from peers outside the allow-list"
    );
    describe_counter!(
        "gossip_articles_applied_total",
        "Announcements applied to the store (label: outcome)"
    );
    describe_counter!(
        "gossip_apply_errors_total",
        "Announcements that failed to apply"
    );
    describe_counter!(
        "gossip_reconnects_total",
        "Gossip subscription re-establishments"
    );
    describe_gauge!(
        "gossip_subscribed",
        "Whether the gossip subscription is live (1=yes, 0=no)"
    );

    // =========================================================================
    // Ledger sync
    // =========================================================================

    describe_counter!("ledger_cycles_total", "Ledger polling cycles run");
    describe_counter!("ledger_records_total", "Ledger records seen");
    describe_counter!(
        "ledger_records_invalid_total",
        "Ledger records rejected before reaching the store"
    );
    describe_counter!(
        "ledger_records_applied_total",
        "Ledger records applied to the store (label: outcome)"
    );
    describe_counter!(
        "ledger_errors_total",
        "Ledger query failures (retried next cycle)"
    );
    describe_gauge!(
        "ledger_cursor_block",
        "Last processed block per address (label: address)"
    );

    // =========================================================================
    // Store and index
    // =========================================================================

    describe_counter!(
        "store_operations_total",
        "Store mutations (labels: op, list)"
    );
    describe_counter!("index_rebuilds_total", "Index rebuilds written");
    describe_gauge!(
        "index_articles",
        "Articles in the last written index (label: list)"
    );
    describe_histogram!(
        "index_rebuild_duration_seconds",
        "Time spent rebuilding the index"
    );
}

// =============================================================================
// Metric Recording Helpers
// =============================================================================

/// Increment a counter.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}
