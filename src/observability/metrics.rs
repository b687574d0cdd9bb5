//! # Metrics Collection
//!
//! Prometheus metrics for the gateway, recorded through the [`metrics`]
//! facade. [`MetricsRecorder`] keeps metric names and label shapes in one
//! place so handlers never hand-roll them.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::config::ObservabilityConfig;
use crate::errors::{GatewayError, Result};

/// Install the Prometheus recorder and return the scrape handle.
///
/// Returns `None` when metrics are disabled; recording through the facade is
/// then a no-op.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enable_metrics {
        info!("Metrics collection disabled");
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| GatewayError::config(format!("failed to install metrics recorder: {}", e)))?;

    describe_histogram!(
        "mcp_request_duration_seconds",
        Unit::Seconds,
        "JSON-RPC request duration keyed by method and endpoint"
    );
    describe_counter!("mcp_requests_total", "JSON-RPC requests by method and outcome");
    describe_counter!("tool_calls_total", "Tool executions by kind and status class");
    describe_histogram!(
        "tool_call_duration_seconds",
        Unit::Seconds,
        "Tool execution duration by kind"
    );
    describe_counter!("auth_failures_total", "Authentication failures by route kind");
    describe_counter!("toolset_snapshot_cache_hits_total", "Snapshot cache hits");
    describe_counter!("toolset_snapshot_cache_misses_total", "Snapshot cache misses");
    describe_counter!(
        "tool_calls_rejected_over_limit_total",
        "Tool calls rejected by the free-tier usage guard"
    );

    info!("Prometheus metrics recorder installed");
    Ok(Some(handle))
}

/// Metrics recorder facade for the gateway.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    pub fn new() -> Self {
        Self
    }

    /// Record one JSON-RPC request, keyed `(method, endpoint)`.
    pub fn record_rpc_request(&self, method: &str, endpoint: &str, duration: f64, is_error: bool) {
        let labels = [("method", method.to_string()), ("endpoint", endpoint.to_string())];
        histogram!("mcp_request_duration_seconds", &labels).record(duration);

        let outcome = if is_error { "error" } else { "ok" };
        let outcome_labels =
            [("method", method.to_string()), ("outcome", outcome.to_string())];
        counter!("mcp_requests_total", &outcome_labels).increment(1);
    }

    /// Record one tool execution outcome.
    pub fn record_tool_call(&self, kind: &str, status_code: u16, duration: f64) {
        let status_class = format!("{}xx", status_code / 100);
        let labels = [("kind", kind.to_string()), ("status", status_class)];
        counter!("tool_calls_total", &labels).increment(1);

        let duration_labels = [("kind", kind.to_string())];
        histogram!("tool_call_duration_seconds", &duration_labels).record(duration);
    }

    /// Record an authentication failure.
    pub fn record_auth_failure(&self, route: &str) {
        let labels = [("route", route.to_string())];
        counter!("auth_failures_total", &labels).increment(1);
    }
}
