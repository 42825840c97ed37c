//! Prometheus metrics for bouncer.
//!
//! Metrics are recorded through the `metrics` facade and are no-ops until
//! [`init_metrics`] installs the Prometheus recorder.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `bouncer_requests_total` | Counter | `path`, `status` | HTTP requests served |
//! | `bouncer_request_duration_seconds` | Histogram | `path` | HTTP request latency |
//! | `bouncer_cache_lookups_total` | Counter | `kind`, `result` | Decision cache lookups |
//! | `bouncer_identity_requests_total` | Counter | `operation`, `outcome` | Identity-service calls |

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Metrics configuration.
#[derive(Debug, Clone, Default)]
pub struct MetricsConfig {
    /// Address to expose the Prometheus endpoint on. `None` disables export.
    pub addr: Option<String>,
}

/// Installs the Prometheus recorder and starts the exporter serving the
/// text format on `addr`.
///
/// Does nothing when no address is configured. Inside a Tokio runtime the
/// exporter runs as a task on it; otherwise it gets a background thread.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable address and
/// `TelemetryError::MetricsInit` if the recorder cannot be installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    let Some(addr) = config.addr.as_deref() else {
        return Ok(());
    };

    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    register_metric_descriptions();

    Ok(())
}

fn register_metric_descriptions() {
    describe_counter!("bouncer_requests_total", "Total number of HTTP requests served");
    describe_histogram!(
        "bouncer_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "bouncer_cache_lookups_total",
        "Decision cache lookups by credential kind and result"
    );
    describe_counter!(
        "bouncer_identity_requests_total",
        "Identity-service calls by operation and outcome"
    );
}

/// Records a completed HTTP request.
pub fn record_request(path: &str, status_code: u16, duration: Duration) {
    counter!(
        "bouncer_requests_total",
        "path" => path.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);

    histogram!(
        "bouncer_request_duration_seconds",
        "path" => path.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a decision cache lookup.
///
/// `kind` is `token` or `credentials`; `result` is one of `hit`, `miss`,
/// `stale_password` or `shape_mismatch`.
pub fn record_cache_lookup(kind: &'static str, result: &'static str) {
    counter!(
        "bouncer_cache_lookups_total",
        "kind" => kind,
        "result" => result
    )
    .increment(1);
}

/// Records an identity-service call outcome.
pub fn record_identity_request(operation: &'static str, outcome: &'static str) {
    counter!(
        "bouncer_identity_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);
}
