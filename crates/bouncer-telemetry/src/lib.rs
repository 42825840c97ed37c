//! Observability for the bouncer authentication webhook.
//!
//! - **Logging**: structured `tracing` output, JSON by default
//! - **Metrics**: Prometheus-format counters and histograms via the `metrics` crate
//! - **Latency summaries**: a request timer whose count, mean, percentiles and
//!   moving-average rates are written to the log on a fixed interval
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bouncer_telemetry::{init_telemetry, LatencyTimer, LogConfig, MetricsConfig, spawn_reporter};
//!
//! init_telemetry(&LogConfig::default(), &MetricsConfig::default())?;
//!
//! let timer = Arc::new(LatencyTimer::new());
//! let _reporter = spawn_reporter(timer.clone(), std::time::Duration::from_secs(600));
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;
pub mod reporter;
pub mod timer;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{init_metrics, MetricsConfig};
pub use reporter::{
    normalize_interval, spawn_reporter, DEFAULT_LOG_STATS_INTERVAL, MAX_LOG_STATS_INTERVAL,
    MIN_LOG_STATS_INTERVAL,
};
pub use timer::{LatencyTimer, TimerSnapshot};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging, then metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if either subsystem fails to initialize.
pub fn init_telemetry(logging: &LogConfig, metrics: &MetricsConfig) -> TelemetryResult<()> {
    init_logging(logging)?;
    init_metrics(metrics)?;
    Ok(())
}
