//! Periodic latency summaries.
//!
//! The reporter owns the background task that ticks a [`LatencyTimer`]'s
//! moving averages and writes a summary line to the log on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::timer::{LatencyTimer, TimerSnapshot, TICK_INTERVAL};

/// Default summary interval.
pub const DEFAULT_LOG_STATS_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Smallest accepted summary interval.
pub const MIN_LOG_STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Largest accepted summary interval.
pub const MAX_LOG_STATS_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Returns `interval` if it lies within
/// [[`MIN_LOG_STATS_INTERVAL`], [`MAX_LOG_STATS_INTERVAL`]], otherwise the
/// default, logging a warning when reverting.
#[must_use]
pub fn normalize_interval(interval: Duration) -> Duration {
    if (MIN_LOG_STATS_INTERVAL..=MAX_LOG_STATS_INTERVAL).contains(&interval) {
        interval
    } else {
        warn!(
            requested_secs = interval.as_secs(),
            min_secs = MIN_LOG_STATS_INTERVAL.as_secs(),
            max_secs = MAX_LOG_STATS_INTERVAL.as_secs(),
            default_secs = DEFAULT_LOG_STATS_INTERVAL.as_secs(),
            "log-stats-interval outside accepted interval; reverting to default"
        );
        DEFAULT_LOG_STATS_INTERVAL
    }
}

/// Writes one summary line for `snapshot`.
pub fn log_snapshot(snapshot: &TimerSnapshot) {
    info!(
        event = "latency_summary",
        count = snapshot.count,
        mean_ms = snapshot.mean.as_millis() as u64,
        median_ms = snapshot.median.as_millis() as u64,
        p95_ms = snapshot.p95.as_millis() as u64,
        p99_ms = snapshot.p99.as_millis() as u64,
        rate_1m = format!("{:.2}", snapshot.rate_1m),
        rate_5m = format!("{:.2}", snapshot.rate_5m),
        rate_15m = format!("{:.2}", snapshot.rate_15m),
        "request latency summary"
    );
}

/// Spawns the background reporter.
///
/// The task runs until aborted through the returned handle.
pub fn spawn_reporter(timer: Arc<LatencyTimer>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(TICK_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticks.tick().await;

        let mut reports = tokio::time::interval(interval);
        reports.tick().await;

        loop {
            tokio::select! {
                _ = ticks.tick() => timer.tick(),
                _ = reports.tick() => log_snapshot(&timer.snapshot()),
            }
        }
    })
}
