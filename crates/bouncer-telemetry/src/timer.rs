//! Request latency timer.
//!
//! [`LatencyTimer`] keeps a count of observed requests, a sliding window of
//! the most recent durations for mean and percentile estimates, and three
//! exponentially-weighted moving averages of the request rate (1, 5 and 15
//! minute windows). The rate averages advance on [`LatencyTimer::tick`],
//! which the reporter calls every [`TICK_INTERVAL`].

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;

/// Interval at which the moving averages must be ticked.
pub const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Number of recent samples kept for mean and percentile estimates.
pub const SAMPLE_SIZE: usize = 1028;

/// Exponentially-weighted moving average of an event rate.
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    rate: f64,
    uncounted: u64,
    initialized: bool,
}

impl Ewma {
    fn with_minutes(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self {
            alpha,
            rate: 0.0,
            uncounted: 0,
            initialized: false,
        }
    }

    fn update(&mut self, n: u64) {
        self.uncounted += n;
    }

    fn tick(&mut self) {
        let instant_rate = self.uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        self.uncounted = 0;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    /// Events per second.
    fn rate(&self) -> f64 {
        self.rate
    }
}

#[derive(Debug)]
struct TimerState {
    count: u64,
    window: VecDeque<Duration>,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

/// Point-in-time view of a [`LatencyTimer`].
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSnapshot {
    /// Total number of observations since the timer was created.
    pub count: u64,
    /// Mean of the sampled durations.
    pub mean: Duration,
    /// 50th percentile.
    pub median: Duration,
    /// 95th percentile.
    pub p95: Duration,
    /// 99th percentile.
    pub p99: Duration,
    /// One-minute moving average rate, per second.
    pub rate_1m: f64,
    /// Five-minute moving average rate, per second.
    pub rate_5m: f64,
    /// Fifteen-minute moving average rate, per second.
    pub rate_15m: f64,
}

/// Thread-safe latency timer shared by all request handlers.
#[derive(Debug)]
pub struct LatencyTimer {
    state: Mutex<TimerState>,
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyTimer {
    /// Creates an empty timer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TimerState {
                count: 0,
                window: VecDeque::with_capacity(SAMPLE_SIZE),
                m1: Ewma::with_minutes(1.0),
                m5: Ewma::with_minutes(5.0),
                m15: Ewma::with_minutes(15.0),
            }),
        }
    }

    /// Records one observed duration.
    pub fn update(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.count += 1;
        if state.window.len() == SAMPLE_SIZE {
            state.window.pop_front();
        }
        state.window.push_back(duration);
        state.m1.update(1);
        state.m5.update(1);
        state.m15.update(1);
    }

    /// Advances the moving averages by one [`TICK_INTERVAL`].
    pub fn tick(&self) {
        let mut state = self.state.lock();
        state.m1.tick();
        state.m5.tick();
        state.m15.tick();
    }

    /// Takes a snapshot of the current statistics.
    #[must_use]
    pub fn snapshot(&self) -> TimerSnapshot {
        let (count, mut samples, rate_1m, rate_5m, rate_15m) = {
            let state = self.state.lock();
            (
                state.count,
                state.window.iter().copied().collect::<Vec<_>>(),
                state.m1.rate(),
                state.m5.rate(),
                state.m15.rate(),
            )
        };
        samples.sort_unstable();

        let mean = if samples.is_empty() {
            Duration::ZERO
        } else {
            let total: Duration = samples.iter().sum();
            total / u32::try_from(samples.len()).unwrap_or(u32::MAX)
        };

        TimerSnapshot {
            count,
            mean,
            median: percentile(&samples, 0.50),
            p95: percentile(&samples, 0.95),
            p99: percentile(&samples, 0.99),
            rate_1m,
            rate_5m,
            rate_15m,
        }
    }
}

/// Linear-interpolated percentile over sorted samples.
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    match sorted.len() {
        0 => Duration::ZERO,
        1 => sorted[0],
        n => {
            let pos = p * (n as f64 + 1.0);
            if pos < 1.0 {
                sorted[0]
            } else if pos >= n as f64 {
                sorted[n - 1]
            } else {
                let lower = sorted[pos as usize - 1];
                let upper = sorted[pos as usize];
                lower + (upper - lower).mul_f64(pos - pos.floor())
            }
        }
    }
}
