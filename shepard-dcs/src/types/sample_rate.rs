//! Sample rate type for reporting stream throughput.

use std::time::Duration;
use tokio::time::Instant;

/// Sample arrival rate (samples per unit time).
///
/// Internally stores the average interval between samples as a Duration,
/// which keeps the rate strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate(Duration);

impl SampleRate {
    /// Create a rate of N samples per second.
    ///
    /// # Panics
    /// Panics if `samples` is not positive.
    pub fn per_second(samples: f64) -> Self {
        assert!(samples > 0.0, "sample rate must be positive");
        Self(Duration::from_secs_f64(1.0 / samples))
    }

    /// Rate observed from `count` samples over `elapsed`.
    ///
    /// Returns None when nothing was counted or no time has passed.
    pub fn from_count(count: u64, elapsed: Duration) -> Option<Self> {
        if count == 0 || elapsed.is_zero() {
            return None;
        }
        Some(Self(elapsed.div_f64(count as f64)))
    }

    pub fn as_per_second(&self) -> f64 {
        1.0 / self.0.as_secs_f64()
    }

    /// Average interval between samples.
    pub fn as_interval(&self) -> Duration {
        self.0
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let per_sec = self.as_per_second();
        if per_sec >= 1.0 {
            write!(f, "~{:.0} samples/s", per_sec.round())
        } else {
            write!(f, "{:.3} samples/s", per_sec)
        }
    }
}

/// Counts samples since the first one arrived.
#[derive(Debug, Default)]
pub struct RateMeter {
    start: Option<Instant>,
    count: u64,
}

impl RateMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self) {
        self.start.get_or_insert_with(Instant::now);
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Average rate since the first recorded sample.
    pub fn rate(&self) -> Option<SampleRate> {
        SampleRate::from_count(self.count, self.start?.elapsed())
    }
}
