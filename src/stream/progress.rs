//! Wall-clock progress estimation.
//!
//! Time-free playlists download faster than real time, and ffmpeg's output is
//! not parsed, so these numbers are an approximation: elapsed time over program
//! length. They only ever grow and only the terminal report reaches 100.

use std::time::Duration;

/// Highest value reported while the process is still running.
pub const IN_FLIGHT_CEILING: f64 = 99.0;

pub const COMPLETE: f64 = 100.0;

/// `min(100, elapsed / total * 100)`. A zero-length total counts as done.
pub fn estimate_progress(elapsed: Duration, total: Duration) -> f64 {
    if total.is_zero() {
        return COMPLETE;
    }
    (elapsed.as_secs_f64() / total.as_secs_f64() * 100.0).min(COMPLETE)
}

/// Per-transfer estimator; keeps reports monotonic.
#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total: Duration,
    last: f64,
}

impl ProgressEstimator {
    pub fn new(total: Duration) -> Self {
        Self { total, last: 0.0 }
    }

    /// In-flight estimate, held at or below [`IN_FLIGHT_CEILING`].
    pub fn tick(&mut self, elapsed: Duration) -> f64 {
        let percent = estimate_progress(elapsed, self.total).min(IN_FLIGHT_CEILING);
        self.last = self.last.max(percent);
        self.last
    }

    /// Terminal report after a successful exit.
    pub fn complete(&mut self) -> f64 {
        self.last = COMPLETE;
        self.last
    }

    pub fn last(&self) -> f64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_way_through_thirty_minutes() {
        let percent = estimate_progress(Duration::from_secs(900), Duration::from_secs(1800));
        assert!((percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn estimate_is_capped() {
        assert_eq!(
            estimate_progress(Duration::from_secs(4000), Duration::from_secs(1800)),
            100.0
        );
        assert_eq!(estimate_progress(Duration::from_secs(1), Duration::ZERO), 100.0);
    }

    #[test]
    fn in_flight_reports_stay_below_complete() {
        let mut estimator = ProgressEstimator::new(Duration::from_secs(10));
        assert_eq!(estimator.tick(Duration::from_secs(5)), 50.0);
        assert_eq!(estimator.tick(Duration::from_secs(60)), IN_FLIGHT_CEILING);
        assert_eq!(estimator.complete(), 100.0);
    }

    #[test]
    fn reports_never_decrease() {
        let mut estimator = ProgressEstimator::new(Duration::from_secs(100));
        estimator.tick(Duration::from_secs(40));
        assert_eq!(estimator.tick(Duration::from_secs(10)), 40.0);
        assert_eq!(estimator.last(), 40.0);
    }
}
