use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use super::types::{EngineProgress, ProgressSnapshot};

/// Percentage band reserved for the transcode itself.
///
/// Below `lower` is file loading, above `upper` is finalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for ProgressBand {
    fn default() -> Self {
        Self {
            lower: 20.0,
            upper: 95.0,
        }
    }
}

impl ProgressBand {
    /// Maps a completion fraction into the band, clamping overshoot.
    pub fn rescale(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.lower + fraction * (self.upper - self.lower)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimatorConfig {
    pub band: ProgressBand,
    /// Minimum wall-clock gap between two emitted snapshots.
    pub throttle: Duration,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            band: ProgressBand::default(),
            throttle: Duration::from_millis(100),
        }
    }
}

/// Turns raw engine progress into throttled snapshots for one conversion.
#[derive(Debug)]
pub struct ProgressEstimator {
    config: EstimatorConfig,
    total_duration_secs: Option<f64>,
    started: Instant,
    started_at: DateTime<Utc>,
    last_emit: Instant,
    last_percentage: f64,
}

impl ProgressEstimator {
    pub fn new(config: EstimatorConfig, total_duration_secs: Option<f64>) -> Self {
        Self::starting_at(config, total_duration_secs, Instant::now())
    }

    pub fn starting_at(
        config: EstimatorConfig,
        total_duration_secs: Option<f64>,
        started: Instant,
    ) -> Self {
        Self {
            config,
            total_duration_secs: total_duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            started,
            started_at: Utc::now(),
            last_emit: started,
            last_percentage: 0.0,
        }
    }

    pub fn band(&self) -> ProgressBand {
        self.config.band
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Unthrottled snapshot for a phase boundary (file loaded, finalizing, ...).
    pub fn mark(&mut self, percentage: f64, step: &str) -> ProgressSnapshot {
        self.last_percentage = self.last_percentage.max(percentage);
        ProgressSnapshot::new(self.last_percentage, step, self.started_at)
    }

    pub fn observe(&mut self, event: EngineProgress) -> Option<ProgressSnapshot> {
        self.observe_at(event, Instant::now())
    }

    /// Feeds one raw event observed at `now`.
    ///
    /// Returns `None` while the throttle window since the last emission is
    /// still open; such events are dropped.
    pub fn observe_at(&mut self, event: EngineProgress, now: Instant) -> Option<ProgressSnapshot> {
        if now.saturating_duration_since(self.last_emit) < self.config.throttle {
            return None;
        }
        self.last_emit = now;

        let percentage = self
            .config
            .band
            .rescale(event.fraction)
            .max(self.last_percentage);
        self.last_percentage = percentage;

        let processed_secs = event.processed_us.max(0) as f64 / 1_000_000.0;
        let elapsed_secs = now.saturating_duration_since(self.started).as_secs_f64();
        let eta_ms = estimate_remaining_ms(self.total_duration_secs, processed_secs, elapsed_secs);

        let step = match self.total_duration_secs {
            Some(total) => format!(
                "Converting... {}s / {}s",
                processed_secs.round(),
                total.round()
            ),
            None => format!("Converting... {}s", processed_secs.round()),
        };

        Some(ProgressSnapshot::new(percentage, step, self.started_at).with_eta(eta_ms))
    }
}

/// `remaining_media / (processed_media / elapsed_wall)`, in milliseconds.
///
/// `None` when the total is unknown or no speed can be measured yet.
pub fn estimate_remaining_ms(
    total_secs: Option<f64>,
    processed_secs: f64,
    elapsed_secs: f64,
) -> Option<u64> {
    let total = total_secs.filter(|t| t.is_finite() && *t > 0.0)?;
    if elapsed_secs <= 0.0 || processed_secs <= 0.0 {
        return None;
    }
    let speed = processed_secs / elapsed_secs;
    let remaining = (total - processed_secs).max(0.0);
    Some((remaining / speed * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(fraction: f64, processed_secs: f64) -> EngineProgress {
        EngineProgress {
            fraction,
            processed_us: (processed_secs * 1_000_000.0) as i64,
        }
    }

    #[test]
    fn test_band_rescale() {
        let band = ProgressBand::default();
        assert_eq!(band.rescale(0.0), 20.0);
        assert_eq!(band.rescale(1.0), 95.0);
        assert_eq!(band.rescale(0.5), 57.5);
        assert_eq!(band.rescale(1.7), 95.0);
        assert_eq!(band.rescale(-0.2), 20.0);
        assert_eq!(band.rescale(f64::NAN), 20.0);
    }

    #[test]
    fn test_events_inside_window_are_dropped() {
        let start = Instant::now();
        let mut estimator = ProgressEstimator::starting_at(EstimatorConfig::default(), Some(12.0), start);

        let first = estimator.observe_at(event(0.10, 1.2), start + Duration::from_millis(95));
        let second = estimator.observe_at(event(0.11, 1.3), start + Duration::from_millis(105));

        assert!(first.is_none());
        let snapshot = second.expect("later event should be emitted");
        assert!((snapshot.percentage - ProgressBand::default().rescale(0.11)).abs() < 1e-9);
    }

    #[test]
    fn test_one_snapshot_per_window() {
        let start = Instant::now();
        let mut estimator = ProgressEstimator::starting_at(EstimatorConfig::default(), None, start);

        let emitted: Vec<_> = (0..50)
            .filter_map(|i| {
                estimator.observe_at(
                    event(i as f64 / 50.0, i as f64),
                    start + Duration::from_millis(100 + i * 10),
                )
            })
            .collect();

        // 100ms..590ms in 10ms steps spans five 100ms windows.
        assert_eq!(emitted.len(), 5);
    }

    #[test]
    fn test_percentage_never_decreases() {
        let start = Instant::now();
        let mut estimator = ProgressEstimator::starting_at(EstimatorConfig::default(), None, start);

        let a = estimator
            .observe_at(event(0.6, 6.0), start + Duration::from_millis(200))
            .unwrap();
        let b = estimator
            .observe_at(event(0.4, 4.0), start + Duration::from_millis(400))
            .unwrap();
        assert!(b.percentage >= a.percentage);
    }

    #[test]
    fn test_eta_from_processing_speed() {
        let start = Instant::now();
        let mut estimator = ProgressEstimator::starting_at(EstimatorConfig::default(), Some(12.0), start);

        // 3s of media in 1s of wall time: 9s remaining at 3x is 3000ms.
        let snapshot = estimator
            .observe_at(event(0.25, 3.0), start + Duration::from_secs(1))
            .unwrap();
        assert_eq!(snapshot.eta_ms, Some(3000));
        assert_eq!(snapshot.step, "Converting... 3s / 12s");
    }

    #[test]
    fn test_eta_omitted_without_duration() {
        let start = Instant::now();
        let mut estimator = ProgressEstimator::starting_at(EstimatorConfig::default(), None, start);

        let snapshot = estimator
            .observe_at(event(0.25, 3.0), start + Duration::from_secs(1))
            .unwrap();
        assert_eq!(snapshot.eta_ms, None);
        assert_eq!(snapshot.step, "Converting... 3s");
    }

    #[test]
    fn test_estimate_remaining_edge_cases() {
        assert_eq!(estimate_remaining_ms(None, 1.0, 1.0), None);
        assert_eq!(estimate_remaining_ms(Some(0.0), 1.0, 1.0), None);
        assert_eq!(estimate_remaining_ms(Some(10.0), 1.0, 0.0), None);
        assert_eq!(estimate_remaining_ms(Some(10.0), 0.0, 1.0), None);
        // Processed past the announced total.
        assert_eq!(estimate_remaining_ms(Some(10.0), 11.0, 1.0), Some(0));
    }

    #[test]
    fn test_marks_are_unthrottled_and_monotonic() {
        let mut estimator = ProgressEstimator::new(EstimatorConfig::default(), None);
        let loading = estimator.mark(0.0, "loading");
        let converting = estimator.mark(20.0, "converting");
        let back = estimator.mark(5.0, "ignored");

        assert_eq!(loading.percentage, 0.0);
        assert_eq!(converting.percentage, 20.0);
        assert_eq!(back.percentage, 20.0);
        assert_eq!(loading.started_at, converting.started_at);
    }
}
