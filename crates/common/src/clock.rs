//! Timing utilities for export pacing.
//!
//! - `ExportClock`: monotonic elapsed time plus the wall-clock start
//! - `frame_interval`: tick length for a frame rate
//! - `DriftMeasurement`: lateness of a scheduled frame
//! - `RateController`: throttle for progress callbacks

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// Monotonic time since an export started, with its wall-clock start.
#[derive(Debug, Clone)]
pub struct ExportClock {
    epoch: Instant,
    started_at: DateTime<Utc>,
}

impl ExportClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn elapsed_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time the export started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Duration of one frame at `fps` (clamped to at least 1 fps).
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / fps.max(1) as u64)
}

/// A frame's scheduled offset against when it was actually delivered,
/// both measured from the same anchor.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    pub reference_ns: u64,
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Positive when the frame was late.
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Allows at most `target_hz` ticks per second.
#[derive(Debug)]
pub struct RateController {
    target_interval_ns: u64,
    last_tick_ns: Option<u64>,
}

impl RateController {
    pub fn new(target_hz: u32) -> Self {
        Self {
            target_interval_ns: 1_000_000_000 / target_hz.max(1) as u64,
            last_tick_ns: None,
        }
    }

    /// True (and records the tick) when a full interval has passed since
    /// the last accepted tick. The first call is always accepted.
    pub fn should_tick(&mut self, current_ns: u64) -> bool {
        match self.last_tick_ns {
            Some(last) if current_ns < last + self.target_interval_ns => false,
            _ => {
                self.last_tick_ns = Some(current_ns);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_elapsed() {
        let clock = ExportClock::start();
        assert!(clock.elapsed_ns() < 1_000_000_000);
        assert!(clock.started_at() <= Utc::now());
    }

    #[test]
    fn test_frame_interval() {
        assert_eq!(frame_interval(25), Duration::from_millis(40));
        assert_eq!(frame_interval(0), Duration::from_secs(1));
    }

    #[test]
    fn test_drift_measurement() {
        let drift = DriftMeasurement {
            reference_ns: 1_000_000_000,
            measured_ns: 1_050_000_000,
        };
        assert_eq!(drift.drift_ns(), 50_000_000);
        assert!((drift.drift_ms() - 50.0).abs() < 1e-9);
        assert!(drift.exceeds_threshold_ms(10.0));
        assert!(!drift.exceeds_threshold_ms(100.0));
    }

    #[test]
    fn test_rate_controller() {
        let mut ctrl = RateController::new(10);
        assert!(ctrl.should_tick(0));
        assert!(!ctrl.should_tick(50_000_000));
        assert!(ctrl.should_tick(100_000_000));
    }
}
