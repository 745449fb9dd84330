//! Throttled progress reporting.

use serde::Serialize;

use dashview_common::clock::{ExportClock, RateController};

/// Stage of a running export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportPhase {
    Preparing,
    Prerolling,
    Recording,
    /// Buffered phase 1: compositing snapshots.
    Rendering,
    /// Buffered phase 2: replaying snapshots into the encoder.
    Encoding,
    Finalizing,
}

/// One progress report handed to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportProgress {
    /// 0.0 to 100.0.
    pub percent: f64,
    /// Source seconds covered so far.
    pub elapsed_export_secs: f64,
    /// Source seconds in the requested range.
    pub total_export_secs: f64,
    /// Absolute event time where the range starts.
    pub start_offset_secs: f64,
    pub phase: ExportPhase,
}

pub type ProgressCallback = Box<dyn Fn(ExportProgress) + Send + Sync>;

/// Rate-limits progress callbacks. The final 100% report always goes out.
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    limiter: RateController,
    clock: ExportClock,
    total_secs: f64,
    start_offset_secs: f64,
    finished: bool,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .field("total_secs", &self.total_secs)
            .finish()
    }
}

impl ProgressReporter {
    pub fn new(callback: Option<ProgressCallback>, hz: u32, start_offset_secs: f64, total_secs: f64) -> Self {
        Self {
            callback,
            limiter: RateController::new(hz),
            clock: ExportClock::start(),
            total_secs,
            start_offset_secs,
            finished: false,
        }
    }

    pub fn total_secs(&self) -> f64 {
        self.total_secs
    }

    /// Report a completion fraction in `[0, 1]` for `phase`.
    pub fn report(&mut self, phase: ExportPhase, fraction: f64) {
        if self.finished || self.callback.is_none() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction < 1.0 && !self.limiter.should_tick(self.clock.elapsed_ns()) {
            return;
        }
        if fraction >= 1.0 {
            self.finished = true;
        }
        self.emit(phase, fraction);
    }

    /// Report progress through the source range at `absolute_secs`.
    pub fn report_position(&mut self, phase: ExportPhase, absolute_secs: f64) {
        let covered = (absolute_secs - self.start_offset_secs).max(0.0);
        let fraction = if self.total_secs > 0.0 {
            covered / self.total_secs
        } else {
            0.0
        };
        // Reaching the range end by position is not completion; finish() is.
        self.report(phase, fraction.min(0.999));
    }

    /// Deliver the final 100% report.
    pub fn finish(&mut self) {
        self.report(ExportPhase::Finalizing, 1.0);
    }

    fn emit(&self, phase: ExportPhase, fraction: f64) {
        if let Some(callback) = &self.callback {
            callback(ExportProgress {
                percent: fraction * 100.0,
                elapsed_export_secs: fraction * self.total_secs,
                total_export_secs: self.total_secs,
                start_offset_secs: self.start_offset_secs,
                phase,
            });
        }
    }
}

/// Maps a phase-local fraction onto an overall band, e.g. buffered
/// rendering onto `[0, 0.5]` and encoding onto `[0.5, 1]`.
pub fn banded(fraction: f64, band_start: f64, band_end: f64) -> f64 {
    band_start + fraction.clamp(0.0, 1.0) * (band_end - band_start)
}
