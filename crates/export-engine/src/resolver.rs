//! Clip-boundary resolution.
//!
//! Converts between absolute event time (continuous seconds from the
//! start of the event) and a [`ClipPosition`] (clip group index plus
//! intra-clip seconds). Durations are probed once per session; after that
//! every conversion is a pure function over the cached array.

use dashview_event_model::ClipPosition;

use crate::providers::SourceProvider;

/// Probed clip durations with their running totals.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipTimeline {
    durations: Vec<f64>,
    /// `cumulative[i]` is the absolute time at which clip `i` ends.
    cumulative: Vec<f64>,
}

impl ClipTimeline {
    /// Build from known durations. Non-finite or non-positive entries
    /// are replaced with `nominal_secs`.
    pub fn from_durations(durations: Vec<f64>, nominal_secs: f64) -> Self {
        let durations: Vec<f64> = durations
            .into_iter()
            .map(|d| if d.is_finite() && d > 0.0 { d } else { nominal_secs })
            .collect();
        let mut cumulative = Vec::with_capacity(durations.len());
        let mut total = 0.0;
        for d in &durations {
            total += d;
            cumulative.push(total);
        }
        Self {
            durations,
            cumulative,
        }
    }

    /// Probe every clip group's real duration.
    ///
    /// A failed probe falls back to `nominal_secs` for that clip rather
    /// than aborting.
    pub async fn probe(source: &mut dyn SourceProvider, nominal_secs: f64) -> Self {
        let count = source.clip_count();
        let mut durations = Vec::with_capacity(count);
        for clip in 0..count {
            match source.probe_duration(clip).await {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    tracing::debug!(clip, duration_secs = secs, "Probed clip duration");
                    durations.push(secs);
                }
                Ok(secs) => {
                    tracing::warn!(
                        clip,
                        reported = secs,
                        fallback = nominal_secs,
                        "Clip reported an unusable duration; using nominal length"
                    );
                    durations.push(nominal_secs);
                }
                Err(e) => {
                    tracing::warn!(
                        clip,
                        error = %e,
                        fallback = nominal_secs,
                        "Failed to probe clip duration; using nominal length"
                    );
                    durations.push(nominal_secs);
                }
            }
        }
        let timeline = Self::from_durations(durations, nominal_secs);
        tracing::info!(
            clips = timeline.clip_count(),
            total_secs = timeline.total_secs(),
            "Clip timeline resolved"
        );
        timeline
    }

    pub fn clip_count(&self) -> usize {
        self.durations.len()
    }

    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    pub fn duration(&self, clip: usize) -> Option<f64> {
        self.durations.get(clip).copied()
    }

    pub fn total_secs(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// Absolute time at which clip `clip` starts.
    pub fn clip_start(&self, clip: usize) -> f64 {
        if clip == 0 {
            return 0.0;
        }
        self.cumulative
            .get(clip - 1)
            .copied()
            .unwrap_or_else(|| self.total_secs())
    }

    /// Absolute times at which playback crosses into the next clip.
    pub fn clip_boundaries(&self) -> Vec<f64> {
        self.cumulative
            .iter()
            .take(self.cumulative.len().saturating_sub(1))
            .copied()
            .collect()
    }

    /// `(index, intra)` to absolute seconds.
    pub fn forward(&self, position: ClipPosition) -> f64 {
        self.clip_start(position.index) + position.intra_secs
    }

    /// Absolute seconds to `(index, intra)`.
    ///
    /// Picks the first clip whose end lies beyond `absolute_secs`. Times
    /// before zero clamp to the first clip's start; times at or past the
    /// total clamp to the end of the last clip.
    pub fn reverse(&self, absolute_secs: f64) -> ClipPosition {
        if self.durations.is_empty() {
            return ClipPosition::default();
        }
        if absolute_secs <= 0.0 || !absolute_secs.is_finite() {
            return ClipPosition::new(0, 0.0);
        }
        let index = self.cumulative.partition_point(|end| *end <= absolute_secs);
        if index >= self.durations.len() {
            let last = self.durations.len() - 1;
            return ClipPosition::new(last, self.durations[last]);
        }
        ClipPosition::new(index, absolute_secs - self.clip_start(index))
    }

    pub fn is_last_clip(&self, clip: usize) -> bool {
        clip + 1 >= self.durations.len()
    }
}
