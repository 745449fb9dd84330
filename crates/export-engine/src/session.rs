//! Per-export session state.
//!
//! An [`ExportSession`] is created when an export starts, owned by the
//! running strategy, and dropped when the export ends. Nothing in it
//! outlives the export.

use chrono::{DateTime, Utc};

use dashview_common::clock::ExportClock;
use dashview_common::config::StallLadderConfig;

use crate::resolver::ClipTimeline;
use crate::stall::{StallAction, StallLadder};

/// Lifecycle of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Prerolling,
    Recording,
    Stalled,
    Completing,
    Cancelled,
    Error,
}

/// Which stall counter a tick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallPhase {
    Preroll,
    Recording,
}

/// Mutable state of one export.
#[derive(Debug)]
pub struct ExportSession {
    state: SessionState,
    timeline: ClipTimeline,
    original_speed: f64,
    current_speed: f64,
    preroll_ladder: StallLadder,
    recording_ladder: StallLadder,
    clock: ExportClock,
    chunks: Vec<Vec<u8>>,
    degraded: bool,
    frames_encoded: u64,
}

impl ExportSession {
    pub fn new(timeline: ClipTimeline, speed: f64, ladder: StallLadderConfig) -> Self {
        Self {
            state: SessionState::Idle,
            timeline,
            original_speed: speed,
            current_speed: speed,
            preroll_ladder: StallLadder::new(ladder.clone()),
            recording_ladder: StallLadder::new(ladder),
            clock: ExportClock::start(),
            chunks: Vec::new(),
            degraded: false,
            frames_encoded: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "Export session state change");
            self.state = state;
        }
    }

    pub fn timeline(&self) -> &ClipTimeline {
        &self.timeline
    }

    pub fn original_speed(&self) -> f64 {
        self.original_speed
    }

    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn speed_reduced(&self) -> bool {
        self.current_speed < self.original_speed
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.clock.started_at()
    }

    pub fn clock(&self) -> &ExportClock {
        &self.clock
    }

    /// Lower the export speed. Requests that would raise it are ignored.
    pub fn reduce_speed(&mut self, to: f64) -> bool {
        if to < self.current_speed {
            tracing::info!(
                from = self.current_speed,
                to,
                "Reducing export speed to recover from stalled source"
            );
            self.current_speed = to;
            true
        } else {
            false
        }
    }

    pub fn ladder(&self, phase: StallPhase) -> &StallLadder {
        match phase {
            StallPhase::Preroll => &self.preroll_ladder,
            StallPhase::Recording => &self.recording_ladder,
        }
    }

    /// Feed one tick into the phase's stall ladder and apply any speed
    /// change it requests.
    pub fn observe_stall(&mut self, phase: StallPhase, advanced: bool) -> Option<StallAction> {
        let speed = self.current_speed;
        let ladder = match phase {
            StallPhase::Preroll => &mut self.preroll_ladder,
            StallPhase::Recording => &mut self.recording_ladder,
        };
        let action = ladder.observe(advanced, speed);
        if let Some(StallAction::ReduceSpeed { to, .. }) = action {
            self.reduce_speed(to);
        }
        if phase == StallPhase::Recording {
            if advanced {
                if self.state == SessionState::Stalled {
                    self.set_state(SessionState::Recording);
                }
            } else if self.state == SessionState::Recording {
                self.set_state(SessionState::Stalled);
            }
        }
        action
    }

    pub fn reset_ladder(&mut self, phase: StallPhase) {
        match phase {
            StallPhase::Preroll => self.preroll_ladder.reset(),
            StallPhase::Recording => self.recording_ladder.reset(),
        }
    }

    /// Mark the export as degraded. Returns `true` only the first time,
    /// so the caller can warn exactly once.
    pub fn mark_degraded(&mut self) -> bool {
        !std::mem::replace(&mut self.degraded, true)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn record_frame(&mut self) {
        self.frames_encoded += 1;
    }

    pub fn frames_encoded(&self) -> u64 {
        self.frames_encoded
    }

    /// Append encoder output. Chunks stay private until [`Self::take_output`].
    pub fn append_chunks(&mut self, chunks: impl IntoIterator<Item = Vec<u8>>) {
        self.chunks.extend(chunks.into_iter().filter(|c| !c.is_empty()));
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Assemble the final binary. Called only after the encoder finalized.
    pub fn take_output(&mut self) -> Vec<u8> {
        let chunks = std::mem::take(&mut self.chunks);
        let mut output = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in chunks {
            output.extend_from_slice(&chunk);
        }
        output
    }

    /// Drop every pending chunk (cancellation and fatal errors).
    pub fn discard_output(&mut self) {
        self.chunks.clear();
        self.chunks.shrink_to_fit();
    }
}
