//! Per-tick playback state machine.
//!
//! The live strategy samples the source once per frame period and feeds
//! what it saw into [`PlaybackSynchronizer::tick`]. The synchronizer owns
//! no I/O: it decides what the tick means (pre-roll, record, hold, load
//! the next clip, finish) and which stall recovery to run, and the
//! caller carries that out against the source and recorder.

use dashview_event_model::ClipPosition;

use crate::session::{ExportSession, SessionState, StallPhase};
use crate::stall::StallAction;

/// Fixed parameters for one synchronized run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub start_secs: f64,
    pub end_secs: f64,
    pub trailing_margin_secs: f64,
    pub clip_ready_max_ticks: u32,
    /// Source seconds between consecutive output frames at the requested speed.
    pub step_secs: f64,
    /// Whether playback begins before `start_secs` and must warm up.
    pub preroll: bool,
}

/// What the caller observed from the source this tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickObservation {
    pub position: ClipPosition,
    /// Every present camera has a frame for the current position.
    pub all_ready: bool,
    /// Every present camera reached the end of its clip.
    pub all_ended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    ReachedEnd,
    SourcesEnded,
    /// The next clip group never loaded; the export stops where it is.
    ClipUnavailable,
}

/// Meaning of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickDecision {
    /// A new clip group is loading; draw placeholders, encode nothing.
    AwaitClip,
    /// Before the requested start; draw black, encode nothing.
    Preroll { absolute_secs: f64 },
    /// Source time did not move; nothing new to encode.
    Hold { absolute_secs: f64 },
    /// Composite and encode a frame at `absolute_secs`.
    Record {
        absolute_secs: f64,
        position: ClipPosition,
    },
    /// Every source ended and another clip group follows.
    LoadNextClip { clip: usize },
    Complete(CompletionReason),
}

/// A ladder action together with where a seek should land.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallResponse {
    pub action: StallAction,
    pub phase: StallPhase,
    /// Absolute seek target for corrective seeks and give-ups.
    pub seek_to: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    pub decision: TickDecision,
    pub stall: Option<StallResponse>,
}

impl TickOutcome {
    fn new(decision: TickDecision) -> Self {
        Self {
            decision,
            stall: None,
        }
    }

    fn with_stall(decision: TickDecision, stall: Option<StallResponse>) -> Self {
        Self { decision, stall }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preroll,
    Recording,
}

/// Tick-by-tick export driver state.
#[derive(Debug)]
pub struct PlaybackSynchronizer {
    settings: SyncSettings,
    phase: Phase,
    current_clip: Option<usize>,
    /// Ticks spent waiting for a freshly loaded clip, if waiting.
    awaiting_ticks: Option<u32>,
    /// Next clip being requested and how many ticks it has been requested.
    pending_load: Option<(usize, u32)>,
    last_absolute: Option<f64>,
    last_recorded: Option<f64>,
    ticks: u64,
}

impl PlaybackSynchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        let phase = if settings.preroll {
            Phase::Preroll
        } else {
            Phase::Recording
        };
        Self {
            settings,
            phase,
            current_clip: None,
            awaiting_ticks: None,
            pending_load: None,
            last_absolute: None,
            last_recorded: None,
            ticks: 0,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn is_recording(&self) -> bool {
        self.phase == Phase::Recording
    }

    pub fn last_recorded(&self) -> Option<f64> {
        self.last_recorded
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Advance the state machine by one tick.
    pub fn tick(&mut self, session: &mut ExportSession, obs: TickObservation) -> TickOutcome {
        self.ticks += 1;
        let clip = obs.position.index;

        if session.state() == SessionState::Idle {
            session.set_state(if self.phase == Phase::Preroll {
                SessionState::Prerolling
            } else {
                SessionState::Recording
            });
        }

        if self.current_clip.is_some_and(|c| c != clip) {
            tracing::debug!(clip, "Clip group changed; awaiting readiness");
            self.awaiting_ticks = Some(0);
        }
        self.current_clip = Some(clip);

        if let Some(waited) = self.awaiting_ticks.as_mut() {
            *waited += 1;
            if !obs.all_ready && *waited < self.settings.clip_ready_max_ticks {
                return TickOutcome::new(TickDecision::AwaitClip);
            }
            if !obs.all_ready {
                tracing::warn!(
                    clip,
                    ticks = *waited,
                    "Clip sources not ready in time; continuing"
                );
            }
            self.awaiting_ticks = None;
            self.last_absolute = None;
        }

        let absolute = session.timeline().forward(obs.position);

        if obs.all_ended {
            if session.timeline().is_last_clip(clip) {
                return self.complete(session, CompletionReason::SourcesEnded);
            }
            let next = clip + 1;
            let requested = match self.pending_load {
                Some((pending, ticks)) if pending == next => ticks + 1,
                _ => 1,
            };
            self.pending_load = Some((next, requested));
            if requested <= self.settings.clip_ready_max_ticks {
                return TickOutcome::new(TickDecision::LoadNextClip { clip: next });
            }
            if session.mark_degraded() {
                tracing::warn!(
                    clip = next,
                    ticks = requested,
                    "Next clip group never loaded; ending export early"
                );
            }
            return self.complete(session, CompletionReason::ClipUnavailable);
        }
        self.pending_load = None;

        if self.phase == Phase::Recording
            && absolute >= self.settings.end_secs + self.settings.trailing_margin_secs
        {
            return self.complete(session, CompletionReason::ReachedEnd);
        }

        let advanced = match self.last_absolute {
            None => true,
            Some(previous) => session.ladder(StallPhase::Preroll).is_advance(absolute - previous),
        };
        self.last_absolute = Some(absolute);

        if self.phase == Phase::Preroll {
            if absolute + 1e-9 < self.settings.start_secs {
                let action = session.observe_stall(StallPhase::Preroll, advanced);
                let stall = action.map(|action| self.preroll_response(session, action, absolute));
                return TickOutcome::with_stall(
                    TickDecision::Preroll {
                        absolute_secs: absolute,
                    },
                    stall,
                );
            }
            tracing::info!(absolute_secs = absolute, "Pre-roll complete; recording");
            self.enter_recording(session);
        }

        let action = session.observe_stall(StallPhase::Recording, advanced);
        let stall = action.map(|action| self.recording_response(session, action));

        let fresh = self.last_recorded.map_or(true, |last| absolute > last);
        if !advanced || !fresh {
            return TickOutcome::with_stall(
                TickDecision::Hold {
                    absolute_secs: absolute,
                },
                stall,
            );
        }

        self.last_recorded = Some(absolute);
        TickOutcome::with_stall(
            TickDecision::Record {
                absolute_secs: absolute,
                position: obs.position,
            },
            stall,
        )
    }

    fn enter_recording(&mut self, session: &mut ExportSession) {
        self.phase = Phase::Recording;
        session.reset_ladder(StallPhase::Preroll);
        session.set_state(SessionState::Recording);
    }

    fn complete(&mut self, session: &mut ExportSession, reason: CompletionReason) -> TickOutcome {
        tracing::info!(?reason, ticks = self.ticks, "Playback complete");
        session.set_state(SessionState::Completing);
        TickOutcome::new(TickDecision::Complete(reason))
    }

    fn preroll_response(
        &mut self,
        session: &mut ExportSession,
        action: StallAction,
        absolute: f64,
    ) -> StallResponse {
        let seek_to = match action {
            StallAction::ReduceSpeed { .. } => None,
            StallAction::CorrectiveSeek => Some(absolute.max(0.0)),
            StallAction::GiveUp => {
                self.warn_degraded(session, "pre-roll");
                self.enter_recording(session);
                self.last_absolute = None;
                Some(self.settings.start_secs)
            }
        };
        StallResponse {
            action,
            phase: StallPhase::Preroll,
            seek_to,
        }
    }

    fn recording_response(&mut self, session: &mut ExportSession, action: StallAction) -> StallResponse {
        let seek_to = match action {
            StallAction::ReduceSpeed { .. } => None,
            StallAction::CorrectiveSeek => {
                Some(self.last_recorded.unwrap_or(self.settings.start_secs))
            }
            StallAction::GiveUp => {
                self.warn_degraded(session, "recording");
                self.last_absolute = None;
                Some(
                    self.last_recorded
                        .map_or(self.settings.start_secs, |t| t + self.settings.step_secs),
                )
            }
        };
        StallResponse {
            action,
            phase: StallPhase::Recording,
            seek_to,
        }
    }

    fn warn_degraded(&self, session: &mut ExportSession, phase: &str) {
        if session.mark_degraded() {
            tracing::warn!(
                phase,
                "Source stalled past the give-up threshold; export continues degraded"
            );
        }
    }
}
