//! Stall ladder: staged recovery when source time stops advancing.
//!
//! Each stalled tick climbs the ladder; any tick in which time advances
//! ends the episode and resets the counters (but never restores speed).

use std::time::Duration;

use dashview_common::config::StallLadderConfig;

/// Recovery step requested by the ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StallAction {
    /// Lower playback speed, optionally pausing around the change.
    ReduceSpeed { to: f64, pause: Option<Duration> },
    /// Re-seek toward the target time to unstick the decoder.
    CorrectiveSeek,
    /// Stop waiting and continue degraded.
    GiveUp,
}

/// Consecutive-stall counter with tiered responses.
#[derive(Debug, Clone)]
pub struct StallLadder {
    config: StallLadderConfig,
    stalled_ticks: u32,
    ticks_since_step: u32,
    seek_issued: bool,
}

impl StallLadder {
    pub fn new(config: StallLadderConfig) -> Self {
        Self {
            config,
            stalled_ticks: 0,
            ticks_since_step: 0,
            seek_issued: false,
        }
    }

    /// Consecutive stalled ticks in the current episode.
    pub fn stalled_ticks(&self) -> u32 {
        self.stalled_ticks
    }

    /// Whether `delta_secs` of absolute-time movement counts as progress.
    pub fn is_advance(&self, delta_secs: f64) -> bool {
        delta_secs > self.config.epsilon_secs
    }

    /// End the current episode.
    pub fn reset(&mut self) {
        self.stalled_ticks = 0;
        self.ticks_since_step = 0;
        self.seek_issued = false;
    }

    /// Record one tick. Returns the action to apply, if any.
    ///
    /// Speed reductions happen every `speed_step_ticks` stalled ticks while
    /// `current_speed` is above the floor: first to the intermediate speed
    /// (with a brief pause), then to the floor. At floor speed a single
    /// corrective seek fires at `seek_ticks` and the episode is abandoned
    /// at `give_up_ticks`.
    pub fn observe(&mut self, advanced: bool, current_speed: f64) -> Option<StallAction> {
        if advanced {
            self.reset();
            return None;
        }

        self.stalled_ticks += 1;
        self.ticks_since_step += 1;

        if current_speed > self.config.floor_speed {
            if self.ticks_since_step < self.config.speed_step_ticks {
                return None;
            }
            self.ticks_since_step = 0;
            return Some(if current_speed > self.config.intermediate_speed {
                StallAction::ReduceSpeed {
                    to: self.config.intermediate_speed,
                    pause: Some(Duration::from_millis(self.config.drop_pause_ms)),
                }
            } else {
                StallAction::ReduceSpeed {
                    to: self.config.floor_speed,
                    pause: None,
                }
            });
        }

        if self.stalled_ticks >= self.config.give_up_ticks {
            self.reset();
            return Some(StallAction::GiveUp);
        }
        if self.stalled_ticks >= self.config.seek_ticks && !self.seek_issued {
            self.seek_issued = true;
            return Some(StallAction::CorrectiveSeek);
        }
        None
    }
}
