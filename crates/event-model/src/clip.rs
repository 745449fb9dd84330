//! Recorded events and their clip groups.
//!
//! An event is a continuous recording split into fixed-length segments
//! ("clip groups"), each holding one file per camera. The nominal segment
//! length is only an estimate; real durations come from probing.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::layout::CameraId;

/// One camera's file inside a clip group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRef {
    pub camera: CameraId,
    pub path: PathBuf,
}

/// One recording segment across all cameras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipGroup {
    /// Creation time embedded in the segment (local camera time).
    pub created_at: Option<NaiveDateTime>,

    /// Per-camera clips, in camera discovery order.
    pub clips: Vec<ClipRef>,
}

impl ClipGroup {
    pub fn clip_for(&self, camera: &CameraId) -> Option<&ClipRef> {
        self.clips.iter().find(|clip| &clip.camera == camera)
    }
}

/// A multi-clip recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Human-readable name (usually the folder name).
    pub name: String,

    /// Event start time; used for output naming.
    pub started_at: Option<NaiveDateTime>,

    /// Clip groups in playback order.
    pub groups: Vec<ClipGroup>,
}

impl RecordedEvent {
    /// All cameras appearing in any clip group, sorted and deduplicated.
    pub fn cameras(&self) -> Vec<CameraId> {
        let mut cameras: Vec<CameraId> = self
            .groups
            .iter()
            .flat_map(|group| group.clips.iter().map(|clip| clip.camera.clone()))
            .collect();
        cameras.sort();
        cameras.dedup();
        cameras
    }
}

/// A location inside an event expressed as clip index plus offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClipPosition {
    /// Zero-based clip group index.
    pub index: usize,
    /// Seconds from the start of that clip group.
    pub intra_secs: f64,
}

impl ClipPosition {
    pub fn new(index: usize, intra_secs: f64) -> Self {
        Self { index, intra_secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(camera: &str) -> ClipRef {
        ClipRef {
            camera: CameraId::from(camera),
            path: PathBuf::from(format!("{camera}.mp4")),
        }
    }

    #[test]
    fn test_event_cameras_are_deduplicated() {
        let event = RecordedEvent {
            name: "event".to_string(),
            started_at: None,
            groups: vec![
                ClipGroup {
                    created_at: None,
                    clips: vec![clip("front"), clip("back")],
                },
                ClipGroup {
                    created_at: None,
                    clips: vec![clip("front"), clip("left_repeater")],
                },
            ],
        };
        let names: Vec<String> = event.cameras().iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["back", "front", "left_repeater"]);
        assert!(event.groups[1].clip_for(&CameraId::from("back")).is_none());
    }
}
