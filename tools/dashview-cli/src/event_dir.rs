//! Event folder discovery.
//!
//! Dashcams write one file per camera per segment, named
//! `YYYY-MM-DD_HH-MM-SS-<camera>.mp4`. Files sharing a timestamp form one
//! clip group.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use dashview_event_model::{CameraId, ClipGroup, ClipRef, RecordedEvent};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";
const TIMESTAMP_LEN: usize = 19;

/// Camera display order used by the grid preset.
const CAMERA_ORDER: [&str; 6] = [
    "front",
    "back",
    "left_repeater",
    "right_repeater",
    "left_pillar",
    "right_pillar",
];

/// Split `2024-05-01_12-30-00-front.mp4` into its timestamp and camera.
pub fn parse_clip_name(file_name: &str) -> Option<(NaiveDateTime, CameraId)> {
    let stem = file_name
        .strip_suffix(".mp4")
        .or_else(|| file_name.strip_suffix(".MP4"))?;
    if stem.len() <= TIMESTAMP_LEN + 1 || !stem.is_char_boundary(TIMESTAMP_LEN) {
        return None;
    }
    let (stamp, rest) = stem.split_at(TIMESTAMP_LEN);
    let camera = rest.strip_prefix('-')?;
    if camera.is_empty() {
        return None;
    }
    let at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
    Some((at, CameraId::new(camera)))
}

/// Group parsed clip files into an event, oldest segment first.
pub fn group_clips(name: impl Into<String>, files: impl IntoIterator<Item = PathBuf>) -> RecordedEvent {
    let mut groups: BTreeMap<NaiveDateTime, Vec<ClipRef>> = BTreeMap::new();
    for path in files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match parse_clip_name(file_name) {
            Some((at, camera)) => groups.entry(at).or_default().push(ClipRef { camera, path }),
            None => tracing::debug!(file = %path.display(), "Skipping file that is not a camera clip"),
        }
    }

    let groups: Vec<ClipGroup> = groups
        .into_iter()
        .map(|(at, mut clips)| {
            clips.sort_by_key(|clip| camera_rank(&clip.camera));
            ClipGroup {
                created_at: Some(at),
                clips,
            }
        })
        .collect();

    RecordedEvent {
        name: name.into(),
        started_at: groups.first().and_then(|g| g.created_at),
        groups,
    }
}

/// Read an event folder.
pub fn scan_event(dir: &Path) -> anyhow::Result<RecordedEvent> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "event".to_string());
    let event = group_clips(name, files);
    if event.groups.is_empty() {
        anyhow::bail!("no camera clips found in {}", dir.display());
    }
    tracing::info!(
        event = %event.name,
        groups = event.groups.len(),
        cameras = event.cameras().len(),
        "Scanned event folder"
    );
    Ok(event)
}

/// Cameras in preferred display order; unknown cameras follow by name.
pub fn ordered_cameras(event: &RecordedEvent) -> Vec<CameraId> {
    let mut cameras = event.cameras();
    cameras.sort_by(|a, b| camera_rank(a).cmp(&camera_rank(b)).then_with(|| a.cmp(b)));
    cameras
}

fn camera_rank(camera: &CameraId) -> usize {
    CAMERA_ORDER
        .iter()
        .position(|name| *name == camera.as_str())
        .unwrap_or(CAMERA_ORDER.len())
}

/// `left_repeater` -> `Left Repeater`.
pub fn display_name(camera: &CameraId) -> String {
    camera
        .as_str()
        .split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clip_name() {
        let (at, camera) = parse_clip_name("2024-05-01_12-30-00-left_repeater.mp4").unwrap();
        assert_eq!(at.format(TIMESTAMP_FORMAT).to_string(), "2024-05-01_12-30-00");
        assert_eq!(camera, CameraId::new("left_repeater"));

        assert!(parse_clip_name("2024-05-01_12-30-00.mp4").is_none());
        assert!(parse_clip_name("event.json").is_none());
        assert!(parse_clip_name("thumb.png").is_none());
        assert!(parse_clip_name("2024-13-01_12-30-00-front.mp4").is_none());
    }

    #[test]
    fn test_group_clips_orders_segments_and_cameras() {
        let files = [
            "2024-05-01_12-31-00-front.mp4",
            "2024-05-01_12-30-00-back.mp4",
            "2024-05-01_12-30-00-front.mp4",
            "2024-05-01_12-31-00-back.mp4",
            "event.json",
        ]
        .into_iter()
        .map(|name| PathBuf::from("/events/trip").join(name));

        let event = group_clips("trip", files);
        assert_eq!(event.groups.len(), 2);
        assert_eq!(
            event.started_at.map(|at| at.format(TIMESTAMP_FORMAT).to_string()),
            Some("2024-05-01_12-30-00".to_string())
        );
        let first: Vec<&str> = event.groups[0].clips.iter().map(|c| c.camera.as_str()).collect();
        assert_eq!(first, vec!["front", "back"]);
    }

    #[test]
    fn test_ordered_cameras_puts_known_first() {
        let files = [
            "2024-05-01_12-30-00-zoom.mp4",
            "2024-05-01_12-30-00-right_repeater.mp4",
            "2024-05-01_12-30-00-front.mp4",
        ]
        .into_iter()
        .map(PathBuf::from);
        let event = group_clips("trip", files);
        let names: Vec<String> = ordered_cameras(&event).iter().map(|c| c.to_string()).collect();
        assert_eq!(names, vec!["front", "right_repeater", "zoom"]);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name(&CameraId::new("left_repeater")), "Left Repeater");
        assert_eq!(display_name(&CameraId::new("front")), "Front");
    }
}
