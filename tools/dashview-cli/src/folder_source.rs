//! `SourceProvider` over an event folder, decoding with ffmpeg.
//!
//! Each camera gets its own `ffmpeg` child emitting raw RGBA frames at a
//! fixed decode rate. Playback time is simulated from the tokio clock;
//! a camera's frame is pulled from its pipe on demand until it reaches
//! the playback position.

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::time::Instant;

use dashview_common::error::{DashviewError, DashviewResult};
use dashview_event_model::{CameraId, ClipPosition, RecordedEvent};
use dashview_export_engine::single_camera::DEFAULT_NATIVE_SIZE;
use dashview_export_engine::{SourceFrame, SourceProvider, SourceState};

/// Forward seeks shorter than this reuse the running decoder.
const MAX_SKIP_SECS: f64 = 2.0;

/// Duration of a video file according to ffprobe.
pub fn probe_file_duration(path: &Path) -> Option<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8(output.stdout).ok()?;
    let secs = raw.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Frame size of the first video stream.
pub fn probe_video_dimensions(path: &Path) -> Option<(u32, u32)> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=p=0:s=x",
        ])
        .arg(path)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let raw = String::from_utf8(output.stdout).ok()?;
    let (w, h) = raw.lines().next()?.trim().split_once('x')?;
    let width = w.parse::<u32>().ok()?;
    let height = h.parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}

struct DecodeProcess {
    child: Child,
    stdout: ChildStdout,
}

impl Drop for DecodeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// One camera's decoder for the current clip group.
struct CameraDecoder {
    width: u32,
    height: u32,
    fps: u32,
    path: Option<PathBuf>,
    process: Option<DecodeProcess>,
    /// Clip time of the first frame the process emits.
    origin_secs: f64,
    frames_read: u64,
    latest: Option<(f64, SourceFrame)>,
    ended: bool,
}

impl CameraDecoder {
    fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            path: None,
            process: None,
            origin_secs: 0.0,
            frames_read: 0,
            latest: None,
            ended: false,
        }
    }

    fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn next_frame_secs(&self) -> f64 {
        self.origin_secs + self.frames_read as f64 / self.fps as f64
    }

    /// Point the decoder at `path` (or nothing) positioned at `intra_secs`.
    fn open(&mut self, path: Option<&Path>, intra_secs: f64) {
        let same_file = self.path.as_deref() == path;
        let skip = intra_secs - self.next_frame_secs();
        if same_file && self.process.is_some() && (0.0..MAX_SKIP_SECS).contains(&skip) {
            return;
        }

        self.process = None;
        self.path = path.map(Path::to_path_buf);
        self.origin_secs = intra_secs;
        self.frames_read = 0;
        self.latest = None;
        self.ended = false;

        let Some(path) = path else {
            return;
        };
        let spawned = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .arg("-ss")
            .arg(format!("{intra_secs:.3}"))
            .arg("-i")
            .arg(path)
            .arg("-an")
            .arg("-vf")
            .arg(format!("fps={},scale={}x{}", self.fps, self.width, self.height))
            .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(mut child) => match child.stdout.take() {
                Some(stdout) => self.process = Some(DecodeProcess { child, stdout }),
                None => {
                    let _ = child.kill();
                    self.ended = true;
                }
            },
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to start decoder");
                self.ended = true;
            }
        }
    }

    /// Read frames until the newest one covers `intra_secs`.
    fn advance_to(&mut self, intra_secs: f64) {
        let frame_bytes = self.frame_bytes();
        while !self.ended && (self.latest.is_none() || self.next_frame_secs() <= intra_secs + 1e-6) {
            let Some(process) = self.process.as_mut() else {
                self.ended = true;
                break;
            };
            let mut pixels = vec![0u8; frame_bytes];
            match process.stdout.read_exact(&mut pixels) {
                Ok(()) => {
                    let at = self.next_frame_secs();
                    self.latest = Some((at, SourceFrame::new(self.width, self.height, pixels)));
                    self.frames_read += 1;
                }
                Err(e) => {
                    if e.kind() != ErrorKind::UnexpectedEof {
                        tracing::warn!(error = %e, "Decoder pipe failed");
                    }
                    self.ended = true;
                    self.process = None;
                }
            }
        }
    }

    fn state(&mut self, intra_secs: f64) -> SourceState {
        if self.path.is_none() {
            return SourceState::Missing;
        }
        self.advance_to(intra_secs);
        match &self.latest {
            _ if !self.ended => SourceState::Ready,
            Some((at, _)) if intra_secs < at + 1.0 / self.fps as f64 => SourceState::Ready,
            _ => SourceState::Ended,
        }
    }
}

/// Event playback backed by ffmpeg decoders.
pub struct FolderSource {
    event: RecordedEvent,
    cameras: Vec<CameraId>,
    sizes: BTreeMap<CameraId, (u32, u32)>,
    decoders: BTreeMap<CameraId, Mutex<CameraDecoder>>,
    durations: Vec<Option<f64>>,
    clip: usize,
    base_intra: f64,
    anchor: Instant,
    intra: f64,
    rate: f64,
    playing: bool,
}

impl std::fmt::Debug for FolderSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FolderSource")
            .field("event", &self.event.name)
            .field("clip", &self.clip)
            .field("intra", &self.intra)
            .finish()
    }
}

impl FolderSource {
    /// Probe every camera's frame size and prepare decoders at `fps`.
    pub fn open(event: RecordedEvent, cameras: Vec<CameraId>, fps: u32) -> Self {
        let mut sizes = BTreeMap::new();
        let mut decoders = BTreeMap::new();
        for camera in &cameras {
            let size = event
                .groups
                .iter()
                .find_map(|group| group.clip_for(camera))
                .and_then(|clip| probe_video_dimensions(&clip.path))
                .unwrap_or_else(|| {
                    tracing::warn!(%camera, "Could not probe frame size; using default");
                    DEFAULT_NATIVE_SIZE
                });
            // rawvideo scaling needs even dimensions for some inputs.
            let size = ((size.0 / 2 * 2).max(2), (size.1 / 2 * 2).max(2));
            tracing::debug!(%camera, width = size.0, height = size.1, "Camera frame size");
            sizes.insert(camera.clone(), size);
            decoders.insert(camera.clone(), Mutex::new(CameraDecoder::new(size.0, size.1, fps.max(1))));
        }
        let durations = vec![None; event.groups.len()];
        Self {
            event,
            cameras,
            sizes,
            decoders,
            durations,
            clip: 0,
            base_intra: 0.0,
            anchor: Instant::now(),
            intra: 0.0,
            rate: 1.0,
            playing: false,
        }
    }

    pub fn event(&self) -> &RecordedEvent {
        &self.event
    }

    fn current_duration(&self) -> f64 {
        self.durations.get(self.clip).copied().flatten().unwrap_or(f64::MAX)
    }

    fn playback_intra(&self) -> f64 {
        let intra = if self.playing {
            self.base_intra + self.anchor.elapsed().as_secs_f64() * self.rate
        } else {
            self.base_intra
        };
        intra.min(self.current_duration())
    }

    /// Freeze the simulated clock at the current position.
    fn rebase(&mut self) {
        self.base_intra = self.playback_intra();
        self.anchor = Instant::now();
    }

    fn with_decoder<R>(&self, camera: &CameraId, f: impl FnOnce(&mut CameraDecoder) -> R) -> Option<R> {
        let decoder = self.decoders.get(camera)?;
        let mut guard = decoder.lock().ok()?;
        Some(f(&mut guard))
    }
}

#[async_trait]
impl SourceProvider for FolderSource {
    fn cameras(&self) -> Vec<CameraId> {
        self.cameras.clone()
    }

    fn clip_count(&self) -> usize {
        self.event.groups.len()
    }

    async fn probe_duration(&mut self, clip: usize) -> DashviewResult<f64> {
        let group = self
            .event
            .groups
            .get(clip)
            .ok_or_else(|| DashviewError::source(format!("no clip group {clip}")))?;
        let longest = group
            .clips
            .iter()
            .filter_map(|c| probe_file_duration(&c.path))
            .fold(None, |acc: Option<f64>, secs| Some(acc.map_or(secs, |a| a.max(secs))));
        let secs = longest.ok_or_else(|| DashviewError::source(format!("no readable clip in group {clip}")))?;
        if let Some(slot) = self.durations.get_mut(clip) {
            *slot = Some(secs);
        }
        Ok(secs)
    }

    async fn load_clip(&mut self, clip: usize) -> DashviewResult<()> {
        self.seek(ClipPosition::new(clip, 0.0)).await
    }

    async fn seek(&mut self, position: ClipPosition) -> DashviewResult<()> {
        let group = self
            .event
            .groups
            .get(position.index)
            .ok_or_else(|| DashviewError::source(format!("no clip group {}", position.index)))?;
        self.clip = position.index;
        self.base_intra = position.intra_secs.max(0.0);
        self.anchor = Instant::now();
        self.intra = self.base_intra;

        for camera in &self.cameras {
            let path = group.clip_for(camera).map(|c| c.path.clone());
            if let Some(decoder) = self.decoders.get(camera) {
                if let Ok(mut decoder) = decoder.lock() {
                    decoder.open(path.as_deref(), position.intra_secs.max(0.0));
                }
            }
        }
        Ok(())
    }

    fn play(&mut self) {
        if !self.playing {
            self.anchor = Instant::now();
            self.playing = true;
        }
    }

    fn pause(&mut self) {
        self.rebase();
        self.playing = false;
    }

    fn set_rate(&mut self, speed: f64) {
        self.rebase();
        self.rate = speed;
    }

    fn position(&mut self) -> ClipPosition {
        self.intra = self.playback_intra();
        ClipPosition::new(self.clip, self.intra)
    }

    fn camera_state(&self, camera: &CameraId) -> SourceState {
        self.with_decoder(camera, |d| d.state(self.intra))
            .unwrap_or(SourceState::Missing)
    }

    fn frame(&self, camera: &CameraId) -> Option<SourceFrame> {
        self.with_decoder(camera, |d| {
            d.advance_to(self.intra);
            d.latest.as_ref().map(|(_, frame)| frame.clone())
        })
        .flatten()
    }

    fn native_size(&self, camera: &CameraId) -> Option<(u32, u32)> {
        self.sizes.get(camera).copied()
    }

    fn clip_created_at(&self, clip: usize) -> Option<NaiveDateTime> {
        self.event.groups.get(clip).and_then(|g| g.created_at)
    }

    fn event_started_at(&self) -> Option<NaiveDateTime> {
        self.event.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_dir::group_clips;

    fn event() -> RecordedEvent {
        group_clips(
            "trip",
            [
                "2024-05-01_12-30-00-front.mp4",
                "2024-05-01_12-31-00-front.mp4",
                "2024-05-01_12-31-00-back.mp4",
            ]
            .into_iter()
            .map(|name| PathBuf::from("/nonexistent").join(name)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_clock_follows_rate() {
        let cameras = vec![CameraId::new("front"), CameraId::new("back")];
        let mut source = FolderSource::open(event(), cameras, 30);
        source.seek(ClipPosition::new(1, 5.0)).await.unwrap();
        source.set_rate(4.0);
        source.play();
        tokio::time::advance(std::time::Duration::from_secs(2)).await;

        let position = source.position();
        assert_eq!(position.index, 1);
        assert!((position.intra_secs - 13.0).abs() < 1e-6);

        source.pause();
        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        assert!((source.position().intra_secs - 13.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_without_clip_is_missing() {
        let cameras = vec![CameraId::new("front"), CameraId::new("back")];
        let mut source = FolderSource::open(event(), cameras, 30);
        source.seek(ClipPosition::new(0, 0.0)).await.unwrap();
        assert_eq!(source.camera_state(&CameraId::new("back")), SourceState::Missing);
        assert_eq!(source.native_size(&CameraId::new("back")), Some(DEFAULT_NATIVE_SIZE));
        assert_eq!(source.clip_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_past_last_group_fails() {
        let mut source = FolderSource::open(event(), vec![CameraId::new("front")], 30);
        assert!(source.seek(ClipPosition::new(5, 0.0)).await.is_err());
    }
}
