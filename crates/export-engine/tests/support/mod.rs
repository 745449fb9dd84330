//! Scripted collaborators for driving whole exports under paused tokio time.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use tokio::time::Instant;

use dashview_common::config::AppConfig;
use dashview_common::error::{DashviewError, DashviewResult};
use dashview_event_model::{
    CameraId, CameraMapping, ClipPosition, GeoPosition, LayoutConfig, Rect, TelemetrySample,
};
use dashview_export_engine::canvas::Canvas;
use dashview_export_engine::encoder::memory::MemoryRecorderFactory;
use dashview_export_engine::{
    ExportEngine, LicensingProvider, MapOverlayProvider, RedactionProvider, SourceFrame, SourceProvider,
    SourceState, StaticLayout, TelemetryProvider,
};

/// Calls observed by a [`ScriptedSource`].
#[derive(Debug, Clone, Default)]
pub struct SourceLog {
    inner: Arc<Mutex<SourceLogInner>>,
}

#[derive(Debug, Default)]
struct SourceLogInner {
    seeks: Vec<ClipPosition>,
    loads: Vec<usize>,
    rates: Vec<f64>,
}

impl SourceLog {
    pub fn seeks(&self) -> Vec<ClipPosition> {
        self.inner.lock().map(|l| l.seeks.clone()).unwrap_or_default()
    }

    pub fn loads(&self) -> Vec<usize> {
        self.inner.lock().map(|l| l.loads.clone()).unwrap_or_default()
    }

    pub fn rates(&self) -> Vec<f64> {
        self.inner.lock().map(|l| l.rates.clone()).unwrap_or_default()
    }
}

/// A freeze of the decoder once playback reaches `at_secs` (absolute).
#[derive(Debug, Clone, Copy)]
pub struct Freeze {
    pub at_secs: f64,
    pub hold: Duration,
}

/// Multi-camera playback simulated against tokio's clock.
///
/// Playback advances `elapsed * rate` while playing. Seeks and clip loads
/// make every camera `Loading` for `settle`, and scripted freezes hold
/// the position still for a fixed stretch of time.
#[derive(Debug)]
pub struct ScriptedSource {
    cameras: Vec<CameraId>,
    durations: Vec<f64>,
    frame_size: (u32, u32),
    started_at: Option<NaiveDateTime>,
    missing: BTreeMap<usize, BTreeSet<CameraId>>,
    failing_probes: BTreeSet<usize>,
    failing_loads: BTreeSet<usize>,
    probe_delay: Duration,
    freezes: Vec<Freeze>,
    settle: Duration,
    log: SourceLog,

    clip: usize,
    intra: f64,
    rate: f64,
    playing: bool,
    last_update: Instant,
    ready_at: Instant,
    frozen_until: Option<Instant>,
}

impl ScriptedSource {
    pub fn new(cameras: &[&str], durations: &[f64]) -> Self {
        let now = Instant::now();
        Self {
            cameras: cameras.iter().map(|c| CameraId::new(*c)).collect(),
            durations: durations.to_vec(),
            frame_size: (32, 24),
            started_at: NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(12, 30, 0)),
            missing: BTreeMap::new(),
            failing_probes: BTreeSet::new(),
            failing_loads: BTreeSet::new(),
            probe_delay: Duration::ZERO,
            freezes: Vec::new(),
            settle: Duration::ZERO,
            log: SourceLog::default(),
            clip: 0,
            intra: 0.0,
            rate: 1.0,
            playing: false,
            last_update: now,
            ready_at: now,
            frozen_until: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(&[], &[])
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_freeze(mut self, at_secs: f64, hold: Duration) -> Self {
        self.freezes.push(Freeze { at_secs, hold });
        self
    }

    pub fn with_missing(mut self, clip: usize, camera: &str) -> Self {
        self.missing.entry(clip).or_default().insert(CameraId::new(camera));
        self
    }

    pub fn with_failing_probe(mut self, clip: usize) -> Self {
        self.failing_probes.insert(clip);
        self
    }

    pub fn with_failing_load(mut self, clip: usize) -> Self {
        self.failing_loads.insert(clip);
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn log(&self) -> SourceLog {
        self.log.clone()
    }

    fn clip_start(&self) -> f64 {
        self.durations[..self.clip.min(self.durations.len())].iter().sum()
    }

    fn clip_duration(&self) -> f64 {
        self.durations.get(self.clip).copied().unwrap_or(0.0)
    }

    fn is_missing(&self, camera: &CameraId) -> bool {
        self.missing.get(&self.clip).is_some_and(|set| set.contains(camera))
    }

    /// Bring the simulated position up to tokio's current time.
    fn advance(&mut self) {
        let now = Instant::now();
        let since = self.last_update.max(self.ready_at);
        self.last_update = now;
        if !self.playing || now <= since {
            return;
        }
        let mut from = since;
        if let Some(until) = self.frozen_until {
            if now < until {
                return;
            }
            self.frozen_until = None;
            from = from.max(until);
        }

        let delta = (now - from).as_secs_f64() * self.rate;
        let start = self.clip_start();
        let before = start + self.intra;
        let after = before + delta;

        if let Some(index) = self
            .freezes
            .iter()
            .position(|f| f.at_secs > before && f.at_secs <= after)
        {
            let freeze = self.freezes.remove(index);
            self.intra = (freeze.at_secs - start).min(self.clip_duration());
            self.frozen_until = Some(now + freeze.hold);
            return;
        }
        self.intra = (self.intra + delta).min(self.clip_duration());
    }

    fn reposition(&mut self, clip: usize, intra: f64) {
        let now = Instant::now();
        self.clip = clip.min(self.durations.len().saturating_sub(1));
        self.intra = intra.clamp(0.0, self.clip_duration());
        self.last_update = now;
        self.ready_at = now + self.settle;
        self.frozen_until = None;
    }

    fn color_for(&self, camera: &CameraId) -> [u8; 4] {
        let index = self.cameras.iter().position(|c| c == camera).unwrap_or(0) as u8;
        [40 + index * 50, 80, 200 - index * 40, 255]
    }
}

#[async_trait]
impl SourceProvider for ScriptedSource {
    fn cameras(&self) -> Vec<CameraId> {
        self.cameras.clone()
    }

    fn clip_count(&self) -> usize {
        self.durations.len()
    }

    async fn probe_duration(&mut self, clip: usize) -> DashviewResult<f64> {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        if self.failing_probes.contains(&clip) {
            return Err(DashviewError::source(format!("clip {clip} unreadable")));
        }
        self.durations
            .get(clip)
            .copied()
            .ok_or_else(|| DashviewError::source(format!("no clip {clip}")))
    }

    async fn load_clip(&mut self, clip: usize) -> DashviewResult<()> {
        if let Ok(mut log) = self.log.inner.lock() {
            log.loads.push(clip);
        }
        if self.failing_loads.contains(&clip) {
            return Err(DashviewError::source(format!("clip {clip} failed to open")));
        }
        self.reposition(clip, 0.0);
        Ok(())
    }

    async fn seek(&mut self, position: ClipPosition) -> DashviewResult<()> {
        if let Ok(mut log) = self.log.inner.lock() {
            log.seeks.push(position);
        }
        self.reposition(position.index, position.intra_secs);
        Ok(())
    }

    fn play(&mut self) {
        self.advance();
        self.playing = true;
    }

    fn pause(&mut self) {
        self.advance();
        self.playing = false;
    }

    fn set_rate(&mut self, speed: f64) {
        self.advance();
        self.rate = speed;
        if let Ok(mut log) = self.log.inner.lock() {
            log.rates.push(speed);
        }
    }

    fn position(&mut self) -> ClipPosition {
        self.advance();
        ClipPosition::new(self.clip, self.intra)
    }

    fn camera_state(&self, camera: &CameraId) -> SourceState {
        if !self.cameras.contains(camera) || self.is_missing(camera) {
            return SourceState::Missing;
        }
        let now = Instant::now();
        if now < self.ready_at || self.frozen_until.is_some_and(|until| now < until) {
            return SourceState::Loading;
        }
        if self.intra >= self.clip_duration() {
            return SourceState::Ended;
        }
        SourceState::Ready
    }

    fn frame(&self, camera: &CameraId) -> Option<SourceFrame> {
        (self.camera_state(camera) == SourceState::Ready)
            .then(|| SourceFrame::solid(self.frame_size.0, self.frame_size.1, self.color_for(camera)))
    }

    fn native_size(&self, camera: &CameraId) -> Option<(u32, u32)> {
        self.cameras.contains(camera).then_some(self.frame_size)
    }

    fn clip_created_at(&self, clip: usize) -> Option<NaiveDateTime> {
        let offset: f64 = self.durations[..clip.min(self.durations.len())].iter().sum();
        self.started_at
            .map(|at| at + chrono::Duration::milliseconds((offset * 1000.0) as i64))
    }

    fn event_started_at(&self) -> Option<NaiveDateTime> {
        self.started_at
    }
}

/// Licensing that refuses every export.
pub struct Expired;

impl LicensingProvider for Expired {
    fn authorize_export(&self) -> Result<(), String> {
        Err("trial expired".to_string())
    }

    fn should_watermark(&self) -> bool {
        true
    }
}

/// Telemetry with a fixed position and a speed that follows clip time.
pub struct SteadyTelemetry;

impl TelemetryProvider for SteadyTelemetry {
    fn sample(&self, _clip: usize, intra_secs: f64) -> Option<TelemetrySample> {
        Some(TelemetrySample {
            position: Some(GeoPosition {
                latitude: 37.39,
                longitude: -122.15,
            }),
            heading_deg: Some(45.0),
            speed_mps: Some(10.0 + intra_secs),
            ..Default::default()
        })
    }
}

/// Map renderer that always fails, counting attempts.
#[derive(Default)]
pub struct BrokenMap {
    pub calls: AtomicUsize,
}

impl MapOverlayProvider for BrokenMap {
    fn render(&self, _canvas: &mut dyn Canvas, _rect: Rect, _position: GeoPosition) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("tile server unreachable")
    }
}

/// Redaction that records how many regions it was handed per frame.
#[derive(Default)]
pub struct RecordingRedaction {
    pub regions: Mutex<Vec<usize>>,
}

#[async_trait]
impl RedactionProvider for RecordingRedaction {
    async fn process(&self, _canvas: &mut dyn Canvas, regions: &[Rect]) -> anyhow::Result<()> {
        if let Ok(mut seen) = self.regions.lock() {
            seen.push(regions.len());
        }
        Ok(())
    }
}

/// Config tuned for small, fast test exports.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.overlay.font_path = None;
    config
}

/// A 2x2 grid of `cameras` on a `width` x `height` surface.
pub fn grid_layout(cameras: &[&str], width: u32, height: u32) -> Arc<StaticLayout> {
    let layout = LayoutConfig::grid(width, height, cameras);
    let mapping = CameraMapping::identity(&layout);
    Arc::new(StaticLayout { layout, mapping })
}

pub fn engine(source: ScriptedSource, recorders: &MemoryRecorderFactory, width: u32, height: u32) -> ExportEngine {
    let cameras: Vec<String> = source.cameras().iter().map(|c| c.to_string()).collect();
    let names: Vec<&str> = cameras.iter().map(String::as_str).collect();
    ExportEngine::new(
        Box::new(source),
        grid_layout(&names, width, height),
        Arc::new(recorders.clone()),
        test_config(),
    )
}
