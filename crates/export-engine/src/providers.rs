//! Collaborator interfaces the pipeline consumes.
//!
//! The export core never discovers files, decodes video, extracts
//! telemetry, draws map tiles, or detects license plates itself. Those
//! concerns are injected through the traits below.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use dashview_common::error::DashviewResult;
use dashview_event_model::{
    CameraId, CameraMapping, ClipPosition, GeoPosition, LayoutConfig, Rect, TelemetrySample,
};

use crate::canvas::Canvas;

/// Playback state of one camera source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// A decoded frame for the current position is available.
    Ready,
    /// Seeking or buffering.
    Loading,
    /// Reached the end of the current clip.
    Ended,
    /// The camera has no clip in the current group.
    Missing,
}

/// A decoded RGBA8 camera frame.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGBA, `width * height * 4` bytes.
    pub pixels: Arc<Vec<u8>>,
}

impl SourceFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::new(pixels),
        }
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&rgba);
        }
        Self::new(width, height, pixels)
    }

    /// RGBA value at `(x, y)`, or transparent black when out of range.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0, 0, 0, 0];
        }
        let offset = ((y * self.width + x) * 4) as usize;
        match self.pixels.get(offset..offset + 4) {
            Some(px) => [px[0], px[1], px[2], px[3]],
            None => [0, 0, 0, 0],
        }
    }
}

/// Multi-camera playback of one recorded event.
///
/// Seeks and clip loads complete asynchronously; the pipeline only
/// observes playback through [`SourceProvider::position`] and
/// [`SourceProvider::camera_state`].
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Cameras available in this event.
    fn cameras(&self) -> Vec<CameraId>;

    /// Number of clip groups.
    fn clip_count(&self) -> usize;

    /// Real duration of a clip group in seconds.
    async fn probe_duration(&mut self, clip: usize) -> DashviewResult<f64>;

    /// Make `clip` the current group, positioned at its start.
    async fn load_clip(&mut self, clip: usize) -> DashviewResult<()>;

    /// Position every camera at `position`, loading the group if needed.
    async fn seek(&mut self, position: ClipPosition) -> DashviewResult<()>;

    fn play(&mut self);

    fn pause(&mut self);

    /// Playback rate multiplier.
    fn set_rate(&mut self, speed: f64);

    /// Current clip index and intra-clip time of the lead camera.
    fn position(&mut self) -> ClipPosition;

    fn camera_state(&self, camera: &CameraId) -> SourceState;

    /// Most recent decoded frame for `camera`.
    fn frame(&self, camera: &CameraId) -> Option<SourceFrame>;

    /// Decoded frame size for `camera`, when known.
    fn native_size(&self, camera: &CameraId) -> Option<(u32, u32)>;

    /// Creation time embedded in a clip group.
    fn clip_created_at(&self, clip: usize) -> Option<NaiveDateTime>;

    /// Start time of the whole event.
    fn event_started_at(&self) -> Option<NaiveDateTime>;
}

/// Current layout and camera assignment.
pub trait LayoutProvider: Send + Sync {
    fn layout(&self) -> LayoutConfig;

    fn camera_mapping(&self) -> CameraMapping;

    /// Display name drawn in a slot label.
    fn camera_label(&self, camera: &CameraId) -> String {
        camera.to_string()
    }
}

/// A fixed layout and mapping.
#[derive(Debug, Clone)]
pub struct StaticLayout {
    pub layout: LayoutConfig,
    pub mapping: CameraMapping,
}

impl LayoutProvider for StaticLayout {
    fn layout(&self) -> LayoutConfig {
        self.layout.clone()
    }

    fn camera_mapping(&self) -> CameraMapping {
        self.mapping.clone()
    }
}

/// Per-instant vehicle telemetry.
pub trait TelemetryProvider: Send + Sync {
    fn sample(&self, clip: usize, intra_secs: f64) -> Option<TelemetrySample>;
}

/// Map inset renderer. Failures are tolerated by the caller.
pub trait MapOverlayProvider: Send + Sync {
    fn render(
        &self,
        canvas: &mut dyn Canvas,
        rect: Rect,
        position: GeoPosition,
    ) -> anyhow::Result<()>;
}

/// License-plate / face redaction over composited camera regions.
#[async_trait]
pub trait RedactionProvider: Send + Sync {
    async fn process(&self, canvas: &mut dyn Canvas, regions: &[Rect]) -> anyhow::Result<()>;
}

/// Export entitlement gate.
pub trait LicensingProvider: Send + Sync {
    /// `Err(reason)` refuses the export outright.
    fn authorize_export(&self) -> Result<(), String> {
        Ok(())
    }

    fn should_watermark(&self) -> bool;
}

/// Licensing that allows every export without a watermark.
#[derive(Debug, Clone, Copy, Default)]
pub struct Licensed;

impl LicensingProvider for Licensed {
    fn should_watermark(&self) -> bool {
        false
    }
}

/// Licensing that allows export but stamps a watermark.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlicensed;

impl LicensingProvider for Unlicensed {
    fn should_watermark(&self) -> bool {
        true
    }
}

/// Optional collaborators consulted while compositing.
#[derive(Clone, Default)]
pub struct OverlayServices {
    pub telemetry: Option<Arc<dyn TelemetryProvider>>,
    pub map: Option<Arc<dyn MapOverlayProvider>>,
    pub redaction: Option<Arc<dyn RedactionProvider>>,
}

impl std::fmt::Debug for OverlayServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayServices")
            .field("telemetry", &self.telemetry.is_some())
            .field("map", &self.map.is_some())
            .field("redaction", &self.redaction.is_some())
            .finish()
    }
}
