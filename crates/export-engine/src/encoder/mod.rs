//! Encoder strategies and the recorder seam.
//!
//! A strategy drives the source and compositor and feeds composited
//! frames to a [`Recorder`]. Three strategies exist:
//! - [`live::LiveStrategy`]: real-time playback sampled by a tick driver
//! - [`buffered::BufferedStrategy`]: render every frame to memory, then
//!   replay on a fixed schedule
//! - [`sequence::ImageSequenceStrategy`]: the buffered path at reduced
//!   resolution, frame rate, and duration for animated images

pub mod buffered;
pub mod ffmpeg;
pub mod live;
pub mod memory;
pub mod sequence;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use dashview_common::config::AppConfig;
use dashview_common::error::{DashviewError, DashviewResult};
use dashview_event_model::{
    CameraId, CameraMapping, ClipPosition, ExportFormat, ExportQuality, LayoutConfig,
    StrategyPreference,
};

use crate::canvas::{Canvas, RasterCanvas, RasterFrame};
use crate::compositor::{CompositeReport, Compositor, FrameContext, FrameInputs};
use crate::controller::ExportStatus;
use crate::progress::ProgressReporter;
use crate::providers::{SourceProvider, SourceState};
use crate::session::ExportSession;
use crate::sync::TickObservation;
use crate::text::TextPainter;

/// Encoder input parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: ExportFormat,
    pub bitrate_kbps: u32,
}

/// Consumes composited frames and produces container bytes.
pub trait Recorder: Send {
    fn start(&mut self, spec: &RecorderSpec) -> DashviewResult<()>;

    fn push_frame(&mut self, frame: &RasterFrame) -> DashviewResult<()>;

    /// Output produced so far and not yet taken.
    fn take_chunks(&mut self) -> Vec<Vec<u8>>;

    /// Flush and finalize. Returns the remaining chunks.
    fn finish(&mut self) -> DashviewResult<Vec<Vec<u8>>>;

    /// Stop without finalizing and discard pending output.
    fn abort(&mut self);

    fn frames_pushed(&self) -> u64;
}

/// Creates a recorder per export.
pub trait RecorderFactory: Send + Sync {
    fn create(&self, format: ExportFormat) -> DashviewResult<Box<dyn Recorder>>;
}

/// Which strategy ran an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Live,
    Buffered,
    ImageSequence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyOutcome {
    Finished { frames: u64 },
    Cancelled,
}

/// Everything fixed about one export's rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPlan {
    pub layout: LayoutConfig,
    pub mapping: CameraMapping,
    pub labels: BTreeMap<CameraId, String>,
    /// Cameras shown by visible slots.
    pub cameras: Vec<CameraId>,
    pub start_secs: f64,
    pub end_secs: f64,
    pub fps: u32,
    pub speed: f64,
    /// Whether live playback warms up before `start_secs`.
    pub preroll: bool,
    pub format: ExportFormat,
    pub quality: ExportQuality,
    pub overlays_enabled: bool,
    pub watermark: bool,
}

impl RenderPlan {
    /// Source seconds covered.
    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    /// Seconds of output video.
    pub fn output_duration_secs(&self) -> f64 {
        self.duration_secs() / self.speed
    }

    /// `ceil(duration * fps / speed)`.
    pub fn frame_count(&self) -> u64 {
        let exact = self.duration_secs() * self.fps as f64 / self.speed;
        if exact <= 0.0 {
            return 0;
        }
        // Round away float noise before ceil so 125 s at 30 fps is 3750, not 3751.
        (exact - 1e-9).ceil() as u64
    }

    /// Memory needed to hold every output frame as RGBA.
    pub fn buffered_bytes(&self) -> u64 {
        self.frame_count()
            .saturating_mul(self.layout.width as u64 * self.layout.height as u64 * 4)
    }

    /// Source seconds between consecutive output frames.
    pub fn step_secs(&self) -> f64 {
        self.speed / self.fps.max(1) as f64
    }

    pub fn recorder_spec(&self) -> RecorderSpec {
        RecorderSpec {
            width: self.layout.width,
            height: self.layout.height,
            fps: self.fps,
            format: self.format,
            bitrate_kbps: self
                .quality
                .bitrate_kbps(self.layout.width, self.layout.height, self.fps),
        }
    }
}

/// Borrowed state a strategy runs against.
pub struct ExportContext<'a> {
    pub source: &'a mut dyn SourceProvider,
    pub session: &'a mut ExportSession,
    pub plan: &'a RenderPlan,
    pub compositor: &'a mut Compositor,
    pub recorder: &'a mut dyn Recorder,
    pub progress: &'a mut ProgressReporter,
    pub config: &'a AppConfig,
    pub cancel: &'a AtomicBool,
    pub status: &'a Mutex<ExportStatus>,
    pub font: Option<&'a [u8]>,
}

impl<'a> ExportContext<'a> {
    pub fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// A fresh output-sized surface, with the overlay font when configured.
    pub fn new_canvas(&self) -> RasterCanvas {
        let painter = self.font.and_then(|bytes| match TextPainter::from_bytes(bytes.to_vec()) {
            Ok(painter) => Some(painter),
            Err(e) => {
                tracing::warn!(error = %e, "Overlay font unusable; drawing text plates only");
                None
            }
        });
        RasterCanvas::new(self.plan.layout.width, self.plan.layout.height).with_painter(painter)
    }

    /// Sample the source for one tick.
    pub fn observe(&mut self) -> (FrameInputs, TickObservation) {
        let position = self.source.position();
        let inputs = FrameInputs::collect(
            &*self.source,
            &self.plan.layout,
            &self.plan.mapping,
            &self.plan.labels,
        );
        let present: Vec<SourceState> = self
            .plan
            .cameras
            .iter()
            .map(|camera| self.source.camera_state(camera))
            .filter(|state| *state != SourceState::Missing)
            .collect();
        let all_ended = if present.is_empty() {
            let duration = self.session.timeline().duration(position.index).unwrap_or(0.0);
            position.intra_secs >= duration
        } else {
            present.iter().all(|state| *state == SourceState::Ended)
        };
        let observation = TickObservation {
            position,
            all_ready: inputs.all_ready(),
            all_ended,
        };
        (inputs, observation)
    }

    pub fn frame_context(&self, position: ClipPosition, absolute_secs: f64) -> FrameContext {
        FrameContext {
            position,
            absolute_secs,
            clip_created_at: self.source.clip_created_at(position.index),
            fps: self.plan.fps,
            overlays_enabled: self.plan.overlays_enabled,
            watermark: self.plan.watermark,
        }
    }

    pub async fn composite(
        &mut self,
        canvas: &mut dyn Canvas,
        inputs: &FrameInputs,
        position: ClipPosition,
        absolute_secs: f64,
    ) -> CompositeReport {
        let ctx = self.frame_context(position, absolute_secs);
        self.compositor
            .render(canvas, &self.plan.layout, &self.plan.mapping, inputs, &ctx)
            .await
    }

    /// Hand one frame to the recorder and collect whatever it produced.
    pub fn push_frame(&mut self, frame: &RasterFrame) -> DashviewResult<()> {
        self.recorder.push_frame(frame)?;
        self.session.record_frame();
        let chunks = self.recorder.take_chunks();
        self.session.append_chunks(chunks);
        Ok(())
    }

    pub fn set_buffered_frames(&self, count: usize) {
        if let Ok(mut status) = self.status.lock() {
            status.buffered_frames = count;
        }
    }

    /// Mirror the session's speed into the shared status.
    pub fn publish_status(&self) {
        if let Ok(mut status) = self.status.lock() {
            status.current_speed = self.session.current_speed();
            status.speed_reduced = self.session.speed_reduced();
        }
    }
}

/// Runs one export against an [`ExportContext`].
#[async_trait]
pub trait EncodeStrategy: Send {
    fn kind(&self) -> StrategyKind;

    /// Tighten the plan before any resource is created.
    fn adjust_plan(&self, _plan: &mut RenderPlan, _config: &AppConfig) {}

    async fn run(&mut self, ctx: &mut ExportContext<'_>) -> DashviewResult<StrategyOutcome>;
}

/// Choose a strategy for `plan` and `preference`.
///
/// Animated images always use the image-sequence path, which caps its
/// own size. `Auto` buffers when every frame fits within
/// `max_buffered_bytes` and plays live otherwise; an explicit buffered
/// request over the bound is rejected.
pub fn select_strategy(
    plan: &RenderPlan,
    preference: StrategyPreference,
    config: &AppConfig,
) -> DashviewResult<Box<dyn EncodeStrategy>> {
    if plan.format.is_image_sequence() {
        return Ok(Box::new(sequence::ImageSequenceStrategy::new()));
    }
    let limit = config.export.max_buffered_bytes;
    let needed = plan.buffered_bytes();
    let strategy: Box<dyn EncodeStrategy> = match preference {
        StrategyPreference::Live => Box::new(live::LiveStrategy::new()),
        StrategyPreference::Buffered if needed > limit => {
            return Err(DashviewError::invalid_options(format!(
                "buffered export needs {} MiB of frame memory, limit is {} MiB",
                needed / (1024 * 1024),
                limit / (1024 * 1024)
            )));
        }
        StrategyPreference::Buffered => Box::new(buffered::BufferedStrategy::new()),
        StrategyPreference::Auto if needed <= limit => Box::new(buffered::BufferedStrategy::new()),
        StrategyPreference::Auto => Box::new(live::LiveStrategy::new()),
    };
    Ok(strategy)
}
