//! Two-phase export: render every frame to memory, then encode on a
//! fixed schedule.
//!
//! Phase 1 seeks the paused source to each frame's exact source time, so
//! decoder speed never affects which frames are produced. Phase 2 feeds
//! the snapshots to the recorder at `anchor + i / fps`.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use dashview_common::clock::{frame_interval, DriftMeasurement};
use dashview_common::error::DashviewResult;

use crate::canvas::{RasterCanvas, RasterFrame};
use crate::compositor::FrameInputs;
use crate::encoder::{EncodeStrategy, ExportContext, StrategyKind, StrategyOutcome};
use crate::progress::{banded, ExportPhase};
use crate::session::SessionState;

/// Drift beyond this many frame intervals is logged.
const DRIFT_WARN_INTERVALS: f64 = 2.0;

/// Render-then-encode. Frame memory is bounded by `max_buffered_bytes`.
#[derive(Debug, Default)]
pub struct BufferedStrategy;

impl BufferedStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EncodeStrategy for BufferedStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Buffered
    }

    async fn run(&mut self, ctx: &mut ExportContext<'_>) -> DashviewResult<StrategyOutcome> {
        let Some(frames) = render_phase(ctx).await else {
            ctx.set_buffered_frames(0);
            return Ok(StrategyOutcome::Cancelled);
        };
        encode_phase(ctx, frames).await
    }
}

/// Poll until every present camera has a frame, or `timeout` passes.
async fn wait_for_frames(ctx: &mut ExportContext<'_>, timeout: Duration, poll: Duration) -> (FrameInputs, bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let (inputs, observation) = ctx.observe();
        if observation.all_ready {
            return (inputs, true);
        }
        if tokio::time::Instant::now() >= deadline || ctx.cancelled() {
            return (inputs, false);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Phase 1. Returns `None` when cancelled.
pub(crate) async fn render_phase(ctx: &mut ExportContext<'_>) -> Option<VecDeque<RasterFrame>> {
    let plan = ctx.plan;
    let total = plan.frame_count();
    let step = plan.step_secs();
    let timeout = Duration::from_millis(ctx.config.export.frame_ready_timeout_ms);
    let poll = Duration::from_millis(ctx.config.export.frame_poll_interval_ms.max(1));

    tracing::info!(
        frames = total,
        start_secs = plan.start_secs,
        end_secs = plan.end_secs,
        width = plan.layout.width,
        height = plan.layout.height,
        "Rendering frames to memory"
    );

    ctx.source.pause();
    ctx.session.set_state(SessionState::Recording);
    let mut canvas = ctx.new_canvas();
    let mut frames = VecDeque::with_capacity(total as usize);

    for index in 0..total {
        if ctx.cancelled() {
            return None;
        }
        let absolute = plan.start_secs + index as f64 * step;
        let position = ctx.session.timeline().reverse(absolute);
        if let Err(e) = ctx.source.seek(position).await {
            tracing::warn!(absolute_secs = absolute, error = %e, "Seek failed; rendering what is available");
        }

        let (inputs, ready) = wait_for_frames(ctx, timeout, poll).await;
        if ctx.cancelled() {
            return None;
        }
        if !ready && ctx.session.mark_degraded() {
            tracing::warn!(
                absolute_secs = absolute,
                timeout_ms = timeout.as_millis() as u64,
                "Source frame not ready in time; export continues degraded"
            );
        }

        ctx.composite(&mut canvas, &inputs, position, absolute).await;
        frames.push_back(canvas.snapshot(absolute));
        ctx.set_buffered_frames(frames.len());
        ctx.progress
            .report(ExportPhase::Rendering, banded((index + 1) as f64 / total as f64, 0.0, 0.5));
    }

    Some(frames)
}

/// Phase 2: replay snapshots into the recorder on schedule.
pub(crate) async fn encode_phase(
    ctx: &mut ExportContext<'_>,
    mut frames: VecDeque<RasterFrame>,
) -> DashviewResult<StrategyOutcome> {
    let plan = ctx.plan;
    let total = frames.len();
    ctx.recorder.start(&plan.recorder_spec())?;

    let interval = frame_interval(plan.fps);
    let warn_ms = interval.as_secs_f64() * 1000.0 * DRIFT_WARN_INTERVALS;
    let mut surface = RasterCanvas::new(plan.layout.width, plan.layout.height);
    let anchor = tokio::time::Instant::now();
    let mut worst_drift_ms = 0.0f64;
    let mut index: u64 = 0;

    while let Some(frame) = frames.pop_front() {
        if ctx.cancelled() {
            ctx.set_buffered_frames(0);
            return Ok(StrategyOutcome::Cancelled);
        }
        let offset = interval.mul_f64(index as f64);
        tokio::time::sleep_until(anchor + offset).await;

        let drift = DriftMeasurement {
            reference_ns: offset.as_nanos() as u64,
            measured_ns: anchor.elapsed().as_nanos() as u64,
        };
        worst_drift_ms = worst_drift_ms.max(drift.drift_ms());
        if drift.exceeds_threshold_ms(warn_ms) {
            tracing::debug!(frame = index, drift_ms = drift.drift_ms(), "Encode schedule slipping");
        }

        surface.present(frame);
        ctx.push_frame(surface.frame())?;
        ctx.set_buffered_frames(frames.len());
        index += 1;
        // 100% belongs to finalizing, after the recorder has flushed.
        let fraction = banded(index as f64 / total.max(1) as f64, 0.5, 1.0).min(0.999);
        ctx.progress.report(ExportPhase::Encoding, fraction);
    }

    tracing::info!(
        frames = index,
        worst_drift_ms,
        degraded = ctx.session.is_degraded(),
        "Buffered encode complete"
    );
    Ok(StrategyOutcome::Finished { frames: index })
}
