//! Animated-image export.
//!
//! Runs the buffered path on a reduced plan: narrower surface, capped
//! frame rate, and a hard ceiling on output duration.

use async_trait::async_trait;

use dashview_common::config::AppConfig;
use dashview_common::error::DashviewResult;

use crate::encoder::buffered::{encode_phase, render_phase};
use crate::encoder::{EncodeStrategy, ExportContext, RenderPlan, StrategyKind, StrategyOutcome};

#[derive(Debug, Default)]
pub struct ImageSequenceStrategy;

impl ImageSequenceStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EncodeStrategy for ImageSequenceStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ImageSequence
    }

    fn adjust_plan(&self, plan: &mut RenderPlan, config: &AppConfig) {
        let limits = &config.image_sequence;
        let original = (plan.layout.width, plan.layout.height, plan.fps, plan.end_secs);

        plan.layout = plan.layout.scaled_to_width(limits.max_width);
        plan.fps = plan.fps.min(limits.max_fps.max(1));
        let max_source_secs = limits.max_duration_secs * plan.speed;
        if plan.duration_secs() > max_source_secs {
            plan.end_secs = plan.start_secs + max_source_secs;
        }

        tracing::info!(
            width = plan.layout.width,
            height = plan.layout.height,
            fps = plan.fps,
            end_secs = plan.end_secs,
            original_width = original.0,
            original_fps = original.2,
            original_end_secs = original.3,
            "Reduced plan for image sequence"
        );
    }

    async fn run(&mut self, ctx: &mut ExportContext<'_>) -> DashviewResult<StrategyOutcome> {
        let Some(frames) = render_phase(ctx).await else {
            ctx.set_buffered_frames(0);
            return Ok(StrategyOutcome::Cancelled);
        };
        encode_phase(ctx, frames).await
    }
}
