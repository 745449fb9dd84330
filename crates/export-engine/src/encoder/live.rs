//! Real-time export: play the event and record what the compositor shows.

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;

use dashview_common::clock::frame_interval;
use dashview_common::error::DashviewResult;

use crate::encoder::{EncodeStrategy, ExportContext, StrategyKind, StrategyOutcome};
use crate::progress::ExportPhase;
use crate::stall::StallAction;
use crate::sync::{PlaybackSynchronizer, StallResponse, SyncSettings, TickDecision};

/// Tick-driven live recording. Works for any duration.
#[derive(Debug, Default)]
pub struct LiveStrategy;

impl LiveStrategy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EncodeStrategy for LiveStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Live
    }

    async fn run(&mut self, ctx: &mut ExportContext<'_>) -> DashviewResult<StrategyOutcome> {
        let plan = ctx.plan;
        let preroll_start = if plan.preroll {
            (plan.start_secs - ctx.config.export.preroll_secs).max(0.0)
        } else {
            plan.start_secs
        };
        let settings = SyncSettings {
            start_secs: plan.start_secs,
            end_secs: plan.end_secs,
            trailing_margin_secs: ctx.config.export.trailing_margin_secs,
            clip_ready_max_ticks: ctx.config.export.clip_ready_max_ticks,
            step_secs: plan.step_secs(),
            preroll: preroll_start < plan.start_secs,
        };
        tracing::info!(
            start_secs = plan.start_secs,
            end_secs = plan.end_secs,
            preroll_from = preroll_start,
            fps = plan.fps,
            speed = plan.speed,
            "Starting live export"
        );

        let target = ctx.session.timeline().reverse(preroll_start);
        if let Err(e) = ctx.source.seek(target).await {
            tracing::warn!(error = %e, "Initial seek failed; relying on stall recovery");
        }
        ctx.source.set_rate(ctx.session.current_speed());
        ctx.source.play();

        let spec = plan.recorder_spec();
        ctx.recorder.start(&spec)?;

        let mut canvas = ctx.new_canvas();
        let mut sync = PlaybackSynchronizer::new(settings);
        let mut ticker = tokio::time::interval(frame_interval(plan.fps));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if ctx.cancelled() {
                ctx.source.pause();
                return Ok(StrategyOutcome::Cancelled);
            }

            let (inputs, observation) = ctx.observe();
            let outcome = sync.tick(ctx.session, observation);
            if let Some(stall) = outcome.stall {
                apply_stall(ctx, stall).await;
            }

            match outcome.decision {
                TickDecision::AwaitClip => {
                    let absolute = ctx.session.timeline().forward(observation.position);
                    ctx.composite(&mut canvas, &inputs, observation.position, absolute).await;
                }
                TickDecision::Preroll { .. } => {
                    ctx.compositor.render_black(&mut canvas);
                    ctx.progress.report(ExportPhase::Prerolling, 0.0);
                }
                TickDecision::Hold { .. } => {}
                TickDecision::Record {
                    absolute_secs,
                    position,
                } => {
                    ctx.composite(&mut canvas, &inputs, position, absolute_secs).await;
                    let frame = canvas.snapshot(absolute_secs);
                    ctx.push_frame(&frame)?;
                    ctx.progress.report_position(ExportPhase::Recording, absolute_secs);
                }
                TickDecision::LoadNextClip { clip } => {
                    tracing::debug!(clip, "Loading next clip group");
                    if let Err(e) = ctx.source.load_clip(clip).await {
                        tracing::warn!(clip, error = %e, "Clip load failed; treating as stall");
                    }
                    ctx.source.set_rate(ctx.session.current_speed());
                    ctx.source.play();
                }
                TickDecision::Complete(reason) => {
                    ctx.source.pause();
                    tracing::info!(
                        ?reason,
                        frames = ctx.session.frames_encoded(),
                        speed = ctx.session.current_speed(),
                        "Live export finished"
                    );
                    return Ok(StrategyOutcome::Finished {
                        frames: ctx.session.frames_encoded(),
                    });
                }
            }
            ctx.publish_status();
        }
    }
}

/// Carry out a ladder action against the source.
async fn apply_stall(ctx: &mut ExportContext<'_>, stall: StallResponse) {
    match stall.action {
        StallAction::ReduceSpeed { to, pause } => {
            if let Some(pause) = pause {
                ctx.source.pause();
                tokio::time::sleep(pause).await;
                ctx.source.set_rate(to);
                ctx.source.play();
            } else {
                ctx.source.set_rate(to);
            }
            ctx.publish_status();
        }
        StallAction::CorrectiveSeek | StallAction::GiveUp => {
            let Some(target) = stall.seek_to else {
                return;
            };
            tracing::debug!(
                action = ?stall.action,
                phase = ?stall.phase,
                target_secs = target,
                "Re-seeking stalled source"
            );
            let position = ctx.session.timeline().reverse(target);
            if let Err(e) = ctx.source.seek(position).await {
                tracing::warn!(error = %e, "Corrective seek failed");
            }
            ctx.source.set_rate(ctx.session.current_speed());
            ctx.source.play();
        }
    }
}
