//! Export session controller: the public entry point.
//!
//! At most one export runs per engine. `start` validates and gates the
//! request, resolves the clip timeline, picks a strategy, runs it, and
//! assembles the output once the recorder has finalized.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use dashview_common::config::AppConfig;
use dashview_common::error::{DashviewError, DashviewResult};
use dashview_event_model::{CameraId, ExportOptions};

use crate::compositor::Compositor;
use crate::encoder::{select_strategy, ExportContext, RecorderFactory, RenderPlan, StrategyOutcome};
use crate::naming::output_file_name;
use crate::progress::{ExportPhase, ProgressCallback, ProgressReporter};
use crate::providers::{LayoutProvider, Licensed, LicensingProvider, OverlayServices, SourceProvider};
use crate::resolver::ClipTimeline;
use crate::session::{ExportSession, SessionState};

/// Snapshot of the engine's export state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportStatus {
    pub exporting: bool,
    pub speed_reduced: bool,
    pub current_speed: f64,
    pub original_speed: f64,
    pub started_at: Option<DateTime<Utc>>,
    /// Frames held in memory by the buffered strategies.
    pub buffered_frames: usize,
}

impl Default for ExportStatus {
    fn default() -> Self {
        Self {
            exporting: false,
            speed_reduced: false,
            current_speed: 1.0,
            original_speed: 1.0,
            started_at: None,
            buffered_frames: 0,
        }
    }
}

/// A finished export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutput {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub frame_count: u64,
    /// Seconds of output video.
    pub duration_secs: f64,
    /// Some frames were produced from stalled or late sources.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed(ExportOutput),
    Cancelled,
}

/// How the surface and cameras are chosen for one export.
pub(crate) enum Target {
    Layout,
    SingleCamera(CameraId),
}

/// Clears the in-progress flag when the export ends, however it ends.
struct ExportGuard<'a> {
    exporting: &'a AtomicBool,
    status: &'a Mutex<ExportStatus>,
}

impl<'a> ExportGuard<'a> {
    /// Claim the engine and clear any cancel request left by a previous
    /// export. Cancels issued after this returns stick.
    fn acquire(
        exporting: &'a AtomicBool,
        cancel: &AtomicBool,
        status: &'a Mutex<ExportStatus>,
    ) -> DashviewResult<Self> {
        exporting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DashviewError::AlreadyInProgress)?;
        cancel.store(false, Ordering::Release);
        Ok(Self { exporting, status })
    }
}

impl Drop for ExportGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut status) = self.status.lock() {
            status.exporting = false;
            status.buffered_frames = 0;
        }
        self.exporting.store(false, Ordering::Release);
    }
}

/// Multi-camera export engine.
pub struct ExportEngine {
    source: tokio::sync::Mutex<Box<dyn SourceProvider>>,
    layout: Arc<dyn LayoutProvider>,
    services: OverlayServices,
    licensing: Arc<dyn LicensingProvider>,
    recorders: Arc<dyn RecorderFactory>,
    config: AppConfig,
    font: Option<Vec<u8>>,
    exporting: AtomicBool,
    cancel: Arc<AtomicBool>,
    status: Arc<Mutex<ExportStatus>>,
}

impl std::fmt::Debug for ExportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportEngine")
            .field("services", &self.services)
            .field("exporting", &self.exporting.load(Ordering::Relaxed))
            .finish()
    }
}

impl ExportEngine {
    pub fn new(
        source: Box<dyn SourceProvider>,
        layout: Arc<dyn LayoutProvider>,
        recorders: Arc<dyn RecorderFactory>,
        config: AppConfig,
    ) -> Self {
        let font = config.overlay.font_path.as_ref().and_then(|path| match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Overlay font not loaded");
                None
            }
        });
        Self {
            source: tokio::sync::Mutex::new(source),
            layout,
            services: OverlayServices::default(),
            licensing: Arc::new(Licensed),
            recorders,
            config,
            font,
            exporting: AtomicBool::new(false),
            cancel: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(ExportStatus::default())),
        }
    }

    pub fn with_overlays(mut self, services: OverlayServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_licensing(mut self, licensing: Arc<dyn LicensingProvider>) -> Self {
        self.licensing = licensing;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn status(&self) -> ExportStatus {
        self.status.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn is_exporting(&self) -> bool {
        self.exporting.load(Ordering::Acquire)
    }

    /// Ask the running export to stop at its next suspension point.
    pub fn cancel(&self) {
        if self.is_exporting() {
            tracing::info!("Export cancellation requested");
            self.cancel.store(true, Ordering::Release);
        }
    }

    /// Shared flag that cancels the running export when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Export the current layout.
    pub async fn start(
        &self,
        options: ExportOptions,
        progress: Option<ProgressCallback>,
    ) -> DashviewResult<ExportOutcome> {
        self.run(Target::Layout, options, progress).await
    }

    pub(crate) async fn run(
        &self,
        target: Target,
        options: ExportOptions,
        progress: Option<ProgressCallback>,
    ) -> DashviewResult<ExportOutcome> {
        let _guard = ExportGuard::acquire(&self.exporting, &self.cancel, &self.status)?;
        options
            .validate()
            .map_err(|e| DashviewError::invalid_options(e.to_string()))?;

        let mut locked = self.source.lock().await;
        let source: &mut dyn SourceProvider = &mut **locked;
        let cameras = source.cameras();
        if cameras.is_empty() || source.clip_count() == 0 {
            return Err(DashviewError::NoSourceLoaded);
        }
        if let Target::SingleCamera(camera) = &target {
            if !cameras.contains(camera) {
                return Err(DashviewError::invalid_options(format!(
                    "camera {camera} is not part of this event"
                )));
            }
        }
        self.licensing
            .authorize_export()
            .map_err(DashviewError::access_denied)?;

        tracing::info!(
            format = ?options.format,
            fps = options.fps,
            speed = options.speed,
            strategy = ?options.strategy,
            "Starting export"
        );

        let timeline = ClipTimeline::probe(source, self.config.export.nominal_clip_secs).await;
        let (start_secs, end_secs) = options.resolved_range(timeline.total_secs());
        if end_secs <= start_secs {
            return Err(DashviewError::invalid_options(format!(
                "range {start_secs:.2}..{end_secs:.2} is empty for an event of {:.2} s",
                timeline.total_secs()
            )));
        }

        let mut plan = self.plan(&target, &*source, &options, start_secs, end_secs);
        let mut strategy = select_strategy(&plan, options.strategy, &self.config)?;
        strategy.adjust_plan(&mut plan, &self.config);
        let mut recorder = self.recorders.create(plan.format)?;

        let mut session = ExportSession::new(timeline, plan.speed, self.config.stall.clone());
        if let Ok(mut status) = self.status.lock() {
            *status = ExportStatus {
                exporting: true,
                speed_reduced: false,
                current_speed: plan.speed,
                original_speed: plan.speed,
                started_at: Some(session.started_at()),
                buffered_frames: 0,
            };
        }

        let mut reporter = ProgressReporter::new(
            progress,
            self.config.export.progress_hz,
            plan.start_secs,
            plan.duration_secs(),
        );
        reporter.report(ExportPhase::Preparing, 0.0);
        let mut compositor = Compositor::new(self.config.overlay.clone(), self.services.clone());

        tracing::info!(
            strategy = ?strategy.kind(),
            width = plan.layout.width,
            height = plan.layout.height,
            frames = plan.frame_count(),
            output_secs = plan.output_duration_secs(),
            start_secs = plan.start_secs,
            end_secs = plan.end_secs,
            "Export plan ready"
        );

        let result = {
            let mut ctx = ExportContext {
                source: &mut *source,
                session: &mut session,
                plan: &plan,
                compositor: &mut compositor,
                recorder: recorder.as_mut(),
                progress: &mut reporter,
                config: &self.config,
                cancel: &self.cancel,
                status: &self.status,
                font: self.font.as_deref(),
            };
            strategy.run(&mut ctx).await
        };
        source.pause();

        match result {
            Ok(StrategyOutcome::Finished { frames }) => match recorder.finish() {
                Ok(chunks) => {
                    session.append_chunks(chunks);
                    session.set_state(SessionState::Idle);
                    let bytes = session.take_output();
                    reporter.finish();
                    let output = ExportOutput {
                        file_name: output_file_name(
                            source.event_started_at(),
                            &plan.cameras,
                            plan.speed,
                            plan.format,
                        ),
                        mime_type: plan.format.mime_type().to_string(),
                        bytes,
                        frame_count: frames,
                        duration_secs: frames as f64 / plan.fps as f64,
                        degraded: session.is_degraded(),
                    };
                    tracing::info!(
                        file_name = %output.file_name,
                        bytes = output.bytes.len(),
                        frames,
                        degraded = output.degraded,
                        final_speed = session.current_speed(),
                        elapsed_secs = session.clock().elapsed_secs(),
                        "Export complete"
                    );
                    Ok(ExportOutcome::Completed(output))
                }
                Err(e) => {
                    session.discard_output();
                    session.set_state(SessionState::Error);
                    tracing::error!(error = %e, "Encoder failed to finalize");
                    Err(e)
                }
            },
            Ok(StrategyOutcome::Cancelled) => {
                recorder.abort();
                session.discard_output();
                session.set_state(SessionState::Cancelled);
                tracing::info!(frames = session.frames_encoded(), "Export cancelled");
                Ok(ExportOutcome::Cancelled)
            }
            Err(e) => {
                recorder.abort();
                session.discard_output();
                session.set_state(SessionState::Error);
                tracing::error!(error = %e, frames = session.frames_encoded(), "Export failed");
                Err(e)
            }
        }
    }

    fn plan(
        &self,
        target: &Target,
        source: &dyn SourceProvider,
        options: &ExportOptions,
        start_secs: f64,
        end_secs: f64,
    ) -> RenderPlan {
        let (layout, mapping, preroll) = match target {
            Target::Layout => (self.layout.layout(), self.layout.camera_mapping(), true),
            Target::SingleCamera(camera) => {
                let (layout, mapping) = crate::single_camera::single_layout(source, camera);
                (layout, mapping, false)
            }
        };

        let mut cameras: Vec<CameraId> = Vec::new();
        for slot in layout.visible_slots_by_z() {
            if let Some(camera) = mapping.camera_for(&slot.id) {
                if !cameras.contains(camera) {
                    cameras.push(camera.clone());
                }
            }
        }
        cameras.sort_by_key(|c| {
            layout
                .slots
                .iter()
                .position(|s| mapping.camera_for(&s.id) == Some(c))
                .unwrap_or(usize::MAX)
        });
        let labels: BTreeMap<CameraId, String> = cameras
            .iter()
            .map(|c| (c.clone(), self.layout.camera_label(c)))
            .collect();

        RenderPlan {
            layout,
            mapping,
            labels,
            cameras,
            start_secs,
            end_secs,
            fps: options.fps,
            speed: options.speed,
            preroll,
            format: options.format,
            quality: options.quality,
            overlays_enabled: options.overlays_enabled(),
            watermark: self.licensing.should_watermark(),
        }
    }
}
