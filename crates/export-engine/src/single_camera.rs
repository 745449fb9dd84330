//! Single-camera export at the camera's native resolution.

use dashview_common::error::DashviewResult;
use dashview_event_model::{CameraId, CameraMapping, ExportOptions, LayoutConfig, SlotId};

use crate::controller::{ExportEngine, ExportOutcome, Target};
use crate::progress::ProgressCallback;
use crate::providers::SourceProvider;

/// Surface size used when the source cannot report one.
pub const DEFAULT_NATIVE_SIZE: (u32, u32) = (1280, 960);

/// Full-surface layout showing only `camera`, sized to its frames.
pub(crate) fn single_layout(source: &dyn SourceProvider, camera: &CameraId) -> (LayoutConfig, CameraMapping) {
    let (width, height) = source
        .native_size(camera)
        .filter(|(w, h)| *w > 0 && *h > 0)
        .unwrap_or(DEFAULT_NATIVE_SIZE);
    // Even dimensions for yuv420p encoders.
    let width = (width / 2 * 2).max(2);
    let height = (height / 2 * 2).max(2);

    let layout = LayoutConfig::single(width, height, camera.as_str());
    let mut mapping = CameraMapping::new();
    mapping.assign(SlotId::new(camera.as_str()), camera.clone());
    (layout, mapping)
}

impl ExportEngine {
    /// Export one camera without the multi-camera layout.
    ///
    /// Playback seeks straight to the range start (no pre-roll). Label,
    /// info bar, HUD, and watermark rules are the same as for `start`.
    pub async fn start_single(
        &self,
        camera: CameraId,
        options: ExportOptions,
        progress: Option<ProgressCallback>,
    ) -> DashviewResult<ExportOutcome> {
        self.run(Target::SingleCamera(camera), options, progress).await
    }
}
