//! Frame compositor: lays camera frames, labels, and overlays onto a canvas.
//!
//! Drawing order for one frame:
//! 1. camera slots by ascending z-order (placeholders for absent sources)
//! 2. redaction over the regions showing real frames
//! 3. slot labels
//! 4. info bar, telemetry HUD, and map inset (unless privacy mode)
//! 5. watermark per visible slot (unlicensed only)

use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use dashview_common::config::OverlayConfig;
use dashview_event_model::{
    CameraId, CameraMapping, ClipPosition, FitMode, LayoutConfig, Rect, SlotConfig, SlotId,
};

use crate::canvas::{Canvas, Rgba, TextStyle, BLACK, WHITE};
use crate::providers::{OverlayServices, SourceFrame, SourceProvider, SourceState};

const PLACEHOLDER_FILL: Rgba = [24, 24, 28, 255];
const PLACEHOLDER_TEXT: &str = "No Signal";
const LABEL_PLATE: Rgba = [0, 0, 0, 170];
const INFO_BAR_FILL: Rgba = [0, 0, 0, 180];
const WATERMARK_COLOR: Rgba = [255, 255, 255, 90];
const WATERMARK_ANGLE_DEG: f64 = -30.0;
const EDGE_MARGIN: f64 = 8.0;
/// Map inset width as a fraction of the surface width.
const MAP_WIDTH_FRACTION: f64 = 0.25;

/// What one slot shows this frame.
#[derive(Debug, Clone)]
pub struct SlotInput {
    pub slot: SlotId,
    pub camera: Option<CameraId>,
    pub label: Option<String>,
    pub state: SourceState,
    pub frame: Option<SourceFrame>,
}

impl SlotInput {
    fn has_picture(&self) -> bool {
        self.state == SourceState::Ready && self.frame.is_some()
    }
}

/// Per-slot source snapshot taken before compositing.
#[derive(Debug, Clone, Default)]
pub struct FrameInputs {
    pub slots: Vec<SlotInput>,
}

impl FrameInputs {
    /// Sample every visible slot's camera from `source`.
    pub fn collect(
        source: &dyn SourceProvider,
        layout: &LayoutConfig,
        mapping: &CameraMapping,
        labels: &BTreeMap<CameraId, String>,
    ) -> Self {
        let slots = layout
            .slots
            .iter()
            .filter(|slot| slot.visible)
            .map(|slot| {
                let camera = mapping.camera_for(&slot.id).cloned();
                let state = camera
                    .as_ref()
                    .map_or(SourceState::Missing, |c| source.camera_state(c));
                let frame = match (&camera, state) {
                    (Some(c), SourceState::Ready) => source.frame(c),
                    _ => None,
                };
                let label = camera
                    .as_ref()
                    .map(|c| labels.get(c).cloned().unwrap_or_else(|| c.to_string()));
                SlotInput {
                    slot: slot.id.clone(),
                    camera,
                    label,
                    state,
                    frame,
                }
            })
            .collect();
        Self { slots }
    }

    pub fn get(&self, slot: &SlotId) -> Option<&SlotInput> {
        self.slots.iter().find(|input| &input.slot == slot)
    }

    /// Every slot with a camera has a frame for the current position.
    /// Slots whose camera is absent from the clip group are ignored.
    pub fn all_ready(&self) -> bool {
        self.slots
            .iter()
            .filter(|input| input.camera.is_some() && input.state != SourceState::Missing)
            .all(SlotInput::has_picture)
    }
}

/// Timing and policy for one composited frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub position: ClipPosition,
    pub absolute_secs: f64,
    pub clip_created_at: Option<NaiveDateTime>,
    pub fps: u32,
    /// Info bar, HUD, and map inset.
    pub overlays_enabled: bool,
    pub watermark: bool,
}

/// Counts of what was drawn, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeReport {
    pub frames_drawn: usize,
    pub placeholders: usize,
    pub labels_drawn: usize,
    pub labels_omitted: usize,
    pub watermarks: usize,
    pub geometry_rebuilt: bool,
}

/// Resolved geometry for one visible slot.
#[derive(Debug, Clone, PartialEq)]
struct SlotPlan {
    slot: SlotId,
    z_order: i32,
    bounds: Rect,
    /// Source crop, when the source size is known.
    src: Option<Rect>,
    dst: Rect,
}

#[derive(Debug, Clone, PartialEq)]
struct GeometryKey {
    layout: LayoutConfig,
    mapping: CameraMapping,
    sizes: Vec<Option<(u32, u32)>>,
}

#[derive(Debug)]
struct GeometryCache {
    key: GeometryKey,
    plans: Vec<SlotPlan>,
}

fn plan_slot(slot: &SlotConfig, size: Option<(u32, u32)>) -> SlotPlan {
    let (src, dst) = match size {
        Some((w, h)) if w > 0 && h > 0 => {
            let src = slot.crop.crop_rect(w, h);
            let dst = match slot.fit {
                FitMode::Stretch => slot.rect,
                FitMode::Contain => slot.rect.fit_contain(src.w, src.h),
            };
            (Some(src), dst)
        }
        _ => (None, slot.rect),
    };
    SlotPlan {
        slot: slot.id.clone(),
        z_order: slot.z_order,
        bounds: slot.rect,
        src,
        dst,
    }
}

/// Stateful compositor; keeps slot geometry between frames.
#[derive(Debug)]
pub struct Compositor {
    overlay: OverlayConfig,
    services: OverlayServices,
    geometry: Option<GeometryCache>,
}

impl Compositor {
    pub fn new(overlay: OverlayConfig, services: OverlayServices) -> Self {
        Self {
            overlay,
            services,
            geometry: None,
        }
    }

    /// Fill the surface with black (pre-roll frames).
    pub fn render_black(&self, canvas: &mut dyn Canvas) {
        canvas.clear(BLACK);
    }

    /// Returns `true` when the cached plans were rebuilt.
    fn refresh_geometry(&mut self, layout: &LayoutConfig, mapping: &CameraMapping, inputs: &FrameInputs) -> bool {
        let ordered = layout.visible_slots_by_z();
        let sizes: Vec<Option<(u32, u32)>> = ordered
            .iter()
            .map(|slot| {
                inputs
                    .get(&slot.id)
                    .and_then(|input| input.frame.as_ref())
                    .map(|frame| (frame.width, frame.height))
            })
            .collect();

        if let Some(cache) = &self.geometry {
            if cache.key.sizes == sizes && cache.key.mapping == *mapping && cache.key.layout == *layout {
                return false;
            }
        }

        let plans = ordered
            .iter()
            .zip(&sizes)
            .map(|(slot, size)| plan_slot(slot, *size))
            .collect();
        tracing::debug!(slots = ordered.len(), "Rebuilt slot geometry");
        self.geometry = Some(GeometryCache {
            key: GeometryKey {
                layout: layout.clone(),
                mapping: mapping.clone(),
                sizes,
            },
            plans,
        });
        true
    }

    /// Composite one frame.
    pub async fn render(
        &mut self,
        canvas: &mut dyn Canvas,
        layout: &LayoutConfig,
        mapping: &CameraMapping,
        inputs: &FrameInputs,
        ctx: &FrameContext,
    ) -> CompositeReport {
        let mut report = CompositeReport {
            geometry_rebuilt: self.refresh_geometry(layout, mapping, inputs),
            ..Default::default()
        };
        let plans = match &self.geometry {
            Some(cache) => cache.plans.clone(),
            None => Vec::new(),
        };

        canvas.clear(BLACK);

        let mut regions = Vec::new();
        for plan in &plans {
            let input = inputs.get(&plan.slot);
            match (input.filter(|i| i.has_picture()).and_then(|i| i.frame.as_ref()), plan.src) {
                (Some(frame), Some(src)) => {
                    canvas.draw_frame(frame, src, plan.dst);
                    regions.push(plan.dst);
                    report.frames_drawn += 1;
                }
                _ => {
                    self.draw_placeholder(canvas, plan.dst);
                    report.placeholders += 1;
                }
            }
        }

        if let Some(redaction) = &self.services.redaction {
            if !regions.is_empty() {
                if let Err(e) = redaction.process(canvas, &regions).await {
                    tracing::debug!(error = %e, "Redaction failed; frame left unredacted");
                }
            }
        }

        for (index, plan) in plans.iter().enumerate() {
            let Some(label) = inputs.get(&plan.slot).and_then(|i| i.label.as_deref()) else {
                continue;
            };
            let occluders: Vec<Rect> = plans[index + 1..]
                .iter()
                .filter(|other| other.z_order > plan.z_order)
                .map(|other| other.bounds)
                .collect();
            if self.draw_label(canvas, label, plan.bounds, &occluders) {
                report.labels_drawn += 1;
            } else {
                report.labels_omitted += 1;
            }
        }

        if ctx.overlays_enabled {
            self.draw_info_bar(canvas, ctx);
            self.draw_telemetry(canvas, ctx);
        }

        if ctx.watermark {
            for plan in &plans {
                self.draw_watermark(canvas, plan.dst);
                report.watermarks += 1;
            }
        }

        report
    }

    fn draw_placeholder(&self, canvas: &mut dyn Canvas, rect: Rect) {
        canvas.fill_rect(rect, PLACEHOLDER_FILL);
        let style = TextStyle::plain(self.overlay.label_font_px, [160, 160, 160, 255]);
        let (w, h) = canvas.text_plate_size(PLACEHOLDER_TEXT, &style);
        let (cx, cy) = rect.center();
        canvas.draw_text(PLACEHOLDER_TEXT, cx - w / 2.0, cy - h / 2.0, &style);
    }

    /// Draw `label` in the first free corner of `bounds`.
    /// Returns `false` when every corner is covered by a higher slot.
    fn draw_label(&self, canvas: &mut dyn Canvas, label: &str, bounds: Rect, occluders: &[Rect]) -> bool {
        let style = TextStyle::plated(self.overlay.label_font_px, WHITE, LABEL_PLATE, 4.0);
        let (w, h) = canvas.text_plate_size(label, &style);
        let left = bounds.x + EDGE_MARGIN;
        let right = bounds.right() - EDGE_MARGIN - w;
        let top = bounds.y + EDGE_MARGIN;
        let bottom = bounds.bottom() - EDGE_MARGIN - h;
        let corners = [(left, top), (right, top), (left, bottom), (right, bottom)];

        let free = corners.into_iter().find(|(x, y)| {
            let plate = Rect::new(*x, *y, w, h);
            !occluders.iter().any(|o| o.intersects(&plate))
        });
        match free {
            Some((x, y)) => {
                canvas.draw_text(label, x, y, &style);
                true
            }
            None => false,
        }
    }

    fn info_bar_rect(&self, canvas: &dyn Canvas) -> Rect {
        let height = (self.overlay.info_bar_height as f64).min(canvas.height() as f64);
        Rect::new(0.0, canvas.height() as f64 - height, canvas.width() as f64, height)
    }

    fn draw_info_bar(&self, canvas: &mut dyn Canvas, ctx: &FrameContext) {
        let bar = self.info_bar_rect(canvas);
        canvas.fill_rect(bar, INFO_BAR_FILL);

        let size = (bar.h * 0.5).max(8.0) as f32;
        let style = TextStyle::plain(size, WHITE);
        let text = format_timestamp(ctx.clip_created_at, ctx.position.intra_secs, ctx.absolute_secs, ctx.fps);
        let (_, text_h) = canvas.measure_text(&text, size);
        let y = bar.y + (bar.h - text_h) / 2.0;
        canvas.draw_text(&text, bar.x + EDGE_MARGIN, y, &style);

        if let Some(branding) = self.overlay.branding.as_deref() {
            let (w, _) = canvas.measure_text(branding, size);
            canvas.draw_text(branding, bar.right() - EDGE_MARGIN - w, y, &style);
        }
    }

    fn draw_telemetry(&self, canvas: &mut dyn Canvas, ctx: &FrameContext) {
        let Some(telemetry) = &self.services.telemetry else {
            return;
        };
        let Some(sample) = telemetry.sample(ctx.position.index, ctx.position.intra_secs) else {
            return;
        };
        let bar = self.info_bar_rect(canvas);

        let hud = sample.hud_line();
        if !hud.is_empty() {
            let style = TextStyle::plated(self.overlay.label_font_px, WHITE, LABEL_PLATE, 4.0);
            let (_, h) = canvas.text_plate_size(&hud, &style);
            canvas.draw_text(&hud, EDGE_MARGIN, bar.y - EDGE_MARGIN - h, &style);
        }

        if let (Some(map), Some(position)) = (&self.services.map, sample.position) {
            let w = (canvas.width() as f64 * MAP_WIDTH_FRACTION).round();
            let h = (w * 3.0 / 4.0).round();
            let rect = Rect::new(
                canvas.width() as f64 - EDGE_MARGIN - w,
                bar.y - EDGE_MARGIN - h,
                w,
                h,
            );
            if let Err(e) = map.render(canvas, rect, position) {
                tracing::debug!(error = %e, "Map inset failed; skipped");
            }
        }
    }

    fn draw_watermark(&self, canvas: &mut dyn Canvas, dst: Rect) {
        let text = self.overlay.watermark_text.as_str();
        let chars = text.chars().count().max(1) as f64;
        let size = (dst.w * 0.7 / (chars * 0.6)).clamp(12.0, 96.0) as f32;
        let style = TextStyle::plain(size, WATERMARK_COLOR);
        canvas.draw_rotated_text(text, dst.center(), WATERMARK_ANGLE_DEG, &style);
    }
}

/// Info-bar timestamp: clip creation time plus `intra_secs`, formatted
/// `YYYY-MM-DD HH:MM:SS.FF` where `FF` is the frame index within the
/// second at `fps`. Without a creation time, falls back to elapsed event
/// time as `T+HH:MM:SS.FF`.
pub fn format_timestamp(
    created_at: Option<NaiveDateTime>,
    intra_secs: f64,
    absolute_secs: f64,
    fps: u32,
) -> String {
    let frame_in_second = |secs: f64| -> u32 {
        let fps = fps.max(1);
        ((secs.max(0.0).fract() * fps as f64).floor() as u32).min(fps - 1)
    };
    match created_at {
        Some(created) => {
            let whole = chrono::Duration::seconds(intra_secs.max(0.0).floor() as i64);
            let at = created + whole;
            format!("{}.{:02}", at.format("%Y-%m-%d %H:%M:%S"), frame_in_second(intra_secs))
        }
        None => {
            let total = absolute_secs.max(0.0).floor() as u64;
            format!(
                "T+{:02}:{:02}:{:02}.{:02}",
                total / 3600,
                (total / 60) % 60,
                total % 60,
                frame_in_second(absolute_secs)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use dashview_event_model::{CropMargins, GeoPosition, TelemetrySample};

    use crate::canvas::{DisplayList, DrawOp};
    use crate::providers::{MapOverlayProvider, RedactionProvider, TelemetryProvider};

    fn grid() -> (LayoutConfig, CameraMapping) {
        let layout = LayoutConfig::grid(1280, 960, &["front", "back", "left", "right"]);
        let mapping = CameraMapping::identity(&layout);
        (layout, mapping)
    }

    fn input(slot: &str, state: SourceState) -> SlotInput {
        SlotInput {
            slot: SlotId::new(slot),
            camera: Some(CameraId::new(slot)),
            label: Some(slot.to_string()),
            state,
            frame: (state == SourceState::Ready).then(|| SourceFrame::solid(64, 48, [90, 90, 90, 255])),
        }
    }

    fn all_ready(layout: &LayoutConfig) -> FrameInputs {
        FrameInputs {
            slots: layout
                .slots
                .iter()
                .map(|s| input(s.id.as_str(), SourceState::Ready))
                .collect(),
        }
    }

    fn ctx(overlays: bool, watermark: bool) -> FrameContext {
        FrameContext {
            position: ClipPosition::new(0, 5.5),
            absolute_secs: 5.5,
            clip_created_at: NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(12, 30, 0)),
            fps: 30,
            overlays_enabled: overlays,
            watermark,
        }
    }

    fn compositor(services: OverlayServices) -> Compositor {
        Compositor::new(OverlayConfig::default(), services)
    }

    #[tokio::test]
    async fn test_watermark_on_every_visible_slot_when_unlicensed() {
        let (layout, mapping) = grid();
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());

        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(true, true)).await;
        assert_eq!(report.watermarks, 4);
        let dsts = canvas.frame_destinations();
        let centers: Vec<(f64, f64)> = canvas.rotated_texts().map(|(_, c)| c).collect();
        assert_eq!(centers.len(), 4);
        for dst in dsts {
            assert!(centers.contains(&dst.center()));
        }

        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(true, false)).await;
        assert_eq!(report.watermarks, 0);
        assert_eq!(canvas.rotated_texts().count(), 0);
    }

    #[tokio::test]
    async fn test_hidden_slot_gets_no_watermark() {
        let (mut layout, mapping) = grid();
        layout.slots[3].visible = false;
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, true)).await;
        assert_eq!(report.watermarks, 3);
    }

    #[tokio::test]
    async fn test_absent_sources_get_placeholders() {
        let (layout, mapping) = grid();
        let inputs = FrameInputs {
            slots: vec![
                input("front", SourceState::Ready),
                input("back", SourceState::Missing),
                input("left", SourceState::Loading),
                input("right", SourceState::Ended),
            ],
        };
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        assert_eq!(report.frames_drawn, 1);
        assert_eq!(report.placeholders, 3);
        assert_eq!(canvas.texts().filter(|(t, _, _)| *t == PLACEHOLDER_TEXT).count(), 3);
        assert!(!inputs.all_ready());
    }

    #[tokio::test]
    async fn test_contain_fit_letterboxes_frame() {
        let layout = LayoutConfig::single(400, 400, "front");
        let mapping = CameraMapping::identity(&layout);
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(400, 400);
        comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        assert_eq!(canvas.frame_destinations(), vec![Rect::new(0.0, 50.0, 400.0, 300.0)]);
    }

    #[tokio::test]
    async fn test_crop_and_stretch() {
        let mut layout = LayoutConfig::single(400, 400, "front");
        layout.slots[0].fit = FitMode::Stretch;
        layout.slots[0].crop = CropMargins {
            top: 0.0,
            right: 50.0,
            bottom: 0.0,
            left: 0.0,
        };
        let mapping = CameraMapping::identity(&layout);
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(400, 400);
        comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        let frame_op = canvas.ops.iter().find_map(|op| match op {
            DrawOp::Frame { src, dst } => Some((*src, *dst)),
            _ => None,
        });
        assert_eq!(
            frame_op,
            Some((Rect::new(0.0, 0.0, 32.0, 48.0), Rect::new(0.0, 0.0, 400.0, 400.0)))
        );
    }

    fn pip_layout(pip: Rect) -> (LayoutConfig, CameraMapping) {
        let mut layout = LayoutConfig::single(1280, 960, "front");
        layout.slots.push(SlotConfig {
            id: SlotId::new("back"),
            rect: pip,
            crop: CropMargins::NONE,
            fit: FitMode::Stretch,
            visible: true,
            z_order: 1,
        });
        let mapping = CameraMapping::identity(&layout);
        (layout, mapping)
    }

    #[tokio::test]
    async fn test_label_moves_away_from_higher_slot() {
        let (layout, mapping) = pip_layout(Rect::new(0.0, 0.0, 320.0, 240.0));
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        assert_eq!(report.labels_drawn, 2);
        let (_, x, y) = canvas
            .texts()
            .find(|(t, _, _)| *t == "front")
            .expect("front label");
        assert!(x > 640.0, "expected top-right, got x={x}");
        assert_eq!(y, EDGE_MARGIN);
    }

    #[tokio::test]
    async fn test_label_omitted_when_fully_occluded() {
        let (layout, mapping) = pip_layout(Rect::new(0.0, 0.0, 1280.0, 960.0));
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        assert_eq!(report.labels_drawn, 1);
        assert_eq!(report.labels_omitted, 1);
        assert!(canvas.texts().all(|(t, _, _)| t != "front"));
    }

    struct FixedTelemetry;

    impl TelemetryProvider for FixedTelemetry {
        fn sample(&self, _clip: usize, _intra_secs: f64) -> Option<TelemetrySample> {
            Some(TelemetrySample {
                position: Some(GeoPosition {
                    latitude: 37.0,
                    longitude: -122.0,
                }),
                heading_deg: Some(90.0),
                speed_mps: Some(20.0),
                ..Default::default()
            })
        }
    }

    struct FailingMap(Arc<Mutex<Vec<Rect>>>);

    impl MapOverlayProvider for FailingMap {
        fn render(&self, _canvas: &mut dyn Canvas, rect: Rect, _position: GeoPosition) -> anyhow::Result<()> {
            if let Ok(mut calls) = self.0.lock() {
                calls.push(rect);
            }
            anyhow::bail!("tile server unreachable")
        }
    }

    #[tokio::test]
    async fn test_overlays_drawn_unless_privacy() {
        let (layout, mapping) = grid();
        let inputs = all_ready(&layout);
        let map_calls = Arc::new(Mutex::new(Vec::new()));
        let services = OverlayServices {
            telemetry: Some(Arc::new(FixedTelemetry)),
            map: Some(Arc::new(FailingMap(Arc::clone(&map_calls)))),
            redaction: None,
        };
        let mut comp = compositor(services);

        let mut canvas = DisplayList::new(1280, 960);
        comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(true, false)).await;
        let texts: Vec<String> = canvas.texts().map(|(t, _, _)| t.to_string()).collect();
        assert!(texts.contains(&"2024-05-01 12:30:05.15".to_string()));
        assert!(texts.iter().any(|t| t.starts_with("72 km/h")));
        let calls = map_calls.lock().map(|c| c.clone()).unwrap_or_default();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].w, 320.0);
        assert_eq!(calls[0].h, 240.0);

        let mut canvas = DisplayList::new(1280, 960);
        comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        let texts: Vec<&str> = canvas.texts().map(|(t, _, _)| t).collect();
        assert!(texts.iter().all(|t| !t.starts_with("2024-05-01")));
        assert!(texts.iter().all(|t| !t.contains("km/h")));
    }

    struct RecordingRedaction(Arc<Mutex<Vec<usize>>>);

    #[async_trait]
    impl RedactionProvider for RecordingRedaction {
        async fn process(&self, _canvas: &mut dyn Canvas, regions: &[Rect]) -> anyhow::Result<()> {
            if let Ok(mut calls) = self.0.lock() {
                calls.push(regions.len());
            }
            anyhow::bail!("detector unavailable")
        }
    }

    #[tokio::test]
    async fn test_redaction_receives_real_frame_regions_only() {
        let (layout, mapping) = grid();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let services = OverlayServices {
            redaction: Some(Arc::new(RecordingRedaction(Arc::clone(&calls)))),
            ..Default::default()
        };
        let mut comp = compositor(services);
        let inputs = FrameInputs {
            slots: vec![
                input("front", SourceState::Ready),
                input("back", SourceState::Ready),
                input("left", SourceState::Missing),
                input("right", SourceState::Loading),
            ],
        };
        let mut canvas = DisplayList::new(1280, 960);
        let report = comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await;
        assert_eq!(report.frames_drawn, 2);
        assert_eq!(calls.lock().map(|c| c.clone()).unwrap_or_default(), vec![2]);
    }

    #[tokio::test]
    async fn test_geometry_cached_until_inputs_change() {
        let (layout, mut mapping) = grid();
        let inputs = all_ready(&layout);
        let mut comp = compositor(OverlayServices::default());
        let mut canvas = DisplayList::new(1280, 960);
        assert!(comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await.geometry_rebuilt);
        assert!(!comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await.geometry_rebuilt);

        mapping.swap(&SlotId::new("front"), &SlotId::new("back"));
        assert!(comp.render(&mut canvas, &layout, &mapping, &inputs, &ctx(false, false)).await.geometry_rebuilt);

        let mut resized = inputs.clone();
        resized.slots[0].frame = Some(SourceFrame::solid(32, 32, WHITE));
        assert!(comp.render(&mut canvas, &layout, &mapping, &resized, &ctx(false, false)).await.geometry_rebuilt);
    }

    #[test]
    fn test_timestamp_formatting() {
        let created = NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(23, 59, 59));
        assert_eq!(format_timestamp(created, 1.5, 61.5, 30), "2024-05-02 00:00:00.15");
        assert_eq!(format_timestamp(created, 0.999, 0.999, 30), "2024-05-01 23:59:59.29");
        assert_eq!(format_timestamp(None, 0.0, 3725.25, 24), "T+01:02:05.06");
    }
}
