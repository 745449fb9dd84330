//! Layout configuration: where each camera slot lands on the output surface.
//!
//! Slot geometry and camera assignment are kept apart. A [`LayoutConfig`]
//! says where slot `"top-left"` is drawn; a [`CameraMapping`] says which
//! camera currently feeds it, so the user can reorder cameras without
//! touching geometry.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// Identifier of a physical camera (e.g. `"front"`, `"left_repeater"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub String);

/// Identifier of a layout position (e.g. `"top-left"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub String);

impl CameraId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SlotId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CameraId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SlotId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How a cropped source maps into its destination rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fill the destination, ignoring aspect ratio.
    #[default]
    Stretch,
    /// Preserve aspect ratio, centered with bars.
    Contain,
}

/// Crop margins as percentages of the source dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CropMargins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// Smallest share of a source dimension a crop may leave (percent).
const MIN_CROP_REMAINDER_PCT: f64 = 1.0;

impl CropMargins {
    pub const NONE: CropMargins = CropMargins {
        top: 0.0,
        right: 0.0,
        bottom: 0.0,
        left: 0.0,
    };

    /// Source-pixel crop rectangle for a `src_w` x `src_h` frame.
    ///
    /// Margins are clamped to `[0, 100]`; opposing margins that would
    /// leave less than 1% are scaled down proportionally.
    pub fn crop_rect(&self, src_w: u32, src_h: u32) -> Rect {
        let (left, right) = clamp_pair(self.left, self.right);
        let (top, bottom) = clamp_pair(self.top, self.bottom);
        let w = src_w as f64;
        let h = src_h as f64;
        Rect::new(
            w * left / 100.0,
            h * top / 100.0,
            w * (100.0 - left - right) / 100.0,
            h * (100.0 - top - bottom) / 100.0,
        )
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

fn clamp_pair(a: f64, b: f64) -> (f64, f64) {
    let a = if a.is_finite() { a.clamp(0.0, 100.0) } else { 0.0 };
    let b = if b.is_finite() { b.clamp(0.0, 100.0) } else { 0.0 };
    let budget = 100.0 - MIN_CROP_REMAINDER_PCT;
    let sum = a + b;
    if sum > budget {
        let k = budget / sum;
        (a * k, b * k)
    } else {
        (a, b)
    }
}

/// A single named position in the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub id: SlotId,

    /// Destination rectangle in surface pixels.
    pub rect: Rect,

    #[serde(default)]
    pub crop: CropMargins,

    #[serde(default)]
    pub fit: FitMode,

    #[serde(default = "default_visible")]
    pub visible: bool,

    /// Drawing order; lower values are drawn first.
    #[serde(default)]
    pub z_order: i32,
}

fn default_visible() -> bool {
    true
}

/// Surface size plus slot geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: f64,
    pub slots: Vec<SlotConfig>,
}

impl LayoutConfig {
    pub fn new(width: u32, height: u32, slots: Vec<SlotConfig>) -> Self {
        Self {
            width,
            height,
            aspect_ratio: width as f64 / height.max(1) as f64,
            slots,
        }
    }

    /// Evenly divided grid with one slot per id, row-major.
    pub fn grid(width: u32, height: u32, slot_ids: &[&str]) -> Self {
        let n = slot_ids.len().max(1);
        let cols = (n as f64).sqrt().ceil() as usize;
        let rows = n.div_ceil(cols);
        let cell_w = width as f64 / cols as f64;
        let cell_h = height as f64 / rows as f64;
        let slots = slot_ids
            .iter()
            .enumerate()
            .map(|(i, id)| SlotConfig {
                id: SlotId::new(*id),
                rect: Rect::new(
                    (i % cols) as f64 * cell_w,
                    (i / cols) as f64 * cell_h,
                    cell_w,
                    cell_h,
                ),
                crop: CropMargins::NONE,
                fit: FitMode::Contain,
                visible: true,
                z_order: 0,
            })
            .collect();
        Self::new(width, height, slots)
    }

    /// A single full-surface slot.
    pub fn single(width: u32, height: u32, slot_id: &str) -> Self {
        Self::new(
            width,
            height,
            vec![SlotConfig {
                id: SlotId::new(slot_id),
                rect: Rect::from_size(width, height),
                crop: CropMargins::NONE,
                fit: FitMode::Contain,
                visible: true,
                z_order: 0,
            }],
        )
    }

    pub fn slot(&self, id: &SlotId) -> Option<&SlotConfig> {
        self.slots.iter().find(|slot| &slot.id == id)
    }

    /// Visible slots ordered by ascending z-order; ties keep layout order.
    pub fn visible_slots_by_z(&self) -> Vec<&SlotConfig> {
        let mut slots: Vec<&SlotConfig> = self.slots.iter().filter(|s| s.visible).collect();
        slots.sort_by_key(|slot| slot.z_order);
        slots
    }

    /// Copy of this layout resized to `width`, keeping the aspect ratio.
    /// Height is rounded to an even number for encoder compatibility.
    pub fn scaled_to_width(&self, width: u32) -> LayoutConfig {
        if width >= self.width || self.width == 0 {
            return self.clone();
        }
        let factor = width as f64 / self.width as f64;
        let height = ((self.height as f64 * factor).round() as u32 / 2 * 2).max(2);
        let sy = height as f64 / self.height as f64;
        let slots = self
            .slots
            .iter()
            .map(|slot| SlotConfig {
                rect: slot.rect.scale(factor, sy),
                ..slot.clone()
            })
            .collect();
        LayoutConfig {
            width,
            height,
            aspect_ratio: self.aspect_ratio,
            slots,
        }
    }
}

/// Slot to camera assignment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CameraMapping {
    assignments: BTreeMap<SlotId, CameraId>,
}

impl CameraMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map slot ids to the camera with the same name.
    pub fn identity(layout: &LayoutConfig) -> Self {
        let assignments = layout
            .slots
            .iter()
            .map(|slot| (slot.id.clone(), CameraId::new(slot.id.as_str())))
            .collect();
        Self { assignments }
    }

    pub fn assign(&mut self, slot: SlotId, camera: CameraId) {
        self.assignments.insert(slot, camera);
    }

    pub fn camera_for(&self, slot: &SlotId) -> Option<&CameraId> {
        self.assignments.get(slot)
    }

    /// Exchange the cameras shown in two slots.
    pub fn swap(&mut self, a: &SlotId, b: &SlotId) {
        let camera_a = self.assignments.remove(a);
        let camera_b = self.assignments.remove(b);
        if let Some(camera) = camera_b {
            self.assignments.insert(a.clone(), camera);
        }
        if let Some(camera) = camera_a {
            self.assignments.insert(b.clone(), camera);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SlotId, &CameraId)> {
        self.assignments.iter()
    }
}

impl FromIterator<(SlotId, CameraId)> for CameraMapping {
    fn from_iter<T: IntoIterator<Item = (SlotId, CameraId)>>(iter: T) -> Self {
        Self {
            assignments: iter.into_iter().collect(),
        }
    }
}
