//! Rectangle math for layout slots, crops, and overlay placement.
//!
//! All coordinates are in surface pixels with `(0, 0)` at the top-left.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub w: f64,
    /// Height.
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Rectangle covering a `width` x `height` surface.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    /// Right edge.
    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    /// Bottom edge.
    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// The center point of this rectangle.
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.w.max(0.0) * self.h.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0.0 || self.h <= 0.0
    }

    /// Whether the two rectangles overlap with a non-zero area.
    /// Shared edges do not count as overlap.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }

    /// Check if a point is within this rectangle.
    pub fn contains(&self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.right() && py >= self.y && py <= self.bottom()
    }

    /// Scale position and size by independent factors.
    pub fn scale(&self, sx: f64, sy: f64) -> Rect {
        Rect::new(self.x * sx, self.y * sy, self.w * sx, self.h * sy)
    }

    /// Largest rectangle with the aspect ratio `content_w / content_h`
    /// that fits inside `self`, centered (letterboxed or pillarboxed).
    pub fn fit_contain(&self, content_w: f64, content_h: f64) -> Rect {
        if content_w <= 0.0 || content_h <= 0.0 || self.is_empty() {
            return *self;
        }
        let scale = (self.w / content_w).min(self.h / content_h);
        let w = content_w * scale;
        let h = content_h * scale;
        Rect::new(self.x + (self.w - w) / 2.0, self.y + (self.h - h) / 2.0, w, h)
    }

    /// Round outward to whole pixels.
    pub fn snapped(&self) -> Rect {
        let x = self.x.floor();
        let y = self.y.floor();
        Rect::new(x, y, self.right().ceil() - x, self.bottom().ceil() - y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersects_ignores_shared_edges() {
        let left = Rect::new(0.0, 0.0, 100.0, 100.0);
        let right = Rect::new(100.0, 0.0, 100.0, 100.0);
        assert!(!left.intersects(&right));

        let overlapping = Rect::new(90.0, 90.0, 20.0, 20.0);
        assert!(left.intersects(&overlapping));
    }

    #[test]
    fn test_fit_contain_letterboxes_wide_content() {
        let slot = Rect::new(0.0, 0.0, 400.0, 400.0);
        let fitted = slot.fit_contain(16.0, 9.0);
        assert!((fitted.w - 400.0).abs() < 1e-9);
        assert!((fitted.h - 225.0).abs() < 1e-9);
        assert!((fitted.y - 87.5).abs() < 1e-9);
        assert_eq!(fitted.x, 0.0);
    }

    #[test]
    fn test_fit_contain_pillarboxes_tall_content() {
        let slot = Rect::new(10.0, 20.0, 320.0, 180.0);
        let fitted = slot.fit_contain(3.0, 4.0);
        assert!((fitted.h - 180.0).abs() < 1e-9);
        assert!((fitted.w - 135.0).abs() < 1e-9);
        let (cx, _) = fitted.center();
        assert!((cx - 170.0).abs() < 1e-9);
    }

    #[test]
    fn test_snapped_covers_original() {
        let rect = Rect::new(1.4, 2.6, 10.2, 3.3).snapped();
        assert_eq!(rect, Rect::new(1.0, 2.0, 11.0, 4.0));
    }
}
