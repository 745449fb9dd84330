//! Drawing surfaces.
//!
//! [`RasterCanvas`] is the software RGBA surface frames are composited
//! into and encoded from. [`DisplayList`] records draw calls instead of
//! rasterizing them.

use dashview_event_model::Rect;

use crate::providers::SourceFrame;
use crate::text::{approximate_extent, CoverageMask, TextPainter};

/// Straight-alpha RGBA color.
pub type Rgba = [u8; 4];

pub const BLACK: Rgba = [0, 0, 0, 255];
pub const WHITE: Rgba = [255, 255, 255, 255];

/// Text appearance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size_px: f32,
    pub color: Rgba,
    /// Plate drawn behind the text.
    pub background: Option<Rgba>,
    /// Plate padding in pixels.
    pub padding: f64,
}

impl TextStyle {
    pub fn plain(size_px: f32, color: Rgba) -> Self {
        Self {
            size_px,
            color,
            background: None,
            padding: 0.0,
        }
    }

    pub fn plated(size_px: f32, color: Rgba, background: Rgba, padding: f64) -> Self {
        Self {
            size_px,
            color,
            background: Some(background),
            padding,
        }
    }
}

/// A destination for compositing.
pub trait Canvas: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    fn clear(&mut self, color: Rgba);

    /// Alpha-blend a solid rectangle.
    fn fill_rect(&mut self, rect: Rect, color: Rgba);

    /// Scale the `src` region of `frame` into `dst`.
    fn draw_frame(&mut self, frame: &SourceFrame, src: Rect, dst: Rect);

    /// Width and height of `text` at `size_px`, excluding padding.
    fn measure_text(&self, text: &str, size_px: f32) -> (f64, f64);

    /// Draw text with its plate's top-left corner at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle);

    /// Draw text centered on `center`, rotated by `angle_deg` (clockwise).
    fn draw_rotated_text(&mut self, text: &str, center: (f64, f64), angle_deg: f64, style: &TextStyle);

    /// Size of the plate `draw_text` would produce.
    fn text_plate_size(&self, text: &str, style: &TextStyle) -> (f64, f64) {
        let (w, h) = self.measure_text(text, style.size_px);
        (w + style.padding * 2.0, h + style.padding * 2.0)
    }
}

/// An immutable rendered frame tagged with its absolute event time.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterFrame {
    pub absolute_secs: f64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RasterFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            absolute_secs: 0.0,
            width,
            height,
            pixels: vec![0; (width as usize) * (height as usize) * 4],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba {
        if x >= self.width || y >= self.height {
            return [0, 0, 0, 0];
        }
        let offset = ((y * self.width + x) * 4) as usize;
        [
            self.pixels[offset],
            self.pixels[offset + 1],
            self.pixels[offset + 2],
            self.pixels[offset + 3],
        ]
    }
}

/// Software RGBA surface.
#[derive(Debug)]
pub struct RasterCanvas {
    frame: RasterFrame,
    painter: Option<TextPainter>,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RasterFrame::new(width, height),
            painter: None,
        }
    }

    pub fn with_painter(mut self, painter: Option<TextPainter>) -> Self {
        self.painter = painter;
        self
    }

    /// Copy of the current surface tagged with `absolute_secs`.
    pub fn snapshot(&self, absolute_secs: f64) -> RasterFrame {
        RasterFrame {
            absolute_secs,
            ..self.frame.clone()
        }
    }

    /// Replace the surface content with a previously rendered frame.
    /// The frame is moved in; the prior content is dropped.
    pub fn present(&mut self, frame: RasterFrame) {
        self.frame = frame;
    }

    pub fn frame(&self) -> &RasterFrame {
        &self.frame
    }

    #[inline]
    fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba, coverage: u8) {
        if x < 0 || y < 0 || x >= self.frame.width as i64 || y >= self.frame.height as i64 {
            return;
        }
        let offset = ((y as usize) * self.frame.width as usize + x as usize) * 4;
        let alpha = color[3] as u32 * coverage as u32 / 255;
        if alpha == 0 {
            return;
        }
        let dst = &mut self.frame.pixels[offset..offset + 4];
        if alpha == 255 {
            dst.copy_from_slice(&color);
            return;
        }
        let inv = 255 - alpha;
        for channel in 0..3 {
            dst[channel] = ((color[channel] as u32 * alpha + dst[channel] as u32 * inv) / 255) as u8;
        }
        dst[3] = (alpha + dst[3] as u32 * inv / 255).min(255) as u8;
    }

    fn clip_rect(&self, rect: Rect) -> Option<(i64, i64, i64, i64)> {
        let x0 = rect.x.round().max(0.0) as i64;
        let y0 = rect.y.round().max(0.0) as i64;
        let x1 = (rect.right().round() as i64).min(self.frame.width as i64);
        let y1 = (rect.bottom().round() as i64).min(self.frame.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }

    fn coverage(&mut self, text: &str, size_px: f32) -> Option<CoverageMask> {
        self.painter
            .as_mut()
            .map(|painter| painter.coverage(text, size_px))
    }
}

/// Bilinear sample at fractional source coordinates.
fn sample_bilinear(frame: &SourceFrame, fx: f64, fy: f64) -> Rgba {
    let max_x = frame.width.saturating_sub(1) as f64;
    let max_y = frame.height.saturating_sub(1) as f64;
    let fx = fx.clamp(0.0, max_x);
    let fy = fy.clamp(0.0, max_y);
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(frame.width.saturating_sub(1));
    let y1 = (y0 + 1).min(frame.height.saturating_sub(1));
    let tx = fx - x0 as f64;
    let ty = fy - y0 as f64;

    let p00 = frame.pixel(x0, y0);
    let p10 = frame.pixel(x1, y0);
    let p01 = frame.pixel(x0, y1);
    let p11 = frame.pixel(x1, y1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - tx) + p10[c] as f64 * tx;
        let bottom = p01[c] as f64 * (1.0 - tx) + p11[c] as f64 * tx;
        out[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
    }
    out
}

impl Canvas for RasterCanvas {
    fn width(&self) -> u32 {
        self.frame.width
    }

    fn height(&self) -> u32 {
        self.frame.height
    }

    fn clear(&mut self, color: Rgba) {
        for pixel in self.frame.pixels.chunks_exact_mut(4) {
            pixel.copy_from_slice(&color);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        let Some((x0, y0, x1, y1)) = self.clip_rect(rect) else {
            return;
        };
        for y in y0..y1 {
            for x in x0..x1 {
                self.blend_pixel(x, y, color, 255);
            }
        }
    }

    fn draw_frame(&mut self, frame: &SourceFrame, src: Rect, dst: Rect) {
        if frame.width == 0 || frame.height == 0 || src.is_empty() || dst.is_empty() {
            return;
        }
        let Some((x0, y0, x1, y1)) = self.clip_rect(dst) else {
            return;
        };
        let sx = src.w / dst.w;
        let sy = src.h / dst.h;
        for y in y0..y1 {
            let fy = src.y + ((y as f64 + 0.5) - dst.y) * sy - 0.5;
            for x in x0..x1 {
                let fx = src.x + ((x as f64 + 0.5) - dst.x) * sx - 0.5;
                let color = sample_bilinear(frame, fx, fy);
                self.blend_pixel(x, y, color, 255);
            }
        }
    }

    fn measure_text(&self, text: &str, size_px: f32) -> (f64, f64) {
        match &self.painter {
            Some(painter) => painter.measure(text, size_px),
            None => approximate_extent(text, size_px),
        }
    }

    fn draw_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) {
        if let Some(background) = style.background {
            let (w, h) = self.text_plate_size(text, style);
            self.fill_rect(Rect::new(x, y, w, h), background);
        }
        let Some(mask) = self.coverage(text, style.size_px) else {
            return;
        };
        let ox = (x + style.padding).round() as i64;
        let oy = (y + style.padding).round() as i64;
        for row in 0..mask.height {
            for col in 0..mask.width {
                let value = mask.get(col, row);
                if value > 0 {
                    self.blend_pixel(ox + col as i64, oy + row as i64, style.color, value);
                }
            }
        }
    }

    fn draw_rotated_text(&mut self, text: &str, center: (f64, f64), angle_deg: f64, style: &TextStyle) {
        let Some(mask) = self.coverage(text, style.size_px) else {
            return;
        };
        let (sin, cos) = angle_deg.to_radians().sin_cos();
        let half_w = mask.width as f64 / 2.0;
        let half_h = mask.height as f64 / 2.0;
        // Bounding radius of the rotated mask.
        let radius = (half_w * half_w + half_h * half_h).sqrt().ceil() as i64;
        let (cx, cy) = (center.0.round() as i64, center.1.round() as i64);
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                // Inverse-rotate the destination offset into mask space.
                let mx = dx as f64 * cos + dy as f64 * sin + half_w;
                let my = -(dx as f64) * sin + dy as f64 * cos + half_h;
                if mx < 0.0 || my < 0.0 {
                    continue;
                }
                let value = mask.get(mx as usize, my as usize);
                if value > 0 {
                    self.blend_pixel(cx + dx, cy + dy, style.color, value);
                }
            }
        }
    }
}

/// A recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rgba),
    FillRect {
        rect: Rect,
        color: Rgba,
    },
    Frame {
        src: Rect,
        dst: Rect,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        style: TextStyle,
    },
    RotatedText {
        text: String,
        center: (f64, f64),
        angle_deg: f64,
        style: TextStyle,
    },
}

/// Canvas that records draw calls instead of rasterizing.
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    width: u32,
    height: u32,
    pub ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn texts(&self) -> impl Iterator<Item = (&str, f64, f64)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Text { text, x, y, .. } => Some((text.as_str(), *x, *y)),
            _ => None,
        })
    }

    pub fn rotated_texts(&self) -> impl Iterator<Item = (&str, (f64, f64))> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::RotatedText { text, center, .. } => Some((text.as_str(), *center)),
            _ => None,
        })
    }

    pub fn frame_destinations(&self) -> Vec<Rect> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Frame { dst, .. } => Some(*dst),
                _ => None,
            })
            .collect()
    }
}

impl Canvas for DisplayList {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn clear(&mut self, color: Rgba) {
        self.ops.push(DrawOp::Clear(color));
    }

    fn fill_rect(&mut self, rect: Rect, color: Rgba) {
        self.ops.push(DrawOp::FillRect { rect, color });
    }

    fn draw_frame(&mut self, _frame: &SourceFrame, src: Rect, dst: Rect) {
        self.ops.push(DrawOp::Frame { src, dst });
    }

    fn measure_text(&self, text: &str, size_px: f32) -> (f64, f64) {
        approximate_extent(text, size_px)
    }

    fn draw_text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            x,
            y,
            style: *style,
        });
    }

    fn draw_rotated_text(&mut self, text: &str, center: (f64, f64), angle_deg: f64, style: &TextStyle) {
        self.ops.push(DrawOp::RotatedText {
            text: text.to_string(),
            center,
            angle_deg,
            style: *style,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_rect_is_clipped() {
        let mut canvas = RasterCanvas::new(4, 4);
        canvas.clear(BLACK);
        canvas.fill_rect(Rect::new(2.0, 2.0, 10.0, 10.0), WHITE);
        assert_eq!(canvas.frame().pixel(3, 3), WHITE);
        assert_eq!(canvas.frame().pixel(1, 1), BLACK);
    }

    #[test]
    fn test_translucent_fill_blends() {
        let mut canvas = RasterCanvas::new(1, 1);
        canvas.clear(BLACK);
        canvas.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), [255, 255, 255, 128]);
        let px = canvas.frame().pixel(0, 0);
        assert!(px[0] > 120 && px[0] < 136);
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_draw_frame_scales_source() {
        let source = SourceFrame::solid(2, 2, [10, 200, 30, 255]);
        let mut canvas = RasterCanvas::new(8, 8);
        canvas.clear(BLACK);
        canvas.draw_frame(
            &source,
            Rect::new(0.0, 0.0, 2.0, 2.0),
            Rect::new(4.0, 0.0, 4.0, 4.0),
        );
        assert_eq!(canvas.frame().pixel(5, 1), [10, 200, 30, 255]);
        assert_eq!(canvas.frame().pixel(1, 1), BLACK);
        assert_eq!(canvas.frame().pixel(5, 6), BLACK);
    }

    #[test]
    fn test_text_without_font_draws_plate_only() {
        let mut canvas = RasterCanvas::new(64, 32);
        canvas.clear(BLACK);
        let style = TextStyle::plated(10.0, WHITE, [200, 0, 0, 255], 2.0);
        canvas.draw_text("cam", 0.0, 0.0, &style);
        assert_eq!(canvas.frame().pixel(1, 1), [200, 0, 0, 255]);
        canvas.draw_rotated_text("cam", (32.0, 16.0), -30.0, &style);
        assert_eq!(canvas.frame().pixel(32, 16), BLACK);
    }

    #[test]
    fn test_snapshot_and_present_round_trip() {
        let mut canvas = RasterCanvas::new(2, 2);
        canvas.clear(WHITE);
        let snap = canvas.snapshot(12.5);
        assert_eq!(snap.absolute_secs, 12.5);

        let mut second = RasterCanvas::new(2, 2);
        second.present(snap);
        assert_eq!(second.frame().pixel(0, 0), WHITE);
    }
}
