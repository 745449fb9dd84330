//! Glyph rasterization for overlay text.

use std::collections::HashMap;
use std::path::Path;

use fontdue::layout::{CoordinateSystem, GlyphRasterConfig, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};

use dashview_common::error::{DashviewError, DashviewResult};

/// 8-bit coverage for a rendered line of text.
#[derive(Debug, Clone)]
pub struct CoverageMask {
    pub width: usize,
    pub height: usize,
    pub alpha: Vec<u8>,
}

impl CoverageMask {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        self.alpha[y * self.width + x]
    }
}

struct GlyphBitmap {
    width: usize,
    height: usize,
    bitmap: Vec<u8>,
}

/// Single-font text painter with a glyph cache.
pub struct TextPainter {
    font: Font,
    glyph_cache: HashMap<GlyphRasterConfig, GlyphBitmap>,
}

impl std::fmt::Debug for TextPainter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextPainter")
            .field("cached_glyphs", &self.glyph_cache.len())
            .finish()
    }
}

impl TextPainter {
    pub fn load(font_path: &Path) -> DashviewResult<Self> {
        if !font_path.exists() {
            return Err(DashviewError::FileNotFound {
                path: font_path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(font_path)?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> DashviewResult<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| DashviewError::config(format!("Failed to parse overlay font: {e}")))?;
        Ok(Self {
            font,
            glyph_cache: HashMap::new(),
        })
    }

    /// Width and line height of `text` at `size_px`.
    pub fn measure(&self, text: &str, size_px: f32) -> (f64, f64) {
        let width: f32 = text
            .chars()
            .map(|c| self.font.metrics(c, size_px).advance_width)
            .sum();
        let height = self
            .font
            .horizontal_line_metrics(size_px)
            .map(|m| m.new_line_size)
            .unwrap_or(size_px * 1.2);
        (width.ceil() as f64, height.ceil() as f64)
    }

    /// Rasterize one line of text into a coverage mask sized to fit it.
    pub fn coverage(&mut self, text: &str, size_px: f32) -> CoverageMask {
        let (w, h) = self.measure(text, size_px);
        let mut mask = CoverageMask {
            width: w.max(1.0) as usize,
            height: h.max(1.0) as usize,
            alpha: vec![0; (w.max(1.0) * h.max(1.0)) as usize],
        };

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings::default());
        layout.append(&[&self.font], &TextStyle::new(text, size_px, 0));

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let font = &self.font;
            let bitmap = self.glyph_cache.entry(glyph.key).or_insert_with(|| {
                let (_, bitmap) = font.rasterize_config(glyph.key);
                GlyphBitmap {
                    width: glyph.width,
                    height: glyph.height,
                    bitmap,
                }
            });
            let gx = glyph.x.round() as i64;
            let gy = glyph.y.round() as i64;
            for row in 0..bitmap.height {
                for col in 0..bitmap.width {
                    let x = gx + col as i64;
                    let y = gy + row as i64;
                    if x < 0 || y < 0 || x as usize >= mask.width || y as usize >= mask.height {
                        continue;
                    }
                    let idx = y as usize * mask.width + x as usize;
                    let value = bitmap.bitmap[row * bitmap.width + col];
                    mask.alpha[idx] = mask.alpha[idx].max(value);
                }
            }
        }

        mask
    }
}

/// Estimated text extent when no font is loaded.
pub fn approximate_extent(text: &str, size_px: f32) -> (f64, f64) {
    let chars = text.chars().count() as f64;
    (
        (chars * size_px as f64 * 0.6).ceil(),
        (size_px as f64 * 1.2).ceil(),
    )
}
