use anyhow::{Context, Result};
use fontdue::{Font, FontSettings};
use std::path::Path;

/// Glyph rasterizer for chart and dashboard labels.
pub struct TextOverlay {
    font: Font,
}

impl TextOverlay {
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read font: {}", path.display()))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;
        Ok(Self { font })
    }

    /// Composite text onto an RGBA buffer. `baseline_y` is the text baseline.
    pub fn composite(
        &self,
        pixels: &mut [u8],
        width: u32,
        height: u32,
        text: &str,
        x: i32,
        baseline_y: i32,
        size: f32,
        color: [u8; 4],
    ) {
        let mut cursor_x = x as f32;
        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, size);
            let glyph_x = cursor_x.round() as i32 + metrics.xmin;
            let glyph_y = baseline_y - metrics.height as i32 - metrics.ymin;

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx];
                    if coverage == 0 {
                        continue;
                    }

                    let px = glyph_x + gx as i32;
                    let py = glyph_y + gy as i32;

                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let idx = ((py as u32 * width + px as u32) * 4) as usize;
                    if idx + 3 >= pixels.len() {
                        continue;
                    }

                    let a = coverage as f32 / 255.0 * (color[3] as f32 / 255.0);
                    let inv_a = 1.0 - a;
                    pixels[idx] = (color[0] as f32 * a + pixels[idx] as f32 * inv_a) as u8;
                    pixels[idx + 1] = (color[1] as f32 * a + pixels[idx + 1] as f32 * inv_a) as u8;
                    pixels[idx + 2] = (color[2] as f32 * a + pixels[idx + 2] as f32 * inv_a) as u8;
                    pixels[idx + 3] = 255;
                }
            }

            cursor_x += metrics.advance_width;
        }
    }

    /// Width of rendered text in pixels.
    pub fn measure_width(&self, text: &str, size: f32) -> u32 {
        let width: f32 = text
            .chars()
            .map(|ch| self.font.metrics(ch, size).advance_width)
            .sum();
        width.ceil() as u32
    }
}
