use rayon::prelude::*;

use super::ops::{flatten_path, Color, DrawBackend, Paint, PathSegment, Point, Rect, Stroke, TextAlign};
use super::text::TextOverlay;

const CURVE_STEPS: usize = 12;

/// Byte length of one RGBA8 frame, computed without `u32` overflow.
pub fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// CPU RGBA8 render target. Row-heavy fills run in parallel.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    text: Option<TextOverlay>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, text: Option<TextOverlay>) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; rgba_len(width, height)],
            text,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    pub fn clear(&mut self, color: Color) {
        self.pixels
            .par_chunks_mut(4)
            .for_each(|px| px.copy_from_slice(&color.0));
    }

    fn row_stride(&self) -> usize {
        self.width as usize * 4
    }

    fn blend_at(&mut self, x: i32, y: i32, color: Color, coverage: f32) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        blend(&mut self.pixels[i..i + 4], color, coverage);
    }

    fn stamp_disc(&mut self, center: Point, radius: f32, color: Color) {
        let r = radius.max(0.5);
        let x0 = (center.x - r).floor() as i32;
        let x1 = (center.x + r).ceil() as i32;
        let y0 = (center.y - r).floor() as i32;
        let y1 = (center.y + r).ceil() as i32;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 + 0.5 - center.x;
                let dy = y as f32 + 0.5 - center.y;
                let d = (dx * dx + dy * dy).sqrt();
                let coverage = (r + 0.5 - d).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    self.blend_at(x, y, color, coverage);
                }
            }
        }
    }

    fn stroke_polyline(&mut self, points: &[Point], stroke: &Stroke) {
        let radius = stroke.width / 2.0;
        // Dash phase carries across segments.
        let mut travelled = 0.0f32;
        for pair in points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
            let steps = (len * 2.0).ceil().max(1.0) as usize;
            for i in 0..=steps {
                let t = i as f32 / steps as f32;
                if let Some([on, off]) = stroke.dash {
                    let period = (on + off).max(f32::EPSILON);
                    if (travelled + t * len) % period >= on {
                        continue;
                    }
                }
                let p = Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
                self.stamp_disc(p, radius, stroke.color);
            }
            travelled += len;
        }
    }
}

fn blend(px: &mut [u8], color: Color, coverage: f32) {
    let a = color.0[3] as f32 / 255.0 * coverage;
    if a <= 0.0 {
        return;
    }
    let inv = 1.0 - a;
    for c in 0..3 {
        px[c] = (color.0[c] as f32 * a + px[c] as f32 * inv).round() as u8;
    }
    px[3] = 255;
}

impl DrawBackend for Canvas {
    fn fill_rect(&mut self, rect: Rect, color: Color) {
        let x0 = rect.x.max(0.0).round() as usize;
        let x1 = (rect.right().round().max(0.0) as usize).min(self.width as usize);
        let y0 = rect.y.max(0.0).round() as usize;
        let y1 = (rect.bottom().round().max(0.0) as usize).min(self.height as usize);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let stride = self.row_stride();
        self.pixels[y0 * stride..y1 * stride]
            .par_chunks_mut(stride)
            .for_each(|row| {
                for px in row[x0 * 4..x1 * 4].chunks_mut(4) {
                    blend(px, color, 1.0);
                }
            });
    }

    fn stroke_line(&mut self, from: Point, to: Point, stroke: &Stroke) {
        self.stroke_polyline(&[from, to], stroke);
    }

    /// Even-odd scanline fill, sampled at pixel centers.
    fn fill_polygon(&mut self, points: &[Point], paint: &Paint) {
        if points.len() < 3 {
            return;
        }
        let min_y = points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_y = points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);
        let y0 = min_y.floor().max(0.0) as usize;
        let y1 = (max_y.ceil().max(0.0) as usize).min(self.height as usize);
        if y0 >= y1 {
            return;
        }
        let width = self.width as usize;
        let stride = self.row_stride();

        self.pixels[y0 * stride..y1 * stride]
            .par_chunks_mut(stride)
            .enumerate()
            .for_each(|(row_index, row)| {
                let y = (y0 + row_index) as f32 + 0.5;
                let mut crossings: Vec<f32> = Vec::new();
                for i in 0..points.len() {
                    let a = points[i];
                    let b = points[(i + 1) % points.len()];
                    if (a.y <= y && b.y > y) || (b.y <= y && a.y > y) {
                        crossings.push(a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x));
                    }
                }
                crossings.sort_by(|a, b| a.total_cmp(b));
                let color = paint.color_at(y);
                for span in crossings.chunks_exact(2) {
                    let start = (span[0] - 0.5).ceil().max(0.0) as usize;
                    let end = ((span[1] - 0.5).floor() + 1.0).max(0.0) as usize;
                    for x in start..end.min(width) {
                        blend(&mut row[x * 4..x * 4 + 4], color, 1.0);
                    }
                }
            });
    }

    fn stroke_path(&mut self, start: Point, segments: &[PathSegment], stroke: &Stroke) {
        let points = flatten_path(start, segments, CURVE_STEPS);
        self.stroke_polyline(&points, stroke);
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color) {
        self.stamp_disc(center, radius, color);
    }

    fn draw_text(&mut self, text: &str, at: Point, size: f32, align: TextAlign, color: Color) {
        let Some(overlay) = self.text.as_ref() else {
            return;
        };
        let w = overlay.measure_width(text, size) as f32;
        let x = match align {
            TextAlign::Left => at.x,
            TextAlign::Center => at.x - w / 2.0,
            TextAlign::Right => at.x - w,
        };
        let (width, height) = (self.width, self.height);
        overlay.composite(
            &mut self.pixels,
            width,
            height,
            text,
            x.round() as i32,
            at.y.round() as i32,
            size,
            color.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ops::{replay, DrawOp};

    const RED: Color = Color::rgb(255, 0, 0);
    const BLACK: Color = Color::rgb(0, 0, 0);

    #[test]
    fn fill_rect_is_clipped_to_canvas() {
        let mut canvas = Canvas::new(10, 10, None);
        canvas.clear(BLACK);
        canvas.fill_rect(Rect::new(5.0, 5.0, 100.0, 100.0), RED);
        assert_eq!(canvas.pixel(4, 4), [0, 0, 0, 255]);
        assert_eq!(canvas.pixel(9, 9), [255, 0, 0, 255]);
    }

    #[test]
    fn frame_length_does_not_overflow_u32() {
        assert_eq!(rgba_len(1280, 720), 3_686_400);
        assert_eq!(rgba_len(40_000, 40_000), 6_400_000_000);
    }

    #[test]
    fn polygon_fills_interior_only() {
        let mut canvas = Canvas::new(20, 20, None);
        canvas.clear(BLACK);
        let square = [
            Point::new(5.0, 5.0),
            Point::new(15.0, 5.0),
            Point::new(15.0, 15.0),
            Point::new(5.0, 15.0),
        ];
        canvas.fill_polygon(&square, &Paint::Solid(RED));
        assert_eq!(canvas.pixel(10, 10), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(2, 10), [0, 0, 0, 255]);
        assert_eq!(canvas.pixel(10, 17), [0, 0, 0, 255]);
    }

    #[test]
    fn dashed_line_leaves_gaps() {
        let mut canvas = Canvas::new(40, 5, None);
        canvas.clear(BLACK);
        let stroke = Stroke::dashed(RED, 1.0, 4.0, 4.0);
        canvas.stroke_line(Point::new(0.0, 2.5), Point::new(40.0, 2.5), &stroke);
        let lit: Vec<bool> = (0..40).map(|x| canvas.pixel(x, 2)[0] > 128).collect();
        assert!(lit.iter().any(|&l| l));
        assert!(lit.iter().any(|&l| !l));
    }

    #[test]
    fn replayed_chart_changes_pixels() {
        let mut canvas = Canvas::new(64, 32, None);
        let ops = vec![
            DrawOp::FillRect {
                rect: Rect::new(0.0, 0.0, 64.0, 32.0),
                color: BLACK,
            },
            DrawOp::Circle {
                center: Point::new(32.0, 16.0),
                radius: 4.0,
                color: RED,
            },
            DrawOp::Text {
                text: "ignored without font".into(),
                at: Point::new(0.0, 10.0),
                size: 10.0,
                align: TextAlign::Left,
                color: RED,
            },
        ];
        replay(&ops, &mut canvas);
        assert_eq!(canvas.pixel(32, 16), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel(0, 0), [0, 0, 0, 255]);
    }
}
