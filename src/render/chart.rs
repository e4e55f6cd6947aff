use super::ops::{Color, DrawOp, Paint, PathSegment, Point, Rect, Stroke, TextAlign};
use crate::telemetry::BitrateSample;

const GRID_BANDS: usize = 10;
const HEADROOM: f64 = 1.3;
const PLACEHOLDER: &str = "Awaiting stream data...";

/// Vertical extent of a rendered chart, in kbps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisScale {
    pub min: f64,
    pub max: f64,
}

impl AxisScale {
    /// Always-fit scale: room above the target, zero (or lower) at the floor.
    pub fn fit(values: impl Iterator<Item = f64>, target: f64) -> Option<AxisScale> {
        let (lo, hi) = values.fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
        let min = lo.min(0.0);
        let mut max = (target * HEADROOM).max(hi);
        if max - min <= 0.0 {
            max = min + 1.0;
        }
        Some(AxisScale { min, max })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChartStyle {
    pub background: Color,
    pub grid: Stroke,
    pub target: Stroke,
    pub curve: Stroke,
    pub marker: Color,
    pub marker_radius: f32,
    pub fill_stops: Vec<(f32, Color)>,
    pub label: Color,
    pub placeholder: Color,
    pub label_size: f32,
    pub label_margin: f32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            background: Color::rgb(0x0a, 0x0a, 0x0a),
            grid: Stroke::solid(Color::rgb(0x1a, 0x1a, 0x1a), 1.0),
            target: Stroke::dashed(Color::rgba(0x48, 0xbb, 0x78, 0xcc), 1.0, 6.0, 4.0),
            curve: Stroke::solid(Color::rgb(0xff, 0x6b, 0x6b), 2.0),
            marker: Color::rgb(0xff, 0x6b, 0x6b),
            marker_radius: 4.0,
            fill_stops: vec![
                (0.0, Color::rgba(255, 107, 107, 153)),
                (0.3, Color::rgba(255, 159, 67, 102)),
                (0.7, Color::rgba(72, 187, 120, 77)),
                (1.0, Color::rgba(72, 187, 120, 26)),
            ],
            label: Color::rgb(0x66, 0x66, 0x66),
            placeholder: Color::rgb(0x33, 0x33, 0x33),
            label_size: 12.0,
            label_margin: 5.0,
        }
    }
}

/// Output of one chart render.
#[derive(Clone, Debug, PartialEq)]
pub struct ChartFrame {
    pub ops: Vec<DrawOp>,
    /// `None` when the window was empty and only the placeholder was drawn
    pub scale: Option<AxisScale>,
}

#[cfg(test)]
impl ChartFrame {
    pub fn has_curve(&self) -> bool {
        self.ops.iter().any(|op| matches!(op, DrawOp::Path { .. }))
    }

    pub fn has_placeholder(&self) -> bool {
        self.ops
            .iter()
            .any(|op| matches!(op, DrawOp::Text { text, .. } if text == PLACEHOLDER))
    }
}

/// Maps a bitrate history plus a target to draw operations.
#[derive(Clone, Debug)]
pub struct TelemetryRenderer {
    style: ChartStyle,
    span_label: String,
}

impl TelemetryRenderer {
    pub fn new(style: ChartStyle, history_span_ms: u64) -> Self {
        Self {
            style,
            span_label: span_label(history_span_ms),
        }
    }

    pub fn render(&self, samples: &[BitrateSample], target: f64, area: Rect) -> ChartFrame {
        let s = &self.style;
        let mut ops = vec![DrawOp::FillRect {
            rect: area,
            color: s.background,
        }];

        let Some(scale) = AxisScale::fit(samples.iter().map(|b| b.value), target) else {
            ops.push(DrawOp::Text {
                text: PLACEHOLDER.to_string(),
                at: area.center(),
                size: s.label_size,
                align: TextAlign::Center,
                color: s.placeholder,
            });
            return ChartFrame { ops, scale: None };
        };

        for i in 0..=GRID_BANDS {
            let y = area.y + area.height * i as f32 / GRID_BANDS as f32;
            ops.push(DrawOp::Line {
                from: Point::new(area.x, y),
                to: Point::new(area.right(), y),
                stroke: s.grid,
            });
        }

        let to_y = |value: f64| -> f32 {
            let t = ((value - scale.min) / scale.span()) as f32;
            area.bottom() - t * area.height
        };

        let target_y = to_y(target);
        ops.push(DrawOp::Line {
            from: Point::new(area.x, target_y),
            to: Point::new(area.right(), target_y),
            stroke: s.target,
        });

        let last_index = samples.len().saturating_sub(1).max(1) as f32;
        let points: Vec<Point> = samples
            .iter()
            .enumerate()
            .map(|(i, b)| Point::new(area.x + i as f32 / last_index * area.width, to_y(b.value)))
            .collect();

        if points.len() > 1 {
            let mut polygon = Vec::with_capacity(points.len() + 2);
            polygon.push(Point::new(area.x, area.bottom()));
            polygon.extend_from_slice(&points);
            polygon.push(Point::new(area.right(), area.bottom()));
            ops.push(DrawOp::Polygon {
                points: polygon,
                paint: Paint::VerticalGradient {
                    top: area.y,
                    bottom: area.bottom(),
                    stops: s.fill_stops.clone(),
                },
            });

            ops.push(DrawOp::Path {
                start: points[0],
                segments: smooth_segments(&points),
                stroke: s.curve,
            });
        }

        if let Some(&last) = points.last() {
            ops.push(DrawOp::Circle {
                center: last,
                radius: s.marker_radius,
                color: s.marker,
            });
        }

        let m = s.label_margin;
        let label = |text: String, at: Point, align: TextAlign| DrawOp::Text {
            text,
            at,
            size: s.label_size,
            align,
            color: s.label,
        };
        ops.push(label(
            format!("{} kbps", scale.min.round()),
            Point::new(area.x + m, area.bottom() - m),
            TextAlign::Left,
        ));
        ops.push(label(
            format!("{} kbps", scale.max.round()),
            Point::new(area.x + m, area.y + m + s.label_size),
            TextAlign::Left,
        ));
        ops.push(label(
            self.span_label.clone(),
            Point::new(area.right() - m, area.bottom() - m),
            TextAlign::Right,
        ));
        ops.push(label(
            "now".to_string(),
            Point::new(area.right() - m, area.bottom() - m - s.label_size - 2.0),
            TextAlign::Right,
        ));

        ChartFrame {
            ops,
            scale: Some(scale),
        }
    }
}

/// Quadratic segments through `points`: each previous point is the control
/// and the midpoint to the next point the end, closed with a line to the
/// final point.
fn smooth_segments(points: &[Point]) -> Vec<PathSegment> {
    let mut segments: Vec<PathSegment> = points
        .windows(2)
        .map(|w| PathSegment::QuadTo {
            control: w[0],
            to: w[0].midpoint(w[1]),
        })
        .collect();
    if let Some(&last) = points.last() {
        segments.push(PathSegment::LineTo(last));
    }
    segments
}

fn span_label(ms: u64) -> String {
    let secs = ms / 1000;
    if secs >= 60 && secs % 60 == 0 {
        format!("{}min", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
