/// RGBA color, straight (non-premultiplied) alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Color(pub [u8; 4]);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color([r, g, b, 255])
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Color([r, g, b, a])
    }

    pub fn with_alpha(self, a: u8) -> Self {
        let [r, g, b, _] = self.0;
        Color([r, g, b, a])
    }

    /// Linear interpolation between two colors, `t` in 0..=1.
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mut out = [0u8; 4];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (self.0[i] as f32 + (other.0[i] as f32 - self.0[i] as f32) * t).round() as u8;
        }
        Color(out)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn midpoint(self, other: Point) -> Point {
        Point::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f32,
    /// `[on, off]` lengths in pixels
    pub dash: Option<[f32; 2]>,
}

impl Stroke {
    pub const fn solid(color: Color, width: f32) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub const fn dashed(color: Color, width: f32, on: f32, off: f32) -> Self {
        Self {
            color,
            width,
            dash: Some([on, off]),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Paint {
    Solid(Color),
    /// Stops are `(offset, color)` with offsets in 0..=1 from `top` to `bottom`.
    VerticalGradient {
        top: f32,
        bottom: f32,
        stops: Vec<(f32, Color)>,
    },
}

impl Paint {
    pub fn color_at(&self, y: f32) -> Color {
        match self {
            Paint::Solid(c) => *c,
            Paint::VerticalGradient { top, bottom, stops } => {
                let Some(first) = stops.first() else {
                    return Color::rgba(0, 0, 0, 0);
                };
                let span = bottom - top;
                let t = if span.abs() < f32::EPSILON {
                    0.0
                } else {
                    ((y - top) / span).clamp(0.0, 1.0)
                };
                if t <= first.0 {
                    return first.1;
                }
                for pair in stops.windows(2) {
                    let (a, b) = (pair[0], pair[1]);
                    if t <= b.0 {
                        let local = if b.0 > a.0 { (t - a.0) / (b.0 - a.0) } else { 1.0 };
                        return a.1.lerp(b.1, local);
                    }
                }
                stops[stops.len() - 1].1
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PathSegment {
    LineTo(Point),
    QuadTo { control: Point, to: Point },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

/// One backend-independent drawing instruction.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawOp {
    FillRect { rect: Rect, color: Color },
    Line { from: Point, to: Point, stroke: Stroke },
    Polygon { points: Vec<Point>, paint: Paint },
    Path {
        start: Point,
        segments: Vec<PathSegment>,
        stroke: Stroke,
    },
    Circle { center: Point, radius: f32, color: Color },
    /// `at` is the baseline anchor; `align` picks which edge of the text it marks.
    Text {
        text: String,
        at: Point,
        size: f32,
        align: TextAlign,
        color: Color,
    },
}

/// Anything that can turn draw operations into output.
pub trait DrawBackend {
    fn fill_rect(&mut self, rect: Rect, color: Color);
    fn stroke_line(&mut self, from: Point, to: Point, stroke: &Stroke);
    fn fill_polygon(&mut self, points: &[Point], paint: &Paint);
    fn stroke_path(&mut self, start: Point, segments: &[PathSegment], stroke: &Stroke);
    fn fill_circle(&mut self, center: Point, radius: f32, color: Color);
    fn draw_text(&mut self, text: &str, at: Point, size: f32, align: TextAlign, color: Color);
}

pub fn replay<B: DrawBackend + ?Sized>(ops: &[DrawOp], backend: &mut B) {
    for op in ops {
        match op {
            DrawOp::FillRect { rect, color } => backend.fill_rect(*rect, *color),
            DrawOp::Line { from, to, stroke } => backend.stroke_line(*from, *to, stroke),
            DrawOp::Polygon { points, paint } => backend.fill_polygon(points, paint),
            DrawOp::Path {
                start,
                segments,
                stroke,
            } => backend.stroke_path(*start, segments, stroke),
            DrawOp::Circle {
                center,
                radius,
                color,
            } => backend.fill_circle(*center, *radius, *color),
            DrawOp::Text {
                text,
                at,
                size,
                align,
                color,
            } => backend.draw_text(text, *at, *size, *align, *color),
        }
    }
}

/// Flatten a path into a polyline; each quadratic segment becomes `steps` lines.
pub fn flatten_path(start: Point, segments: &[PathSegment], steps: usize) -> Vec<Point> {
    let steps = steps.max(1);
    let mut out = vec![start];
    let mut cursor = start;
    for seg in segments {
        match *seg {
            PathSegment::LineTo(p) => {
                out.push(p);
                cursor = p;
            }
            PathSegment::QuadTo { control, to } => {
                for i in 1..=steps {
                    let t = i as f32 / steps as f32;
                    let u = 1.0 - t;
                    out.push(Point::new(
                        u * u * cursor.x + 2.0 * u * t * control.x + t * t * to.x,
                        u * u * cursor.y + 2.0 * u * t * control.y + t * t * to.y,
                    ));
                }
                cursor = to;
            }
        }
    }
    out
}
