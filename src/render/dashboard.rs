use super::ops::{Color, DrawOp, Paint, Point, Rect, Stroke, TextAlign};
use crate::events::{Notification, NotificationKind};
use crate::telemetry::controller::{AudioStatus, TelemetryController};
use crate::telemetry::meter::level_to_db_label;

const PANEL: Color = Color::rgb(0x12, 0x12, 0x14);
const BACKDROP: Color = Color::rgb(0x05, 0x05, 0x06);
const TEXT: Color = Color::rgb(0xdd, 0xdd, 0xdd);
const MUTED_TEXT: Color = Color::rgb(0x88, 0x88, 0x88);
const LIVE: Color = Color::rgb(0xe5, 0x3e, 0x3e);
const OFFLINE: Color = Color::rgb(0x55, 0x55, 0x55);
const METER_TRACK: Color = Color::rgb(0x22, 0x22, 0x22);
const METER_OK: Color = Color::rgb(0x48, 0xbb, 0x78);
const METER_HOT: Color = Color::rgb(0xff, 0x9f, 0x43);
const METER_CLIP: Color = Color::rgb(0xff, 0x6b, 0x6b);
const PEAK_HOLD: Color = Color::rgb(0xf5, 0xf5, 0xf5);

/// Screen regions of the telemetry dashboard.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DashboardLayout {
    pub header: Rect,
    pub chart: Rect,
    pub stats: Rect,
    pub meters: Rect,
    pub toasts: Rect,
}

impl DashboardLayout {
    pub fn for_size(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let pad = (w.min(h) * 0.025).round().max(4.0);
        let header_h = (h * 0.09).max(24.0);
        let stats_h = (h * 0.08).max(20.0);
        let meter_w = (w * 0.16).max(60.0);

        let header = Rect::new(pad, pad, w - 2.0 * pad, header_h);
        let body_y = header.bottom() + pad;
        let body_h = (h - body_y - pad).max(0.0);
        let meters = Rect::new(w - pad - meter_w, body_y, meter_w, body_h);
        let chart_w = (meters.x - pad - pad).max(0.0);
        let chart = Rect::new(pad, body_y, chart_w, (body_h - stats_h - pad).max(0.0));
        let stats = Rect::new(pad, chart.bottom() + pad, chart_w, stats_h);
        let toasts = Rect::new(w * 0.55, header.bottom() + pad, w * 0.45 - pad, body_h);

        Self {
            header,
            chart,
            stats,
            meters,
            toasts,
        }
    }
}

pub struct Dashboard {
    layout: DashboardLayout,
    font_size: f32,
}

impl Dashboard {
    pub fn new(width: u32, height: u32) -> Self {
        let layout = DashboardLayout::for_size(width, height);
        let font_size = (layout.header.height * 0.45).clamp(10.0, 32.0);
        Self { layout, font_size }
    }

    pub fn compose(
        &self,
        controller: &TelemetryController,
        destination: Option<&str>,
        notifications: &[Notification],
    ) -> Vec<DrawOp> {
        let l = &self.layout;
        let mut ops = vec![DrawOp::FillRect {
            rect: Rect::new(0.0, 0.0, l.header.right() + l.header.x, l.meters.bottom() + l.header.x),
            color: BACKDROP,
        }];

        self.header(&mut ops, controller, destination);
        ops.extend(controller.render_chart(l.chart).ops);
        self.stats_row(&mut ops, controller);
        self.meters(&mut ops, controller);
        self.toasts(&mut ops, notifications);
        ops
    }

    fn text(&self, text: impl Into<String>, at: Point, scale: f32, align: TextAlign, color: Color) -> DrawOp {
        DrawOp::Text {
            text: text.into(),
            at,
            size: self.font_size * scale,
            align,
            color,
        }
    }

    fn header(&self, ops: &mut Vec<DrawOp>, c: &TelemetryController, destination: Option<&str>) {
        let r = self.layout.header;
        ops.push(DrawOp::FillRect { rect: r, color: PANEL });

        let mid_y = r.y + r.height / 2.0;
        let baseline = mid_y + self.font_size * 0.35;
        let dot_r = r.height * 0.15;
        let live = c.is_active() && c.stream_state().is_live();
        ops.push(DrawOp::Circle {
            center: Point::new(r.x + r.height / 2.0, mid_y),
            radius: dot_r,
            color: if live { LIVE } else { OFFLINE },
        });
        ops.push(self.text(
            if live { "LIVE" } else { "OFFLINE" },
            Point::new(r.x + r.height, baseline),
            1.0,
            TextAlign::Left,
            TEXT,
        ));
        if let Some(dest) = destination.filter(|_| live) {
            ops.push(self.text(
                dest,
                Point::new(r.x + r.height + self.font_size * 5.0, baseline),
                0.8,
                TextAlign::Left,
                MUTED_TEXT,
            ));
        }

        let current = match c.latest_bitrate() {
            Some(s) => format!("BITRATE ANALYSIS  {} kbps", s.value.round()),
            None => "BITRATE ANALYSIS  -- kbps".to_string(),
        };
        ops.push(self.text(
            current,
            Point::new(r.right() - self.font_size * 0.5, baseline),
            1.0,
            TextAlign::Right,
            TEXT,
        ));
    }

    fn stats_row(&self, ops: &mut Vec<DrawOp>, c: &TelemetryController) {
        let r = self.layout.stats;
        ops.push(DrawOp::FillRect { rect: r, color: PANEL });
        let baseline = r.y + r.height / 2.0 + self.font_size * 0.3;

        let mut cells = vec![format!("Target: {} kbps", c.target_kbps().round())];
        match c.statistics() {
            Some(s) => cells.extend([
                format!("Avg: {:.0}", s.average),
                format!("Min: {:.0}", s.min),
                format!("Max: {:.0}", s.max),
                format!("Jitter: {:.1}", s.jitter),
            ]),
            None => cells.push("No samples".to_string()),
        }

        let cell_w = r.width / cells.len() as f32;
        for (i, cell) in cells.into_iter().enumerate() {
            ops.push(self.text(
                cell,
                Point::new(r.x + cell_w * i as f32 + self.font_size * 0.5, baseline),
                0.8,
                TextAlign::Left,
                MUTED_TEXT,
            ));
        }
    }

    fn meters(&self, ops: &mut Vec<DrawOp>, c: &TelemetryController) {
        let r = self.layout.meters;
        ops.push(DrawOp::FillRect { rect: r, color: PANEL });

        let status_baseline = r.y + self.font_size * 1.2;
        let status = match c.audio_status() {
            AudioStatus::Metering if c.is_muted() => "MUTED",
            AudioStatus::Metering => "AUDIO ACTIVE",
            AudioStatus::Off | AudioStatus::Degraded(_) => "INITIALIZING...",
        };
        ops.push(self.text(
            status,
            Point::new(r.center().x, status_baseline),
            0.7,
            TextAlign::Center,
            MUTED_TEXT,
        ));

        let levels = c.loudness();
        let peaks = c.peak_hold();
        let metering = matches!(c.audio_status(), AudioStatus::Metering);
        let top = status_baseline + self.font_size;
        let label_h = self.font_size * 2.2;
        let bar_h = (r.bottom() - top - label_h).max(0.0);
        let bar_w = r.width * 0.22;

        let channels = [("L", levels.left, peaks.left), ("R", levels.right, peaks.right)];
        for (i, (name, level, peak)) in channels.into_iter().enumerate() {
            let cx = r.x + r.width * (0.3 + 0.4 * i as f32);
            let track = Rect::new(cx - bar_w / 2.0, top, bar_w, bar_h);
            ops.push(DrawOp::FillRect {
                rect: track,
                color: METER_TRACK,
            });

            if metering {
                let fill_h = bar_h * level / 100.0;
                let color = if level > 90.0 {
                    METER_CLIP
                } else if level > 70.0 {
                    METER_HOT
                } else {
                    METER_OK
                };
                ops.push(DrawOp::FillRect {
                    rect: Rect::new(track.x, track.bottom() - fill_h, track.width, fill_h),
                    color,
                });

                if peak > 0.0 {
                    let y = track.bottom() - bar_h * peak / 100.0;
                    ops.push(DrawOp::Line {
                        from: Point::new(track.x, y),
                        to: Point::new(track.right(), y),
                        stroke: Stroke::solid(PEAK_HOLD, 2.0),
                    });
                    let tip = Point::new(track.right() + 2.0, y);
                    ops.push(DrawOp::Polygon {
                        points: vec![
                            tip,
                            Point::new(tip.x + 6.0, y - 4.0),
                            Point::new(tip.x + 6.0, y + 4.0),
                        ],
                        paint: Paint::Solid(PEAK_HOLD),
                    });
                }
            }

            // -6 dB reference tick
            let ref_y = track.bottom() - bar_h * 0.9;
            ops.push(DrawOp::Line {
                from: Point::new(track.x - 3.0, ref_y),
                to: Point::new(track.right() + 3.0, ref_y),
                stroke: Stroke::solid(MUTED_TEXT.with_alpha(120), 1.0),
            });

            let db = if metering { level_to_db_label(level) } else { "--".to_string() };
            ops.push(self.text(
                name,
                Point::new(cx, track.bottom() + self.font_size * 0.9),
                0.7,
                TextAlign::Center,
                TEXT,
            ));
            ops.push(self.text(
                db,
                Point::new(cx, track.bottom() + self.font_size * 1.8),
                0.6,
                TextAlign::Center,
                MUTED_TEXT,
            ));
        }
    }

    fn toasts(&self, ops: &mut Vec<DrawOp>, notifications: &[Notification]) {
        let r = self.layout.toasts;
        let h = self.font_size * 2.6;
        for (i, n) in notifications.iter().rev().take(4).enumerate() {
            let rect = Rect::new(r.x, r.y + i as f32 * (h + 6.0), r.width, h);
            let accent = match n.kind {
                NotificationKind::Success => METER_OK,
                NotificationKind::Error => METER_CLIP,
                NotificationKind::Warning => METER_HOT,
                NotificationKind::Info => MUTED_TEXT,
            };
            ops.push(DrawOp::FillRect {
                rect,
                color: PANEL.with_alpha(230),
            });
            ops.push(DrawOp::FillRect {
                rect: Rect::new(rect.x, rect.y, 4.0, rect.height),
                color: accent,
            });
            ops.push(self.text(
                n.title.clone(),
                Point::new(rect.x + 12.0, rect.y + self.font_size * 1.0),
                0.75,
                TextAlign::Left,
                TEXT,
            ));
            ops.push(self.text(
                n.message.clone(),
                Point::new(rect.x + 12.0, rect.y + self.font_size * 2.0),
                0.65,
                TextAlign::Left,
                MUTED_TEXT,
            ));
        }
    }
}
