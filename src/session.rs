use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;

use crate::encode::ffmpeg::FfmpegEncoder;
use crate::events::{EventReceiver, NotificationKind, NotificationQueue, TelemetryEvent};
use crate::render::dashboard::Dashboard;
use crate::render::ops::{replay, Color};
use crate::render::raster::Canvas;
use crate::stream::{StreamConfig, StreamControl};
use crate::telemetry::controller::TelemetryController;
use crate::telemetry::stats::TelemetrySnapshot;

const BACKGROUND: Color = Color::rgb(0, 0, 0);

/// When the operator starts and stops the stream on the session clock.
#[derive(Clone, Debug)]
pub struct SessionPlan {
    pub duration_ms: u64,
    pub start_at_ms: u64,
    /// Defaults to the end of the session and never falls after it.
    pub stop_at_ms: Option<u64>,
    pub fps: u32,
    pub stream: StreamConfig,
    pub muted: bool,
}

impl SessionPlan {
    pub fn frame_count(&self) -> u64 {
        (self.duration_ms * self.fps as u64).div_ceil(1000)
    }

    pub fn frame_time_ms(&self, index: u64) -> u64 {
        index * 1000 / self.fps as u64
    }

    fn stop_at_ms(&self) -> u64 {
        self.stop_at_ms
            .map_or(self.duration_ms, |at| at.min(self.duration_ms))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperatorError {
    pub at_ms: u64,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SessionReport {
    pub duration_ms: u64,
    pub frames: u64,
    pub destination: String,
    pub events: Vec<TelemetryEvent>,
    pub errors: Vec<OperatorError>,
    /// Statistics of the last window seen before the stream ended.
    pub final_statistics: Option<TelemetrySnapshot>,
}

impl SessionReport {
    pub fn sample_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::BitrateSampled { .. }))
            .count()
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create report: {}", path.display()))?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }
}

/// Dashboard rendering plus the encoder it feeds.
pub struct VideoOutput {
    pub dashboard: Dashboard,
    pub canvas: Canvas,
    pub encoder: FfmpegEncoder,
}

/// Offline operator session driven by the output frame clock.
pub struct Session {
    plan: SessionPlan,
    controller: TelemetryController,
    stream: Box<dyn StreamControl>,
    events: EventReceiver,
    notifications: NotificationQueue,
    started: bool,
    stopped: bool,
    report: SessionReport,
}

impl Session {
    pub fn new(
        plan: SessionPlan,
        mut controller: TelemetryController,
        stream: Box<dyn StreamControl>,
        events: EventReceiver,
    ) -> Self {
        controller.set_muted(plan.muted);
        let report = SessionReport {
            duration_ms: plan.duration_ms,
            destination: plan.stream.destination(),
            ..Default::default()
        };
        Self {
            plan,
            controller,
            stream,
            events,
            notifications: NotificationQueue::default(),
            started: false,
            stopped: false,
            report,
        }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &TelemetryController {
        &self.controller
    }

    #[cfg(test)]
    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    /// Apply operator actions due by `now_ms`, then advance telemetry.
    pub fn step(&mut self, now_ms: u64) {
        if !self.started && now_ms >= self.plan.start_at_ms {
            self.started = true;
            self.start_stream(now_ms);
        }
        if !self.stopped && now_ms >= self.plan.stop_at_ms() {
            self.stopped = true;
            self.stop_stream(now_ms);
        }

        self.controller.advance(now_ms, self.stream.as_mut());
        if let Some(snapshot) = self.controller.statistics() {
            self.report.final_statistics = Some(snapshot);
        }

        for event in self.events.drain() {
            self.notifications.notify_event(&event);
            self.report.events.push(event);
        }
        self.notifications.prune(now_ms);
    }

    fn start_stream(&mut self, now_ms: u64) {
        log::info!("Starting stream to {}", self.plan.stream.destination());
        match self.stream.start(&self.plan.stream, now_ms) {
            Ok(signal) => self.controller.handle_signal(signal, now_ms),
            Err(err) => {
                log::warn!("Stream start failed: {}", err);
                self.notifications.push(
                    NotificationKind::Error,
                    "Cannot start stream",
                    err.to_string(),
                    now_ms,
                );
                self.report.errors.push(OperatorError {
                    at_ms: now_ms,
                    message: err.to_string(),
                });
            }
        }
    }

    fn stop_stream(&mut self, now_ms: u64) {
        if !self.stream.state().is_live() {
            return;
        }
        match self.stream.stop(now_ms) {
            Ok(signal) => self.controller.handle_signal(signal, now_ms),
            Err(err) => log::debug!("Stop ignored: {}", err),
        }
    }

    fn destination(&self) -> Option<String> {
        self.controller
            .is_active()
            .then(|| self.plan.stream.destination())
    }

    fn render(&self, video: &mut VideoOutput) -> Result<()> {
        let destination = self.destination();
        let ops = video.dashboard.compose(
            &self.controller,
            destination.as_deref(),
            self.notifications.active(),
        );
        video.canvas.clear(BACKGROUND);
        replay(&ops, &mut video.canvas);
        video.encoder.write_frame(video.canvas.pixels())
    }

    /// Run the whole plan. Without `video`, only telemetry and the report
    /// are produced.
    pub fn run(mut self, mut video: Option<VideoOutput>) -> Result<SessionReport> {
        let total = self.plan.frame_count();
        log::info!(
            "Session: {:.1}s @ {}fps, start at {}ms, stop at {}ms",
            self.plan.duration_ms as f64 / 1000.0,
            self.plan.fps,
            self.plan.start_at_ms,
            self.plan.stop_at_ms()
        );

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
                .progress_chars("=>-"),
        );

        for index in 0..total {
            let now_ms = self.plan.frame_time_ms(index);
            self.step(now_ms);
            if let Some(video) = video.as_mut() {
                self.render(video)
                    .with_context(|| format!("Failed to render frame {}", index))?;
            }
            self.report.frames += 1;
            pb.set_position(index + 1);
        }
        pb.finish_with_message("Session complete");

        // Close out at the session end so the report sees the stop.
        self.step(self.plan.duration_ms);

        if let Some(video) = video {
            log::info!("Finishing encoding...");
            video.encoder.finish()?;
        }

        log::info!(
            "Recorded {} bitrate samples, {} operator errors",
            self.report.sample_count(),
            self.report.errors.len()
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::AnalysisFrame;
    use crate::audio::source::ClipSource;
    use crate::config::TelemetryConfig;
    use crate::events::event_bus;
    use crate::stream::simulated::SimulatedEncoder;
    use crate::stream::StreamState;
    use crate::telemetry::meter::LevelMeter;

    fn plan(host: &str) -> SessionPlan {
        SessionPlan {
            duration_ms: 10_000,
            start_at_ms: 2_000,
            stop_at_ms: Some(8_000),
            fps: 10,
            stream: StreamConfig {
                protocol: "srt".into(),
                host: host.into(),
                port: 9999,
                target_bitrate_kbps: 5000,
            },
            muted: false,
        }
    }

    fn session(plan: SessionPlan, encoder: SimulatedEncoder) -> Session {
        let (tx, rx) = event_bus();
        let frames = (0..600)
            .map(|i| AnalysisFrame::mono(i * 16, vec![128; 32]))
            .collect();
        let controller = TelemetryController::new(
            &TelemetryConfig::default(),
            LevelMeter::default(),
            Box::new(ClipSource::new(frames)),
            tx,
        )
        .unwrap();
        Session::new(plan, controller, Box::new(encoder), rx)
    }

    #[test]
    fn frame_clock() {
        let p = plan("h");
        assert_eq!(p.frame_count(), 100);
        assert_eq!(p.frame_time_ms(25), 2_500);

        let mut odd = plan("h");
        odd.fps = 30;
        odd.duration_ms = 1_010;
        assert_eq!(odd.frame_count(), 31);
        assert_eq!(odd.frame_time_ms(1), 33);
    }

    #[test]
    fn scheduled_session_samples_while_live() {
        let s = session(plan("10.0.0.5"), SimulatedEncoder::new(0.0, Some(1)));
        let report = s.run(None).unwrap();

        assert_eq!(report.frames, 100);
        assert_eq!(report.sample_count(), 6);
        assert!(report.errors.is_empty());
        assert_eq!(
            report.events.first(),
            Some(&TelemetryEvent::SessionStarted {
                at_ms: 2_000,
                target_kbps: 5000.0
            })
        );
        assert!(report.events.contains(&TelemetryEvent::SessionEnded {
            at_ms: 8_000,
            reason: None
        }));
        let stats = report.final_statistics.unwrap();
        assert_eq!(stats.average, 5000.0);
        assert_eq!(stats.jitter, 0.0);
    }

    #[test]
    fn missing_host_is_an_operator_error() {
        let mut s = session(plan(""), SimulatedEncoder::new(0.0, Some(1)));
        s.step(2_000);
        assert!(!s.controller().is_active());
        let toast = &s.notifications().active()[0];
        assert_eq!(toast.kind, NotificationKind::Error);

        let report = s.run(None).unwrap();
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.sample_count(), 0);
    }

    #[test]
    fn dropped_connection_ends_session_with_reason() {
        let mut p = plan("10.0.0.5");
        p.stop_at_ms = None;
        let encoder = SimulatedEncoder::new(0.0, Some(1)).fail_at(Some(5_000));
        let mut s = session(p, encoder);
        for t in (0..=6_000).step_by(100) {
            s.step(t);
        }
        assert_eq!(s.controller().stream_state(), StreamState::Error);
        assert!(s.controller().bitrate_history().is_empty());

        let report = s.run(None).unwrap();
        let ended: Vec<_> = report
            .events
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::SessionEnded { .. }))
            .collect();
        assert_eq!(ended.len(), 1);
        assert!(matches!(
            ended[0],
            TelemetryEvent::SessionEnded { at_ms: 5_000, reason: Some(_) }
        ));
    }

    #[test]
    fn stop_after_session_end_still_closes_the_stream() {
        let mut p = plan("10.0.0.5");
        p.stop_at_ms = Some(60_000);
        let report = session(p, SimulatedEncoder::new(0.0, Some(1))).run(None).unwrap();
        assert!(report.events.contains(&TelemetryEvent::SessionEnded {
            at_ms: 10_000,
            reason: None
        }));
        assert_eq!(report.sample_count(), 8);
    }

    #[test]
    fn report_serializes_tagged_events() {
        let s = session(plan("10.0.0.5"), SimulatedEncoder::new(0.0, Some(1)));
        let report = s.run(None).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["destination"], "srt://10.0.0.5:9999");
        assert_eq!(json["events"][0]["event"], "session_started");
    }
}
