use crate::audio::source::{AudioSource, FrameSubscription};
use crate::config::TelemetryConfig;
use crate::error::ConfigError;
use crate::events::{EventSender, TelemetryEvent};
use crate::render::chart::{ChartFrame, ChartStyle, TelemetryRenderer};
use crate::render::ops::Rect;
use crate::stream::{StreamControl, StreamSignal, StreamState};

use super::meter::{Gate, LevelMeter, LoudnessSample};
use super::stats::{self, TelemetrySnapshot};
use super::window::{SampleWindow, WindowBound};
use super::{BitrateSample, LevelSample};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Inactive,
    Active,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioStatus {
    Off,
    Metering,
    /// The signal handle could not be acquired; metering shows "initializing".
    Degraded(String),
}

/// Fixed-interval schedule. Disarmed tickers never fire.
#[derive(Clone, Debug)]
pub struct Ticker {
    interval_ms: u64,
    next_due_ms: Option<u64>,
}

impl Ticker {
    pub fn new(interval_ms: u64) -> Result<Self, ConfigError> {
        if interval_ms == 0 {
            return Err(ConfigError::NonPositiveInterval(interval_ms));
        }
        Ok(Self {
            interval_ms,
            next_due_ms: None,
        })
    }

    pub fn arm(&mut self, first_due_ms: u64) {
        self.next_due_ms = Some(first_due_ms);
    }

    pub fn cancel(&mut self) {
        self.next_due_ms = None;
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    /// Scheduled time of the next tick due by `now_ms`, advancing the schedule.
    pub fn take_due(&mut self, now_ms: u64) -> Option<u64> {
        let due = self.next_due_ms?;
        if due > now_ms {
            return None;
        }
        self.next_due_ms = Some(due + self.interval_ms);
        Some(due)
    }
}

/// Owns the telemetry buffers and decides when they are fed.
pub struct TelemetryController {
    state: ControllerState,
    stream_state: StreamState,
    target_kbps: f64,
    muted: bool,
    bitrate: SampleWindow<BitrateSample>,
    levels: SampleWindow<LevelSample>,
    snapshot: Option<TelemetrySnapshot>,
    loudness: LoudnessSample,
    ticker: Ticker,
    meter: LevelMeter,
    audio: Box<dyn AudioSource>,
    subscription: Option<FrameSubscription>,
    audio_status: AudioStatus,
    renderer: TelemetryRenderer,
    events: EventSender,
}

impl TelemetryController {
    pub fn new(
        config: &TelemetryConfig,
        meter: LevelMeter,
        audio: Box<dyn AudioSource>,
        events: EventSender,
    ) -> Result<Self, ConfigError> {
        let bitrate = SampleWindow::with_capacity(config.history_capacity)?;
        let levels = SampleWindow::new(WindowBound::Age(config.level_history_ms))?;
        let ticker = Ticker::new(config.sample_interval_ms)?;
        let span_ms = config.history_capacity as u64 * config.sample_interval_ms;

        Ok(Self {
            state: ControllerState::Inactive,
            stream_state: StreamState::Idle,
            target_kbps: 0.0,
            muted: false,
            bitrate,
            levels,
            snapshot: None,
            loudness: LoudnessSample::SILENT,
            ticker,
            meter,
            audio,
            subscription: None,
            audio_status: AudioStatus::Off,
            renderer: TelemetryRenderer::new(ChartStyle::default(), span_ms),
            events,
        })
    }

    pub fn handle_signal(&mut self, signal: StreamSignal, now_ms: u64) {
        match signal {
            StreamSignal::Started { target_kbps } => self.activate(target_kbps, now_ms),
            StreamSignal::Stopped { reason } => self.deactivate(reason, now_ms),
        }
    }

    fn activate(&mut self, target_kbps: f64, now_ms: u64) {
        self.target_kbps = target_kbps;
        if self.state == ControllerState::Active {
            log::debug!("Start signal while active; target now {} kbps", target_kbps);
            return;
        }

        self.clear_history();
        self.state = ControllerState::Active;
        self.stream_state = StreamState::Live;
        self.ticker.arm(now_ms);

        match self.audio.subscribe() {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.audio_status = AudioStatus::Metering;
            }
            Err(err) => {
                log::warn!("Audio metering unavailable: {}", err);
                self.audio_status = AudioStatus::Degraded(err.to_string());
                self.events.publish(TelemetryEvent::AudioDegraded {
                    at_ms: now_ms,
                    reason: err.to_string(),
                });
            }
        }

        log::info!("Telemetry active, target {} kbps", target_kbps);
        self.events.publish(TelemetryEvent::SessionStarted {
            at_ms: now_ms,
            target_kbps,
        });
    }

    fn deactivate(&mut self, reason: Option<String>, now_ms: u64) {
        if self.state == ControllerState::Inactive {
            return;
        }

        self.ticker.cancel();
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
            self.events.publish(TelemetryEvent::AudioReleased { at_ms: now_ms });
        }
        self.audio_status = AudioStatus::Off;
        self.clear_history();
        self.state = ControllerState::Inactive;
        self.stream_state = if reason.is_some() {
            StreamState::Error
        } else {
            StreamState::Idle
        };

        match &reason {
            Some(r) => log::warn!("Telemetry halted: {}", r),
            None => log::info!("Telemetry stopped"),
        }
        self.events.publish(TelemetryEvent::SessionEnded { at_ms: now_ms, reason });
    }

    fn clear_history(&mut self) {
        self.bitrate.clear();
        self.levels.clear();
        self.snapshot = None;
        self.loudness = LoudnessSample::SILENT;
    }

    /// Run everything due by `now_ms`: collaborator signals, pending audio
    /// frames, then bitrate ticks.
    pub fn advance(&mut self, now_ms: u64, stream: &mut dyn StreamControl) {
        if let Some(signal) = stream.poll(now_ms) {
            self.handle_signal(signal, now_ms);
        }
        if self.state == ControllerState::Inactive {
            return;
        }
        self.stream_state = stream.state();

        self.pump_audio(now_ms);

        if !self.stream_state.is_live() {
            // Non-live clears the bitrate history; due ticks pass unsampled.
            if !self.bitrate.is_empty() {
                log::debug!("Stream {:?}, clearing bitrate history", self.stream_state);
                self.bitrate.clear();
                self.snapshot = None;
            }
            while self.ticker.take_due(now_ms).is_some() {}
            return;
        }

        while let Some(due_ms) = self.ticker.take_due(now_ms) {
            let value = stream.current_bitrate_kbps();
            self.record_bitrate(due_ms, value);
        }
    }

    fn pump_audio(&mut self, now_ms: u64) {
        if self.subscription.is_none() {
            return;
        }
        self.audio.drive(now_ms);
        if !self.audio.is_acquired() {
            self.subscription = None;
            let reason = "audio input released by the device".to_string();
            log::warn!("Audio metering lost: {}", reason);
            self.audio_status = AudioStatus::Degraded(reason.clone());
            self.loudness = LoudnessSample::SILENT;
            self.events.publish(TelemetryEvent::AudioDegraded { at_ms: now_ms, reason });
            return;
        }

        let gate = self.gate();
        let Some(subscription) = self.subscription.as_ref() else {
            return;
        };
        while let Some(frame) = subscription.try_next() {
            let loudness = self.meter.measure(&frame, gate);
            self.loudness = loudness;
            self.levels.push(LevelSample {
                timestamp_ms: frame.timestamp_ms,
                loudness,
            });
        }
    }

    fn record_bitrate(&mut self, timestamp_ms: u64, value: f64) {
        let sample = BitrateSample::new(timestamp_ms, value);
        self.bitrate.push(sample);
        self.snapshot = stats::summarize_samples(self.bitrate.as_slice());

        if let Some(snapshot) = self.snapshot {
            log::debug!(
                "t={}ms bitrate={} kbps avg={:.1} jitter={:.1}",
                timestamp_ms,
                value,
                snapshot.average,
                snapshot.jitter
            );
            self.events
                .publish(TelemetryEvent::BitrateSampled { sample, snapshot });
        }
    }

    fn gate(&self) -> Gate {
        Gate {
            muted: self.muted,
            stream_active: self.state == ControllerState::Active && self.stream_state.is_live(),
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        if muted {
            self.loudness = LoudnessSample::SILENT;
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_active(&self) -> bool {
        self.state == ControllerState::Active
    }

    pub fn stream_state(&self) -> StreamState {
        self.stream_state
    }

    pub fn target_kbps(&self) -> f64 {
        self.target_kbps
    }

    /// Latest loudness, forced silent whenever the gate is closed.
    pub fn loudness(&self) -> LoudnessSample {
        if self.gate().is_open() {
            self.loudness
        } else {
            LoudnessSample::SILENT
        }
    }

    pub fn statistics(&self) -> Option<TelemetrySnapshot> {
        self.snapshot
    }

    pub fn bitrate_history(&self) -> Vec<BitrateSample> {
        self.bitrate.to_vec()
    }

    /// Loudest level per channel over the level window, for peak-hold
    /// markers. Silent whenever the gate is closed.
    pub fn peak_hold(&self) -> LoudnessSample {
        if !self.gate().is_open() {
            return LoudnessSample::SILENT;
        }
        self.levels
            .iter()
            .fold(LoudnessSample::SILENT, |peak, s| LoudnessSample {
                left: peak.left.max(s.loudness.left),
                right: peak.right.max(s.loudness.right),
            })
    }

    #[cfg(test)]
    pub fn level_history(&self) -> Vec<LevelSample> {
        self.levels.to_vec()
    }

    pub fn latest_bitrate(&self) -> Option<BitrateSample> {
        self.bitrate.latest().copied()
    }

    pub fn audio_status(&self) -> &AudioStatus {
        &self.audio_status
    }

    pub fn render_chart(&self, area: Rect) -> ChartFrame {
        self.renderer
            .render(&self.bitrate_history(), self.target_kbps, area)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::features::AnalysisFrame;
    use crate::audio::source::{ClipSource, UnavailableSource};
    use crate::error::StreamError;
    use crate::events::{event_bus, EventReceiver};
    use crate::stream::StreamConfig;
    use std::collections::VecDeque;

    /// Stream collaborator that replays a fixed bitrate script.
    struct Scripted {
        state: StreamState,
        target: f64,
        values: VecDeque<f64>,
        reads: usize,
        drop_at: Option<u64>,
    }

    impl Scripted {
        fn live(target: f64, values: &[f64]) -> Self {
            Self {
                state: StreamState::Live,
                target,
                values: values.iter().copied().collect(),
                reads: 0,
                drop_at: None,
            }
        }
    }

    impl StreamControl for Scripted {
        fn start(&mut self, _: &StreamConfig, _: u64) -> Result<StreamSignal, StreamError> {
            self.state = StreamState::Live;
            Ok(StreamSignal::Started {
                target_kbps: self.target,
            })
        }
        fn stop(&mut self, _: u64) -> Result<StreamSignal, StreamError> {
            self.state = StreamState::Idle;
            Ok(StreamSignal::Stopped { reason: None })
        }
        fn state(&self) -> StreamState {
            self.state
        }
        fn current_bitrate_kbps(&mut self) -> f64 {
            self.reads += 1;
            self.values.pop_front().unwrap_or(self.target)
        }
        fn target_bitrate_kbps(&self) -> f64 {
            self.target
        }
        fn poll(&mut self, now_ms: u64) -> Option<StreamSignal> {
            match self.drop_at {
                Some(at) if now_ms >= at => {
                    self.drop_at = None;
                    self.state = StreamState::Error;
                    Some(StreamSignal::Stopped {
                        reason: Some("link down".into()),
                    })
                }
                _ => None,
            }
        }
    }

    fn config() -> TelemetryConfig {
        TelemetryConfig {
            history_capacity: 120,
            sample_interval_ms: 1000,
            level_history_ms: 3000,
        }
    }

    fn loud_clip() -> Box<dyn AudioSource> {
        let frames = (0..600)
            .map(|i| AnalysisFrame::mono(i * 16, vec![204; 64]))
            .collect();
        Box::new(ClipSource::new(frames))
    }

    fn controller(audio: Box<dyn AudioSource>) -> (TelemetryController, EventReceiver) {
        let (tx, rx) = event_bus();
        let c = TelemetryController::new(&config(), LevelMeter::default(), audio, tx).unwrap();
        (c, rx)
    }

    fn close(a: f64, b: f64, eps: f64) -> bool {
        (a - b).abs() < eps
    }

    #[test]
    fn rejects_invalid_setup() {
        let (tx, _rx) = event_bus();
        let mut cfg = config();
        cfg.history_capacity = 0;
        let err = TelemetryController::new(&cfg, LevelMeter::default(), loud_clip(), tx.clone())
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::ZeroCapacity);

        let mut cfg = config();
        cfg.sample_interval_ms = 0;
        let err = TelemetryController::new(&cfg, LevelMeter::default(), loud_clip(), tx)
            .err()
            .unwrap();
        assert_eq!(err, ConfigError::NonPositiveInterval(0));
    }

    #[test]
    fn end_to_end_three_ticks() {
        let (mut c, rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[4800.0, 5100.0, 5050.0]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        for t in [0, 1000, 2000] {
            c.advance(t, &mut stream);
        }

        let history: Vec<f64> = c.bitrate_history().iter().map(|s| s.value).collect();
        assert_eq!(history, vec![4800.0, 5100.0, 5050.0]);
        let stamps: Vec<u64> = c.bitrate_history().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 1000, 2000]);

        let s = c.statistics().unwrap();
        assert!(close(s.average, 4983.333, 0.05));
        assert_eq!(s.min, 4800.0);
        assert_eq!(s.max, 5100.0);
        assert!(close(s.jitter, 131.233, 0.01));

        let chart = c.render_chart(Rect::new(0.0, 0.0, 640.0, 240.0));
        assert!(chart.has_curve());
        assert!(!chart.has_placeholder());

        let sampled = rx
            .drain()
            .into_iter()
            .filter(|e| matches!(e, TelemetryEvent::BitrateSampled { .. }))
            .count();
        assert_eq!(sampled, 3);
    }

    #[test]
    fn stop_clears_both_windows_and_cancels_tick() {
        let (mut c, _rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(0, &mut stream);
        c.advance(5000, &mut stream);
        assert_eq!(c.bitrate_history().len(), 6);
        assert!(!c.level_history().is_empty());

        c.handle_signal(StreamSignal::Stopped { reason: None }, 5000);
        assert!(c.bitrate_history().is_empty());
        assert!(c.level_history().is_empty());
        assert!(c.statistics().is_none());
        assert!(!c.is_active());

        let reads = stream.reads;
        c.advance(60_000, &mut stream);
        assert_eq!(stream.reads, reads);
        assert!(c.bitrate_history().is_empty());
        assert!(c.level_history().is_empty());
        assert!(c.render_chart(Rect::new(0.0, 0.0, 100.0, 50.0)).has_placeholder());
    }

    #[test]
    fn new_session_starts_from_empty_history() {
        let (mut c, _rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(3000, &mut stream);
        c.handle_signal(StreamSignal::Stopped { reason: None }, 3000);
        c.handle_signal(StreamSignal::Started { target_kbps: 6000.0 }, 10_000);
        c.advance(10_000, &mut stream);
        let history = c.bitrate_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].timestamp_ms, 10_000);
        assert_eq!(c.target_kbps(), 6000.0);
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let (mut c, _rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        for t in (0..300_000).step_by(1000) {
            c.advance(t, &mut stream);
        }
        let history = c.bitrate_history();
        assert_eq!(history.len(), 120);
        assert_eq!(history[0].timestamp_ms, 180_000);
        assert!(history.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    }

    #[test]
    fn meters_while_live_and_gates_on_mute() {
        let (mut c, _rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(0, &mut stream);
        c.advance(500, &mut stream);
        assert_eq!(c.audio_status(), &AudioStatus::Metering);
        assert!(close(c.loudness().left as f64, 80.0, 0.01));

        c.set_muted(true);
        c.advance(1000, &mut stream);
        assert_eq!(c.loudness(), LoudnessSample::SILENT);
        let last = c.level_history().last().copied().unwrap();
        assert_eq!(last.loudness, LoudnessSample::SILENT);
    }

    #[test]
    fn non_live_stream_gates_meter() {
        let (mut c, _rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[]);
        stream.state = StreamState::Connecting;
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(0, &mut stream);
        c.advance(400, &mut stream);
        assert_eq!(c.loudness(), LoudnessSample::SILENT);
        assert!(c.bitrate_history().is_empty());
        assert!(c.statistics().is_none());
    }

    #[test]
    fn non_live_state_without_stop_clears_bitrate_history() {
        for state in [StreamState::Connecting, StreamState::Error] {
            let (mut c, rx) = controller(loud_clip());
            let mut stream = Scripted::live(5000.0, &[]);
            c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
            c.advance(0, &mut stream);
            c.advance(1000, &mut stream);
            assert_eq!(c.bitrate_history().len(), 2);

            stream.state = state;
            for t in [2000, 3000] {
                c.advance(t, &mut stream);
                assert!(c.bitrate_history().is_empty(), "{:?} at {}", state, t);
            }
            assert!(c.statistics().is_none());
            assert!(c.is_active());
            assert_eq!(c.stream_state(), state);
            rx.drain();

            // Back to live: sampling resumes on schedule without a catch-up burst.
            stream.state = StreamState::Live;
            c.advance(4000, &mut stream);
            let stamps: Vec<u64> = c.bitrate_history().iter().map(|s| s.timestamp_ms).collect();
            assert_eq!(stamps, vec![4000]);
        }
    }

    #[test]
    fn peak_hold_tracks_loudest_level_in_window() {
        let frames = (0..600)
            .map(|i| AnalysisFrame::mono(i * 16, vec![if i < 30 { 204 } else { 51 }; 64]))
            .collect();
        let (mut c, _rx) = controller(Box::new(ClipSource::new(frames)));
        let mut stream = Scripted::live(5000.0, &[]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(0, &mut stream);
        c.advance(1000, &mut stream);
        assert!(close(c.loudness().left as f64, 20.0, 0.01));
        assert!(close(c.peak_hold().left as f64, 80.0, 0.01));

        // Loud frames age out of the 3s level window.
        c.advance(4000, &mut stream);
        assert!(close(c.peak_hold().right as f64, 20.0, 0.01));

        c.set_muted(true);
        assert_eq!(c.peak_hold(), LoudnessSample::SILENT);
    }

    /// Releases its handle after the first drive, like a device being unplugged.
    struct Unplugged {
        sink: Option<crate::audio::source::FrameSink>,
    }

    impl AudioSource for Unplugged {
        fn subscribe(&mut self) -> Result<FrameSubscription, crate::error::AudioError> {
            let (sink, sub) = crate::audio::source::frame_channel();
            self.sink = Some(sink);
            Ok(sub)
        }
        fn drive(&mut self, _now_ms: u64) {
            self.sink = None;
        }
        fn is_acquired(&self) -> bool {
            self.sink.is_some()
        }
    }

    #[test]
    fn released_audio_handle_degrades_metering() {
        let (mut c, rx) = controller(Box::new(Unplugged { sink: None }));
        let mut stream = Scripted::live(5000.0, &[]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        assert_eq!(c.audio_status(), &AudioStatus::Metering);
        c.advance(0, &mut stream);
        assert!(matches!(c.audio_status(), AudioStatus::Degraded(_)));
        assert_eq!(c.bitrate_history().len(), 1);
        assert!(rx
            .drain()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::AudioDegraded { at_ms: 0, .. })));
    }

    #[test]
    fn degraded_audio_keeps_bitrate_path() {
        let (mut c, rx) = controller(Box::new(UnavailableSource::new("permission denied")));
        let mut stream = Scripted::live(5000.0, &[5000.0, 5200.0]);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(1000, &mut stream);
        assert!(matches!(c.audio_status(), AudioStatus::Degraded(_)));
        assert_eq!(c.bitrate_history().len(), 2);
        assert_eq!(c.loudness(), LoudnessSample::SILENT);
        assert!(rx
            .drain()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::AudioDegraded { .. })));
    }

    #[test]
    fn collaborator_error_is_treated_as_stop() {
        let (mut c, rx) = controller(loud_clip());
        let mut stream = Scripted::live(5000.0, &[]);
        stream.drop_at = Some(2500);
        c.handle_signal(StreamSignal::Started { target_kbps: 5000.0 }, 0);
        c.advance(2000, &mut stream);
        assert_eq!(c.bitrate_history().len(), 3);
        c.advance(3000, &mut stream);
        assert!(!c.is_active());
        assert_eq!(c.stream_state(), StreamState::Error);
        assert!(c.bitrate_history().is_empty());
        let events = rx.drain();
        assert!(events.contains(&TelemetryEvent::SessionEnded {
            at_ms: 3000,
            reason: Some("link down".into()),
        }));
        assert!(events.contains(&TelemetryEvent::AudioReleased { at_ms: 3000 }));
    }

    #[test]
    fn ticker_fires_each_missed_interval_once() {
        let mut ticker = Ticker::new(1000).unwrap();
        assert_eq!(ticker.take_due(0), None);
        ticker.arm(0);
        let fired: Vec<u64> = std::iter::from_fn(|| ticker.take_due(2500)).collect();
        assert_eq!(fired, vec![0, 1000, 2000]);
        ticker.cancel();
        assert!(!ticker.is_armed());
        assert_eq!(ticker.take_due(10_000), None);
    }
}
