use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;

use crate::telemetry::stats::TelemetrySnapshot;
use crate::telemetry::BitrateSample;

/// Asynchronous outcomes published by the telemetry controller.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryEvent {
    SessionStarted { at_ms: u64, target_kbps: f64 },
    SessionEnded { at_ms: u64, reason: Option<String> },
    BitrateSampled {
        sample: BitrateSample,
        snapshot: TelemetrySnapshot,
    },
    AudioDegraded { at_ms: u64, reason: String },
    AudioReleased { at_ms: u64 },
}

/// Cloneable publishing handle, injected into whatever needs to report.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<TelemetryEvent>,
}

pub struct EventReceiver {
    rx: Receiver<TelemetryEvent>,
}

pub fn event_bus() -> (EventSender, EventReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Publishing never fails the caller; a bus with no listener just drops.
    pub fn publish(&self, event: TelemetryEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("Event bus has no receiver");
        }
    }
}

impl EventReceiver {
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        self.rx.try_iter().collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn default_duration_ms(self) -> u64 {
        match self {
            NotificationKind::Success => 6_000,
            NotificationKind::Error => 8_000,
            NotificationKind::Info | NotificationKind::Warning => 4_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub expires_at_ms: u64,
}

/// Toast queue; entries expire on their own.
#[derive(Default)]
pub struct NotificationQueue {
    entries: Vec<Notification>,
}

impl NotificationQueue {
    pub fn push(
        &mut self,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now_ms: u64,
    ) {
        self.entries.push(Notification {
            kind,
            title: title.into(),
            message: message.into(),
            expires_at_ms: now_ms + kind.default_duration_ms(),
        });
    }

    /// Drop expired entries.
    pub fn prune(&mut self, now_ms: u64) {
        self.entries.retain(|n| n.expires_at_ms > now_ms);
    }

    pub fn active(&self) -> &[Notification] {
        &self.entries
    }

    /// Turn a telemetry event into an operator-facing toast, if it merits one.
    pub fn notify_event(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::SessionStarted { at_ms, target_kbps } => {
                self.push(
                    NotificationKind::Success,
                    "Stream started",
                    format!("Target {} kbps", target_kbps.round()),
                    *at_ms,
                );
            }
            TelemetryEvent::SessionEnded { at_ms, reason: None } => {
                self.push(NotificationKind::Info, "Stream stopped", "Transmission ended", *at_ms);
            }
            TelemetryEvent::SessionEnded {
                at_ms,
                reason: Some(reason),
            } => {
                self.push(NotificationKind::Error, "Stream error", reason.clone(), *at_ms);
            }
            TelemetryEvent::AudioDegraded { at_ms, reason } => {
                self.push(NotificationKind::Warning, "Audio unavailable", reason.clone(), *at_ms);
            }
            TelemetryEvent::BitrateSampled { .. } | TelemetryEvent::AudioReleased { .. } => {}
        }
    }
}
