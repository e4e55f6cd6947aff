use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use super::features::AnalysisFrame;
use crate::error::AudioError;

/// Frames buffered between two controller drains. Once full, newly pushed
/// frames are dropped and the pending ones are kept.
const FRAME_BACKLOG: usize = 256;

/// A live audio signal that pushes analysis frames.
///
/// `subscribe` acquires the signal handle and registers for frames. The
/// handle is released once the returned subscription is cancelled or dropped;
/// sources observe that on their next `drive`.
pub trait AudioSource {
    fn subscribe(&mut self) -> Result<FrameSubscription, AudioError>;

    /// Push every frame due at or before `now_ms` to the live subscription.
    fn drive(&mut self, now_ms: u64);

    /// Whether a signal handle is currently held.
    fn is_acquired(&self) -> bool;
}

/// Consumer end of a frame registration.
pub struct FrameSubscription {
    frames: Receiver<AnalysisFrame>,
    cancelled: Arc<AtomicBool>,
}

/// Producer end held by the source.
pub struct FrameSink {
    frames: Sender<AnalysisFrame>,
    cancelled: Arc<AtomicBool>,
}

/// Create a connected sink/subscription pair.
pub fn frame_channel() -> (FrameSink, FrameSubscription) {
    let (tx, rx) = crossbeam_channel::bounded(FRAME_BACKLOG);
    let cancelled = Arc::new(AtomicBool::new(false));
    (
        FrameSink {
            frames: tx,
            cancelled: Arc::clone(&cancelled),
        },
        FrameSubscription {
            frames: rx,
            cancelled,
        },
    )
}

impl FrameSubscription {
    /// Next pending frame. Always `None` once cancelled.
    pub fn try_next(&self) -> Option<AnalysisFrame> {
        if self.is_cancelled() {
            return None;
        }
        self.frames.try_recv().ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl FrameSink {
    /// Deliver a frame. Returns `false` when the subscriber is gone and the
    /// source should release its handle.
    pub fn push(&self, frame: AnalysisFrame) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.frames.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::debug!("Frame backlog full, dropping frame");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Replays pre-analyzed frames of a decoded clip against the session clock.
/// Frame timestamps are relative to the moment of acquisition.
pub struct ClipSource {
    frames: Arc<Vec<AnalysisFrame>>,
    live: Option<LiveClip>,
}

struct LiveClip {
    sink: FrameSink,
    cursor: usize,
    origin_ms: Option<u64>,
}

impl ClipSource {
    pub fn new(frames: Vec<AnalysisFrame>) -> Self {
        Self {
            frames: Arc::new(frames),
            live: None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl AudioSource for ClipSource {
    fn subscribe(&mut self) -> Result<FrameSubscription, AudioError> {
        if self.live.as_ref().map_or(false, |l| !l.sink.is_cancelled()) {
            return Err(AudioError::AlreadyAcquired);
        }
        if self.frames.is_empty() {
            return Err(AudioError::Unavailable("clip produced no analysis frames".into()));
        }
        let (sink, subscription) = frame_channel();
        self.live = Some(LiveClip {
            sink,
            cursor: 0,
            origin_ms: None,
        });
        log::debug!("Clip source acquired ({} frames)", self.frames.len());
        Ok(subscription)
    }

    fn drive(&mut self, now_ms: u64) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let origin = *live.origin_ms.get_or_insert(now_ms);
        let elapsed = now_ms.saturating_sub(origin);

        while let Some(frame) = self.frames.get(live.cursor) {
            if frame.timestamp_ms > elapsed {
                break;
            }
            let mut frame = frame.clone();
            frame.timestamp_ms += origin;
            if !live.sink.push(frame) {
                log::debug!("Clip source released");
                self.live = None;
                return;
            }
            live.cursor += 1;
        }

        if live.cursor >= self.frames.len() {
            // Loop the clip for sessions longer than it.
            live.cursor = 0;
            live.origin_ms = Some(now_ms + 1);
        }
    }

    fn is_acquired(&self) -> bool {
        self.live.as_ref().map_or(false, |l| !l.sink.is_cancelled())
    }
}

/// A source whose device is missing or denied.
pub struct UnavailableSource {
    reason: String,
}

impl UnavailableSource {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl AudioSource for UnavailableSource {
    fn subscribe(&mut self) -> Result<FrameSubscription, AudioError> {
        Err(AudioError::Unavailable(self.reason.clone()))
    }

    fn drive(&mut self, _now_ms: u64) {}

    fn is_acquired(&self) -> bool {
        false
    }
}
