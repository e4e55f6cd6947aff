pub mod controller;
pub mod meter;
pub mod stats;
pub mod window;

use serde::Serialize;

use meter::LoudnessSample;
use window::Timestamped;

/// One bitrate reading. Immutable once taken.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BitrateSample {
    pub timestamp_ms: u64,
    /// kbps, never negative
    pub value: f64,
}

impl BitrateSample {
    pub fn new(timestamp_ms: u64, value: f64) -> Self {
        Self {
            timestamp_ms,
            value: value.max(0.0),
        }
    }
}

impl Timestamped for BitrateSample {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

/// Loudness at one analysis tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LevelSample {
    pub timestamp_ms: u64,
    pub loudness: LoudnessSample,
}

impl Timestamped for LevelSample {
    fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}
