use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::audio::features::{AnalysisFrame, FrequencyFrame};

const MAX_BIN_ENERGY: f32 = 255.0;
const STEREO_JITTER: f32 = 5.0;

/// Per-channel loudness on a 0-100 scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct LoudnessSample {
    pub left: f32,
    pub right: f32,
}

impl LoudnessSample {
    pub const SILENT: LoudnessSample = LoudnessSample { left: 0.0, right: 0.0 };
}

/// Output gate. Closed when muted or when no stream is live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Gate {
    pub muted: bool,
    pub stream_active: bool,
}

impl Gate {
    pub fn is_open(&self) -> bool {
        !self.muted && self.stream_active
    }
}

/// How a mono frame is spread to two channels.
#[derive(Debug)]
pub enum ChannelSpread {
    /// Both channels carry the mono level.
    Mirror,
    /// Each channel gets independent uniform noise in `[-amount, +amount]`.
    Jitter { rng: StdRng, amount: f32 },
}

impl ChannelSpread {
    pub fn jitter(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        ChannelSpread::Jitter {
            rng,
            amount: STEREO_JITTER,
        }
    }
}

/// Reduces frequency frames to loudness pairs.
#[derive(Debug)]
pub struct LevelMeter {
    spread: ChannelSpread,
}

impl LevelMeter {
    pub fn new(spread: ChannelSpread) -> Self {
        Self { spread }
    }

    pub fn measure(&mut self, frame: &AnalysisFrame, gate: Gate) -> LoudnessSample {
        if !gate.is_open() {
            return LoudnessSample::SILENT;
        }

        let left = frame_level(&frame.left);
        match &frame.right {
            Some(right) => LoudnessSample {
                left,
                right: frame_level(right),
            },
            None => match &mut self.spread {
                ChannelSpread::Mirror => LoudnessSample { left, right: left },
                // No signal to spread.
                ChannelSpread::Jitter { .. } if frame.left.is_empty() => LoudnessSample::SILENT,
                ChannelSpread::Jitter { rng, amount } => {
                    let amount = *amount;
                    LoudnessSample {
                        left: (left + rng.gen_range(-amount..=amount)).clamp(0.0, 100.0),
                        right: (left + rng.gen_range(-amount..=amount)).clamp(0.0, 100.0),
                    }
                }
            },
        }
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(ChannelSpread::Mirror)
    }
}

/// Mean bin energy normalized to 0-100. An empty frame is silence.
pub fn frame_level(frame: &FrequencyFrame) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: u64 = frame.bins.iter().map(|&b| b as u64).sum();
    let avg = sum as f32 / frame.bins.len() as f32;
    (avg / MAX_BIN_ENERGY * 100.0).clamp(0.0, 100.0)
}

/// Meter readout in the console's dB convention: 0-100 maps onto -60..0 dB.
pub fn level_to_db_label(level: f32) -> String {
    if level > 0.0 {
        format!("-{}dB", (60.0 - level * 0.6).round() as i32)
    } else {
        "-inf dB".to_string()
    }
}
