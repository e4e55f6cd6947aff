use std::sync::Arc;

use rayon::prelude::*;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::decode::ClipData;
use super::features::AnalysisFrame;
use crate::config::MeterConfig;
use crate::error::ConfigError;

/// Analyzer parameters. Defaults mirror a browser `AnalyserNode` tuned for
/// metering: 512-point FFT, light smoothing, -90..-10 dB byte range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalyzerSettings {
    pub fft_size: usize,
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing: 0.3,
            min_db: -90.0,
            max_db: -10.0,
        }
    }
}

impl AnalyzerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fft_size < 32 || !self.fft_size.is_power_of_two() {
            return Err(ConfigError::InvalidFftSize(self.fft_size));
        }
        if self.min_db >= self.max_db {
            return Err(ConfigError::InvalidDecibelRange {
                min: self.min_db,
                max: self.max_db,
            });
        }
        Ok(())
    }
}

impl From<&MeterConfig> for AnalyzerSettings {
    fn from(cfg: &MeterConfig) -> Self {
        Self {
            fft_size: cfg.fft_size,
            smoothing: cfg.smoothing.clamp(0.0, 1.0),
            min_db: cfg.min_db,
            max_db: cfg.max_db,
        }
    }
}

/// Stateful byte-spectrum analyzer. Keeps the smoothed magnitude of every bin
/// between calls, so one instance serves exactly one channel.
pub struct SpectrumAnalyzer {
    settings: AnalyzerSettings,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(settings.fft_size);
        Ok(Self {
            fft,
            window: blackman_window(settings.fft_size),
            smoothed: vec![0.0; settings.fft_size / 2],
            buffer: vec![Complex::new(0.0, 0.0); settings.fft_size],
            settings,
        })
    }

    /// Analyze the most recent `fft_size` samples of `block` (zero-padded at
    /// the front when shorter) and return one byte per bin.
    pub fn process(&mut self, block: &[f32]) -> Vec<u8> {
        let n = self.settings.fft_size;
        let take = block.len().min(n);
        let offset = n - take;
        let tail = &block[block.len() - take..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i >= offset { tail[i - offset] } else { 0.0 };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let tau = self.settings.smoothing;
        let range = self.settings.max_db - self.settings.min_db;
        let scale = 1.0 / n as f32;

        self.smoothed
            .iter_mut()
            .zip(self.buffer.iter())
            .map(|(prev, c)| {
                let magnitude = c.norm() * scale;
                *prev = tau * *prev + (1.0 - tau) * magnitude;
                let db = if *prev > 0.0 {
                    20.0 * prev.log10()
                } else {
                    f32::NEG_INFINITY
                };
                let byte = (db - self.settings.min_db) / range * 255.0;
                byte.clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

/// Pre-compute every analysis tick of a clip at `analysis_hz`.
///
/// Channels are independent (each has its own smoothing state), so they are
/// analyzed in parallel and zipped back into frames.
pub fn analyze_clip(
    clip: &ClipData,
    settings: AnalyzerSettings,
    analysis_hz: u32,
) -> Result<Vec<AnalysisFrame>, ConfigError> {
    if analysis_hz == 0 {
        return Err(ConfigError::NotPositive { name: "analysis_hz" });
    }
    settings.validate()?;

    let duration = clip.duration_secs();
    let total_ticks = (duration * analysis_hz as f32).floor() as usize;
    let samples_per_tick = clip.sample_rate as f32 / analysis_hz as f32;

    log::info!(
        "Analyzing {} channel(s): {} ticks @ {}Hz, fft={}",
        clip.channels.len(),
        total_ticks,
        analysis_hz,
        settings.fft_size
    );

    let per_channel: Vec<Vec<Vec<u8>>> = clip
        .channels
        .par_iter()
        .map(|samples| -> Result<Vec<Vec<u8>>, ConfigError> {
            let mut analyzer = SpectrumAnalyzer::new(settings)?;
            Ok((0..total_ticks)
                .map(|tick| {
                    let end = (((tick + 1) as f32 * samples_per_tick) as usize).min(samples.len());
                    let start = end.saturating_sub(settings.fft_size);
                    analyzer.process(&samples[start..end])
                })
                .collect())
        })
        .collect::<Result<_, _>>()?;

    let mut channels = per_channel.into_iter();
    let left = channels.next().unwrap_or_default();
    let right = channels.next();

    let frames = left
        .into_iter()
        .enumerate()
        .map(|(tick, bins)| {
            let timestamp_ms = tick as u64 * 1000 / analysis_hz as u64;
            match &right {
                Some(right) => AnalysisFrame::stereo(timestamp_ms, bins, right[tick].clone()),
                None => AnalysisFrame::mono(timestamp_ms, bins),
            }
        })
        .collect();

    Ok(frames)
}

fn blackman_window(size: usize) -> Vec<f32> {
    let a = 0.16f32;
    let a0 = 0.5 * (1.0 - a);
    let a1 = 0.5f32;
    let a2 = 0.5 * a;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            a0 - a1 * x.cos() + a2 * (2.0 * x).cos()
        })
        .collect()
}
