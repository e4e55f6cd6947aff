use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::analysis::AnalyzerSettings;
use crate::error::ConfigError;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub meter: MeterConfig,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TelemetryConfig {
    /// Bitrate samples retained (count-bounded window)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Loudness history kept for the dashboard peak-hold, in milliseconds
    #[serde(default = "default_level_history_ms")]
    pub level_history_ms: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MeterConfig {
    #[serde(default = "default_fft_size")]
    pub fft_size: usize,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_min_db")]
    pub min_db: f32,
    #[serde(default = "default_max_db")]
    pub max_db: f32,
    #[serde(default = "default_analysis_hz")]
    pub analysis_hz: u32,
    /// Fake L/R from a mono source with random jitter
    #[serde(default)]
    pub simulate_stereo: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StreamSettings {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_target_bitrate")]
    pub target_bitrate_kbps: u32,
    #[serde(default = "default_variation")]
    pub variation_kbps: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default)]
    pub font: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            sample_interval_ms: default_sample_interval_ms(),
            level_history_ms: default_level_history_ms(),
        }
    }
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            fft_size: default_fft_size(),
            smoothing: default_smoothing(),
            min_db: default_min_db(),
            max_db: default_max_db(),
            analysis_hz: default_analysis_hz(),
            simulate_stereo: false,
        }
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: String::new(),
            port: default_port(),
            target_bitrate_kbps: default_target_bitrate(),
            variation_kbps: default_variation(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            font: None,
        }
    }
}

impl Config {
    /// Setup-time checks. Stream settings are validated when the stream is
    /// started so that a missing host surfaces as an operator notification.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.telemetry.level_history_ms == 0 {
            return Err(ConfigError::ZeroAge);
        }
        if self.telemetry.sample_interval_ms == 0 {
            return Err(ConfigError::NonPositiveInterval(0));
        }
        AnalyzerSettings::from(&self.meter).validate()?;
        if self.meter.analysis_hz == 0 {
            return Err(ConfigError::NotPositive { name: "analysis_hz" });
        }
        if self.output.width == 0 || self.output.height == 0 {
            return Err(ConfigError::NotPositive { name: "output size" });
        }
        if self.output.fps == 0 {
            return Err(ConfigError::NotPositive { name: "fps" });
        }
        Ok(())
    }
}

fn default_history_capacity() -> usize { 120 }
fn default_sample_interval_ms() -> u64 { 1000 }
fn default_level_history_ms() -> u64 { 3000 }
fn default_fft_size() -> usize { 512 }
fn default_smoothing() -> f32 { 0.3 }
fn default_min_db() -> f32 { -90.0 }
fn default_max_db() -> f32 { -10.0 }
fn default_analysis_hz() -> u32 { 60 }
fn default_protocol() -> String { "srt".into() }
fn default_port() -> u16 { 9999 }
fn default_target_bitrate() -> u32 { 5000 }
fn default_variation() -> f64 { 500.0 }
fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(cfg) => Some(cfg),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path, else `streamscope.toml` in the working directory, else the
/// per-user config file.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("streamscope.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("streamscope").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("streamscope").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.telemetry.history_capacity, 120);
        assert_eq!(cfg.telemetry.sample_interval_ms, 1000);
        assert_eq!(cfg.meter.fft_size, 512);
        assert_eq!(cfg.stream.target_bitrate_kbps, 5000);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [telemetry]
            history_capacity = 60

            [stream]
            host = "10.1.1.2"
            target_bitrate_kbps = 8000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.telemetry.history_capacity, 60);
        assert_eq!(cfg.telemetry.sample_interval_ms, 1000);
        assert_eq!(cfg.stream.host, "10.1.1.2");
        assert_eq!(cfg.stream.protocol, "srt");
    }

    #[test]
    fn validation_fails_fast() {
        let mut cfg = Config::default();
        cfg.telemetry.history_capacity = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroCapacity));

        let mut cfg = Config::default();
        cfg.telemetry.sample_interval_ms = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::NonPositiveInterval(0)));

        let mut cfg = Config::default();
        cfg.telemetry.level_history_ms = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroAge));
    }

    #[test]
    fn meter_settings_are_checked_at_setup() {
        let mut cfg = Config::default();
        cfg.meter.fft_size = 500;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidFftSize(500)));

        let mut cfg = Config::default();
        cfg.meter.min_db = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidDecibelRange { .. })
        ));
    }

    #[test]
    fn missing_file_loads_nothing() {
        assert!(load_config(Path::new("/nonexistent/streamscope.toml")).is_none());
    }
}
