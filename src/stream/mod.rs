pub mod simulated;

use serde::Serialize;

use crate::error::{ConfigError, StreamError};

pub const MIN_BITRATE_KBPS: u32 = 1000;
pub const MAX_BITRATE_KBPS: u32 = 10000;

/// Connection state as reported by the stream-control collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StreamState {
    Idle,
    Connecting,
    Live,
    Error,
}

impl StreamState {
    pub fn is_live(self) -> bool {
        self == StreamState::Live
    }
}

/// Signals the telemetry controller consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamSignal {
    Started { target_kbps: f64 },
    /// `reason` is set when the stream ended because of an error.
    Stopped { reason: Option<String> },
}

/// Where and how hard to push the contribution stream.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub target_bitrate_kbps: u32,
}

impl StreamConfig {
    pub fn destination(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if !(MIN_BITRATE_KBPS..=MAX_BITRATE_KBPS).contains(&self.target_bitrate_kbps) {
            return Err(ConfigError::BitrateOutOfRange(self.target_bitrate_kbps));
        }
        Ok(())
    }
}

/// The external process that actually connects and encodes.
pub trait StreamControl {
    fn start(&mut self, config: &StreamConfig, now_ms: u64) -> Result<StreamSignal, StreamError>;
    fn stop(&mut self, now_ms: u64) -> Result<StreamSignal, StreamError>;
    fn state(&self) -> StreamState;
    /// Most recent encoder output bitrate in kbps.
    fn current_bitrate_kbps(&mut self) -> f64;
    fn target_bitrate_kbps(&self) -> f64;
    /// Asynchronous signals raised since the last poll, e.g. a dropped
    /// connection.
    fn poll(&mut self, now_ms: u64) -> Option<StreamSignal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str, kbps: u32) -> StreamConfig {
        StreamConfig {
            protocol: "srt".into(),
            host: host.into(),
            port: 9999,
            target_bitrate_kbps: kbps,
        }
    }

    #[test]
    fn destination_format() {
        assert_eq!(config("10.0.0.5", 5000).destination(), "srt://10.0.0.5:9999");
    }

    #[test]
    fn validation() {
        assert!(config("10.0.0.5", 5000).validate().is_ok());
        assert_eq!(config("  ", 5000).validate(), Err(ConfigError::EmptyHost));
        assert_eq!(
            config("h", 999).validate(),
            Err(ConfigError::BitrateOutOfRange(999))
        );
        assert!(config("h", 10000).validate().is_ok());
    }
}
