use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{StreamConfig, StreamControl, StreamSignal, StreamState, MAX_BITRATE_KBPS, MIN_BITRATE_KBPS};
use crate::error::StreamError;

/// Stand-in for the external encoder process. Reports the target bitrate
/// plus uniform noise of `variation_kbps` peak-to-peak while live.
pub struct SimulatedEncoder {
    state: StreamState,
    config: Option<StreamConfig>,
    variation_kbps: f64,
    rng: StdRng,
    fail_at_ms: Option<u64>,
}

impl SimulatedEncoder {
    pub fn new(variation_kbps: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            state: StreamState::Idle,
            config: None,
            variation_kbps: variation_kbps.max(0.0),
            rng,
            fail_at_ms: None,
        }
    }

    /// Drop the connection at `at_ms` on the session clock.
    pub fn fail_at(mut self, at_ms: Option<u64>) -> Self {
        self.fail_at_ms = at_ms;
        self
    }

    pub fn destination(&self) -> Option<String> {
        self.config.as_ref().map(StreamConfig::destination)
    }
}

impl StreamControl for SimulatedEncoder {
    fn start(&mut self, config: &StreamConfig, now_ms: u64) -> Result<StreamSignal, StreamError> {
        if self.state == StreamState::Live {
            return Err(StreamError::AlreadyLive);
        }
        config.validate()?;

        self.state = StreamState::Connecting;
        log::info!("Connecting to {} at t={}ms", config.destination(), now_ms);
        self.config = Some(config.clone());
        self.state = StreamState::Live;

        Ok(StreamSignal::Started {
            target_kbps: config.target_bitrate_kbps as f64,
        })
    }

    fn stop(&mut self, now_ms: u64) -> Result<StreamSignal, StreamError> {
        if self.state != StreamState::Live {
            return Err(StreamError::NotLive);
        }
        self.state = StreamState::Idle;
        log::info!("Stream stopped at t={}ms", now_ms);
        Ok(StreamSignal::Stopped { reason: None })
    }

    fn state(&self) -> StreamState {
        self.state
    }

    fn current_bitrate_kbps(&mut self) -> f64 {
        let target = self.target_bitrate_kbps();
        if !self.state.is_live() || self.variation_kbps == 0.0 {
            return target;
        }
        let half = self.variation_kbps / 2.0;
        let value = target + self.rng.gen_range(-half..half);
        value
            .clamp(MIN_BITRATE_KBPS as f64, MAX_BITRATE_KBPS as f64)
            .round()
    }

    fn target_bitrate_kbps(&self) -> f64 {
        self.config
            .as_ref()
            .map_or(0.0, |c| c.target_bitrate_kbps as f64)
    }

    fn poll(&mut self, now_ms: u64) -> Option<StreamSignal> {
        match self.fail_at_ms {
            Some(at) if self.state.is_live() && now_ms >= at => {
                self.fail_at_ms = None;
                self.state = StreamState::Error;
                Some(StreamSignal::Stopped {
                    reason: Some(format!("connection to {} lost", self.destination().unwrap_or_default())),
                })
            }
            _ => None,
        }
    }
}
