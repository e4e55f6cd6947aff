/// Byte energies for one analysis tick, one per frequency bin (0-255).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrequencyFrame {
    pub bins: Vec<u8>,
}

impl FrequencyFrame {
    pub fn new(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// What an audio source pushes per analysis tick.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisFrame {
    /// Time in milliseconds on the session clock
    pub timestamp_ms: u64,
    pub left: FrequencyFrame,
    /// Present only when the source has true stereo separation
    pub right: Option<FrequencyFrame>,
}

impl AnalysisFrame {
    pub fn mono(timestamp_ms: u64, bins: Vec<u8>) -> Self {
        Self {
            timestamp_ms,
            left: FrequencyFrame::new(bins),
            right: None,
        }
    }

    pub fn stereo(timestamp_ms: u64, left: Vec<u8>, right: Vec<u8>) -> Self {
        Self {
            timestamp_ms,
            left: FrequencyFrame::new(left),
            right: Some(FrequencyFrame::new(right)),
        }
    }
}
