use serde::Serialize;

use super::BitrateSample;

/// Derived statistics over a non-empty bitrate window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation.
    pub jitter: f64,
}

/// Summarize a sequence of values. `None` when there is nothing to summarize.
pub fn summarize(values: &[f64]) -> Option<TelemetrySnapshot> {
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let average = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - average).powi(2)).sum::<f64>() / n;

    Some(TelemetrySnapshot {
        average,
        min,
        max,
        jitter: variance.sqrt(),
    })
}

pub fn summarize_samples(samples: &[BitrateSample]) -> Option<TelemetrySnapshot> {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    summarize(&values)
}
