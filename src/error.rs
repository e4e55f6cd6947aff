use thiserror::Error;

/// Setup-time validation failures. Raised when a component is constructed,
/// never while it is running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample window capacity must be greater than zero")]
    ZeroCapacity,
    #[error("sample window max age must be greater than zero")]
    ZeroAge,
    #[error("sampling interval must be positive, got {0}ms")]
    NonPositiveInterval(u64),
    #[error("target bitrate {0} kbps is outside 1000-10000 kbps")]
    BitrateOutOfRange(u32),
    #[error("stream host must not be empty")]
    EmptyHost,
    #[error("fft size must be a power of two >= 32, got {0}")]
    InvalidFftSize(usize),
    #[error("min_db ({min}) must be below max_db ({max})")]
    InvalidDecibelRange { min: f32, max: f32 },
    #[error("{name} must be positive")]
    NotPositive { name: &'static str },
}

/// Audio signal acquisition failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AudioError {
    #[error("audio input unavailable: {0}")]
    Unavailable(String),
    #[error("audio handle already acquired")]
    AlreadyAcquired,
}

/// Failures reported by the stream-control collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StreamError {
    #[error("stream is already live")]
    AlreadyLive,
    #[error("stream is not live")]
    NotLive,
    #[error("invalid stream configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}
