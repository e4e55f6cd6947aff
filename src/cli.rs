use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "streamscope",
    about = "Operator telemetry console for a live contribution encoder"
)]
pub struct Cli {
    /// Audio clip used as the monitored input (WAV, MP3, FLAC, OGG).
    /// Without one, metering runs degraded.
    pub input: Option<PathBuf>,

    /// Dashboard video output
    #[arg(short, long, default_value = "telemetry.mp4")]
    pub output: PathBuf,

    /// Write every bitrate tick and session event as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Skip rendering and encoding; only run telemetry and the report
    #[arg(long)]
    pub no_video: bool,

    /// Config file (TOML)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Session length in seconds
    #[arg(long, default_value_t = 30.0)]
    pub duration: f32,

    /// Second at which the stream is started
    #[arg(long, default_value_t = 2.0)]
    pub start_at: f32,

    /// Second at which the stream is stopped (defaults to the end)
    #[arg(long)]
    pub stop_at: Option<f32>,

    /// Second at which the encoder connection drops
    #[arg(long)]
    pub fail_at: Option<f32>,

    /// Destination protocol
    #[arg(long, default_value = "srt")]
    pub protocol: String,

    /// Destination host
    #[arg(long, default_value = "")]
    pub host: String,

    /// Destination port
    #[arg(long, default_value_t = 9999)]
    pub port: u16,

    /// Target bitrate in kbps (1000-10000)
    #[arg(short, long, default_value_t = 5000)]
    pub target: u32,

    /// Start with the audio muted
    #[arg(long)]
    pub muted: bool,

    /// Spread a mono level to L/R with random jitter
    #[arg(long)]
    pub simulate_stereo: bool,

    /// Seed for the simulated encoder and stereo jitter
    #[arg(long)]
    pub seed: Option<u64>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// TTF/OTF font for labels; without one, labels are skipped
    #[arg(long)]
    pub font: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from(["streamscope"]);
        assert_eq!(cli.target, 5000);
        assert_eq!(cli.fps, 30);
        assert!(cli.input.is_none());
        assert!(!cli.no_video);
    }

    #[test]
    fn session_flags_parse() {
        let cli = Cli::parse_from([
            "streamscope",
            "clip.wav",
            "--host",
            "10.0.0.5",
            "--start-at",
            "1",
            "--stop-at",
            "20",
            "--fail-at",
            "12.5",
            "--no-video",
        ]);
        assert_eq!(cli.input.as_deref(), Some(std::path::Path::new("clip.wav")));
        assert_eq!(cli.host, "10.0.0.5");
        assert_eq!(cli.stop_at, Some(20.0));
        assert_eq!(cli.fail_at, Some(12.5));
        assert!(cli.no_video);
    }
}
