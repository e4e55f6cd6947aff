mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod events;
mod render;
mod session;
mod stream;
mod telemetry;

use anyhow::{Context, Result};
use clap::Parser;

use audio::analysis::{analyze_clip, AnalyzerSettings};
use audio::source::{AudioSource, ClipSource, UnavailableSource};
use cli::Cli;
use config::Config;
use encode::ffmpeg::{EncoderSettings, FfmpegEncoder};
use render::dashboard::Dashboard;
use render::raster::Canvas;
use render::text::TextOverlay;
use session::{Session, SessionPlan, VideoOutput};
use stream::simulated::SimulatedEncoder;
use stream::StreamConfig;
use telemetry::controller::TelemetryController;
use telemetry::meter::{ChannelSpread, LevelMeter};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::default();
    if let Some(path) = config::find_config(cli.config.as_deref()) {
        match config::load_config(&path) {
            Some(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            None => log::warn!("Failed to load config from {}", path.display()),
        }
    }
    merge_config(&cli, &mut cfg);
    cfg.validate().context("Invalid configuration")?;

    log::info!("streamscope - contribution telemetry console");
    log::info!("Destination: {}://{}:{}", cfg.stream.protocol, cfg.stream.host, cfg.stream.port);
    log::info!(
        "Target: {} kbps, sampled every {}ms",
        cfg.stream.target_bitrate_kbps,
        cfg.telemetry.sample_interval_ms
    );

    // 1. Audio source
    let audio = build_audio_source(&cli, &cfg);

    // 2. Telemetry
    let spread = if cfg.meter.simulate_stereo {
        ChannelSpread::jitter(cli.seed)
    } else {
        ChannelSpread::Mirror
    };
    let (events_tx, events_rx) = events::event_bus();
    let controller = TelemetryController::new(&cfg.telemetry, LevelMeter::new(spread), audio, events_tx)
        .context("Invalid telemetry setup")?;

    // 3. Stream collaborator
    let secs_to_ms = |s: f32| (s.max(0.0) * 1000.0).round() as u64;
    let encoder = SimulatedEncoder::new(cfg.stream.variation_kbps, cli.seed)
        .fail_at(cli.fail_at.map(secs_to_ms));

    let plan = SessionPlan {
        duration_ms: secs_to_ms(cli.duration),
        start_at_ms: secs_to_ms(cli.start_at),
        stop_at_ms: cli.stop_at.map(secs_to_ms),
        fps: cfg.output.fps,
        stream: StreamConfig {
            protocol: cfg.stream.protocol.clone(),
            host: cfg.stream.host.clone(),
            port: cfg.stream.port,
            target_bitrate_kbps: cfg.stream.target_bitrate_kbps,
        },
        muted: cli.muted,
    };

    // 4. Dashboard video
    let video = if cli.no_video {
        None
    } else {
        Some(build_video_output(&cli, &cfg)?)
    };

    let report = Session::new(plan, controller, Box::new(encoder), events_rx).run(video)?;

    if let Some(ref path) = cli.report {
        report.write_json(path)?;
        log::info!("Report written to {}", path.display());
    }
    if !cli.no_video {
        log::info!("Done! Output: {}", cli.output.display());
    }
    Ok(())
}

/// Config values apply only where the CLI is at its default.
fn merge_config(cli: &Cli, cfg: &mut Config) {
    if cli.width != 1280 { cfg.output.width = cli.width; }
    if cli.height != 720 { cfg.output.height = cli.height; }
    if cli.fps != 30 { cfg.output.fps = cli.fps; }
    if cli.crf != 18 { cfg.output.crf = cli.crf; }
    if cli.codec != "libx264" { cfg.output.codec = cli.codec.clone(); }
    if cli.font.is_some() {
        cfg.output.font = cli.font.clone();
    }
    if cli.protocol != "srt" { cfg.stream.protocol = cli.protocol.clone(); }
    if !cli.host.is_empty() { cfg.stream.host = cli.host.clone(); }
    if cli.port != 9999 { cfg.stream.port = cli.port; }
    if cli.target != 5000 { cfg.stream.target_bitrate_kbps = cli.target; }
    if cli.simulate_stereo {
        cfg.meter.simulate_stereo = true;
    }
}

/// A clip that cannot be decoded or analyzed leaves metering degraded; the
/// bitrate side of the session still runs.
fn build_audio_source(cli: &Cli, cfg: &Config) -> Box<dyn AudioSource> {
    let Some(input) = cli.input.as_ref() else {
        log::warn!("No input clip; audio metering unavailable");
        return Box::new(UnavailableSource::new("no audio input configured"));
    };

    log::info!("Decoding audio: {}", input.display());
    let clip = match audio::decode::decode_clip(input) {
        Ok(clip) => clip,
        Err(err) => {
            log::warn!("Audio decode failed: {:#}", err);
            return Box::new(UnavailableSource::new(format!("{:#}", err)));
        }
    };
    log::info!(
        "Decoded {:.1}s, {} @ {}Hz",
        clip.duration_secs(),
        if clip.is_stereo() { "stereo" } else { "mono" },
        clip.sample_rate
    );

    match analyze_clip(&clip, AnalyzerSettings::from(&cfg.meter), cfg.meter.analysis_hz) {
        Ok(frames) => {
            let source = ClipSource::new(frames);
            log::info!("Metering from {} analysis frames", source.frame_count());
            Box::new(source)
        }
        Err(err) => {
            log::warn!("Audio analysis failed: {}", err);
            Box::new(UnavailableSource::new(err.to_string()))
        }
    }
}

fn build_video_output(cli: &Cli, cfg: &Config) -> Result<VideoOutput> {
    let out = &cfg.output;
    let text = match out.font.as_deref() {
        Some(path) => match TextOverlay::from_file(path) {
            Ok(overlay) => Some(overlay),
            Err(err) => {
                log::warn!("{:#}; labels disabled", err);
                None
            }
        },
        None => {
            log::warn!("No --font given; labels disabled");
            None
        }
    };

    log::info!("Resolution: {}x{} @ {}fps", out.width, out.height, out.fps);
    log::info!("Starting FFmpeg encoder...");
    let settings = EncoderSettings {
        width: out.width,
        height: out.height,
        fps: out.fps,
        codec: out.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: out.crf,
    };
    let encoder = FfmpegEncoder::spawn(
        &cli.output,
        cli.input.as_deref().filter(|p| p.exists()),
        &settings,
    )?;

    Ok(VideoOutput {
        dashboard: Dashboard::new(out.width, out.height),
        canvas: Canvas::new(out.width, out.height, text),
        encoder,
    })
}
