use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::render::raster::rgba_len;

/// Video settings for the dashboard recording.
#[derive(Clone, Debug)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
}

/// Raw RGBA frames in over stdin, an encoded file out.
pub struct FfmpegEncoder {
    child: Child,
    frame_len: usize,
}

impl FfmpegEncoder {
    /// `audio` is muxed alongside the video when given, trimmed to the
    /// shorter of the two.
    pub fn spawn(output_path: &Path, audio: Option<&Path>, settings: &EncoderSettings) -> Result<Self> {
        let args = build_args(output_path, audio, settings);

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            settings.width,
            settings.height,
            settings.fps,
            settings.codec
        );

        Ok(Self {
            child,
            frame_len: rgba_len(settings.width, settings.height),
        })
    }

    pub fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        anyhow::ensure!(
            rgba_pixels.len() == self.frame_len,
            "Frame is {} bytes, expected {}",
            rgba_pixels.len(),
            self.frame_len
        );
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        // EOF on stdin ends the stream
        drop(self.child.stdin.take());

        let output = self.child.wait_with_output().context("Failed to wait for ffmpeg")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }
}

fn build_args(output_path: &Path, audio: Option<&Path>, settings: &EncoderSettings) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", settings.width, settings.height),
        "-framerate".into(), settings.fps.to_string(),
        "-i".into(), "pipe:0".into(),
    ];

    if let Some(audio) = audio {
        args.extend(["-i".to_string(), audio.to_string_lossy().into_owned()]);
    }

    args.extend([
        "-c:v".to_string(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
        "-crf".into(), settings.crf.to_string(),
        "-preset".into(), "medium".into(),
    ]);

    if audio.is_some() {
        args.extend([
            "-c:a".to_string(), "aac".into(),
            "-b:a".into(), "192k".into(),
            "-shortest".into(),
        ]);
    }

    args.push(output_path.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            width: 640,
            height: 360,
            fps: 30,
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
        }
    }

    #[test]
    fn video_only_has_single_input() {
        let args = build_args(Path::new("out.mp4"), None, &settings());
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert!(!args.contains(&"-shortest".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
        assert!(args.windows(2).any(|w| w[0] == "-video_size" && w[1] == "640x360"));
    }

    #[test]
    fn audio_is_muxed_when_present() {
        let args = build_args(Path::new("out.mp4"), Some(Path::new("clip.wav")), &settings());
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "clip.wav"));
        assert!(args.contains(&"-shortest".to_string()));
        assert!(args.contains(&"aac".to_string()));
    }
}
