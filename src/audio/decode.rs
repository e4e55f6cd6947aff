use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Decoded clip, one sample vector per metered channel (at most two).
pub struct ClipData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl ClipData {
    pub fn duration_secs(&self) -> f32 {
        let len = self.channels.first().map_or(0, |c| c.len());
        if self.sample_rate == 0 {
            return 0.0;
        }
        len as f32 / self.sample_rate as f32
    }

    pub fn is_stereo(&self) -> bool {
        self.channels.len() == 2
    }
}

/// Decode a clip, keeping L/R separate for stereo sources. Sources with more
/// than two channels fold the extra channels into L and R alternately.
pub fn decode_clip(path: &Path) -> Result<ClipData> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("Failed to probe audio format")?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .context("No audio tracks found")?;

    let track_id = track.id;
    let source_channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
    let out_channels = source_channels.min(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    let mut channels: Vec<Vec<f32>> = vec![Vec::new(); out_channels];

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        split_interleaved(sample_buf.samples(), source_channels, &mut channels);
    }

    log::info!(
        "Decoded audio: {} channel(s), {}Hz, {:.1}s",
        channels.len(),
        sample_rate,
        channels.first().map_or(0, |c| c.len()) as f32 / sample_rate as f32
    );

    Ok(ClipData {
        channels,
        sample_rate,
    })
}

fn split_interleaved(samples: &[f32], source_channels: usize, out: &mut [Vec<f32>]) {
    if out.len() == 1 {
        out[0].extend(samples.chunks(source_channels).map(|f| f[0]));
        return;
    }
    for frame in samples.chunks(source_channels) {
        let (mut l, mut r, mut nl, mut nr) = (0.0f32, 0.0f32, 0usize, 0usize);
        for (i, s) in frame.iter().enumerate() {
            if i % 2 == 0 {
                l += s;
                nl += 1;
            } else {
                r += s;
                nr += 1;
            }
        }
        out[0].push(l / nl.max(1) as f32);
        out[1].push(r / nr.max(1) as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_stereo_frames() {
        let mut out = vec![Vec::new(), Vec::new()];
        split_interleaved(&[0.1, 0.2, 0.3, 0.4], 2, &mut out);
        assert_eq!(out[0], vec![0.1, 0.3]);
        assert_eq!(out[1], vec![0.2, 0.4]);
    }

    #[test]
    fn folds_surround_into_pairs() {
        let mut out = vec![Vec::new(), Vec::new()];
        split_interleaved(&[1.0, 0.0, 1.0, 0.0], 4, &mut out);
        assert_eq!(out[0], vec![1.0]);
        assert_eq!(out[1], vec![0.0]);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = decode_clip(Path::new("/nonexistent/clip.wav")).err().unwrap();
        assert!(format!("{:#}", err).contains("/nonexistent/clip.wav"));
    }
}
