use std::{
    fs::File,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use symphonia::core::{
    audio::SampleBuffer, codecs::DecoderOptions, errors::Error as SymphoniaError,
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};
use tracing::{debug, instrument};

use crate::{media_cache::AudioData, waveform::AudioDecoder};

pub const SUPPORTED_AUDIO_EXTENSIONS: [&str; 11] = [
    "wav", "flac", "mp3", "ogg", "m4a", "aiff", "aif", "caf", "mkv", "mp4", "webm",
];

#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    root: Option<PathBuf>,
}

impl SymphoniaDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, src: &str) -> PathBuf {
        let path = Path::new(src);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, src: &str) -> Result<AudioData> {
        decode_audio_file_first_channel(&self.resolve(src))
    }
}

#[must_use]
pub fn is_supported_audio_path(path: &Path) -> bool {
    path.extension()
        .and_then(|value| value.to_str())
        .is_some_and(|extension| {
            SUPPORTED_AUDIO_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
}

#[instrument(fields(path = %path.display()))]
pub fn decode_audio_file_first_channel(path: &Path) -> Result<AudioData> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|value| value.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognized audio container: {}", path.display()))?;
    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("no default audio track found in {}", path.display()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .with_context(|| format!("unsupported audio codec in {}", path.display()))?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(48_000);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(error)) if error.kind() == ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(anyhow::anyhow!(
                    "audio stream reset required for {}",
                    path.display()
                ));
            }
            Err(error) => return Err(error.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                continue;
            }
            Err(error) => return Err(error.into()),
        };

        sample_rate = decoded.spec().rate;
        push_first_channel(decoded, &mut samples);
    }

    if samples.is_empty() {
        return Err(anyhow::anyhow!(
            "decoded zero samples from {}",
            path.display()
        ));
    }

    let audio = AudioData::from_samples(samples, sample_rate);
    debug!(
        sample_rate,
        frames = audio.raw_data.len(),
        duration = audio.duration,
        "audio decode complete"
    );
    Ok(audio)
}

fn push_first_channel(decoded: symphonia::core::audio::AudioBufferRef<'_>, samples: &mut Vec<f32>) {
    let spec = *decoded.spec();
    let channel_count = spec.channels.count().max(1);
    let mut sample_buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
    sample_buffer.copy_interleaved_ref(decoded);

    samples.extend(sample_buffer.samples().iter().step_by(channel_count).copied());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(is_supported_audio_path(Path::new("take.WAV")));
        assert!(is_supported_audio_path(Path::new("clip.webm")));
        assert!(!is_supported_audio_path(Path::new("notes.txt")));
        assert!(!is_supported_audio_path(Path::new("no_extension")));
    }

    #[test]
    fn relative_sources_resolve_against_root() {
        let decoder = SymphoniaDecoder::with_root("/media");
        assert_eq!(decoder.resolve("a.wav"), PathBuf::from("/media/a.wav"));
        assert_eq!(decoder.resolve("/abs/b.wav"), PathBuf::from("/abs/b.wav"));
    }

    #[test]
    fn missing_file_reports_path() {
        let error = decode_audio_file_first_channel(Path::new("/definitely/missing.wav"))
            .expect_err("missing file should fail");
        assert!(format!("{error:#}").contains("missing.wav"));
    }
}
