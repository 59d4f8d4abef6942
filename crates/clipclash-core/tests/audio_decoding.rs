use std::{path::Path, sync::Arc};

use clipclash_core::{
    MediaCache, SourceWindow, SymphoniaDecoder, WaveformSampler, decode_audio_file_first_channel,
};
use tempfile::tempdir;

const SAMPLE_RATE: u32 = 8_000;

/// Left channel ramps from silence to half scale, right channel holds full
/// scale, so channel selection is visible in the decoded peaks.
fn write_stereo_wav(path: &Path, seconds: f32) {
    let frame_count = (seconds * SAMPLE_RATE as f32).round() as usize;
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec).expect("test wav should be creatable");
    for frame in 0..frame_count {
        let left = frame as f32 / frame_count as f32 * 0.5;
        writer
            .write_sample((left * f32::from(i16::MAX)).round() as i16)
            .expect("left sample write should succeed");
        writer
            .write_sample(i16::MAX)
            .expect("right sample write should succeed");
    }
    writer.finalize().expect("test wav finalize should succeed");
}

#[test]
fn decode_keeps_first_channel_only() {
    let temp = tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("ramp.wav");
    write_stereo_wav(&path, 1.0);

    let audio = decode_audio_file_first_channel(&path).expect("decode should succeed");
    assert_eq!(audio.sample_rate, SAMPLE_RATE);
    assert_eq!(audio.raw_data.len(), SAMPLE_RATE as usize);
    assert!((audio.duration - 1.0).abs() < 1e-6);
    assert!(audio.global_max < 0.51, "right channel leaked: {}", audio.global_max);
    assert!(audio.global_max > 0.49);
}

#[test]
fn sampler_normalizes_across_windows() {
    let temp = tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("ramp.wav");
    write_stereo_wav(&path, 2.0);
    let src = path.display().to_string();

    let cache = Arc::new(MediaCache::default());
    let sampler = WaveformSampler::new(Arc::clone(&cache), Arc::new(SymphoniaDecoder::new()));

    let full = sampler.peaks_blocking(&src, 50, SourceWindow::default());
    assert_eq!(full.len(), 50);
    let loudest = full.iter().map(|peak| peak.max).fold(0.0_f32, f32::max);
    assert!((loudest - 1.0).abs() < 1e-3);

    let first_half = sampler.peaks_blocking(&src, 10, SourceWindow::new(0.0, Some(1.0)));
    let first_half_loudest = first_half.iter().map(|peak| peak.max).fold(0.0_f32, f32::max);
    assert!(
        (first_half_loudest - 0.5).abs() < 0.01,
        "window should stay scaled to the whole file: {first_half_loudest}"
    );

    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hit_rate, Some(0.5));
}

#[test]
fn missing_and_garbage_files_yield_empty_peaks() {
    let temp = tempdir().expect("tempdir should be creatable");
    let garbage = temp.path().join("noise.wav");
    std::fs::write(&garbage, b"definitely not a riff header").expect("write garbage");

    let sampler = WaveformSampler::new(
        Arc::new(MediaCache::default()),
        Arc::new(SymphoniaDecoder::with_root(temp.path())),
    );
    assert!(sampler
        .peaks_blocking("noise.wav", 20, SourceWindow::default())
        .is_empty());
    assert!(sampler
        .peaks_blocking("absent.wav", 20, SourceWindow::default())
        .is_empty());
    assert_eq!(sampler.cache().stats().entries, 0);
}

#[test]
fn background_requests_share_one_decode() {
    let temp = tempdir().expect("tempdir should be creatable");
    let path = temp.path().join("ramp.wav");
    write_stereo_wav(&path, 0.5);
    let src = path.display().to_string();

    let sampler = WaveformSampler::new(
        Arc::new(MediaCache::default()),
        Arc::new(SymphoniaDecoder::new()),
    );
    let first = sampler.request(&src, 8, SourceWindow::default());
    let second = sampler.request(&src, 4, SourceWindow::default());
    second.cancel();

    assert_eq!(first.wait().map(|peaks| peaks.len()), Some(8));
    assert!(second.wait().is_none());
    assert!(sampler.cache().get_audio(&src).is_some());
}
