use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::{
    media::MediaError,
    media_cache::{AudioData, DecodeResult, MediaCache, PendingAudio},
    time::{seconds_to_sample_ceil, seconds_to_sample_floor},
};

pub const DEFAULT_SAMPLE_COUNT: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakPair {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceWindow {
    pub source_in: f64,
    pub source_duration: Option<f64>,
}

impl SourceWindow {
    #[must_use]
    pub fn new(source_in: f64, source_duration: Option<f64>) -> Self {
        Self {
            source_in,
            source_duration,
        }
    }

    fn sample_range(self, audio: &AudioData) -> (usize, usize) {
        let len = audio.raw_data.len();
        let start = seconds_to_sample_floor(self.source_in, audio.sample_rate).min(len);
        let end = self.source_duration.map_or(len, |duration| {
            start.saturating_add(seconds_to_sample_ceil(duration, audio.sample_rate))
        });
        (start, end.min(len))
    }
}

#[must_use]
pub fn derive_peaks(audio: &AudioData, sample_count: usize, window: SourceWindow) -> Vec<PeakPair> {
    if sample_count == 0 {
        return Vec::new();
    }

    let (start, end) = window.sample_range(audio);
    let samples = &audio.raw_data[start..end];
    let scale = if audio.global_max > 0.0 {
        audio.global_max.recip()
    } else {
        1.0
    };

    (0..sample_count)
        .map(|block| {
            let from = block * samples.len() / sample_count;
            let to = (block + 1) * samples.len() / sample_count;
            let (min, max) = samples[from..to]
                .iter()
                .fold((0.0_f32, 0.0_f32), |(min, max), &sample| {
                    (min.min(sample), max.max(sample))
                });
            PeakPair {
                min: min * scale,
                max: max * scale,
            }
        })
        .collect()
}

pub trait AudioDecoder: Send + Sync {
    fn decode(&self, src: &str) -> anyhow::Result<AudioData>;
}

#[derive(Clone)]
pub struct WaveformSampler {
    cache: Arc<MediaCache>,
    decoder: Arc<dyn AudioDecoder>,
}

impl std::fmt::Debug for WaveformSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveformSampler")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl WaveformSampler {
    pub fn new(cache: Arc<MediaCache>, decoder: Arc<dyn AudioDecoder>) -> Self {
        Self { cache, decoder }
    }

    pub fn with_global_cache(decoder: Arc<dyn AudioDecoder>) -> Self {
        Self::new(MediaCache::global(), decoder)
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<MediaCache> {
        &self.cache
    }

    #[instrument(skip(self))]
    pub fn load_audio_blocking(&self, src: &str) -> DecodeResult {
        if let Some(audio) = self.cache.get_audio(src) {
            return Ok(audio);
        }

        let (pending, owner) = self.cache.claim_pending_audio(src, PendingAudio::new());
        if owner {
            let result = decode_shared(self.decoder.as_ref(), src);
            self.cache.complete_pending(src, &pending, result);
        } else {
            debug!(src, "joining in-flight decode");
        }
        pending.wait()
    }

    pub fn peaks_blocking(
        &self,
        src: &str,
        sample_count: usize,
        window: SourceWindow,
    ) -> Vec<PeakPair> {
        match self.load_audio_blocking(src) {
            Ok(audio) => derive_peaks(&audio, sample_count, window),
            Err(error) => {
                warn!(src, %error, "waveform unavailable");
                Vec::new()
            }
        }
    }

    pub fn request(&self, src: &str, sample_count: usize, window: SourceWindow) -> WaveformRequest {
        let pending = if let Some(audio) = self.cache.get_audio(src) {
            let ready = PendingAudio::new();
            ready.resolve(Ok(audio));
            ready
        } else {
            let (pending, owner) = self.cache.claim_pending_audio(src, PendingAudio::new());
            if owner {
                self.spawn_decode(src, &pending);
            }
            pending
        };

        WaveformRequest {
            src: src.to_string(),
            sample_count,
            window,
            pending,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    fn spawn_decode(&self, src: &str, pending: &PendingAudio) {
        let cache = Arc::clone(&self.cache);
        let decoder = Arc::clone(&self.decoder);
        let worker_src = src.to_string();
        let worker_pending = pending.clone();

        let spawned = thread::Builder::new()
            .name("waveform-decode".to_string())
            .spawn(move || {
                let result = decode_shared(decoder.as_ref(), &worker_src);
                cache.complete_pending(&worker_src, &worker_pending, result);
            });

        if let Err(error) = spawned {
            warn!(src, %error, "failed to start decode worker");
            self.cache.complete_pending(
                src,
                pending,
                Err(MediaError::Decode {
                    src: src.to_string(),
                    reason: error.to_string(),
                }),
            );
        }
    }
}

fn decode_shared(decoder: &dyn AudioDecoder, src: &str) -> DecodeResult {
    decoder.decode(src).map(Arc::new).map_err(|error| {
        warn!(src, error = %format!("{error:#}"), "audio decode failed");
        MediaError::Decode {
            src: src.to_string(),
            reason: format!("{error:#}"),
        }
    })
}

#[derive(Debug, Clone)]
pub struct WaveformRequest {
    src: String,
    sample_count: usize,
    window: SourceWindow,
    pending: PendingAudio,
    cancelled: Arc<AtomicBool>,
}

impl WaveformRequest {
    #[must_use]
    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn wait(&self) -> Option<Vec<PeakPair>> {
        if self.is_cancelled() {
            return None;
        }
        let result = self.pending.wait();
        if self.is_cancelled() {
            return None;
        }
        Some(self.peaks_from(result))
    }

    #[must_use]
    pub fn try_peaks(&self) -> Option<Vec<PeakPair>> {
        if self.is_cancelled() {
            return None;
        }
        self.pending.try_result().map(|result| self.peaks_from(result))
    }

    fn peaks_from(&self, result: DecodeResult) -> Vec<PeakPair> {
        match result {
            Ok(audio) => derive_peaks(&audio, self.sample_count, self.window),
            Err(error) => {
                warn!(src = %self.src, %error, "waveform unavailable");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl AudioDecoder for CountingDecoder {
        fn decode(&self, src: &str) -> anyhow::Result<AudioData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if src.ends_with(".broken") {
                anyhow::bail!("unsupported container");
            }
            Ok(AudioData::from_samples(vec![0.5, -1.0, 0.25, 0.75], 4))
        }
    }

    fn sampler() -> (WaveformSampler, Arc<CountingDecoder>) {
        let decoder = Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
        });
        let sampler = WaveformSampler::new(Arc::new(MediaCache::default()), decoder.clone());
        (sampler, decoder)
    }

    #[test]
    fn peaks_are_normalized_by_buffer_peak() {
        let audio = AudioData::from_samples(vec![0.1, -0.4, 0.2, 0.3], 4);
        let peaks = derive_peaks(&audio, 2, SourceWindow::default());

        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].min + 1.0).abs() < 1e-6);
        assert!((peaks[0].max - 0.25).abs() < 1e-6);
        assert!((peaks[1].max - 0.75).abs() < 1e-6);
    }

    #[test]
    fn window_keeps_global_normalization() {
        let audio = AudioData::from_samples(vec![1.0, 1.0, 0.5, 0.5], 4);
        let peaks = derive_peaks(&audio, 1, SourceWindow::new(0.5, Some(0.5)));
        assert!((peaks[0].max - 0.5).abs() < 1e-6);
    }

    #[test]
    fn window_past_end_yields_flat_peaks() {
        let audio = AudioData::from_samples(vec![0.5; 8], 4);
        let peaks = derive_peaks(&audio, 3, SourceWindow::new(10.0, None));
        assert_eq!(peaks, vec![PeakPair::default(); 3]);
    }

    #[test]
    fn silent_buffer_does_not_divide_by_zero() {
        let audio = AudioData::from_samples(vec![0.0; 16], 8);
        let peaks = derive_peaks(&audio, 4, SourceWindow::default());
        assert!(peaks.iter().all(|peak| peak.min == 0.0 && peak.max == 0.0));
    }

    #[test]
    fn repeated_requests_decode_once() {
        let (sampler, decoder) = sampler();
        let first = sampler.peaks_blocking("a.wav", 4, SourceWindow::default());
        let second = sampler.peaks_blocking("a.wav", 2, SourceWindow::default());

        assert_eq!(first.len(), 4);
        assert_eq!(second.len(), 2);
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn decode_failure_yields_empty_peaks() {
        let (sampler, _) = sampler();
        assert!(
            sampler
                .peaks_blocking("clip.broken", 10, SourceWindow::default())
                .is_empty()
        );
        assert!(sampler.cache().get_audio("clip.broken").is_none());
    }

    #[test]
    fn cancelled_request_still_populates_cache() {
        let (sampler, decoder) = sampler();
        let request = sampler.request("b.wav", 4, SourceWindow::default());
        request.cancel();
        assert!(request.wait().is_none());

        let follower = sampler.request("b.wav", 2, SourceWindow::default());
        assert_eq!(follower.wait().map(|peaks| peaks.len()), Some(2));
        assert!(sampler.cache().get_audio("b.wav").is_some());
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn background_request_resolves_peaks() {
        let (sampler, _) = sampler();
        let request = sampler.request("c.wav", 2, SourceWindow::default());
        let peaks = request.wait().expect("not cancelled");
        assert_eq!(peaks.len(), 2);
        assert!((peaks[0].min + 1.0).abs() < 1e-6);
    }
}
