use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    compositor::DrawCommand,
    model::{AudioClip, VideoClip},
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediaError {
    #[error("seek to {target:.3}s failed for {src}: {reason}")]
    Seek {
        src: String,
        target: f64,
        reason: String,
    },
    #[error("draw failed for {src}: {reason}")]
    Draw { src: String, reason: String },
    #[error("decode failed for {src}: {reason}")]
    Decode { src: String, reason: String },
    #[error("no media source available for {0}")]
    Unavailable(MediaKey),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaKey {
    pub track_id: String,
    pub clip_id: String,
}

impl MediaKey {
    #[must_use]
    pub fn new(track_id: impl Into<String>, clip_id: impl Into<String>) -> Self {
        Self {
            track_id: track_id.into(),
            clip_id: clip_id.into(),
        }
    }
}

impl std::fmt::Display for MediaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.track_id, self.clip_id)
    }
}

pub trait VideoSource: Send {
    fn src(&self) -> &str;
    fn native_size(&self) -> (f64, f64);
    fn duration(&self) -> Option<f64>;
    fn position(&self) -> f64;
    fn seek(&mut self, seconds: f64) -> Result<(), MediaError>;
    fn is_playing(&self) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
}

pub trait AudioSource: Send {
    fn src(&self) -> &str;
    fn position(&self) -> f64;
    fn seek(&mut self, seconds: f64) -> Result<(), MediaError>;
    fn set_volume(&mut self, volume: f64);
    fn is_playing(&self) -> bool;
    fn play(&mut self);
    fn pause(&mut self);
}

pub trait MediaProvider: Send {
    fn video_source(&mut self, key: &MediaKey, clip: &VideoClip) -> Option<&mut dyn VideoSource>;
    fn audio_source(&mut self, key: &MediaKey, clip: &AudioClip) -> Option<&mut dyn AudioSource>;
    fn for_each_video(&mut self, visit: &mut dyn FnMut(&MediaKey, &mut dyn VideoSource));
    fn for_each_audio(&mut self, visit: &mut dyn FnMut(&MediaKey, &mut dyn AudioSource));
}

pub trait Surface: Send {
    fn clear(&mut self);
    fn draw(&mut self, source: &dyn VideoSource, command: &DrawCommand) -> Result<(), MediaError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: f64,
    pub height: f64,
    pub duration: Option<f64>,
}

impl Default for MediaInfo {
    fn default() -> Self {
        Self {
            width: crate::model::DEFAULT_CLIP_WIDTH,
            height: crate::model::DEFAULT_CLIP_HEIGHT,
            duration: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessVideo {
    src: String,
    info: MediaInfo,
    position: f64,
    playing: bool,
    fail_seeks: bool,
    pub seek_count: usize,
}

impl HeadlessVideo {
    #[must_use]
    pub fn new(src: impl Into<String>, info: MediaInfo) -> Self {
        Self {
            src: src.into(),
            info,
            position: 0.0,
            playing: false,
            fail_seeks: false,
            seek_count: 0,
        }
    }
}

impl VideoSource for HeadlessVideo {
    fn src(&self) -> &str {
        &self.src
    }

    fn native_size(&self) -> (f64, f64) {
        (self.info.width, self.info.height)
    }

    fn duration(&self) -> Option<f64> {
        self.info.duration
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
        if self.fail_seeks {
            return Err(MediaError::Seek {
                src: self.src.clone(),
                target: seconds,
                reason: "element rejected seek".to_string(),
            });
        }
        self.position = seconds;
        self.seek_count += 1;
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessAudio {
    src: String,
    position: f64,
    volume: f64,
    playing: bool,
    fail_seeks: bool,
    pub seek_count: usize,
}

impl HeadlessAudio {
    #[must_use]
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            position: 0.0,
            volume: crate::model::DEFAULT_VOLUME,
            playing: false,
            fail_seeks: false,
            seek_count: 0,
        }
    }

    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume
    }
}

impl AudioSource for HeadlessAudio {
    fn src(&self) -> &str {
        &self.src
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn seek(&mut self, seconds: f64) -> Result<(), MediaError> {
        if self.fail_seeks {
            return Err(MediaError::Seek {
                src: self.src.clone(),
                target: seconds,
                reason: "element rejected seek".to_string(),
            });
        }
        self.position = seconds;
        self.seek_count += 1;
        Ok(())
    }

    fn set_volume(&mut self, volume: f64) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessMediaPool {
    media: HashMap<String, MediaInfo>,
    failing_seeks: BTreeSet<String>,
    videos: BTreeMap<MediaKey, HeadlessVideo>,
    audios: BTreeMap<MediaKey, HeadlessAudio>,
}

impl HeadlessMediaPool {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_media(&mut self, src: impl Into<String>, info: MediaInfo) {
        self.media.insert(src.into(), info);
    }

    pub fn fail_seeks_for(&mut self, src: impl Into<String>) {
        let src = src.into();
        for video in self.videos.values_mut().filter(|video| video.src == src) {
            video.fail_seeks = true;
        }
        for audio in self.audios.values_mut().filter(|audio| audio.src == src) {
            audio.fail_seeks = true;
        }
        self.failing_seeks.insert(src);
    }

    #[must_use]
    pub fn video(&self, key: &MediaKey) -> Option<&HeadlessVideo> {
        self.videos.get(key)
    }

    #[must_use]
    pub fn audio(&self, key: &MediaKey) -> Option<&HeadlessAudio> {
        self.audios.get(key)
    }

    #[must_use]
    pub fn element_count(&self) -> usize {
        self.videos.len() + self.audios.len()
    }
}

impl MediaProvider for HeadlessMediaPool {
    fn video_source(&mut self, key: &MediaKey, clip: &VideoClip) -> Option<&mut dyn VideoSource> {
        let info = self.media.get(&clip.src).copied().unwrap_or_default();
        let fail_seeks = self.failing_seeks.contains(&clip.src);
        let video = self.videos.entry(key.clone()).or_insert_with(|| {
            let mut video = HeadlessVideo::new(clip.src.clone(), info);
            video.fail_seeks = fail_seeks;
            video
        });
        Some(video)
    }

    fn audio_source(&mut self, key: &MediaKey, clip: &AudioClip) -> Option<&mut dyn AudioSource> {
        let fail_seeks = self.failing_seeks.contains(&clip.src);
        let audio = self.audios.entry(key.clone()).or_insert_with(|| {
            let mut audio = HeadlessAudio::new(clip.src.clone());
            audio.fail_seeks = fail_seeks;
            audio
        });
        Some(audio)
    }

    fn for_each_video(&mut self, visit: &mut dyn FnMut(&MediaKey, &mut dyn VideoSource)) {
        for (key, video) in &mut self.videos {
            visit(key, video);
        }
    }

    fn for_each_audio(&mut self, visit: &mut dyn FnMut(&MediaKey, &mut dyn AudioSource)) {
        for (key, audio) in &mut self.audios {
            visit(key, audio);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    frames: Vec<Vec<DrawCommand>>,
    failing_draws: BTreeSet<String>,
    keep_frames: Option<usize>,
}

impl RecordingSurface {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bounded(frames: usize) -> Self {
        Self {
            keep_frames: Some(frames.max(1)),
            ..Self::default()
        }
    }

    pub fn fail_draws_for(&mut self, src: impl Into<String>) {
        self.failing_draws.insert(src.into());
    }

    #[must_use]
    pub fn frames(&self) -> &[Vec<DrawCommand>] {
        &self.frames
    }

    #[must_use]
    pub fn last_frame(&self) -> Option<&[DrawCommand]> {
        self.frames.last().map(Vec::as_slice)
    }
}

impl Surface for RecordingSurface {
    fn clear(&mut self) {
        self.frames.push(Vec::new());
        if let Some(limit) = self.keep_frames
            && self.frames.len() > limit
        {
            let excess = self.frames.len() - limit;
            self.frames.drain(..excess);
        }
    }

    fn draw(&mut self, source: &dyn VideoSource, command: &DrawCommand) -> Result<(), MediaError> {
        if self.failing_draws.contains(source.src()) {
            return Err(MediaError::Draw {
                src: source.src().to_string(),
                reason: "frame not decodable".to_string(),
            });
        }
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push(command.clone());
        }
        Ok(())
    }
}
