use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::timeline::TimelineError;

pub const DEFAULT_CLIP_WIDTH: f64 = 1920.0;
pub const DEFAULT_CLIP_HEIGHT: f64 = 1080.0;
pub const DEFAULT_VOLUME: f64 = 1.0;
pub const DEFAULT_SPEED: f64 = 1.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineState {
    pub duration: f64,
    pub tracks: Vec<Track>,
}

impl TimelineState {
    #[must_use]
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            tracks: Vec::new(),
        }
    }

    #[must_use]
    pub fn for_match(config: &MatchConfig) -> Self {
        let video = (0..config.max_video_tracks)
            .map(|index| Track::new(format!("video-{index}"), TrackKind::Video));
        let audio = (0..config.max_audio_tracks)
            .map(|index| Track::new(format!("audio-{index}"), TrackKind::Audio));

        Self {
            duration: config.timeline_duration,
            tracks: video.chain(audio).collect(),
        }
    }

    #[must_use]
    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|track| track.id == track_id)
    }

    #[must_use]
    pub fn find_clip(&self, track_id: &str, clip_id: &str) -> Option<&Clip> {
        self.track(track_id)?
            .clips
            .iter()
            .find(|clip| clip.id() == clip_id)
    }

    #[must_use]
    pub fn clip_count(&self) -> usize {
        self.tracks.iter().map(|track| track.clips.len()).sum()
    }

    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.tracks
            .iter()
            .flat_map(|track| track.clips.iter())
            .map(Clip::end_time)
            .fold(0.0, f64::max)
    }

    pub fn active_clips_at(&self, time: f64) -> impl Iterator<Item = (usize, &Track, &Clip)> {
        self.tracks
            .iter()
            .enumerate()
            .flat_map(move |(index, track)| {
                track
                    .clips
                    .iter()
                    .filter(move |clip| clip.is_active_at(time))
                    .map(move |clip| (index, track, clip))
            })
    }

    /// # Errors
    /// Returns the first violation found, scanning tracks in order.
    pub fn validate(&self) -> Result<(), TimelineError> {
        if !is_non_negative(self.duration) {
            return Err(TimelineError::InvalidDuration(self.duration));
        }
        for track in &self.tracks {
            let mut seen = BTreeSet::new();
            for clip in &track.clips {
                if clip.kind() != track.kind {
                    return Err(TimelineError::ClipKindMismatch {
                        track_id: track.id.clone(),
                        track_kind: track.kind,
                        clip_kind: clip.kind(),
                    });
                }
                if !seen.insert(clip.id()) {
                    return Err(TimelineError::DuplicateClip {
                        track_id: track.id.clone(),
                        clip_id: clip.id().to_string(),
                    });
                }
                clip.validate()?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    pub max_video_tracks: usize,
    pub max_audio_tracks: usize,
    pub timeline_duration: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_video_tracks: 3,
            max_audio_tracks: 2,
            timeline_duration: 60.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TrackKind,
    pub clips: Vec<Clip>,
}

impl Track {
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TrackKind) -> Self {
        Self {
            id: id.into(),
            kind,
            clips: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Video => f.write_str("video"),
            Self::Audio => f.write_str("audio"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Clip {
    Video(VideoClip),
    Audio(AudioClip),
}

pub type VideoClip = MediaClip<VideoProperties>;
pub type AudioClip = MediaClip<AudioProperties>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaClip<P> {
    pub id: String,
    pub src: String,
    pub start_time: f64,
    pub duration: f64,
    pub source_in: f64,
    pub properties: P,
}

impl<P> MediaClip<P> {
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    #[must_use]
    pub fn is_active_at(&self, time: f64) -> bool {
        self.start_time <= time && time < self.end_time()
    }
}

impl Clip {
    #[must_use]
    pub fn video(src: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self::Video(MediaClip {
            id: Uuid::new_v4().to_string(),
            src: src.into(),
            start_time,
            duration,
            source_in: 0.0,
            properties: VideoProperties::default(),
        })
    }

    #[must_use]
    pub fn audio(src: impl Into<String>, start_time: f64, duration: f64) -> Self {
        Self::Audio(MediaClip {
            id: Uuid::new_v4().to_string(),
            src: src.into(),
            start_time,
            duration,
            source_in: 0.0,
            properties: AudioProperties::default(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> TrackKind {
        match self {
            Self::Video(_) => TrackKind::Video,
            Self::Audio(_) => TrackKind::Audio,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Video(clip) => &clip.id,
            Self::Audio(clip) => &clip.id,
        }
    }

    #[must_use]
    pub fn src(&self) -> &str {
        match self {
            Self::Video(clip) => &clip.src,
            Self::Audio(clip) => &clip.src,
        }
    }

    #[must_use]
    pub fn start_time(&self) -> f64 {
        match self {
            Self::Video(clip) => clip.start_time,
            Self::Audio(clip) => clip.start_time,
        }
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        match self {
            Self::Video(clip) => clip.duration,
            Self::Audio(clip) => clip.duration,
        }
    }

    #[must_use]
    pub fn source_in(&self) -> f64 {
        match self {
            Self::Video(clip) => clip.source_in,
            Self::Audio(clip) => clip.source_in,
        }
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        match self {
            Self::Video(clip) => clip.properties.speed,
            Self::Audio(_) => DEFAULT_SPEED,
        }
    }

    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.start_time() + self.duration()
    }

    #[must_use]
    pub fn is_active_at(&self, time: f64) -> bool {
        match self {
            Self::Video(clip) => clip.is_active_at(time),
            Self::Audio(clip) => clip.is_active_at(time),
        }
    }

    #[must_use]
    pub fn with_timing(&self, start_time: f64, duration: f64, source_in: f64) -> Self {
        let mut next = self.clone();
        match &mut next {
            Self::Video(clip) => {
                clip.start_time = start_time;
                clip.duration = duration;
                clip.source_in = source_in;
            }
            Self::Audio(clip) => {
                clip.start_time = start_time;
                clip.duration = duration;
                clip.source_in = source_in;
            }
        }
        next
    }

    #[must_use]
    pub fn with_id(&self, id: impl Into<String>) -> Self {
        let mut next = self.clone();
        match &mut next {
            Self::Video(clip) => clip.id = id.into(),
            Self::Audio(clip) => clip.id = id.into(),
        }
        next
    }

    /// # Errors
    /// Returns [`TimelineError::InvalidProperty`] naming the offending field.
    pub fn validate(&self) -> Result<(), TimelineError> {
        let invalid = |field: &'static str, value: f64| TimelineError::InvalidProperty {
            clip_id: self.id().to_string(),
            field,
            value,
        };

        if !is_positive(self.duration()) {
            return Err(invalid("duration", self.duration()));
        }
        if !is_non_negative(self.source_in()) {
            return Err(invalid("sourceIn", self.source_in()));
        }
        if !self.start_time().is_finite() {
            return Err(invalid("startTime", self.start_time()));
        }

        match self {
            Self::Video(clip) => {
                let properties = &clip.properties;
                if !is_positive(properties.zoom.x) {
                    return Err(invalid("zoom.x", properties.zoom.x));
                }
                if !is_positive(properties.zoom.y) {
                    return Err(invalid("zoom.y", properties.zoom.y));
                }
                if !is_positive(properties.speed) {
                    return Err(invalid("speed", properties.speed));
                }
                if !is_non_negative(properties.freeze_frame_time) {
                    return Err(invalid("freezeFrameTime", properties.freeze_frame_time));
                }
                let crop = &properties.crop;
                let finite_fields = [
                    ("position.x", properties.position.x),
                    ("position.y", properties.position.y),
                    ("size.width", properties.size.width),
                    ("size.height", properties.size.height),
                    ("rotation", properties.rotation),
                    ("pitch", properties.pitch),
                    ("yaw", properties.yaw),
                    ("crop.left", crop.left),
                    ("crop.right", crop.right),
                    ("crop.top", crop.top),
                    ("crop.bottom", crop.bottom),
                    ("crop.softness", crop.softness),
                ];
                if let Some((field, value)) =
                    finite_fields.into_iter().find(|(_, value)| !value.is_finite())
                {
                    return Err(invalid(field, value));
                }
            }
            Self::Audio(clip) => {
                if !(0.0..=1.0).contains(&clip.properties.volume) {
                    return Err(invalid("volume", clip.properties.volume));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoProperties {
    pub position: Position,
    pub size: Size,
    pub zoom: Zoom,
    pub rotation: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub flip: Flip,
    pub crop: Crop,
    pub speed: f64,
    pub freeze_frame: bool,
    pub freeze_frame_time: f64,
}

impl Default for VideoProperties {
    fn default() -> Self {
        Self {
            position: Position::default(),
            size: Size::default(),
            zoom: Zoom::default(),
            rotation: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            flip: Flip::default(),
            crop: Crop::default(),
            speed: DEFAULT_SPEED,
            freeze_frame: false,
            freeze_frame_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Default for Size {
    fn default() -> Self {
        Self {
            width: DEFAULT_CLIP_WIDTH,
            height: DEFAULT_CLIP_HEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Zoom {
    pub x: f64,
    pub y: f64,
    pub linked: bool,
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            x: 1.0,
            y: 1.0,
            linked: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Flip {
    pub horizontal: bool,
    pub vertical: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct Crop {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    pub softness: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioProperties {
    pub volume: f64,
}

impl Default for AudioProperties {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
}

impl PlaybackState {
    #[must_use]
    pub fn paused_at(current_time: f64) -> Self {
        Self {
            current_time,
            is_playing: false,
        }
    }

    #[must_use]
    pub fn playing_at(current_time: f64) -> Self {
        Self {
            current_time,
            is_playing: true,
        }
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_layout_puts_video_tracks_first() {
        let timeline = TimelineState::for_match(&MatchConfig {
            max_video_tracks: 2,
            max_audio_tracks: 1,
            timeline_duration: 30.0,
        });

        let ids: Vec<&str> = timeline.tracks.iter().map(|track| track.id.as_str()).collect();
        assert_eq!(ids, ["video-0", "video-1", "audio-0"]);
        assert_eq!(timeline.tracks[2].kind, TrackKind::Audio);
        assert!((timeline.duration - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn clip_json_uses_type_tag_and_camel_case() {
        let clip = Clip::video("media/intro.mp4", 1.5, 4.0).with_id("clip-1");
        let value = serde_json::to_value(&clip).expect("clip should serialize");

        assert_eq!(value["type"], "video");
        assert_eq!(value["id"], "clip-1");
        assert_eq!(value["startTime"], 1.5);
        assert_eq!(value["sourceIn"], 0.0);
        assert_eq!(value["properties"]["freezeFrame"], false);
        assert_eq!(value["properties"]["zoom"]["linked"], true);
    }

    #[test]
    fn active_interval_is_half_open() {
        let clip = Clip::audio("media/bed.wav", 2.0, 3.0);
        assert!(!clip.is_active_at(1.999));
        assert!(clip.is_active_at(2.0));
        assert!(clip.is_active_at(4.999));
        assert!(!clip.is_active_at(5.0));
    }

    #[test]
    fn validate_flags_clip_on_wrong_track_kind() {
        let mut timeline = TimelineState::new(10.0);
        let mut track = Track::new("audio-0", TrackKind::Audio);
        track.clips.push(Clip::video("media/intro.mp4", 0.0, 1.0));
        timeline.tracks.push(track);

        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::ClipKindMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_non_finite_numbers() {
        let infinite = Clip::video("media/intro.mp4", 0.0, f64::INFINITY);
        assert!(matches!(
            infinite.validate(),
            Err(TimelineError::InvalidProperty { field: "duration", .. })
        ));

        let Clip::Video(mut clip) = Clip::video("media/intro.mp4", 0.0, 1.0) else {
            unreachable!("constructor builds a video clip");
        };
        clip.properties.speed = f64::INFINITY;
        assert!(Clip::Video(clip.clone()).validate().is_err());

        clip.properties.speed = 1.0;
        clip.properties.crop.left = f64::NAN;
        assert!(matches!(
            Clip::Video(clip).validate(),
            Err(TimelineError::InvalidProperty { field: "crop.left", .. })
        ));

        let mut timeline = TimelineState::new(f64::NAN);
        assert!(matches!(
            timeline.validate(),
            Err(TimelineError::InvalidDuration(_))
        ));
        timeline.duration = 10.0;
        assert!(timeline.validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_positive_speed() {
        let Clip::Video(mut clip) = Clip::video("media/intro.mp4", 0.0, 1.0) else {
            unreachable!("constructor builds a video clip");
        };
        clip.properties.speed = 0.0;

        let error = Clip::Video(clip).validate().expect_err("speed 0 is invalid");
        assert!(matches!(
            error,
            TimelineError::InvalidProperty { field: "speed", .. }
        ));
    }
}
