use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
    media::{AudioSource, MediaError, MediaKey, MediaProvider, Surface, VideoSource},
    model::{AudioClip, Clip, PlaybackState, TimelineState, Track, VideoClip, VideoProperties},
    time::drifted,
};

pub const DEFAULT_SEEK_TOLERANCE_SECONDS: f64 = 0.1;
pub const DEFAULT_REFRESH_RATE_HZ: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorSettings {
    pub seek_tolerance_seconds: f64,
    pub refresh_rate_hz: f64,
}

impl Default for CompositorSettings {
    fn default() -> Self {
        Self {
            seek_tolerance_seconds: DEFAULT_SEEK_TOLERANCE_SECONDS,
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform2d {
    pub translate_x: f64,
    pub translate_y: f64,
    pub rotation_radians: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawCommand {
    pub key: MediaKey,
    pub src: String,
    pub source_time: f64,
    pub transform: Transform2d,
    pub source_rect: Rect,
    pub dest_rect: Rect,
    pub softness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipFailure {
    pub key: MediaKey,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameReport {
    pub current_time: f64,
    pub is_playing: bool,
    pub drawn: Vec<MediaKey>,
    pub cropped_out: Vec<MediaKey>,
    pub audible: Vec<MediaKey>,
    pub failures: Vec<ClipFailure>,
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveVideo<'a> {
    pub track_index: usize,
    pub track: &'a Track,
    pub clip: &'a VideoClip,
}

impl ActiveVideo<'_> {
    #[must_use]
    pub fn key(&self) -> MediaKey {
        MediaKey::new(self.track.id.clone(), self.clip.id.clone())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveAudio<'a> {
    pub track: &'a Track,
    pub clip: &'a AudioClip,
}

#[must_use]
pub fn active_video_clips(timeline: &TimelineState, time: f64) -> Vec<ActiveVideo<'_>> {
    let mut active: Vec<_> = timeline
        .active_clips_at(time)
        .filter_map(|(track_index, track, clip)| match clip {
            Clip::Video(clip) => Some(ActiveVideo {
                track_index,
                track,
                clip,
            }),
            Clip::Audio(_) => None,
        })
        .collect();
    active.sort_by(|left, right| right.track_index.cmp(&left.track_index));
    active
}

#[must_use]
pub fn active_audio_clips(timeline: &TimelineState, time: f64) -> Vec<ActiveAudio<'_>> {
    timeline
        .active_clips_at(time)
        .filter_map(|(_, track, clip)| match clip {
            Clip::Audio(clip) => Some(ActiveAudio { track, clip }),
            Clip::Video(_) => None,
        })
        .collect()
}

#[must_use]
pub fn video_internal_time(clip: &VideoClip, current_time: f64) -> f64 {
    let properties = &clip.properties;
    if properties.freeze_frame {
        clip.source_in + properties.freeze_frame_time
    } else {
        clip.source_in + (current_time - clip.start_time) * properties.speed
    }
}

#[must_use]
pub fn clamp_source_time(internal: f64, clip_duration: f64, media_duration: Option<f64>) -> f64 {
    let upper = media_duration
        .filter(|duration| duration.is_finite())
        .map_or(clip_duration, |duration| duration.max(clip_duration));
    internal.clamp(0.0, upper.max(0.0))
}

#[must_use]
pub fn audio_internal_time(clip: &AudioClip, current_time: f64) -> f64 {
    (current_time - clip.start_time).max(0.0)
}

#[must_use]
pub fn clip_transform(properties: &VideoProperties) -> Transform2d {
    let (width, height) = (properties.size.width, properties.size.height);
    let flip_x = if properties.flip.horizontal { -1.0 } else { 1.0 };
    let flip_y = if properties.flip.vertical { -1.0 } else { 1.0 };

    Transform2d {
        translate_x: properties.position.x + width / 2.0,
        translate_y: properties.position.y + height / 2.0,
        rotation_radians: properties.rotation.to_radians(),
        scale_x: flip_x * properties.zoom.x * properties.yaw.to_radians().cos(),
        scale_y: flip_y * properties.zoom.y * properties.pitch.to_radians().cos(),
    }
}

#[must_use]
pub fn crop_rects(properties: &VideoProperties, native_size: (f64, f64)) -> Option<(Rect, Rect)> {
    let (native_width, native_height) = native_size;
    if native_width <= 0.0 || native_height <= 0.0 {
        return None;
    }

    let crop = &properties.crop;
    let visible_width = native_width - crop.left - crop.right;
    let visible_height = native_height - crop.top - crop.bottom;
    if visible_width <= 0.0 || visible_height <= 0.0 {
        return None;
    }

    let (width, height) = (properties.size.width, properties.size.height);
    let source = Rect {
        x: crop.left,
        y: crop.top,
        width: visible_width,
        height: visible_height,
    };
    let dest = Rect {
        x: -width / 2.0 + crop.left * width / native_width,
        y: -height / 2.0 + crop.top * height / native_height,
        width: width * visible_width / native_width,
        height: height * visible_height / native_height,
    };
    Some((source, dest))
}

#[derive(Debug, Clone, Default)]
pub struct Compositor {
    settings: CompositorSettings,
}

impl Compositor {
    #[must_use]
    pub fn new(settings: CompositorSettings) -> Self {
        Self { settings }
    }

    #[must_use]
    pub fn settings(&self) -> CompositorSettings {
        self.settings
    }

    pub fn tick(
        &self,
        timeline: &TimelineState,
        playback: PlaybackState,
        surface: &mut dyn Surface,
        media: &mut dyn MediaProvider,
    ) -> FrameReport {
        let mut report = FrameReport {
            current_time: playback.current_time,
            is_playing: playback.is_playing,
            ..FrameReport::default()
        };

        surface.clear();

        let active_videos = active_video_clips(timeline, playback.current_time);
        let mut live_videos = BTreeSet::new();
        for active in &active_videos {
            let key = active.key();
            live_videos.insert(key.clone());
            if let Err(error) = self.render_video(active, &key, playback, surface, media, &mut report)
            {
                warn!(clip = %key, %error, "video clip skipped this frame");
                report.failures.push(ClipFailure {
                    key,
                    error: error.to_string(),
                });
            }
        }

        media.for_each_video(&mut |key: &MediaKey, source: &mut dyn VideoSource| {
            let should_pause = !playback.is_playing || !live_videos.contains(key);
            if should_pause && source.is_playing() {
                source.pause();
            }
        });

        let mut live_audio = BTreeSet::new();
        for active in active_audio_clips(timeline, playback.current_time) {
            let key = MediaKey::new(active.track.id.clone(), active.clip.id.clone());
            live_audio.insert(key.clone());
            match self.sync_audio(&active, &key, playback, media) {
                Ok(true) => report.audible.push(key),
                Ok(false) => {}
                Err(error) => {
                    warn!(clip = %key, %error, "audio clip skipped this frame");
                    report.failures.push(ClipFailure {
                        key,
                        error: error.to_string(),
                    });
                }
            }
        }

        media.for_each_audio(&mut |key: &MediaKey, source: &mut dyn AudioSource| {
            if !live_audio.contains(key) && source.is_playing() {
                source.pause();
            }
        });

        trace!(
            time = playback.current_time,
            drawn = report.drawn.len(),
            audible = report.audible.len(),
            failures = report.failures.len(),
            "frame composed"
        );
        report
    }

    fn render_video(
        &self,
        active: &ActiveVideo<'_>,
        key: &MediaKey,
        playback: PlaybackState,
        surface: &mut dyn Surface,
        media: &mut dyn MediaProvider,
        report: &mut FrameReport,
    ) -> Result<(), MediaError> {
        let clip = active.clip;
        let source = media
            .video_source(key, clip)
            .ok_or_else(|| MediaError::Unavailable(key.clone()))?;

        let target = clamp_source_time(
            video_internal_time(clip, playback.current_time),
            clip.duration,
            source.duration(),
        );
        if drifted(source.position(), target, self.settings.seek_tolerance_seconds) {
            source.seek(target)?;
        }

        let should_play = playback.is_playing && !clip.properties.freeze_frame;
        if should_play && !source.is_playing() {
            source.play();
        } else if !should_play && source.is_playing() {
            source.pause();
        }

        let Some((source_rect, dest_rect)) = crop_rects(&clip.properties, source.native_size())
        else {
            report.cropped_out.push(key.clone());
            return Ok(());
        };

        let command = DrawCommand {
            key: key.clone(),
            src: clip.src.clone(),
            source_time: target,
            transform: clip_transform(&clip.properties),
            source_rect,
            dest_rect,
            softness: clip.properties.crop.softness,
        };
        surface.draw(&*source, &command)?;
        report.drawn.push(key.clone());
        Ok(())
    }

    fn sync_audio(
        &self,
        active: &ActiveAudio<'_>,
        key: &MediaKey,
        playback: PlaybackState,
        media: &mut dyn MediaProvider,
    ) -> Result<bool, MediaError> {
        let clip = active.clip;
        let source = media
            .audio_source(key, clip)
            .ok_or_else(|| MediaError::Unavailable(key.clone()))?;

        let target = audio_internal_time(clip, playback.current_time);
        if drifted(source.position(), target, self.settings.seek_tolerance_seconds)
            && let Err(error) = source.seek(target)
        {
            source.pause();
            return Err(error);
        }
        source.set_volume(clip.properties.volume);

        if playback.is_playing {
            if !source.is_playing() {
                source.play();
            }
        } else if source.is_playing() {
            source.pause();
        }
        Ok(playback.is_playing)
    }
}
