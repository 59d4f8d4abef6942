use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Clip, Crop, Flip, Position, Size, TimelineState, TrackKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimelineError {
    #[error("invalid timeline duration {0}")]
    InvalidDuration(f64),
    #[error("track not found: {0}")]
    TrackNotFound(String),
    #[error("clip {clip_id} not found on track {track_id}")]
    ClipNotFound { track_id: String, clip_id: String },
    #[error("clip {clip_id} already exists on track {track_id}")]
    DuplicateClip { track_id: String, clip_id: String },
    #[error("{clip_kind} clip cannot be placed on {track_kind} track {track_id}")]
    ClipKindMismatch {
        track_id: String,
        track_kind: TrackKind,
        clip_kind: TrackKind,
    },
    #[error("{patch_kind} property patch does not apply to {clip_kind} clip {clip_id}")]
    PatchKindMismatch {
        clip_id: String,
        clip_kind: TrackKind,
        patch_kind: TrackKind,
    },
    #[error("split point {at_time} is outside clip {clip_id} extent [{start}, {end})")]
    SplitOutOfRange {
        clip_id: String,
        at_time: f64,
        start: f64,
        end: f64,
    },
    #[error("trim point {at_time} is out of range for clip {clip_id}")]
    TrimOutOfRange { clip_id: String, at_time: f64 },
    #[error("invalid {field} = {value} on clip {clip_id}")]
    InvalidProperty {
        clip_id: String,
        field: &'static str,
        value: f64,
    },
}

impl TimelineError {
    #[must_use]
    pub fn is_invalid_range(&self) -> bool {
        matches!(
            self,
            Self::SplitOutOfRange { .. } | Self::TrimOutOfRange { .. }
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClipPatch {
    pub start_time: Option<f64>,
    pub duration: Option<f64>,
    pub source_in: Option<f64>,
    pub properties: Option<PropertiesPatch>,
}

impl ClipPatch {
    #[must_use]
    pub fn properties(properties: PropertiesPatch) -> Self {
        Self {
            properties: Some(properties),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PropertiesPatch {
    Video(VideoPropertiesPatch),
    Audio(AudioPropertiesPatch),
}

impl PropertiesPatch {
    fn kind(&self) -> TrackKind {
        match self {
            Self::Video(_) => TrackKind::Video,
            Self::Audio(_) => TrackKind::Audio,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoPropertiesPatch {
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub zoom: Option<ZoomPatch>,
    pub rotation: Option<f64>,
    pub pitch: Option<f64>,
    pub yaw: Option<f64>,
    pub flip: Option<Flip>,
    pub crop: Option<Crop>,
    pub speed: Option<f64>,
    pub freeze_frame: Option<bool>,
    pub freeze_frame_time: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ZoomPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub linked: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioPropertiesPatch {
    pub volume: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TrimEdge {
    Start,
    End,
}

impl TimelineState {
    /// # Errors
    /// Fails when the track is missing, the id is taken on that track, or
    /// the clip breaks a model invariant.
    ///
    /// # Panics
    /// Debug builds assert that the clip kind matches the track kind.
    pub fn add_clip(&self, track_id: &str, clip: Clip) -> Result<Self, TimelineError> {
        let mut next = self.clone();
        let track = next
            .tracks
            .iter_mut()
            .find(|track| track.id == track_id)
            .ok_or_else(|| TimelineError::TrackNotFound(track_id.to_string()))?;

        debug_assert_eq!(
            track.kind,
            clip.kind(),
            "clip {} placed on track {} of the wrong kind",
            clip.id(),
            track.id
        );
        if track.kind != clip.kind() {
            return Err(TimelineError::ClipKindMismatch {
                track_id: track.id.clone(),
                track_kind: track.kind,
                clip_kind: clip.kind(),
            });
        }
        if track.clips.iter().any(|existing| existing.id() == clip.id()) {
            return Err(TimelineError::DuplicateClip {
                track_id: track.id.clone(),
                clip_id: clip.id().to_string(),
            });
        }
        clip.validate()?;

        debug!(track_id, clip_id = clip.id(), "clip appended");
        track.clips.push(clip);
        Ok(next)
    }

    /// # Errors
    /// Fails when the clip is missing, the patch targets the other clip kind,
    /// or the patched clip would break an invariant.
    pub fn update_clip(
        &self,
        track_id: &str,
        clip_id: &str,
        patch: &ClipPatch,
    ) -> Result<Self, TimelineError> {
        let current = self
            .find_clip_checked(track_id, clip_id)?
            .clone();
        let updated = apply_patch(&current, patch)?;
        updated.validate()?;
        Ok(self.replace_clip(track_id, clip_id, updated))
    }

    /// # Errors
    /// Fails when the track or clip is missing.
    pub fn remove_clip(&self, track_id: &str, clip_id: &str) -> Result<Self, TimelineError> {
        self.find_clip_checked(track_id, clip_id)?;

        let mut next = self.clone();
        for track in next.tracks.iter_mut().filter(|track| track.id == track_id) {
            track.clips.retain(|clip| clip.id() != clip_id);
        }
        debug!(track_id, clip_id, "clip removed");
        Ok(next)
    }

    /// # Errors
    /// [`TimelineError::SplitOutOfRange`] when `at_time` does not fall
    /// strictly inside the clip; the caller keeps its current state.
    pub fn split_clip(
        &self,
        track_id: &str,
        clip_id: &str,
        at_time: f64,
    ) -> Result<Self, TimelineError> {
        self.split_clip_as(track_id, clip_id, at_time, Uuid::new_v4().to_string())
    }

    /// # Errors
    /// See [`Self::split_clip`]; also fails if `right_id` is already taken.
    pub fn split_clip_as(
        &self,
        track_id: &str,
        clip_id: &str,
        at_time: f64,
        right_id: String,
    ) -> Result<Self, TimelineError> {
        let current = self.find_clip_checked(track_id, clip_id)?;
        let start = current.start_time();
        let end = current.end_time();

        // Cutting on the start boundary would leave a zero-length left half.
        if !(start < at_time && at_time < end) {
            warn!(track_id, clip_id, at_time, start, end, "split rejected: out of range");
            return Err(TimelineError::SplitOutOfRange {
                clip_id: clip_id.to_string(),
                at_time,
                start,
                end,
            });
        }
        if self
            .track(track_id)
            .is_some_and(|track| track.clips.iter().any(|clip| clip.id() == right_id))
        {
            return Err(TimelineError::DuplicateClip {
                track_id: track_id.to_string(),
                clip_id: right_id,
            });
        }

        let offset = at_time - start;
        let left = current.with_timing(start, offset, current.source_in());
        let right = current
            .with_timing(
                at_time,
                current.duration() - offset,
                current.source_in() + source_advance(current, offset),
            )
            .with_id(right_id);

        debug!(
            track_id,
            clip_id,
            right_id = right.id(),
            at_time,
            left_duration = left.duration(),
            right_duration = right.duration(),
            right_source_in = right.source_in(),
            "split accepted"
        );

        let mut next = self.clone();
        if let Some(track) = next.tracks.iter_mut().find(|track| track.id == track_id)
            && let Some(index) = track.clips.iter().position(|clip| clip.id() == clip_id)
        {
            track.clips[index] = left;
            track.clips.insert(index + 1, right);
        }
        Ok(next)
    }

    /// # Errors
    /// Fails when the track or clip is missing.
    pub fn move_clip(
        &self,
        track_id: &str,
        clip_id: &str,
        start_time: f64,
    ) -> Result<Self, TimelineError> {
        let patch = ClipPatch {
            start_time: Some(start_time.max(0.0)),
            ..ClipPatch::default()
        };
        self.update_clip(track_id, clip_id, &patch)
    }

    /// # Errors
    /// [`TimelineError::TrimOutOfRange`] when the clip would become empty or
    /// reach before the start of its source media.
    pub fn trim_clip(
        &self,
        track_id: &str,
        clip_id: &str,
        edge: TrimEdge,
        at_time: f64,
    ) -> Result<Self, TimelineError> {
        let current = self.find_clip_checked(track_id, clip_id)?;
        let out_of_range = || TimelineError::TrimOutOfRange {
            clip_id: clip_id.to_string(),
            at_time,
        };

        let patch = match edge {
            TrimEdge::Start => {
                let removed = at_time - current.start_time();
                let duration = current.end_time() - at_time;
                let source_in = current.source_in() + source_advance(current, removed);
                if duration <= 0.0 || source_in < 0.0 || at_time < 0.0 {
                    warn!(track_id, clip_id, at_time, "trim start rejected");
                    return Err(out_of_range());
                }
                ClipPatch {
                    start_time: Some(at_time),
                    duration: Some(duration),
                    source_in: Some(source_in),
                    properties: None,
                }
            }
            TrimEdge::End => {
                let duration = at_time - current.start_time();
                if duration <= 0.0 {
                    warn!(track_id, clip_id, at_time, "trim end rejected");
                    return Err(out_of_range());
                }
                ClipPatch {
                    duration: Some(duration),
                    ..ClipPatch::default()
                }
            }
        };
        self.update_clip(track_id, clip_id, &patch)
    }

    fn find_clip_checked(&self, track_id: &str, clip_id: &str) -> Result<&Clip, TimelineError> {
        let track = self
            .track(track_id)
            .ok_or_else(|| TimelineError::TrackNotFound(track_id.to_string()))?;
        track
            .clips
            .iter()
            .find(|clip| clip.id() == clip_id)
            .ok_or_else(|| TimelineError::ClipNotFound {
                track_id: track_id.to_string(),
                clip_id: clip_id.to_string(),
            })
    }

    fn replace_clip(&self, track_id: &str, clip_id: &str, replacement: Clip) -> Self {
        let mut next = self.clone();
        if let Some(slot) = next
            .tracks
            .iter_mut()
            .filter(|track| track.id == track_id)
            .flat_map(|track| track.clips.iter_mut())
            .find(|clip| clip.id() == clip_id)
        {
            *slot = replacement;
        }
        next
    }
}

fn source_advance(clip: &Clip, timeline_span: f64) -> f64 {
    match clip {
        Clip::Video(video) if video.properties.freeze_frame => 0.0,
        _ => timeline_span * clip.speed(),
    }
}

fn apply_patch(current: &Clip, patch: &ClipPatch) -> Result<Clip, TimelineError> {
    let mut next = current.with_timing(
        patch.start_time.unwrap_or(current.start_time()),
        patch.duration.unwrap_or(current.duration()),
        patch.source_in.unwrap_or(current.source_in()),
    );

    let Some(properties_patch) = &patch.properties else {
        return Ok(next);
    };

    match (&mut next, properties_patch) {
        (Clip::Video(clip), PropertiesPatch::Video(patch)) => {
            let mut properties = clip.properties.clone();
            if let Some(position) = patch.position {
                properties.position = position;
            }
            if let Some(size) = patch.size {
                properties.size = size;
            }
            if let Some(zoom) = patch.zoom {
                properties.zoom.linked = zoom.linked.unwrap_or(properties.zoom.linked);
                match (zoom.x, zoom.y) {
                    (Some(x), _) if properties.zoom.linked => {
                        properties.zoom.x = x;
                        properties.zoom.y = x;
                    }
                    (None, Some(y)) if properties.zoom.linked => {
                        properties.zoom.x = y;
                        properties.zoom.y = y;
                    }
                    (x, y) => {
                        properties.zoom.x = x.unwrap_or(properties.zoom.x);
                        properties.zoom.y = y.unwrap_or(properties.zoom.y);
                    }
                }
            }
            if let Some(rotation) = patch.rotation {
                properties.rotation = rotation;
            }
            if let Some(pitch) = patch.pitch {
                properties.pitch = pitch;
            }
            if let Some(yaw) = patch.yaw {
                properties.yaw = yaw;
            }
            if let Some(flip) = patch.flip {
                properties.flip = flip;
            }
            if let Some(crop) = patch.crop {
                properties.crop = crop;
            }
            if let Some(speed) = patch.speed {
                properties.speed = speed;
            }
            if let Some(freeze_frame) = patch.freeze_frame {
                properties.freeze_frame = freeze_frame;
            }
            if let Some(freeze_frame_time) = patch.freeze_frame_time {
                properties.freeze_frame_time = freeze_frame_time;
            }
            clip.properties = properties;
        }
        (Clip::Audio(clip), PropertiesPatch::Audio(patch)) => {
            let mut properties = clip.properties.clone();
            if let Some(volume) = patch.volume {
                properties.volume = volume;
            }
            clip.properties = properties;
        }
        (clip, patch) => {
            return Err(TimelineError::PatchKindMismatch {
                clip_id: clip.id().to_string(),
                clip_kind: clip.kind(),
                patch_kind: patch.kind(),
            });
        }
    }

    Ok(next)
}
