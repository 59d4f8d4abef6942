use crate::model::{
    Clip, Crop, Flip, MatchConfig, Position, Size, TimelineState, VideoProperties, Zoom,
};

#[must_use]
pub fn demo_timeline() -> TimelineState {
    let mut timeline = TimelineState::for_match(&MatchConfig {
        max_video_tracks: 2,
        max_audio_tracks: 1,
        timeline_duration: 30.0,
    });

    let intro = Clip::video("media/intro.mp4", 0.0, 8.0).with_id("intro");

    let mut fast = Clip::video("media/skate.mp4", 8.0, 6.0)
        .with_timing(8.0, 6.0, 2.0)
        .with_id("skate-fast");
    if let Clip::Video(clip) = &mut fast {
        clip.properties.speed = 2.0;
    }

    let mut hold = Clip::video("media/skate.mp4", 14.0, 4.0).with_id("skate-hold");
    if let Clip::Video(clip) = &mut hold {
        clip.properties.freeze_frame = true;
        clip.properties.freeze_frame_time = 3.5;
    }

    let mut overlay = Clip::video("media/logo.mp4", 2.0, 12.0).with_id("logo-overlay");
    if let Clip::Video(clip) = &mut overlay {
        clip.properties = VideoProperties {
            position: Position { x: 1400.0, y: 60.0 },
            size: Size {
                width: 480.0,
                height: 270.0,
            },
            zoom: Zoom {
                x: 0.8,
                y: 0.8,
                linked: true,
            },
            rotation: -8.0,
            flip: Flip {
                horizontal: true,
                vertical: false,
            },
            crop: Crop {
                left: 120.0,
                right: 120.0,
                top: 0.0,
                bottom: 60.0,
                softness: 4.0,
            },
            ..VideoProperties::default()
        };
    }

    let mut bed = Clip::audio("media/music.mp3", 0.0, 24.0).with_id("music-bed");
    if let Clip::Audio(clip) = &mut bed {
        clip.properties.volume = 0.6;
    }

    for track in &mut timeline.tracks {
        match track.id.as_str() {
            "video-0" => track.clips.push(overlay.clone()),
            "video-1" => track.clips.extend([intro.clone(), fast.clone(), hold.clone()]),
            "audio-0" => track.clips.push(bed.clone()),
            _ => {}
        }
    }
    timeline
}
