pub mod compositor;
pub mod config;
pub mod decode;
pub mod diagnostics;
pub mod fixtures;
pub mod history;
pub mod match_store;
pub mod media;
pub mod media_cache;
pub mod model;
pub mod render_loop;
pub mod session;
pub mod time;
pub mod timeline;
pub mod waveform;

pub use compositor::{
    Compositor, CompositorSettings, DrawCommand, FrameReport, Rect, Transform2d,
    active_video_clips, audio_internal_time, clip_transform, crop_rects, video_internal_time,
};
pub use config::AppConfig;
pub use decode::{SymphoniaDecoder, decode_audio_file_first_channel};
pub use diagnostics::{
    TelemetryGuard, init_tracing, init_tracing_from_config, init_tracing_with_options,
};
pub use history::{HistoryEngine, HistoryStats, Snapshot, Subscription};
pub use match_store::{
    ClipEditRecord, EditOperation, InMemoryMatchStore, JsonFileMatchStore, MatchStore,
};
pub use media::{
    AudioSource, HeadlessMediaPool, MediaError, MediaInfo, MediaKey, MediaProvider,
    RecordingSurface, Surface, VideoSource,
};
pub use media_cache::{AudioData, CacheLimits, CacheStats, MediaCache, PendingAudio};
pub use model::{
    AudioClip, AudioProperties, Clip, Crop, Flip, MatchConfig, MediaClip, PlaybackState,
    Position, Size, TimelineState, Track, TrackKind, VideoClip, VideoProperties, Zoom,
};
pub use render_loop::{FrameInputs, RenderLoop, RenderLoopHandle, SharedFrameInputs};
pub use session::{EditSession, SessionError};
pub use timeline::{
    AudioPropertiesPatch, ClipPatch, PropertiesPatch, TimelineError, TrimEdge,
    VideoPropertiesPatch, ZoomPatch,
};
pub use waveform::{AudioDecoder, PeakPair, SourceWindow, WaveformRequest, WaveformSampler};
