use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    compositor::{Compositor, CompositorSettings, FrameReport},
    media::{MediaProvider, Surface},
    model::{PlaybackState, TimelineState},
};

pub trait FrameInputs: Send + Sync {
    fn timeline(&self) -> Arc<TimelineState>;
    fn playback(&self) -> PlaybackState;
}

#[derive(Debug)]
pub struct SharedFrameInputs {
    timeline: RwLock<Arc<TimelineState>>,
    playback: RwLock<PlaybackState>,
}

impl SharedFrameInputs {
    #[must_use]
    pub fn new(timeline: impl Into<Arc<TimelineState>>, playback: PlaybackState) -> Self {
        Self {
            timeline: RwLock::new(timeline.into()),
            playback: RwLock::new(playback),
        }
    }

    pub fn set_timeline(&self, timeline: impl Into<Arc<TimelineState>>) {
        *self.timeline.write() = timeline.into();
    }

    pub fn set_playback(&self, playback: PlaybackState) {
        *self.playback.write() = playback;
    }

    pub fn seek(&self, time: f64) {
        self.playback.write().current_time = time.max(0.0);
    }

    pub fn set_playing(&self, is_playing: bool) {
        self.playback.write().is_playing = is_playing;
    }
}

impl FrameInputs for SharedFrameInputs {
    fn timeline(&self) -> Arc<TimelineState> {
        Arc::clone(&self.timeline.read())
    }

    fn playback(&self) -> PlaybackState {
        *self.playback.read()
    }
}

pub struct RenderLoop;

impl RenderLoop {
    pub fn spawn<S, M>(
        settings: CompositorSettings,
        inputs: Arc<dyn FrameInputs>,
        surface: S,
        media: M,
    ) -> Result<RenderLoopHandle<S, M>>
    where
        S: Surface + 'static,
        M: MediaProvider + 'static,
    {
        let period = frame_period(settings.refresh_rate_hz);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let frames = Arc::new(AtomicU64::new(0));
        let last_report = Arc::new(Mutex::new(None));

        let thread_frames = Arc::clone(&frames);
        let thread_report = Arc::clone(&last_report);
        let thread = thread::Builder::new()
            .name("clipclash-render".to_string())
            .spawn(move || {
                let compositor = Compositor::new(settings);
                let ticker = tick(period);
                let mut surface = surface;
                let mut media = media;
                info!(period_ms = period.as_secs_f64() * 1000.0, "render loop started");

                loop {
                    select! {
                        recv(shutdown_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let timeline = inputs.timeline();
                            let report =
                                compositor.tick(&timeline, inputs.playback(), &mut surface, &mut media);
                            thread_frames.fetch_add(1, Ordering::Relaxed);
                            *thread_report.lock() = Some(report);
                        }
                    }
                }

                debug!(
                    frames = thread_frames.load(Ordering::Relaxed),
                    "render loop stopped"
                );
                (surface, media)
            })
            .context("failed to spawn render thread")?;

        Ok(RenderLoopHandle {
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
            frames,
            last_report,
        })
    }
}

fn frame_period(refresh_rate_hz: f64) -> Duration {
    let hz = if refresh_rate_hz.is_finite() && refresh_rate_hz >= 1.0 {
        refresh_rate_hz
    } else {
        crate::compositor::DEFAULT_REFRESH_RATE_HZ
    };
    Duration::from_secs_f64(1.0 / hz)
}

pub struct RenderLoopHandle<S, M> {
    shutdown_tx: Option<Sender<()>>,
    thread: Option<JoinHandle<(S, M)>>,
    frames: Arc<AtomicU64>,
    last_report: Arc<Mutex<Option<FrameReport>>>,
}

impl<S, M> RenderLoopHandle<S, M> {
    #[must_use]
    pub fn frames_rendered(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn last_report(&self) -> Option<FrameReport> {
        self.last_report.lock().clone()
    }

    pub fn shutdown(mut self) -> Option<(S, M)> {
        self.stop()
    }

    fn stop(&mut self) -> Option<(S, M)> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(backends) => Some(backends),
            Err(_) => {
                warn!("render thread panicked");
                None
            }
        }
    }
}

impl<S, M> Drop for RenderLoopHandle<S, M> {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
