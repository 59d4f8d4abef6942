use std::{fs, path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use clipclash_core::{
    AppConfig, Compositor, EditSession, HeadlessMediaPool, JsonFileMatchStore, MatchStore,
    MediaCache, PlaybackState, RecordingSurface, SourceWindow, SymphoniaDecoder, TimelineState,
    WaveformSampler, diagnostics, fixtures::demo_timeline,
};

#[derive(Debug, Parser)]
#[command(name = "clipclash-cli")]
#[command(about = "Headless tools for clipclash timelines, waveforms and frame plans")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Overrides the configured log directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Reads settings from this file instead of searching for one.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Writes the demo timeline as JSON.
    DemoTimeline {
        #[arg(long, default_value = "data/demo.timeline.json")]
        output: PathBuf,
    },
    /// Decodes an audio file and prints its waveform peaks.
    Waveform {
        #[arg(long)]
        src: PathBuf,

        #[arg(long)]
        samples: Option<usize>,

        #[arg(long, default_value_t = 0.0)]
        source_in: f64,

        #[arg(long)]
        source_duration: Option<f64>,
    },
    /// Composes one frame of a timeline against headless media.
    FramePlan {
        #[arg(long)]
        timeline: PathBuf,

        #[arg(long)]
        time: f64,

        #[arg(long)]
        playing: bool,
    },
    /// Replays the demo clips into a stored match as edits by one player.
    SeedMatch {
        #[arg(long)]
        match_id: String,

        #[arg(long, default_value = "cli")]
        player_id: String,
    },
    /// Prints the newest clip edits recorded for a match.
    EditHistory {
        #[arg(long)]
        match_id: String,

        #[arg(long)]
        limit: Option<usize>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_or_default(),
    };

    let mut diagnostics_config = config.diagnostics.clone();
    if let Some(log_dir) = &cli.log_dir {
        diagnostics_config.logs_dir.clone_from(log_dir);
    }
    let _telemetry = diagnostics::init_tracing_from_config(&diagnostics_config)?;

    match cli.command {
        Commands::DemoTimeline { output } => {
            if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let json = serde_json::to_vec_pretty(&demo_timeline())?;
            fs::write(&output, json)
                .with_context(|| format!("failed to write {}", output.display()))?;
            tracing::info!(path = %output.display(), "demo timeline written");
        }
        Commands::Waveform {
            src,
            samples,
            source_in,
            source_duration,
        } => {
            let cache = Arc::new(MediaCache::new(config.cache_limits()));
            let sampler = WaveformSampler::new(Arc::clone(&cache), Arc::new(SymphoniaDecoder::new()));
            let sample_count = samples.unwrap_or(config.waveform.default_sample_count);
            let peaks = sampler.peaks_blocking(
                &src.display().to_string(),
                sample_count,
                SourceWindow::new(source_in, source_duration),
            );
            cache.log_stats();
            println!("{}", serde_json::to_string_pretty(&peaks)?);
        }
        Commands::FramePlan {
            timeline,
            time,
            playing,
        } => {
            let content = fs::read(&timeline)
                .with_context(|| format!("failed to read {}", timeline.display()))?;
            let state: TimelineState =
                serde_json::from_slice(&content).context("invalid timeline json")?;
            state.validate()?;

            let playback = PlaybackState {
                current_time: time,
                is_playing: playing,
            };
            let mut surface = RecordingSurface::new();
            let mut media = HeadlessMediaPool::new();
            let report = Compositor::new(config.compositor_settings()).tick(
                &state,
                playback,
                &mut surface,
                &mut media,
            );

            let plan = serde_json::json!({
                "report": report,
                "draws": surface.last_frame().unwrap_or_default(),
            });
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::SeedMatch {
            match_id,
            player_id,
        } => {
            let store: Arc<dyn MatchStore> =
                Arc::new(JsonFileMatchStore::open(&config.matches.store_dir)?);
            let mut session = EditSession::open(
                &match_id,
                &player_id,
                store,
                &config.match_config(),
                config.history.max_depth,
            )?;

            for track in demo_timeline().tracks {
                if session.timeline().track(&track.id).is_none() {
                    tracing::warn!(track_id = %track.id, "match has no such track, skipping");
                    continue;
                }
                for clip in track.clips {
                    if session.timeline().find_clip(&track.id, clip.id()).is_some() {
                        continue;
                    }
                    session.add_clip(&track.id, clip)?;
                }
            }
            println!("{}", serde_json::to_string_pretty(session.timeline().as_ref())?);
        }
        Commands::EditHistory { match_id, limit } => {
            let store = JsonFileMatchStore::open(&config.matches.store_dir)?;
            let records = store.edit_history(&match_id, limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
