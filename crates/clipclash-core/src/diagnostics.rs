use std::{fs, path::Path};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::config::DiagnosticsConfig;

pub const DEFAULT_LOG_FILTER: &str = "info,clipclash_core=debug";
pub const DEFAULT_LOG_FILE_PREFIX: &str = "clipclash";

pub struct TelemetryGuard {
    pub session_id: Uuid,
    _file_guard: WorkerGuard,
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// # Errors
/// Fails when the log directory cannot be created.
pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(log_dir, DEFAULT_LOG_FILE_PREFIX, DEFAULT_LOG_FILTER)
}

/// # Errors
/// Fails when the configured log directory cannot be created.
pub fn init_tracing_from_config(config: &DiagnosticsConfig) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(
        &config.logs_dir,
        &config.trace_file_prefix,
        &config.rust_log_filter,
    )
}

/// # Errors
/// Fails when the log directory cannot be created.
pub fn init_tracing_with_options(
    log_dir: impl AsRef<Path>,
    file_prefix: &str,
    default_filter: &str,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let session_id = Uuid::new_v4();
    let file_name = log_file_name(file_prefix, Utc::now());
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, &file_name));

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_thread_names(true)
        .with_target(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => info!(%session_id, file = %file_name, "tracing initialized"),
        Err(error) => warn!(?error, "global tracing subscriber already initialized"),
    }

    Ok(TelemetryGuard {
        session_id,
        _file_guard: file_guard,
    })
}

fn log_file_name(prefix: &str, now: DateTime<Utc>) -> String {
    let prefix = if prefix.trim().is_empty() {
        DEFAULT_LOG_FILE_PREFIX
    } else {
        prefix
    };
    format!("{prefix}-{}.log", now.format("%Y%m%d-%H%M%S"))
}
