//! Tracing setup.
//!
//! stderr always gets a `RUST_LOG`-filtered stream. With
//! `QUEUE_DASHBOARD_LOG=1` a non-blocking file writer is added under the data
//! directory, and the default level rises from `warn` to `info` so snapshot
//! and connection events end up in the file.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const FILE_LOG_ENV: &str = "QUEUE_DASHBOARD_LOG";
const LOG_FILE_NAME: &str = "queue-dashboard.log";

/// wgpu and naga are chatty at `info`; keep them at `warn` unless `RUST_LOG`
/// says otherwise.
const GPU_DIRECTIVES: &str = "wgpu_core=warn,wgpu_hal=warn,naga=warn";

/// Keeps the file writer alive. Drop it last.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber. Call once, first thing in `main`.
pub fn init() -> LogGuard {
    let file_logging = std::env::var(FILE_LOG_ENV).as_deref() == Ok("1");
    let filter = env_filter(file_logging);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if !file_logging {
        tracing_subscriber::registry().with(filter).with(stderr_layer).init();
        return LogGuard { _file_guard: None };
    }

    let dir = log_dir().unwrap_or_else(std::env::temp_dir);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Cannot create log directory {}: {}", dir.display(), e);
    }
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, LOG_FILE_NAME));

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    tracing::info!(path = %dir.join(LOG_FILE_NAME).display(), "File logging enabled");

    LogGuard { _file_guard: Some(guard) }
}

fn env_filter(file_logging: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(file_logging))
}

fn default_filter(file_logging: bool) -> EnvFilter {
    let level = if file_logging { "info" } else { "warn" };
    EnvFilter::new(format!("{},{}", level, GPU_DIRECTIVES))
}

/// `$XDG_DATA_HOME/queue-dashboard`, else `~/Library/Logs/queue-dashboard` on
/// macOS and `~/.local/share/queue-dashboard` elsewhere.
fn log_dir() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_DATA_HOME") {
        Some(xdg) => PathBuf::from(xdg),
        None => {
            let home = PathBuf::from(std::env::var_os("HOME")?);
            if cfg!(target_os = "macos") {
                home.join("Library").join("Logs")
            } else {
                home.join(".local").join("share")
            }
        }
    };
    Some(base.join("queue-dashboard"))
}
