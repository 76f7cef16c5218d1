//! Logging and tracing configuration
//!
//! Logs go to stderr; a file layer is added when a log file is configured.

use std::fs::File;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Default filter for a `-v` count
fn default_filter(verbosity: u8) -> EnvFilter {
    let directive = match verbosity {
        0 => "dbgp=info,warn",
        1 => "dbgp=debug,info",
        _ => "dbgp=trace,info",
    };
    EnvFilter::new(directive)
}

/// Initialize tracing
///
/// `RUST_LOG` takes precedence over the verbosity count. The returned guard
/// must be held for the lifetime of the process so buffered file output is flushed.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbosity));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .compact();

    let file = log_file.and_then(open_log_file);

    match file {
        Some(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

/// Open `path` for appending, creating its directory first
///
/// Failures are reported on stderr and disable file logging.
fn open_log_file(path: &Path) -> Option<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory {}: {}", dir.display(), e);
            return None;
        }
    }
    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {}", path.display(), e);
            None
        }
    }
}

/// Default location for the gateway log file
pub fn default_log_path() -> Option<std::path::PathBuf> {
    paths::log_dir().map(|d| d.join("gateway.log"))
}
