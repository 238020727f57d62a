//! Structured logging: stderr console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Rolled log files kept in the log directory.
pub const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "kiosko";

/// Log files (`kiosko.*`) beyond the newest [`MAX_LOG_FILES`].
pub fn stale_logs(log_dir: &Path) -> Vec<PathBuf> {
    let mut log_files: Vec<(PathBuf, SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let is_log = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&format!("{LOG_FILE_PREFIX}.")));
            if is_log {
                let modified = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                log_files.push((path, modified));
            }
        }
    }
    // Newest first; name breaks ties since daily names sort by date.
    log_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
    log_files
        .into_iter()
        .skip(MAX_LOG_FILES)
        .map(|(path, _)| path)
        .collect()
}

pub fn prune_old_logs(log_dir: &Path) {
    for path in stale_logs(log_dir) {
        if let Err(e) = fs::remove_file(&path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// With `json_file` set the file layer writes one JSON object per event.
pub fn init_logging(log_dir: &Path, verbose: bool, json_file: bool) {
    let default_filter = if verbose {
        "debug,kiosko_pos=trace"
    } else {
        "info,kiosko_pos=debug"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    prune_old_logs(log_dir);
    fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let text_file = (!json_file).then(|| {
        fmt::layer()
            .with_writer(non_blocking.clone())
            .with_ansi(false)
            .with_target(true)
    });
    let json_layer = json_file.then(|| {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
    });
    // Console goes to stderr; stdout carries command output.
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(text_file)
        .with(json_layer)
        .init();

    // Dropping the guard flushes and stops the writer thread; the process
    // logs until exit.
    std::mem::forget(guard);
}
