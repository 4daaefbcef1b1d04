//! Logging infrastructure for spam-reply.
//!
//! Provides structured file logging with daily rotation to platform-standard directories.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};

/// Base name of the rolling log files.
const LOG_FILE_PREFIX: &str = "spam-reply";

const RETENTION_DAYS: u64 = 7;

/// Handle used to swap the level filter once configuration is loaded.
pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Result of initializing the logging system.
pub struct LoggingContext {
    /// Guard that must be held for the application lifetime to ensure logs are flushed.
    pub _guard: WorkerGuard,
    /// The session ID for this invocation.
    pub session_id: String,
    /// The directory where logs are written.
    pub log_directory: PathBuf,
    reload: ReloadHandle,
}

impl LoggingContext {
    /// Apply the configured level unless `RUST_LOG` is set.
    pub fn set_level(&self, level: &str) {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = match EnvFilter::try_new(level) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(level, error = %e, "invalid_log_level");
                return;
            }
        };
        match self.reload.reload(filter) {
            Ok(()) => debug!(level, "log_level_set"),
            Err(e) => warn!(error = %e, "log_level_reload_failed"),
        }
    }
}

/// Error that occurred during logging initialization.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct LoggingError {
    pub message: String,
}

/// Generates a 6-character random hex session ID.
fn generate_session_id() -> String {
    use rand::Rng;
    let mut rng = rand::rng();
    let bytes: [u8; 3] = rng.random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Initializes the logging system.
///
/// Returns a `LoggingContext` on success, or a `LoggingError` on failure.
/// The returned `WorkerGuard` must be held for the application lifetime.
pub fn init() -> Result<LoggingContext, LoggingError> {
    let session_id = generate_session_id();
    let log_dir = log_directory()?;

    fs::create_dir_all(&log_dir).map_err(|e| LoggingError {
        message: format!("Failed to create log directory: {}", e),
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, reload) = reload::Layer::new(env_filter);

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE)
        .with_target(true);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| LoggingError {
            message: format!("Failed to install subscriber: {}", e),
        })?;

    info!(session_id = %session_id, "session_start");

    Ok(LoggingContext {
        _guard: guard,
        session_id,
        log_directory: log_dir,
        reload,
    })
}

/// macOS: ~/Library/Logs/spam-reply/, elsewhere the platform state dir.
fn log_directory() -> Result<PathBuf, LoggingError> {
    let project_dirs =
        ProjectDirs::from("dev", "spam-reply", "spam-reply").ok_or_else(|| LoggingError {
            message: "Failed to determine platform directories".to_string(),
        })?;

    let log_dir = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs").join("spam-reply"))
    } else {
        project_dirs.state_dir().map(PathBuf::from)
    };

    log_dir.ok_or_else(|| LoggingError {
        message: "Failed to determine log directory".to_string(),
    })
}

/// Whether `file_name` is a rotated log file we own.
fn is_rotated_log(file_name: &str) -> bool {
    file_name
        .strip_prefix(LOG_FILE_PREFIX)
        .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1)
}

/// Cleans up log files older than the retention period.
///
/// Errors are logged at WARN level but don't prevent app startup.
pub fn cleanup_old_logs(log_dir: &Path) -> u32 {
    let retention = Duration::from_secs(RETENTION_DAYS * 24 * 60 * 60);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Failed to read log directory for cleanup");
            return 0;
        }
    };

    let now = SystemTime::now();
    let mut deleted_count = 0u32;

    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) if is_rotated_log(name) => name.to_string(),
            _ => continue,
        };

        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(file = %file_name, error = %e, "Failed to read modification time for log file");
                continue;
            }
        };

        // Future timestamps are skipped
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };

        if age > retention {
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!(file = %file_name, age_days = age.as_secs() / 86400, "Deleted old log file");
                    deleted_count += 1;
                }
                Err(e) => {
                    warn!(file = %file_name, error = %e, "Failed to delete old log file");
                }
            }
        }
    }

    if deleted_count > 0 {
        debug!(count = deleted_count, "Log cleanup completed");
    }
    deleted_count
}
