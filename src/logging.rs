//! Desktop log setup.
//!
//! All shell logging goes through `tracing`. The subscriber writes to stderr and
//! to `<root>/logs/desktop.log`, which is rotated once at startup when it grows
//! past the configured size.

use std::{
    env, fmt,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopLogCategory {
    Startup,
    Runtime,
    Restart,
    Shutdown,
    Backend,
    Ipc,
}

impl DesktopLogCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Runtime => "runtime",
            Self::Restart => "restart",
            Self::Shutdown => "shutdown",
            Self::Backend => "backend",
            Self::Ipc => "ipc",
        }
    }
}

pub fn log_message(category: DesktopLogCategory, message: &str) {
    tracing::info!(category = category.as_str(), "{message}");
}

pub fn resolve_desktop_log_path(root_dir: Option<PathBuf>, log_file_name: &str) -> PathBuf {
    match root_dir {
        Some(root) => root.join("logs").join(log_file_name),
        None => env::temp_dir()
            .join("workbench-desktop")
            .join(log_file_name),
    }
}

fn backup_path(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}

/// Shifts `desktop.log` to `desktop.log.1` (and older backups up by one) when
/// it exceeds `max_bytes`. Returns whether a rotation happened.
pub fn rotate_log_if_needed(path: &Path, max_bytes: u64, backup_count: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(metadata) => metadata.len(),
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(error) => return Err(error),
    };
    if size <= max_bytes {
        return Ok(false);
    }

    if backup_count == 0 {
        fs::remove_file(path)?;
        return Ok(true);
    }

    let oldest = backup_path(path, backup_count);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for index in (1..backup_count).rev() {
        let from = backup_path(path, index);
        if from.exists() {
            fs::rename(&from, backup_path(path, index + 1))?;
        }
    }
    fs::rename(path, backup_path(path, 1))?;
    Ok(true)
}

struct ChronoLocalTimer;

impl FormatTime for ChronoLocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

pub fn init_logging(
    log_path: &Path,
    filter_env: &str,
    max_bytes: u64,
    backup_count: usize,
) -> Result<(), String> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).map_err(|error| {
            format!(
                "Failed to create desktop log directory {}: {}",
                parent.display(),
                error
            )
        })?;
    }
    let rotation = rotate_log_if_needed(log_path, max_bytes, backup_count);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|error| format!("Failed to open desktop log {}: {}", log_path.display(), error))?;

    let filter = EnvFilter::try_from_env(filter_env).unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_timer(ChronoLocalTimer)
        .with_writer(Mutex::new(file));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_timer(ChronoLocalTimer)
        .with_writer(io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|error| format!("Failed to install log subscriber: {error}"))?;

    match rotation {
        Ok(true) => log_message(
            DesktopLogCategory::Startup,
            &format!("rotated desktop log {}", log_path.display()),
        ),
        Ok(false) => {}
        Err(error) => tracing::warn!(
            category = DesktopLogCategory::Startup.as_str(),
            "failed to rotate desktop log {}: {error}",
            log_path.display()
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_desktop_log_path_uses_logs_dir_under_root() {
        let path = resolve_desktop_log_path(Some(PathBuf::from("/tmp/root")), "desktop.log");
        assert_eq!(path, PathBuf::from("/tmp/root/logs/desktop.log"));
    }

    #[test]
    fn rotate_log_if_needed_keeps_small_logs_in_place() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let log = dir.path().join("desktop.log");
        fs::write(&log, "short").expect("write log");

        assert!(!rotate_log_if_needed(&log, 1024, 3).expect("rotate"));
        assert!(log.exists());
        assert!(!backup_path(&log, 1).exists());
    }

    #[test]
    fn rotate_log_if_needed_shifts_backups_and_drops_oldest() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let log = dir.path().join("desktop.log");
        fs::write(&log, "0123456789").expect("write log");
        fs::write(backup_path(&log, 1), "first").expect("write backup 1");
        fs::write(backup_path(&log, 2), "second").expect("write backup 2");

        assert!(rotate_log_if_needed(&log, 4, 2).expect("rotate"));

        assert!(!log.exists());
        assert_eq!(
            fs::read_to_string(backup_path(&log, 1)).expect("read backup 1"),
            "0123456789"
        );
        assert_eq!(
            fs::read_to_string(backup_path(&log, 2)).expect("read backup 2"),
            "first"
        );
        assert!(!backup_path(&log, 3).exists());
    }

    #[test]
    fn rotate_log_if_needed_ignores_missing_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let log = dir.path().join("missing.log");
        assert!(!rotate_log_if_needed(&log, 1, 1).expect("rotate"));
    }
}
