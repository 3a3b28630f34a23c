use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;

/// Files of previous runs kept next to the new one.
const KEEP_PREVIOUS_LOGS: usize = 1;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Log directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("A logger is already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

pub fn level_filter(log_level: &str) -> log::LevelFilter {
    match log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    }
}

/// Installs the global logger and returns the path of this run's log file.
pub fn setup_logging(log_dir: &Path, log_level: &str, app_name: &str) -> Result<PathBuf, LoggerError> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)?;
    }

    // Clean up old log files, keeping only the most recent one
    prune_old_logs(log_dir, app_name, KEEP_PREVIOUS_LOGS)?;

    let log_file_name = format!("{}_{}.log", app_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level_filter(log_level))
        // Dependencies are chatty at debug level.
        .level_for("tungstenite", log::LevelFilter::Warn)
        .level_for("tokio_tungstenite", log::LevelFilter::Warn)
        .level_for("reqwest_retry", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

/// Deletes `<app_name>_*.log` files in `log_dir` except the `keep` newest.
/// Returns how many were deleted.
pub fn prune_old_logs(log_dir: &Path, app_name: &str, keep: usize) -> Result<usize, LoggerError> {
    let prefix = format!("{}_", app_name);
    let mut entries: Vec<(SystemTime, PathBuf)> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "log"))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .map(|p| {
            let modified = fs::metadata(&p)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, p)
        })
        .collect();

    // Newest first; the file name carries the start time, so it breaks ties.
    entries.sort_by(|a, b| b.cmp(a));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(level_filter("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(level_filter("trace"), log::LevelFilter::Trace);
        assert_eq!(level_filter("fatal"), log::LevelFilter::Info);
    }

    #[test]
    fn pruning_keeps_the_newest_files_of_the_app() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "feed-watch_2024-01-01_00-00-00.log",
            "feed-watch_2024-01-02_00-00-00.log",
            "feed-watch_2024-01-03_00-00-00.log",
            "feed-toggle_2024-01-01_00-00-00.log",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let removed = prune_old_logs(dir.path(), "feed-watch", 1).unwrap();
        assert_eq!(removed, 2);

        let mut left: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(
            left,
            vec![
                "feed-toggle_2024-01-01_00-00-00.log",
                "feed-watch_2024-01-03_00-00-00.log",
                "notes.txt"
            ]
        );
    }

    #[test]
    fn setup_creates_the_directory_and_run_file() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("logs");
        let path = setup_logging(&log_dir, "debug", "feedsync-test").unwrap();
        log::info!("hello from the logger test");

        assert!(path.starts_with(&log_dir));
        assert!(path.exists());
    }
}
