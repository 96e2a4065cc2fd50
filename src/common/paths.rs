//! Configuration and log file locations

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Name used for the config directory
const APP_NAME: &str = "onboard-e2e";

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/onboard-e2e/`
/// - macOS: `~/Library/Application Support/onboard-e2e/`
/// - Windows: `%APPDATA%\onboard-e2e\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// File name of the per-run log, e.g. `log_2024-05-01_13_07_42.txt`
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("log_{}.txt", started.format("%Y-%m-%d_%H_%M_%S"))
}

/// Full path of the per-run log inside `dir`
pub fn log_file_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
    dir.join(log_file_name(started))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_config_dir_is_valid() {
        let dir = config_dir();
        assert!(dir.is_some());
    }

    #[test]
    fn test_log_file_name_format() {
        let started = Local.with_ymd_and_hms(2024, 5, 1, 13, 7, 42).unwrap();
        assert_eq!(log_file_name(started), "log_2024-05-01_13_07_42.txt");
        assert_eq!(
            log_file_path(Path::new("logs"), started),
            PathBuf::from("logs").join("log_2024-05-01_13_07_42.txt")
        );
    }
}
