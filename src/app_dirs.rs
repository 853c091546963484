use chrono::{DateTime, Local};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", "legstretch")
            .map(|pd| pd.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("legstretch_config.json"))
    }

    pub fn session_dir() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("legstretch")
                .join("sessions")
        } else {
            ProjectDirs::from("", "", "legstretch")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("sessions"))
                .unwrap_or_else(|| PathBuf::from("sessions"))
        }
    }

    /// One file per session, named after its local start time.
    pub fn session_log_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
        dir.join(format!("session-{}.csv", started.format("%Y%m%d-%H%M%S")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn session_file_is_named_after_start_time() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let path = AppDirs::session_log_path(Path::new("/tmp/s"), started);
        assert_eq!(path, PathBuf::from("/tmp/s/session-20240309-140507.csv"));
    }

    #[test]
    fn config_lives_in_a_json_file() {
        assert_eq!(
            AppDirs::config_path().extension().and_then(|e| e.to_str()),
            Some("json")
        );
    }
}
