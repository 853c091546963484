use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::app_dirs::AppDirs;
use crate::engine::EngineConfig;
use crate::orientation::SamplerConfig;
use crate::reps::Thresholds;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub smoothing_window: usize,
    pub velocity_window: usize,
    pub pos_threshold: f64,
    pub neg_threshold: f64,
    pub zero_threshold: f64,
    pub failure_limit: u32,
    pub tolerance_percent: f64,
    pub poll_interval_ms: u64,
    pub retry_interval_ms: u64,
    pub line_timeout_ms: u64,
    pub baud_rate: u32,
    pub session_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smoothing_window: 7,
            velocity_window: 5,
            pos_threshold: 15.0,
            neg_threshold: -15.0,
            zero_threshold: 10.0,
            failure_limit: 3,
            tolerance_percent: 80.0,
            poll_interval_ms: 10,
            retry_interval_ms: 500,
            line_timeout_ms: 50,
            baud_rate: 115_200,
            session_dir: None,
        }
    }
}

impl Config {
    pub fn line_timeout(&self) -> Duration {
        Duration::from_millis(self.line_timeout_ms)
    }

    pub fn session_dir(&self) -> PathBuf {
        self.session_dir.clone().unwrap_or_else(AppDirs::session_dir)
    }
}

impl From<&Config> for EngineConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            smoothing_window: cfg.smoothing_window,
            velocity_window: cfg.velocity_window,
            thresholds: Thresholds {
                positive: cfg.pos_threshold,
                negative: cfg.neg_threshold,
                zero: cfg.zero_threshold,
            },
            failure_limit: cfg.failure_limit.max(1),
            tolerance_percent: cfg.tolerance_percent,
        }
    }
}

impl From<&Config> for SamplerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            retry_interval: Duration::from_millis(cfg.retry_interval_ms),
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg,
                Err(err) => tracing::warn!(
                    "ignoring unreadable config {}: {}",
                    self.path.display(),
                    err
                ),
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config::default();
        store.save(&cfg).unwrap();
        let loaded = store.load();
        assert_eq!(cfg, loaded);
    }

    #[test]
    fn save_and_load_custom_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let store = FileConfigStore::with_path(&path);
        let cfg = Config {
            smoothing_window: 9,
            velocity_window: 3,
            pos_threshold: 12.5,
            neg_threshold: -12.5,
            zero_threshold: 8.0,
            failure_limit: 5,
            tolerance_percent: 90.0,
            session_dir: Some(dir.path().join("logs")),
            ..Config::default()
        };
        store.save(&cfg).unwrap();
        assert_eq!(cfg, store.load());
    }

    #[test]
    fn missing_or_broken_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let store = FileConfigStore::with_path(&path);
        assert_eq!(store.load(), Config::default());

        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, br#"{ "failure_limit": 4 }"#).unwrap();

        let cfg = FileConfigStore::with_path(&path).load();
        assert_eq!(cfg.failure_limit, 4);
        assert_eq!(cfg.smoothing_window, 7);
    }

    #[test]
    fn engine_settings_follow_config() {
        let cfg = Config {
            pos_threshold: 20.0,
            failure_limit: 2,
            ..Config::default()
        };
        let engine = EngineConfig::from(&cfg);
        let expected = EngineConfig {
            thresholds: Thresholds {
                positive: 20.0,
                ..Thresholds::default()
            },
            failure_limit: 2,
            ..EngineConfig::default()
        };
        assert_eq!(engine, expected);
    }

    #[test]
    fn zero_failure_limit_is_raised_to_one() {
        let cfg = Config {
            failure_limit: 0,
            ..Config::default()
        };
        assert_eq!(EngineConfig::from(&cfg).failure_limit, 1);
    }
}
