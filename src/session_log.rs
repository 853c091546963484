use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::events::Frame;

pub const COLUMNS: [&str; 7] = ["Set", "Time", "Reps", "Angle", "Velocity", "X", "Y"];

/// Incremental per-session CSV log.
///
/// Opening is best-effort: when the file can't be created the log is disabled and every
/// append becomes a no-op, so the engine keeps running without persistence.
#[derive(Debug)]
pub struct SessionLog {
    writer: Option<csv::Writer<File>>,
    path: Option<PathBuf>,
    discard: bool,
}

impl SessionLog {
    pub fn create<P: AsRef<Path>>(path: P, max_angle: f64, target: Option<f64>) -> Self {
        let path = path.as_ref().to_path_buf();
        match Self::open(&path, max_angle, target) {
            Ok(writer) => {
                info!("logging session to {}", path.display());
                Self {
                    writer: Some(writer),
                    path: Some(path),
                    discard: false,
                }
            }
            Err(err) => {
                warn!(
                    "session log {} unavailable, continuing without it: {}",
                    path.display(),
                    err
                );
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self {
            writer: None,
            path: None,
            discard: false,
        }
    }

    fn open(path: &Path, max_angle: f64, target: Option<f64>) -> csv::Result<csv::Writer<File>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)?;

        let max = format!("{:.4}", max_angle);
        let target = target.map_or_else(|| "0.0".to_string(), |t| format!("{:.4}", t));
        writer.write_record(["Max", max.as_str()])?;
        writer.write_record(["Target", target.as_str()])?;
        writer.write_record(COLUMNS)?;
        writer.flush()?;
        Ok(writer)
    }

    pub fn is_persistent(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&mut self, frame: &Frame) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let row = [
            frame.set_index.to_string(),
            format!("{:.4}", frame.elapsed),
            frame.rep_count.to_string(),
            format!("{:.4}", frame.angle),
            format!("{:.4}", frame.velocity),
            format!("{:.4}", frame.x),
            format!("{:.4}", frame.y),
        ];
        let written = writer
            .write_record(&row)
            .and_then(|()| writer.flush().map_err(csv::Error::from));
        if let Err(err) = written {
            warn!("session log write failed, disabling it: {}", err);
            self.writer = None;
        }
    }

    /// Delete the file instead of keeping it when the log is closed.
    pub fn mark_discard(&mut self) {
        self.discard = true;
    }

    /// Flush and close; returns the path of the retained file, if any.
    pub fn close(mut self) -> Option<PathBuf> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                warn!("failed to flush session log: {}", err);
            }
        }

        let path = self.path.take()?;
        if self.discard {
            match fs::remove_file(&path) {
                Ok(()) => debug!("discarded session log {}", path.display()),
                Err(err) => warn!("failed to discard {}: {}", path.display(), err),
            }
            None
        } else {
            Some(path)
        }
    }
}
