use std::path::PathBuf;

use crate::reps::Repetition;

#[derive(Debug, Clone, PartialEq)]
pub struct SetRecord {
    pub index: u32,
    pub repetitions: Vec<Repetition>,
    /// `None` while the set is still open
    pub end_reason: Option<String>,
}

impl SetRecord {
    pub fn open(index: u32) -> Self {
        Self {
            index,
            repetitions: Vec::new(),
            end_reason: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.end_reason.is_some()
    }

    pub fn passed(&self) -> usize {
        self.repetitions.iter().filter(|r| r.passed).count()
    }

    pub fn best_angle(&self) -> Option<f64> {
        self.repetitions
            .iter()
            .map(|r| r.max_angle_reached)
            .reduce(f64::max)
    }
}

/// What a finished engine leaves behind; per-frame data lives only in the CSV log
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub start_angle: Option<f64>,
    pub max_angle: f64,
    pub target: Option<f64>,
    pub sets: Vec<SetRecord>,
    /// Path of the retained log, `None` when discarded or never opened
    pub log_path: Option<PathBuf>,
}

impl Session {
    pub fn total_reps(&self) -> usize {
        self.sets.iter().map(|s| s.repetitions.len()).sum()
    }
}
