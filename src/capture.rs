//! Recorded sessions for offline replay.
//!
//! A capture is a CSV file with a `time,w,line` header: `time` in seconds, `w` the
//! orientation scalar current when the line arrived (empty to keep the previous one) and
//! `line` the raw board line. Lines starting with `#` are control rows: `#start`, `#end`,
//! `#end:<reason>` and `#discard`. A capture without any `#start` row is replayed as a
//! single set opened at its first timestamp.

use std::io::Read;
use std::path::Path;
use std::sync::mpsc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::calibration::Baseline;
use crate::engine::{EngineConfig, RepDetectionEngine};
use crate::error::CaptureError;
use crate::events::EngineEvent;
use crate::orientation::FixedOrientation;
use crate::session::Session;
use crate::session_log::SessionLog;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CaptureRow {
    pub time: f64,
    pub w: Option<f64>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Control<'a> {
    Start,
    End(&'a str),
    Discard,
}

impl CaptureRow {
    fn control(&self) -> Option<Control<'_>> {
        let directive = self.line.strip_prefix('#')?;
        match directive.split_once(':') {
            Some(("end", reason)) => Some(Control::End(reason)),
            _ => match directive {
                "start" => Some(Control::Start),
                "end" => Some(Control::End("operator")),
                "discard" => Some(Control::Discard),
                other => {
                    warn!("ignoring unknown capture directive #{}", other);
                    None
                }
            },
        }
    }
}

pub fn read_capture<P: AsRef<Path>>(path: P) -> Result<Vec<CaptureRow>, CaptureError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    collect_rows(reader)
}

pub fn from_reader<R: Read>(rdr: R) -> Result<Vec<CaptureRow>, CaptureError> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(rdr);
    collect_rows(reader)
}

fn collect_rows<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<CaptureRow>, CaptureError> {
    reader
        .deserialize()
        .enumerate()
        .map(|(i, row)| row.map_err(|source| CaptureError::Row { row: i + 1, source }))
        .collect()
}

/// Result of a replay: the session summary and every event in emission order
#[derive(Debug, Clone)]
pub struct Replay {
    pub session: Session,
    pub events: Vec<EngineEvent>,
}

impl Replay {
    pub fn markers(&self) -> Vec<String> {
        self.events.iter().filter_map(EngineEvent::marker).collect()
    }

    pub fn frame_count(&self) -> usize {
        self.events.iter().filter(|e| e.as_frame().is_some()).count()
    }
}

/// Drive a fresh engine through `rows` deterministically, on the calling thread.
pub fn replay(
    rows: &[CaptureRow],
    config: EngineConfig,
    baseline: Option<Baseline>,
    max_angle: f64,
    log: SessionLog,
) -> Replay {
    let (tx, rx) = mpsc::channel();
    let mut engine = RepDetectionEngine::new(config, baseline, max_angle, log, tx);
    let pose = FixedOrientation::default();

    let classified: Vec<(&CaptureRow, Option<Control<'_>>)> =
        rows.iter().map(|row| (row, row.control())).collect();

    let implicit_set = !classified
        .iter()
        .any(|(_, control)| *control == Some(Control::Start));
    if implicit_set {
        let t0 = rows.first().map_or(0.0, |row| row.time);
        debug!("capture has no #start rows; replaying as one set from t={:.3}", t0);
        engine.start_set(t0);
    }

    for (row, control) in classified {
        match control {
            Some(Control::Start) => engine.start_set(row.time),
            Some(Control::End(reason)) => engine.end_set(reason),
            Some(Control::Discard) => engine.discard_data(),
            None if row.line.starts_with('#') => {}
            None => {
                if let Some(w) = row.w {
                    pose.set(w);
                }
                engine.process_line(&row.line, &pose, row.time);
            }
        }
    }

    let session = engine.stop();
    Replay {
        session,
        events: rx.try_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const CAPTURE: &str = "\
time,w,line
0.0,,#start
0.1,1.0,\"(0.5, 0.5)\"
0.2,1.0,\"(0.5, 0.5)\"
0.3,,garbage
0.4,0.99,\"(0.6, 0.4)\"
0.5,,#end:done
";

    #[test]
    fn parses_rows_with_quoted_lines() {
        let rows = from_reader(CAPTURE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(
            rows[1],
            CaptureRow {
                time: 0.1,
                w: Some(1.0),
                line: "(0.5, 0.5)".into()
            }
        );
        assert_eq!(rows[3].w, None);
        assert_eq!(rows[5].control(), Some(Control::End("done")));
    }

    #[test]
    fn bad_row_reports_its_position() {
        let err = from_reader("time,w,line\n0.1,1.0,x\nsoon,1.0,y\n".as_bytes()).unwrap_err();
        assert_matches!(err, CaptureError::Row { row: 2, .. });
    }

    #[test]
    fn control_rows_drive_the_set_lifecycle() {
        let rows = from_reader(CAPTURE.as_bytes()).unwrap();
        let config = EngineConfig {
            smoothing_window: 3,
            ..EngineConfig::default()
        };
        let out = replay(&rows, config, None, 40.0, SessionLog::disabled());

        assert_eq!(out.markers(), vec!["SET_START:1", "SET_END:1:done:0"]);
        assert_eq!(out.frame_count(), 1);
        assert_eq!(out.session.sets.len(), 1);
    }

    #[test]
    fn unknown_directives_are_skipped() {
        let capture = "time,w,line\n0.0,,#pause\n0.1,1.0,\"(0.0, 0.0)\"\n";
        let rows = from_reader(capture.as_bytes()).unwrap();
        assert_eq!(rows[0].control(), None);

        let config = EngineConfig {
            smoothing_window: 1,
            ..EngineConfig::default()
        };
        let out = replay(&rows, config, None, 40.0, SessionLog::disabled());
        assert_eq!(out.markers(), vec!["SET_START:1", "SET_END:1:stopped:0"]);
        assert_eq!(out.frame_count(), 1);
    }

    #[test]
    fn capture_without_start_is_one_set() {
        let rows = vec![
            CaptureRow {
                time: 2.0,
                w: Some(1.0),
                line: "(0.0, 0.0)".into(),
            },
            CaptureRow {
                time: 2.1,
                w: None,
                line: "(0.0, 0.0)".into(),
            },
        ];
        let config = EngineConfig {
            smoothing_window: 2,
            ..EngineConfig::default()
        };
        let out = replay(&rows, config, None, 40.0, SessionLog::disabled());

        assert_eq!(out.markers(), vec!["SET_START:1", "SET_END:1:stopped:0"]);
        let frame = out.events.iter().find_map(EngineEvent::as_frame).unwrap();
        assert!((frame.elapsed - 0.1).abs() < 1e-9);
    }
}
