use std::fmt;

/// One smoothed sample of a running set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub elapsed: f64,
    pub angle: f64,
    pub velocity: f64,
    pub x: f64,
    pub y: f64,
    pub rep_count: u32,
    pub set_index: u32,
}

/// Everything the engine publishes on its output FIFO
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Frame(Frame),
    SetStart {
        set: u32,
    },
    SetEnd {
        set: u32,
        reason: String,
        reps: u32,
    },
}

impl EngineEvent {
    /// Textual lifecycle marker, `None` for data frames.
    pub fn marker(&self) -> Option<String> {
        match self {
            EngineEvent::Frame(_) => None,
            EngineEvent::SetStart { set } => Some(format!("SET_START:{}", set)),
            EngineEvent::SetEnd { set, reason, reps } => {
                Some(format!("SET_END:{}:{}:{}", set, reason, reps))
            }
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            EngineEvent::Frame(frame) => Some(frame),
            _ => None,
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self, self.marker()) {
            (_, Some(marker)) => f.write_str(&marker),
            (EngineEvent::Frame(fr), None) => write!(
                f,
                "set {} t={:.2}s reps={} angle={:.1} vel={:.1} cop=({:.2}, {:.2})",
                fr.set_index, fr.elapsed, fr.rep_count, fr.angle, fr.velocity, fr.x, fr.y
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_markers() {
        assert_eq!(
            EngineEvent::SetStart { set: 2 }.marker().as_deref(),
            Some("SET_START:2")
        );
        let end = EngineEvent::SetEnd {
            set: 2,
            reason: "3 failed reps".into(),
            reps: 4,
        };
        assert_eq!(end.marker().as_deref(), Some("SET_END:2:3 failed reps:4"));
        assert_eq!(end.to_string(), "SET_END:2:3 failed reps:4");
    }

    #[test]
    fn frames_have_no_marker() {
        let frame = Frame {
            elapsed: 1.5,
            angle: 12.34,
            velocity: -3.0,
            x: 0.5,
            y: -0.25,
            rep_count: 1,
            set_index: 1,
        };
        let ev = EngineEvent::Frame(frame);
        assert!(ev.marker().is_none());
        assert_eq!(ev.as_frame(), Some(&frame));
        assert_eq!(
            ev.to_string(),
            "set 1 t=1.50s reps=1 angle=12.3 vel=-3.0 cop=(0.50, -0.25)"
        );
    }
}
