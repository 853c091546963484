/// Phase of the repetition state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum RepPhase {
    /// waiting for a rep to begin
    Idle,
    /// leg ascending
    Rising,
    /// leg moving back first (negative-first motion)
    Falling,
    /// direction has flipped; waiting for stillness to seal the rep
    Reversing,
}

/// Velocity thresholds in degrees per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub positive: f64,
    pub negative: f64,
    pub zero: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            positive: 15.0,
            negative: -15.0,
            zero: 10.0,
        }
    }
}

impl Thresholds {
    pub fn is_moving(&self, velocity: f64) -> bool {
        velocity.abs() >= self.zero
    }
}

/// A sealed repetition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Repetition {
    pub index: u32,
    pub max_angle_reached: f64,
    pub passed: bool,
}

/// Recognizes discrete repetitions from a smoothed angle/velocity signal.
#[derive(Debug, Clone)]
pub struct RepTracker {
    thresholds: Thresholds,
    target: Option<f64>,
    phase: RepPhase,
    peak: f64,
    count: u32,
}

impl RepTracker {
    /// `target` of `None` makes every repetition a failure.
    pub fn new(thresholds: Thresholds, target: Option<f64>) -> Self {
        Self {
            thresholds,
            target,
            phase: RepPhase::Idle,
            peak: f64::NEG_INFINITY,
            count: 0,
        }
    }

    pub fn phase(&self) -> RepPhase {
        self.phase
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn reset(&mut self) {
        self.phase = RepPhase::Idle;
        self.peak = f64::NEG_INFINITY;
        self.count = 0;
    }

    /// Feed one smoothed frame; returns the repetition sealed by it, if any.
    pub fn advance(&mut self, velocity: f64, is_moving: bool, angle: f64) -> Option<Repetition> {
        let t = self.thresholds;
        match self.phase {
            RepPhase::Idle => {
                if velocity > t.positive {
                    self.phase = RepPhase::Rising;
                    self.peak = angle;
                } else if velocity < t.negative {
                    self.phase = RepPhase::Falling;
                    self.peak = angle;
                }
                None
            }
            RepPhase::Rising => {
                self.peak = self.peak.max(angle);
                if velocity < t.negative {
                    self.phase = RepPhase::Reversing;
                }
                None
            }
            RepPhase::Falling => {
                self.peak = self.peak.max(angle);
                if velocity > t.positive {
                    self.phase = RepPhase::Reversing;
                }
                None
            }
            RepPhase::Reversing => {
                self.peak = self.peak.max(angle);
                if is_moving {
                    return None;
                }
                Some(self.seal())
            }
        }
    }

    fn seal(&mut self) -> Repetition {
        self.count += 1;
        let max_angle_reached = self.peak;
        let passed = self.target.is_some_and(|target| max_angle_reached >= target);

        self.peak = f64::NEG_INFINITY;
        self.phase = RepPhase::Idle;

        Repetition {
            index: self.count,
            max_angle_reached,
            passed,
        }
    }
}
