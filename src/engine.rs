use std::sync::mpsc::Sender;

use tracing::{debug, info, trace};

use crate::calibration::{target_threshold, Baseline, CalibrationResult};
use crate::cop::CopPoint;
use crate::events::{EngineEvent, Frame};
use crate::orientation::OrientationReader;
use crate::reps::{RepPhase, RepTracker, Repetition, Thresholds};
use crate::session::{Session, SetRecord};
use crate::session_log::SessionLog;
use crate::smoothing::RingBuffer;

/// Angle jumps of this size between consecutive readings are sensor faults.
const MAX_ANGLE_JUMP: f64 = 180.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    pub smoothing_window: usize,
    pub velocity_window: usize,
    pub thresholds: Thresholds,
    /// Consecutive failed reps that end the set automatically
    pub failure_limit: u32,
    pub tolerance_percent: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 7,
            velocity_window: 5,
            thresholds: Thresholds::default(),
            failure_limit: 3,
            tolerance_percent: 80.0,
        }
    }
}

/// Real-time repetition detector.
///
/// Fuses CoP telemetry lines with the latest orientation reading, smooths and differentiates
/// the leg angle, runs the repetition state machine and publishes frames and set markers.
/// Time is supplied by the caller in seconds on any monotonic scale.
pub struct RepDetectionEngine {
    config: EngineConfig,
    max_angle: f64,
    target: Option<f64>,
    baseline: Option<Baseline>,
    last_angle: f64,

    angles: RingBuffer,
    velocities: RingBuffer,
    /// (elapsed, smoothed angle) of the previous emitted frame
    previous: Option<(f64, f64)>,
    velocity: f64,

    tracker: RepTracker,
    consecutive_failures: u32,

    set_active: bool,
    set_index: u32,
    set_started_at: f64,
    current_set: Option<SetRecord>,
    sets: Vec<SetRecord>,

    log: SessionLog,
    events: Sender<EngineEvent>,
}

impl RepDetectionEngine {
    /// `baseline` of `None` adopts the first orientation reading as zero.
    pub fn new(
        config: EngineConfig,
        baseline: Option<Baseline>,
        max_angle: f64,
        log: SessionLog,
        events: Sender<EngineEvent>,
    ) -> Self {
        let target = target_threshold(max_angle, config.tolerance_percent);
        match target {
            Some(t) => info!("target angle {:.2} deg (max {:.2})", t, max_angle),
            None => info!("no usable max angle ({:.2}); every rep will fail", max_angle),
        }

        Self {
            config,
            max_angle,
            target,
            baseline,
            last_angle: 0.0,
            angles: RingBuffer::new(config.smoothing_window),
            velocities: RingBuffer::new(config.velocity_window),
            previous: None,
            velocity: 0.0,
            tracker: RepTracker::new(config.thresholds, target),
            consecutive_failures: 0,
            set_active: false,
            set_index: 1,
            set_started_at: 0.0,
            current_set: None,
            sets: Vec::new(),
            log,
            events,
        }
    }

    pub fn from_calibration(
        config: EngineConfig,
        calibration: &CalibrationResult,
        log: SessionLog,
        events: Sender<EngineEvent>,
    ) -> Self {
        Self::new(
            config,
            Some(calibration.baseline()),
            calibration.max_angle,
            log,
            events,
        )
    }

    pub fn is_active(&self) -> bool {
        self.set_active
    }

    pub fn set_index(&self) -> u32 {
        self.set_index
    }

    pub fn rep_count(&self) -> u32 {
        self.tracker.count()
    }

    pub fn phase(&self) -> RepPhase {
        self.tracker.phase()
    }

    pub fn target(&self) -> Option<f64> {
        self.target
    }

    pub fn baseline(&self) -> Option<Baseline> {
        self.baseline
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    fn emit(&self, event: EngineEvent) {
        // a consumer that went away is not the engine's problem
        let _ = self.events.send(event);
    }

    pub fn start_set(&mut self, now: f64) {
        if self.set_active {
            self.end_set("restarted");
        }

        self.tracker.reset();
        self.angles.clear();
        self.velocities.clear();
        self.previous = None;
        self.velocity = 0.0;
        self.consecutive_failures = 0;
        self.set_started_at = now;
        self.set_active = true;
        self.current_set = Some(SetRecord::open(self.set_index));

        info!("set {} started", self.set_index);
        self.emit(EngineEvent::SetStart {
            set: self.set_index,
        });
    }

    pub fn end_set(&mut self, reason: &str) {
        if !self.set_active {
            return;
        }
        self.set_active = false;

        let reps = self.tracker.count();
        info!("set {} ended after {} reps: {}", self.set_index, reps, reason);
        self.emit(EngineEvent::SetEnd {
            set: self.set_index,
            reason: reason.to_string(),
            reps,
        });

        if let Some(mut record) = self.current_set.take() {
            record.end_reason = Some(reason.to_string());
            self.sets.push(record);
        }
        self.set_index += 1;
    }

    pub fn discard_data(&mut self) {
        info!("session data will be discarded");
        self.log.mark_discard();
    }

    /// Close the log (deleting it if discarded) and hand back the session summary.
    pub fn stop(mut self) -> Session {
        self.end_set("stopped");
        let log_path = self.log.close();
        Session {
            start_angle: self.baseline.map(|b| b.start_angle),
            max_angle: self.max_angle,
            target: self.target,
            sets: self.sets,
            log_path,
        }
    }

    /// Run one inbound line through the pipeline.
    ///
    /// Returns the emitted frame, or `None` when the line was ignored, rejected,
    /// or consumed while the smoothing window is still filling.
    pub fn process_line<R>(&mut self, line: &str, orientation: &R, now: f64) -> Option<Frame>
    where
        R: OrientationReader + ?Sized,
    {
        if !self.set_active {
            return None;
        }

        let cop = CopPoint::parse(line)?;
        if !cop.is_plausible() {
            trace!("dropping implausible CoP ({}, {})", cop.x, cop.y);
            return None;
        }

        let angle = self.accept_angle(orientation.get_latest().angle_degrees());
        self.angles.push(angle);
        if !self.angles.is_full() {
            return None;
        }

        let smoothed = self.angles.mean()?;
        let elapsed = now - self.set_started_at;
        let velocity = self.next_velocity(elapsed, smoothed);

        let moving = self.tracker.thresholds().is_moving(velocity);
        let sealed = self.tracker.advance(velocity, moving, smoothed);

        let frame = Frame {
            elapsed,
            angle: smoothed,
            velocity,
            x: cop.x,
            y: cop.y,
            rep_count: self.tracker.count(),
            set_index: self.set_index,
        };
        self.log.append(&frame);
        self.emit(EngineEvent::Frame(frame));

        if let Some(rep) = sealed {
            self.record_rep(rep);
        }

        Some(frame)
    }

    fn accept_angle(&mut self, absolute: f64) -> f64 {
        let start = self
            .baseline
            .get_or_insert_with(|| {
                debug!("adopting first reading {:.2} deg as baseline", absolute);
                Baseline {
                    start_angle: absolute,
                }
            })
            .start_angle;

        let candidate = absolute - start;
        if candidate >= 0.0 && (candidate - self.last_angle).abs() < MAX_ANGLE_JUMP {
            self.last_angle = candidate;
        } else {
            trace!(
                "rejecting angle {:.2}, holding {:.2}",
                candidate,
                self.last_angle
            );
        }
        self.last_angle
    }

    fn next_velocity(&mut self, elapsed: f64, smoothed: f64) -> f64 {
        if let Some((prev_elapsed, prev_angle)) = self.previous {
            let dt = elapsed - prev_elapsed;
            // two lines stamped with the same instant carry no rate information
            if dt > 0.0 {
                self.velocities.push((smoothed - prev_angle) / dt);
                self.velocity = self.velocities.mean().unwrap_or(0.0);
            }
        } else {
            self.velocity = 0.0;
        }
        self.previous = Some((elapsed, smoothed));
        self.velocity
    }

    fn record_rep(&mut self, rep: Repetition) {
        if rep.passed {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures += 1;
        }
        info!(
            "set {} rep {}: peak {:.1} deg, {}",
            self.set_index,
            rep.index,
            rep.max_angle_reached,
            if rep.passed { "pass" } else { "fail" }
        );

        if let Some(record) = self.current_set.as_mut() {
            record.repetitions.push(rep);
        }

        // a limit of zero would end the set on every rep; one failure is the floor
        let limit = self.config.failure_limit.max(1);
        if self.consecutive_failures >= limit {
            self.end_set(&format!("{} failed reps", limit));
        }
    }
}
