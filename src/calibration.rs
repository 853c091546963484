use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::CalibrationError;
use crate::orientation::{OrientationReader, OrientationSample};
use crate::util::{mean, quaternion_angle_degrees, std_dev};

/// Absolute angle of the user standing still, subtracted from every later reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub start_angle: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub start_angle: f64,
    pub max_angle: f64,
}

impl CalibrationResult {
    pub fn baseline(&self) -> Baseline {
        Baseline {
            start_angle: self.start_angle,
        }
    }

    /// Peak angle a repetition must reach to pass; `None` disables pass detection.
    pub fn target_threshold(&self, tolerance_percent: f64) -> Option<f64> {
        target_threshold(self.max_angle, tolerance_percent)
    }
}

pub fn target_threshold(max_angle: f64, tolerance_percent: f64) -> Option<f64> {
    if max_angle > 0.0 {
        Some(max_angle * tolerance_percent / 100.0)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalibrationConfig {
    pub zero_samples: usize,
    pub sample_interval: Duration,
    /// How long the zero phase waits for fresh sensor data in total
    pub sample_timeout: Duration,
    pub track_interval: Duration,
    /// Spread (degrees) above which the zero phase warns that the user moved
    pub stillness_tolerance: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            zero_samples: 10,
            sample_interval: Duration::from_millis(20),
            sample_timeout: Duration::from_secs(2),
            track_interval: Duration::from_millis(10),
            stillness_tolerance: 2.0,
        }
    }
}

/// Two-phase calibration driven by polling the orientation sampler
pub struct Calibrator<R: OrientationReader> {
    orientation: R,
    config: CalibrationConfig,
}

impl<R: OrientationReader> Calibrator<R> {
    pub fn new(orientation: R, config: CalibrationConfig) -> Self {
        Self {
            orientation,
            config,
        }
    }

    /// Average fresh samples while the user stands still.
    pub fn zero(&self) -> Result<Baseline, CalibrationError> {
        let wanted = self.config.zero_samples.max(1);
        let deadline = Instant::now() + self.config.sample_timeout;
        let mut last_seen = self.orientation.sequence();
        let mut scalars = Vec::with_capacity(wanted);

        while scalars.len() < wanted {
            let seq = self.orientation.sequence();
            if seq != last_seen {
                last_seen = seq;
                scalars.push(self.orientation.get_latest().w);
                if scalars.len() == wanted {
                    break;
                }
                thread::sleep(self.config.sample_interval);
            } else if Instant::now() >= deadline {
                return Err(CalibrationError::NoSensorData {
                    received: scalars.len(),
                    wanted,
                });
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }

        let angles: Vec<f64> = scalars.iter().map(|&w| quaternion_angle_degrees(w)).collect();
        if let Some(spread) = std_dev(&angles) {
            if spread > self.config.stillness_tolerance {
                warn!(
                    "orientation moved {:.1} deg during zeroing; baseline may be off",
                    spread
                );
            }
        }

        let avg_w = mean(&scalars).unwrap_or(OrientationSample::default().w);
        let baseline = Baseline {
            start_angle: quaternion_angle_degrees(avg_w),
        };
        info!("baseline angle {:.2} deg", baseline.start_angle);
        Ok(baseline)
    }

    /// Track the largest angle relative to `baseline` until `done` is raised.
    pub fn track_max(&self, baseline: Baseline, done: &AtomicBool) -> f64 {
        let mut max_angle = 0.0_f64;
        loop {
            // read once more after `done` so the final pose is never missed
            let finished = done.load(Ordering::Acquire);
            let relative = self.orientation.get_latest().angle_degrees() - baseline.start_angle;
            max_angle = max_angle.max(relative);
            if finished {
                break;
            }
            thread::sleep(self.config.track_interval);
        }
        info!("maximum stretch {:.2} deg", max_angle);
        max_angle
    }

    pub fn calibrate(&self, done: &AtomicBool) -> Result<CalibrationResult, CalibrationError> {
        let baseline = self.zero()?;
        let max_angle = self.track_max(baseline, done);
        Ok(CalibrationResult {
            start_angle: baseline.start_angle,
            max_angle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::{
        FixedOrientation, OrientationSampler, SamplerConfig, ScriptedOrientation,
    };
    use std::sync::Arc;

    fn fast_sampler(source: ScriptedOrientation) -> OrientationSampler {
        OrientationSampler::spawn(
            source,
            SamplerConfig {
                poll_interval: Duration::from_millis(1),
                retry_interval: Duration::from_millis(1),
            },
        )
    }

    fn fast_config() -> CalibrationConfig {
        CalibrationConfig {
            zero_samples: 5,
            sample_interval: Duration::from_millis(1),
            sample_timeout: Duration::from_millis(100),
            track_interval: Duration::from_millis(1),
            stillness_tolerance: 2.0,
        }
    }

    fn w_for(angle_deg: f64) -> f64 {
        (angle_deg / 2.0).to_radians().cos()
    }

    #[test]
    fn target_threshold_scales_max_angle() {
        let cal = CalibrationResult {
            start_angle: 3.0,
            max_angle: 40.0,
        };
        assert_eq!(cal.target_threshold(75.0), Some(30.0));
        assert_eq!(cal.baseline().start_angle, 3.0);
    }

    #[test]
    fn non_positive_max_disables_target() {
        assert_eq!(target_threshold(0.0, 80.0), None);
        assert_eq!(target_threshold(-4.0, 80.0), None);
    }

    #[test]
    fn zero_phase_averages_fresh_samples() {
        let mut sampler = fast_sampler(ScriptedOrientation::from_scalars(vec![w_for(12.0); 400]));
        let calibrator = Calibrator::new(sampler.handle(), fast_config());

        let baseline = calibrator.zero().unwrap();
        assert!((baseline.start_angle - 12.0).abs() < 1e-6);
        sampler.stop();
    }

    #[test]
    fn zero_phase_without_sensor_fails() {
        let mut sampler = fast_sampler(ScriptedOrientation::new());
        let calibrator = Calibrator::new(sampler.handle(), fast_config());

        assert_eq!(
            calibrator.zero(),
            Err(CalibrationError::NoSensorData {
                received: 0,
                wanted: 5
            })
        );
        sampler.stop();
    }

    #[test]
    fn max_tracking_keeps_the_largest_relative_angle() {
        let pose = FixedOrientation::new(w_for(20.0));
        let calibrator = Calibrator::new(pose.clone(), fast_config());
        let done = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&done);
        let mover = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            pose.set(w_for(45.0));
            flag.store(true, Ordering::Release);
        });

        let max = calibrator.track_max(Baseline { start_angle: 5.0 }, &done);
        mover.join().unwrap();
        assert!((max - 40.0).abs() < 1e-6, "max was {}", max);
    }

    #[test]
    fn max_below_baseline_is_zero() {
        let calibrator = Calibrator::new(FixedOrientation::new(w_for(2.0)), fast_config());
        let done = AtomicBool::new(true);
        assert_eq!(calibrator.track_max(Baseline { start_angle: 10.0 }, &done), 0.0);
    }

    #[test]
    fn calibrate_runs_both_phases() {
        let mut sampler = fast_sampler(ScriptedOrientation::from_scalars(vec![w_for(8.0); 400]));
        let calibrator = Calibrator::new(sampler.handle(), fast_config());
        let done = AtomicBool::new(true);

        let result = calibrator.calibrate(&done).unwrap();
        sampler.stop();
        assert!((result.start_angle - 8.0).abs() < 1e-6);
        assert!(result.max_angle.abs() < 1e-6);
        assert!(result.target_threshold(80.0).unwrap_or(0.0) < 1e-6);
    }
}
