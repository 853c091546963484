use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::SensorError;
use crate::transport::LineTransport;
use crate::util::quaternion_angle_degrees;

/// Scalar part of the latest unit-quaternion orientation reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    pub w: f64,
}

impl Default for OrientationSample {
    fn default() -> Self {
        Self { w: 1.0 }
    }
}

impl OrientationSample {
    pub fn new(w: f64) -> Self {
        Self { w }
    }

    pub fn angle_degrees(&self) -> f64 {
        quaternion_angle_degrees(self.w)
    }
}

/// Anything that can report a quaternion's scalar component.
///
/// `Ok(None)` means no new reading is available yet; it is not an error.
pub trait OrientationSource: Send + 'static {
    fn latest_scalar(&mut self) -> Result<Option<f64>, SensorError>;
}

/// Read access to the most recent orientation sample.
pub trait OrientationReader: Send {
    fn get_latest(&self) -> OrientationSample;

    /// Number of good readings stored so far.
    ///
    /// Zero means `get_latest` still returns the identity default.
    fn sequence(&self) -> u64;
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerConfig {
    pub poll_interval: Duration,
    pub retry_interval: Duration,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            retry_interval: Duration::from_millis(500),
        }
    }
}

#[derive(Debug)]
struct Slot {
    w_bits: AtomicU64,
    sequence: AtomicU64,
}

/// Cloneable reader over the sampler's latest-sample slot
#[derive(Debug, Clone)]
pub struct OrientationHandle {
    slot: Arc<Slot>,
}

impl OrientationHandle {
    fn new() -> Self {
        Self {
            slot: Arc::new(Slot {
                w_bits: AtomicU64::new(OrientationSample::default().w.to_bits()),
                sequence: AtomicU64::new(0),
            }),
        }
    }

    fn store(&self, w: f64) {
        self.slot.w_bits.store(w.to_bits(), Ordering::Release);
        self.slot.sequence.fetch_add(1, Ordering::AcqRel);
    }
}

impl OrientationReader for OrientationHandle {
    fn get_latest(&self) -> OrientationSample {
        OrientationSample::new(f64::from_bits(self.slot.w_bits.load(Ordering::Acquire)))
    }

    fn sequence(&self) -> u64 {
        self.slot.sequence.load(Ordering::Acquire)
    }
}

/// Background loop keeping a single latest-known orientation sample fresh
pub struct OrientationSampler {
    handle: OrientationHandle,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl OrientationSampler {
    pub fn spawn<S: OrientationSource>(mut source: S, config: SamplerConfig) -> Self {
        let handle = OrientationHandle::new();
        let running = Arc::new(AtomicBool::new(true));

        let slot = handle.clone();
        let flag = Arc::clone(&running);
        let worker = thread::spawn(move || {
            while flag.load(Ordering::Acquire) {
                match source.latest_scalar() {
                    Ok(Some(w)) if w.is_finite() => {
                        slot.store(w);
                        thread::sleep(config.poll_interval);
                    }
                    Ok(_) => thread::sleep(config.poll_interval),
                    Err(err) => {
                        warn!("orientation read failed, retrying: {}", err);
                        thread::sleep(config.retry_interval);
                    }
                }
            }
            debug!("orientation sampler stopped");
        });

        Self {
            handle,
            running,
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> OrientationHandle {
        self.handle.clone()
    }

    pub fn get_latest(&self) -> OrientationSample {
        self.handle.get_latest()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for OrientationSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Scripted source for tests and demos: yields each queued result once, then `Ok(None)`.
#[derive(Debug, Default)]
pub struct ScriptedOrientation {
    script: VecDeque<Result<Option<f64>, String>>,
}

impl ScriptedOrientation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_scalars<I: IntoIterator<Item = f64>>(values: I) -> Self {
        Self {
            script: values.into_iter().map(|w| Ok(Some(w))).collect(),
        }
    }

    pub fn push_reading(&mut self, w: f64) -> &mut Self {
        self.script.push_back(Ok(Some(w)));
        self
    }

    pub fn push_failure(&mut self, reason: &str) -> &mut Self {
        self.script.push_back(Err(reason.to_string()));
        self
    }
}

impl OrientationSource for ScriptedOrientation {
    fn latest_scalar(&mut self) -> Result<Option<f64>, SensorError> {
        match self.script.pop_front() {
            Some(Ok(reading)) => Ok(reading),
            Some(Err(reason)) => Err(SensorError::Unavailable(reason)),
            None => Ok(None),
        }
    }
}

/// Reading set directly by the test or replay driver; every `set` counts as a fresh sample.
#[derive(Debug, Clone, Default)]
pub struct FixedOrientation {
    sample: Arc<Mutex<(OrientationSample, u64)>>,
}

impl FixedOrientation {
    pub fn new(w: f64) -> Self {
        Self {
            sample: Arc::new(Mutex::new((OrientationSample::new(w), 1))),
        }
    }

    pub fn set(&self, w: f64) {
        let mut guard = self.sample.lock().unwrap_or_else(|p| p.into_inner());
        guard.0 = OrientationSample::new(w);
        guard.1 += 1;
    }
}

impl OrientationReader for FixedOrientation {
    fn get_latest(&self) -> OrientationSample {
        self.sample.lock().unwrap_or_else(|p| p.into_inner()).0
    }

    fn sequence(&self) -> u64 {
        self.sample.lock().unwrap_or_else(|p| p.into_inner()).1
    }
}

/// IMU bridge that prints one `w,x,y,z` quaternion per line.
pub struct LineQuaternionSource<T: LineTransport> {
    transport: T,
}

impl<T: LineTransport> LineQuaternionSource<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Scalar component of a `w,x,y,z` (or whitespace separated) line.
    pub fn parse_scalar(line: &str) -> Option<f64> {
        let mut parts = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty());
        let w = parts.next()?.parse::<f64>().ok()?;
        if parts.count() == 3 && (-1.0..=1.0).contains(&w) {
            Some(w)
        } else {
            None
        }
    }
}

impl<T: LineTransport + 'static> OrientationSource for LineQuaternionSource<T> {
    fn latest_scalar(&mut self) -> Result<Option<f64>, SensorError> {
        let mut latest = None;
        // Drain whatever is buffered so the slot tracks the newest quaternion.
        while let Some(line) = self.transport.read_line()? {
            if let Some(w) = Self::parse_scalar(&line) {
                latest = Some(w);
            }
            if !self.transport.has_buffered_line() {
                break;
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;
    use std::time::Instant;

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn fast() -> SamplerConfig {
        SamplerConfig {
            poll_interval: Duration::from_millis(1),
            retry_interval: Duration::from_millis(5),
        }
    }

    #[test]
    fn default_sample_is_identity() {
        let sample = OrientationSample::default();
        assert_eq!(sample.w, 1.0);
        assert_eq!(sample.angle_degrees(), 0.0);
    }

    #[test]
    fn sampler_reports_identity_before_first_read() {
        let mut sampler = OrientationSampler::spawn(ScriptedOrientation::new(), fast());
        assert_eq!(sampler.get_latest(), OrientationSample::default());
        assert_eq!(sampler.handle().sequence(), 0);
        sampler.stop();
    }

    #[test]
    fn sampler_keeps_last_good_value_through_failures() {
        let mut script = ScriptedOrientation::new();
        script
            .push_reading(0.9)
            .push_failure("i2c nack")
            .push_reading(f64::NAN)
            .push_failure("i2c nack");
        let mut sampler = OrientationSampler::spawn(script, fast());
        let handle = sampler.handle();

        assert!(wait_for(|| handle.sequence() == 1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(handle.get_latest().w, 0.9);
        assert_eq!(handle.sequence(), 1);
        sampler.stop();
    }

    #[test]
    fn stop_returns_promptly() {
        let mut sampler = OrientationSampler::spawn(ScriptedOrientation::new(), fast());
        let started = Instant::now();
        sampler.stop();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn fixed_orientation_counts_updates() {
        let fixed = FixedOrientation::new(1.0);
        assert_eq!(fixed.sequence(), 1);
        fixed.set(0.5);
        assert_eq!(fixed.get_latest().w, 0.5);
        assert_eq!(fixed.sequence(), 2);
    }

    #[test]
    fn parses_bridge_quaternion_lines() {
        type Src = LineQuaternionSource<ScriptedTransport>;
        assert_eq!(Src::parse_scalar("0.98,0.1,0.0,0.17"), Some(0.98));
        assert_eq!(Src::parse_scalar("0.5 0.5 0.5 0.5"), Some(0.5));
        assert_eq!(Src::parse_scalar("0.5,0.5,0.5"), None);
        assert_eq!(Src::parse_scalar("1.7,0,0,0"), None);
        assert_eq!(Src::parse_scalar("calibrating"), None);
    }

    #[test]
    fn bridge_source_reports_newest_buffered_quaternion() {
        let transport = ScriptedTransport::from_lines(["1,0,0,0", "noise", "0.7,0,0.7,0"]);
        let mut source = LineQuaternionSource::new(transport);
        assert_eq!(source.latest_scalar().unwrap(), Some(0.7));
        assert_eq!(source.latest_scalar().unwrap(), None);
    }
}
