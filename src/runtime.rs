use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::RepDetectionEngine;
use crate::orientation::OrientationReader;
use crate::session::Session;

/// Control messages from the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    StartSet,
    EndSet(String),
    DiscardData,
    Stop,
}

/// Everything the engine loop consumes, in one arrival order
#[derive(Clone, Debug, PartialEq)]
pub enum Input {
    Line(String),
    Command(Command),
}

impl From<String> for Input {
    fn from(line: String) -> Self {
        Input::Line(line)
    }
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        Input::Command(command)
    }
}

/// Source of engine time, in seconds
pub trait Clock: Send + 'static {
    fn now(&self) -> f64;
}

/// Wall-clock independent time since construction
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Test clock advancing by a fixed step on every reading
#[derive(Debug)]
pub struct SteppedClock {
    step: f64,
    ticks: AtomicU64,
}

impl SteppedClock {
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.as_secs_f64(),
            ticks: AtomicU64::new(0),
        }
    }
}

impl Clock for SteppedClock {
    fn now(&self) -> f64 {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        tick as f64 * self.step
    }
}

/// Control surface of an engine running on its own thread
pub struct EngineHandle {
    input: Sender<Input>,
    worker: Option<JoinHandle<Session>>,
}

impl EngineHandle {
    /// Move `engine` onto a consumer thread handling lines and commands in arrival order.
    ///
    /// Line producers feed the same FIFO through [`EngineHandle::input`].
    pub fn spawn<R, C>(mut engine: RepDetectionEngine, orientation: R, clock: C) -> Self
    where
        R: OrientationReader + 'static,
        C: Clock,
    {
        let (input, inbox) = mpsc::channel::<Input>();

        let worker = thread::spawn(move || {
            // A stalled or unplugged board leaves an active set open; nothing times it out.
            for next in inbox.iter() {
                match next {
                    Input::Line(line) => {
                        if engine.is_active() {
                            engine.process_line(&line, &orientation, clock.now());
                        }
                    }
                    Input::Command(command) => {
                        if !apply(&mut engine, command, &clock) {
                            break;
                        }
                    }
                }
            }
            debug!("engine loop stopped");
            engine.stop()
        });

        Self {
            input,
            worker: Some(worker),
        }
    }

    /// Sender for line producers such as the balance board reader.
    pub fn input(&self) -> Sender<Input> {
        self.input.clone()
    }

    fn send(&self, command: Command) {
        if self.input.send(Input::Command(command)).is_err() {
            debug!("engine loop already stopped");
        }
    }

    pub fn start_set(&self) {
        self.send(Command::StartSet);
    }

    pub fn end_set(&self, reason: &str) {
        self.send(Command::EndSet(reason.to_string()));
    }

    pub fn discard_data(&self) {
        self.send(Command::DiscardData);
    }

    /// Stop the loop and wait for it; returns the session summary the first time.
    ///
    /// Lines queued before the stop are still handled.
    pub fn stop(&mut self) -> Option<Session> {
        self.send(Command::Stop);
        self.worker.take().and_then(|w| w.join().ok())
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Apply one command; returns false once the loop should exit.
fn apply<C: Clock>(engine: &mut RepDetectionEngine, command: Command, clock: &C) -> bool {
    match command {
        Command::StartSet => engine.start_set(clock.now()),
        Command::EndSet(reason) => engine.end_set(&reason),
        Command::DiscardData => engine.discard_data(),
        Command::Stop => return false,
    }
    true
}
