// Library surface for the binary, headless runs and integration tests.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod calibration;
pub mod capture;
pub mod config;
pub mod cop;
pub mod engine;
pub mod error;
pub mod events;
pub mod orientation;
pub mod reps;
pub mod runtime;
pub mod session;
pub mod session_log;
pub mod smoothing;
pub mod transport;
pub mod util;
