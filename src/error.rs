use std::io;
use thiserror::Error;

/// Failure reading the orientation sensor
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("orientation sensor unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure on the line transport shared by the balance board and the IMU bridge
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open {path}: {reason}")]
    Open { path: String, reason: String },
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        TransportError::Io(io::Error::from(err))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("no orientation samples arrived ({received} of {wanted}) before the timeout")]
    NoSensorData { received: usize, wanted: usize },
}

/// Failure reading a recorded capture for replay
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture row {row}: {source}")]
    Row {
        row: usize,
        #[source]
        source: csv::Error,
    },
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
