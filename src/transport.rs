use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Single-byte control commands understood by the balance board firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardCommand {
    /// zero the load cells
    Tare,
    /// start streaming `(x, y)` centre of pressure lines
    StreamCop,
    StopStream,
    /// per-cell raw weights; not consumed by the engine
    StreamRaw,
}

impl BoardCommand {
    pub fn as_byte(self) -> u8 {
        match self {
            BoardCommand::Tare => b'z',
            BoardCommand::StreamCop => b'c',
            BoardCommand::StopStream => b's',
            BoardCommand::StreamRaw => b'r',
        }
    }
}

/// Line-delimited, timeout-bounded byte stream.
pub trait LineTransport: Send {
    /// Block until a full line arrives or the read timeout expires.
    /// Returns `Ok(None)` on timeout; the line is returned without its terminator.
    fn read_line(&mut self) -> Result<Option<String>, TransportError>;

    /// Whether another complete line is already buffered locally.
    fn has_buffered_line(&self) -> bool {
        false
    }

    /// Independent write handle for sending device commands.
    fn writer(&self) -> Result<Box<dyn Write + Send>, TransportError>;
}

/// Serial port (USB CDC / UART) line transport
pub struct SerialTransport {
    reader: BufReader<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|e| TransportError::Open {
                path: path.to_string(),
                reason: e.description,
            })?;
        info!("opened {} at {} baud", path, baud_rate);

        Ok(Self {
            reader: BufReader::new(port),
            pending: Vec::new(),
        })
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim().to_string()
}

impl LineTransport for SerialTransport {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        // read_until keeps bytes consumed before a timeout, so partial lines survive in `pending`
        match self.reader.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(TransportError::Closed),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = decode_line(&self.pending);
                self.pending.clear();
                Ok(Some(line))
            }
            Ok(_) => Ok(None),
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn has_buffered_line(&self) -> bool {
        self.reader.buffer().contains(&b'\n')
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>, TransportError> {
        let port = self.reader.get_ref().try_clone()?;
        Ok(Box::new(port))
    }
}

type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// Background reader moving transport lines onto an unbounded FIFO
pub struct BalanceStreamReader {
    running: Arc<AtomicBool>,
    writer: SharedWriter,
    worker: Option<JoinHandle<()>>,
}

impl BalanceStreamReader {
    /// Open the transport on the reader thread and start forwarding lines.
    ///
    /// An open failure is logged and the thread exits; the receiving end then sees no lines.
    /// Lines are converted into the channel's item type, e.g. the engine's `Input`.
    pub fn spawn<T, F, M>(open: F, lines: Sender<M>) -> Self
    where
        T: LineTransport + 'static,
        F: FnOnce() -> Result<T, TransportError> + Send + 'static,
        M: From<String> + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let writer: SharedWriter = Arc::new(Mutex::new(None));

        let flag = Arc::clone(&running);
        let slot = Arc::clone(&writer);
        let worker = thread::spawn(move || {
            let mut transport = match open() {
                Ok(t) => t,
                Err(err) => {
                    warn!("balance board unavailable: {}", err);
                    return;
                }
            };

            match transport.writer() {
                Ok(w) => *lock(&slot) = Some(w),
                Err(err) => warn!("balance board is read-only: {}", err),
            }

            while flag.load(Ordering::Acquire) {
                match transport.read_line() {
                    Ok(Some(line)) if !line.is_empty() => {
                        if lines.send(M::from(line)).is_err() {
                            debug!("line consumer gone, stopping reader");
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!("balance board read failed: {}", err);
                        break;
                    }
                }
            }

            lock(&slot).take();
            debug!("balance stream reader stopped");
        });

        Self {
            running,
            writer,
            worker: Some(worker),
        }
    }

    /// Best-effort write; dropped silently (with a log line) when the transport is not open.
    pub fn send(&self, bytes: &[u8]) {
        let mut guard = lock(&self.writer);
        match guard.as_mut() {
            Some(w) => {
                if let Err(err) = w.write_all(bytes).and_then(|_| w.flush()) {
                    warn!("failed to send {} bytes to balance board: {}", bytes.len(), err);
                }
            }
            None => debug!("balance board not open, dropping {} bytes", bytes.len()),
        }
    }

    pub fn send_command(&self, command: BoardCommand) {
        self.send(&[command.as_byte()]);
    }

    /// True once the transport is open and writable.
    pub fn is_connected(&self) -> bool {
        lock(&self.writer).is_some()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        lock(&self.writer).take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for BalanceStreamReader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug)]
enum ScriptStep {
    Line(String),
    Timeout,
    Fail,
}

/// In-memory transport replaying a fixed script; records everything written to it.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: VecDeque<ScriptStep>,
    close_when_drained: bool,
    idle: Duration,
    written: Arc<Mutex<Vec<u8>>>,
}

impl ScriptedTransport {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: lines.into_iter().map(|l| ScriptStep::Line(l.into())).collect(),
            close_when_drained: false,
            idle: Duration::from_millis(1),
            written: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report the transport as closed once the script runs out.
    pub fn then_close(mut self) -> Self {
        self.close_when_drained = true;
        self
    }

    pub fn push_line(&mut self, line: &str) -> &mut Self {
        self.script.push_back(ScriptStep::Line(line.to_string()));
        self
    }

    pub fn push_timeout(&mut self) -> &mut Self {
        self.script.push_back(ScriptStep::Timeout);
        self
    }

    pub fn push_failure(&mut self) -> &mut Self {
        self.script.push_back(ScriptStep::Fail);
        self
    }

    /// Shared view of the bytes written through `writer()`.
    pub fn sink(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.written)
    }
}

struct SinkWriter(Arc<Mutex<Vec<u8>>>);

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LineTransport for ScriptedTransport {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        match self.script.pop_front() {
            Some(ScriptStep::Line(line)) => Ok(Some(decode_line(line.as_bytes()))),
            Some(ScriptStep::Timeout) => Ok(None),
            Some(ScriptStep::Fail) => Err(TransportError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device disconnected",
            ))),
            None if self.close_when_drained => Err(TransportError::Closed),
            None => {
                thread::sleep(self.idle);
                Ok(None)
            }
        }
    }

    fn has_buffered_line(&self) -> bool {
        matches!(self.script.front(), Some(ScriptStep::Line(_)))
    }

    fn writer(&self) -> Result<Box<dyn Write + Send>, TransportError> {
        Ok(Box::new(SinkWriter(Arc::clone(&self.written))))
    }
}
