//! Byte-stream output targets.
//!
//! Sinks receive fully formatted lines from the writer pipeline. Write
//! failures never stop the pipeline: they are forwarded to a process-wide
//! error sink hook that defaults to discard.

use std::fs::{ self, File, OpenOptions };
use std::io::{ self, Write };
use std::net::UdpSocket;
use std::path::{ Path, PathBuf };

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::{ PlumeError, Result };

/// A formatted-line output target.
pub trait Sink: Send + Sync {
    fn write(&self, line: &str) -> Result<()>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Where [`ConsoleSink`] writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleStream {
    Stdout,
    Stderr,
}

pub struct ConsoleSink {
    stream: ConsoleStream,
    lock: Mutex<()>,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self {
            stream: ConsoleStream::Stdout,
            lock: Mutex::new(()),
        }
    }

    pub fn stderr() -> Self {
        Self {
            stream: ConsoleStream::Stderr,
            lock: Mutex::new(()),
        }
    }
}

impl Sink for ConsoleSink {
    fn write(&self, line: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let result = match self.stream {
            ConsoleStream::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(line.as_bytes()).and_then(|_| out.write_all(b"\n"))
            }
            ConsoleStream::Stderr => {
                let mut out = io::stderr().lock();
                out.write_all(line.as_bytes()).and_then(|_| out.write_all(b"\n"))
            }
        };
        result.map_err(|e| PlumeError::sink(e.to_string()))
    }

    fn flush(&self) -> Result<()> {
        let _guard = self.lock.lock();
        match self.stream {
            ConsoleStream::Stdout => io::stdout().lock().flush(),
            ConsoleStream::Stderr => io::stderr().lock().flush(),
        }.map_err(|e| PlumeError::sink(e.to_string()))
    }
}

struct FileSinkState {
    file: File,
    written: u64,
}

/// File sink with size-based rotation.
///
/// When the current file passes `max_size` bytes the sink rotates
/// `path` → `path.1` → … → `path.N`, dropping the oldest.
pub struct FileSink {
    path: PathBuf,
    max_size: u64,
    max_rotations: u32,
    state: Mutex<FileSinkState>,
}

impl FileSink {
    /// Open (appending) with rotation disabled.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_rotation(path, u64::MAX, 0)
    }

    /// Open (appending), rotating past `max_size` bytes and keeping
    /// `max_rotations` old files.
    pub fn with_rotation<P: AsRef<Path>>(
        path: P,
        max_size: u64,
        max_rotations: u32
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = Self::open_file(&path)?;
        let written = file
            .metadata()
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(Self {
            path,
            max_size,
            max_rotations,
            state: Mutex::new(FileSinkState { file, written }),
        })
    }

    fn open_file(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PlumeError::sink(format!("open {}: {e}", path.display())))
    }

    fn rotated_path(&self, index: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&self, state: &mut FileSinkState) -> Result<()> {
        let _ = state.file.flush();

        // Shift path.N-1 → path.N, …, path → path.1.
        let _ = fs::remove_file(self.rotated_path(self.max_rotations));
        for i in (1..self.max_rotations).rev() {
            let _ = fs::rename(self.rotated_path(i), self.rotated_path(i + 1));
        }
        fs
            ::rename(&self.path, self.rotated_path(1))
            .map_err(|e| PlumeError::sink(format!("rotate {}: {e}", self.path.display())))?;

        state.file = Self::open_file(&self.path)?;
        state.written = 0;
        Ok(())
    }
}

impl Sink for FileSink {
    fn write(&self, line: &str) -> Result<()> {
        let mut state = self.state.lock();
        if self.max_rotations > 0 && state.written + (line.len() as u64) + 1 > self.max_size {
            self.rotate(&mut state)?;
        }
        state.file
            .write_all(line.as_bytes())
            .and_then(|_| state.file.write_all(b"\n"))
            .map_err(|e| PlumeError::sink(e.to_string()))?;
        state.written += (line.len() as u64) + 1;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.state
            .lock()
            .file.flush()
            .map_err(|e| PlumeError::sink(e.to_string()))
    }
}

/// Datagram-per-line UDP sink.
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    pub fn connect(target: &str) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e|
            PlumeError::sink(format!("bind: {e}"))
        )?;
        socket.connect(target).map_err(|e| PlumeError::sink(format!("connect {target}: {e}")))?;
        Ok(Self { socket })
    }
}

impl Sink for UdpSink {
    fn write(&self, line: &str) -> Result<()> {
        self.socket
            .send(line.as_bytes())
            .map(|_| ())
            .map_err(|e| PlumeError::sink(e.to_string()))
    }
}

/// Swallows everything; useful for benchmarks and as the default error sink.
pub struct NullSink;

impl Sink for NullSink {
    fn write(&self, _line: &str) -> Result<()> {
        Ok(())
    }
}

/// Process-wide hook receiving sink failures and internal pipeline faults.
/// Defaults to discard.
static ERROR_SINK: OnceCell<Box<dyn Sink>> = OnceCell::new();

/// Install the error sink. Only the first call takes effect.
pub fn set_error_sink(sink: Box<dyn Sink>) {
    let _ = ERROR_SINK.set(sink);
}

/// Report an internal fault to the error sink.
pub fn report_error(context: &str, error: &PlumeError) {
    if let Some(sink) = ERROR_SINK.get() {
        let _ = sink.write(&format!("plume: {context}: {error}"));
    }
}
