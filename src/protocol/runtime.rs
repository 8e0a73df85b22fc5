use flume::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;

use crate::{
    error::{ConnectionFailure, TerminalError},
    protocol::{
        config::ConnectionParams,
        daemon::{boot_serial_loop, ReaderContext},
        format::DisplayOptions,
        frame::FrameAccumulator,
        link::{SerialBackend, SerialLink},
    },
};

/// Consecutive read or write failures tolerated before the session is torn down.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 5;
pub const READER_JOIN_TIMEOUT: Duration = Duration::from_millis(500);
/// How long `close` waits for the link lock once the reader was abandoned.
pub const LINK_RELEASE_TIMEOUT: Duration = Duration::from_millis(100);

pub type SharedLink = Arc<Mutex<Option<Box<dyn SerialLink>>>>;

/// Messages from the reader thread to the controller, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Frame { text: String, raw: Bytes },
    Counters { rx: u64, tx: u64 },
    ReadError { message: String, consecutive: u32 },
    /// The reader gave up; the controller must disconnect.
    Fatal(String),
    Stopped,
}

#[derive(Debug, Default)]
pub struct Counters {
    rx: AtomicU64,
    tx: AtomicU64,
}

impl Counters {
    pub fn rx(&self) -> u64 {
        self.rx.load(Ordering::Relaxed)
    }

    pub fn tx(&self) -> u64 {
        self.tx.load(Ordering::Relaxed)
    }

    /// Returns the new total.
    pub fn add_rx(&self, n: u64) -> u64 {
        self.rx.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn add_tx(&self, n: u64) -> u64 {
        self.tx.fetch_add(n, Ordering::Relaxed) + n
    }
}

/// Outcome of [`Session::close`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    /// The reader confirmed its exit within [`READER_JOIN_TIMEOUT`].
    pub reader_exited: bool,
    /// Error reported while releasing the device, if any.
    pub close_error: Option<String>,
    pub already_closed: bool,
}

/// An open serial link plus the reader thread draining it.
pub struct Session {
    params: ConnectionParams,
    link: SharedLink,
    running: Arc<AtomicBool>,
    orphaned: Arc<AtomicBool>,
    counters: Arc<Counters>,
    accumulator: Arc<Mutex<FrameAccumulator>>,
    evt_rx: Receiver<RuntimeEvent>,
    exit_rx: Option<oneshot::Receiver<()>>,
    write_errors: u32,
    closed: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("params", &self.params)
            .field("rx", &self.counters.rx())
            .field("tx", &self.counters.tx())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Open the device through `backend` and start the reader thread.
    pub fn open(
        params: &ConnectionParams,
        backend: &dyn SerialBackend,
        options: Arc<RwLock<DisplayOptions>>,
    ) -> Result<Self, TerminalError> {
        params.validate()?;
        let link = backend.open(params)?;
        Self::from_link(params.clone(), link, options)
    }

    /// Wrap an already opened link, e.g. a loopback device.
    pub fn from_link(
        params: ConnectionParams,
        link: Box<dyn SerialLink>,
        options: Arc<RwLock<DisplayOptions>>,
    ) -> Result<Self, TerminalError> {
        let link: SharedLink = Arc::new(Mutex::new(Some(link)));
        let running = Arc::new(AtomicBool::new(true));
        let orphaned = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let accumulator = Arc::new(Mutex::new(FrameAccumulator::new(Instant::now())));
        let (evt_tx, evt_rx): (Sender<RuntimeEvent>, Receiver<RuntimeEvent>) = flume::unbounded();
        let (exit_tx, exit_rx) = oneshot::channel();

        let ctx = ReaderContext {
            link: Arc::clone(&link),
            running: Arc::clone(&running),
            orphaned: Arc::clone(&orphaned),
            counters: Arc::clone(&counters),
            accumulator: Arc::clone(&accumulator),
            options,
            events: evt_tx,
        };
        let spawned = thread::Builder::new()
            .name(format!("serial-reader-{}", params.device_name))
            .spawn(move || boot_serial_loop(ctx, exit_tx));
        if let Err(err) = spawned {
            if let Some(mut link) = link.lock().take() {
                let _ = link.close();
            }
            return Err(TerminalError::connection(
                &params.device_name,
                ConnectionFailure::Other,
                format!("cannot start reader thread: {err}"),
            ));
        }

        log::info!("Session started on {}", params.summary());
        Ok(Self {
            params,
            link,
            running,
            orphaned,
            counters,
            accumulator,
            evt_rx,
            exit_rx: Some(exit_rx),
            write_errors: 0,
            closed: false,
        })
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    pub fn device_name(&self) -> &str {
        &self.params.device_name
    }

    /// False once the reader stopped, whether by `close` or a fatal error.
    pub fn is_running(&self) -> bool {
        !self.closed && self.running.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn counters(&self) -> (u64, u64) {
        (self.counters.rx(), self.counters.tx())
    }

    pub fn events(&self) -> &Receiver<RuntimeEvent> {
        &self.evt_rx
    }

    /// Raw bytes kept in the receive ring buffer, oldest first.
    pub fn recent_bytes(&self) -> Vec<u8> {
        self.accumulator.lock().history().snapshot()
    }

    pub fn total_received(&self) -> u64 {
        self.accumulator.lock().history().total_received()
    }

    /// Write and flush `bytes`. A failing write returns a `Transport` error
    /// that is marked fatal once the error budget is exhausted.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize, TerminalError> {
        if self.closed {
            return Err(TerminalError::NotConnected);
        }
        let outcome = {
            let mut guard = self.link.lock();
            let Some(link) = guard.as_mut() else {
                return Err(TerminalError::NotConnected);
            };
            link.write_all(bytes).and_then(|_| link.flush())
        };
        match outcome {
            Ok(()) => {
                self.write_errors = 0;
                self.counters.add_tx(bytes.len() as u64);
                Ok(bytes.len())
            }
            Err(err) => {
                self.write_errors += 1;
                log::warn!(
                    "Write to {} failed ({} in a row): {err}",
                    self.params.device_name,
                    self.write_errors
                );
                let mut error = TerminalError::transport(&err);
                if self.write_errors >= MAX_CONSECUTIVE_ERRORS {
                    if let TerminalError::Transport { fatal, .. } = &mut error {
                        *fatal = true;
                    }
                }
                Err(error)
            }
        }
    }

    /// Stop the reader and release the device. Safe to call repeatedly.
    pub fn close(&mut self) -> CloseReport {
        if self.closed {
            return CloseReport {
                already_closed: true,
                ..CloseReport::default()
            };
        }
        self.closed = true;
        self.running.store(false, Ordering::Release);

        let reader_exited = match self.exit_rx.take() {
            Some(exit) => match exit.recv_timeout(READER_JOIN_TIMEOUT) {
                Ok(()) => true,
                Err(oneshot::RecvTimeoutError::Disconnected) => true,
                Err(oneshot::RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Reader for {} did not stop within {:?}, abandoning it",
                        self.params.device_name,
                        READER_JOIN_TIMEOUT
                    );
                    false
                }
            },
            None => true,
        };

        // a stalled reader may sit on the link lock; it releases the device itself
        let guard = if reader_exited {
            Some(self.link.lock())
        } else {
            self.orphaned.store(true, Ordering::Release);
            self.link.try_lock_for(LINK_RELEASE_TIMEOUT)
        };
        let close_error = match guard {
            Some(mut guard) => guard.take().and_then(|mut link| match link.close() {
                Ok(()) => None,
                Err(err) => {
                    log::warn!("Closing {} reported: {err}", self.params.device_name);
                    Some(err.to_string())
                }
            }),
            None => {
                log::warn!(
                    "Link to {} still held by its reader, it will be released when the reader stops",
                    self.params.device_name
                );
                Some("device still busy in the reader thread".to_string())
            }
        };

        log::info!("Session on {} closed", self.params.device_name);
        CloseReport {
            reader_exited,
            close_error,
            already_closed: false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::loopback::{MemoryBackend, MemoryLink};
    use std::io;

    fn wait_for<F: FnMut(&RuntimeEvent) -> bool>(
        session: &Session,
        mut pred: F,
    ) -> Vec<RuntimeEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut seen = Vec::new();
        while Instant::now() < deadline {
            if let Ok(evt) = session.events().recv_timeout(Duration::from_millis(20)) {
                let done = pred(&evt);
                seen.push(evt);
                if done {
                    return seen;
                }
            }
        }
        panic!("event not observed, got {seen:?}");
    }

    fn options() -> Arc<RwLock<DisplayOptions>> {
        Arc::new(RwLock::new(DisplayOptions::default()))
    }

    #[test]
    fn received_line_becomes_one_frame() {
        let backend = MemoryBackend::new(&["loop0"]);
        let session =
            Session::open(&ConnectionParams::new("loop0", 115200), &backend, options()).unwrap();
        backend.probe("loop0").unwrap().feed(b"OK\r\n");

        let events = wait_for(&session, |e| matches!(e, RuntimeEvent::Frame { .. }));
        let frame = events
            .iter()
            .find_map(|e| match e {
                RuntimeEvent::Frame { text, .. } => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(frame, "OK\r\n");
        assert_eq!(session.counters().0, 4);
        assert_eq!(session.recent_bytes(), b"OK\r\n");
    }

    #[test]
    fn partial_frame_drains_after_timeout() {
        let backend = MemoryBackend::new(&["loop0"]);
        let session =
            Session::open(&ConnectionParams::new("loop0", 9600), &backend, options()).unwrap();
        let started = Instant::now();
        backend.probe("loop0").unwrap().feed(b"prompt>");

        wait_for(&session, |e| {
            matches!(e, RuntimeEvent::Frame { text, .. } if text == "prompt>")
        });
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn write_counts_tx_and_reaches_device() {
        let backend = MemoryBackend::new(&["loop0"]);
        let mut session =
            Session::open(&ConnectionParams::new("loop0", 9600), &backend, options()).unwrap();
        assert_eq!(session.write(b"AT\r\n").unwrap(), 4);
        assert_eq!(session.counters(), (0, 4));
        assert_eq!(backend.probe("loop0").unwrap().written(), b"AT\r\n");
    }

    #[test]
    fn fifth_write_failure_is_fatal() {
        let (link, probe) = MemoryLink::new();
        let mut session =
            Session::from_link(ConnectionParams::new("mem", 9600), Box::new(link), options())
                .unwrap();
        for _ in 0..MAX_CONSECUTIVE_ERRORS {
            probe.fail_next_write(io::ErrorKind::Other);
        }
        for _ in 1..MAX_CONSECUTIVE_ERRORS {
            assert!(!session.write(b"x").unwrap_err().is_fatal());
        }
        assert!(session.write(b"x").unwrap_err().is_fatal());
        assert_eq!(session.counters().1, 0);
    }

    #[test]
    fn reader_gives_up_after_repeated_read_errors() {
        let (link, probe) = MemoryLink::new();
        for _ in 0..MAX_CONSECUTIVE_ERRORS {
            probe.fail_next_read(io::ErrorKind::Other);
        }
        let session =
            Session::from_link(ConnectionParams::new("mem", 9600), Box::new(link), options())
                .unwrap();
        let events = wait_for(&session, |e| matches!(e, RuntimeEvent::Fatal(_)));
        let warnings = events
            .iter()
            .filter(|e| matches!(e, RuntimeEvent::ReadError { .. }))
            .count();
        assert_eq!(warnings, (MAX_CONSECUTIVE_ERRORS - 1) as usize);
        assert!(!session.is_running());
    }

    #[test]
    fn fatal_kind_stops_reader_immediately() {
        let (link, probe) = MemoryLink::new();
        probe.fail_next_read(io::ErrorKind::BrokenPipe);
        let session =
            Session::from_link(ConnectionParams::new("mem", 9600), Box::new(link), options())
                .unwrap();
        let events = wait_for(&session, |e| matches!(e, RuntimeEvent::Fatal(_)));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_tolerates_failing_release() {
        let (link, probe) = MemoryLink::new();
        probe.fail_close();
        let mut session =
            Session::from_link(ConnectionParams::new("mem", 9600), Box::new(link), options())
                .unwrap();

        let report = session.close();
        assert!(report.reader_exited);
        assert!(report.close_error.is_some());
        assert!(probe.is_closed());

        assert!(session.close().already_closed);
        assert_eq!(session.write(b"x"), Err(TerminalError::NotConnected));
    }

    #[test]
    fn close_does_not_wait_for_a_hung_reader() {
        let (link, probe) = MemoryLink::new();
        let mut session =
            Session::from_link(ConnectionParams::new("mem", 9600), Box::new(link), options())
                .unwrap();
        probe.stall_next_poll(Duration::from_millis(1500));
        thread::sleep(Duration::from_millis(60));

        let started = Instant::now();
        let report = session.close();
        assert!(started.elapsed() < READER_JOIN_TIMEOUT + Duration::from_millis(250));
        assert!(!report.reader_exited);
        assert!(report.close_error.is_some());
        assert!(!probe.is_closed());

        // the reader drops the device once its poll returns
        let deadline = Instant::now() + Duration::from_secs(3);
        while !probe.is_closed() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(probe.is_closed());
    }
}
