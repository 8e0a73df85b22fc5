//! In-memory serial devices.
//!
//! A [`MemoryLink`] is one end of a virtual wire: bytes pushed through its
//! [`LinkProbe`] show up on the read side, and everything written to it is
//! recorded (and optionally echoed back). [`MemoryBackend`] serves such
//! links under fake device names and lets the port list change at runtime.

use parking_lot::Mutex;
use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::Arc,
    thread,
    time::Duration,
};

use crate::{
    error::{ConnectionFailure, TerminalError},
    protocol::{
        config::ConnectionParams,
        link::{SerialBackend, SerialLink},
        ports::PortDescriptor,
    },
};

#[derive(Debug, Default)]
struct Wire {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    read_errors: VecDeque<io::ErrorKind>,
    write_errors: VecDeque<io::ErrorKind>,
    fail_close: bool,
    closed: bool,
    echo: bool,
    stall: Option<Duration>,
}

/// Test/demo handle onto a [`MemoryLink`]'s wire.
#[derive(Debug, Clone, Default)]
pub struct LinkProbe {
    wire: Arc<Mutex<Wire>>,
}

impl LinkProbe {
    /// Make bytes available to the reader.
    pub fn feed(&self, bytes: &[u8]) {
        self.wire.lock().inbound.extend(bytes.iter().copied());
    }

    /// Queue a read failure; it is returned by the next read attempt.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.wire.lock().read_errors.push_back(kind);
    }

    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.wire.lock().write_errors.push_back(kind);
    }

    /// Block the next `bytes_to_read` call for `pause`, like a hung driver.
    pub fn stall_next_poll(&self, pause: Duration) {
        self.wire.lock().stall = Some(pause);
    }

    pub fn fail_close(&self) {
        self.wire.lock().fail_close = true;
    }

    /// Everything written to the link so far.
    pub fn written(&self) -> Vec<u8> {
        self.wire.lock().written.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.wire.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.wire.lock().inbound.len()
    }
}

#[derive(Debug)]
pub struct MemoryLink {
    wire: Arc<Mutex<Wire>>,
}

impl MemoryLink {
    pub fn new() -> (Self, LinkProbe) {
        let probe = LinkProbe::default();
        (
            Self {
                wire: Arc::clone(&probe.wire),
            },
            probe,
        )
    }

    /// A link that reads back whatever is written to it.
    pub fn echo() -> (Self, LinkProbe) {
        let (link, probe) = Self::new();
        probe.wire.lock().echo = true;
        (link, probe)
    }
}

impl SerialLink for MemoryLink {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        let stall = self.wire.lock().stall.take();
        if let Some(pause) = stall {
            thread::sleep(pause);
        }
        let wire = self.wire.lock();
        if wire.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "link closed"));
        }
        // a queued failure must reach `read`, so report one pending byte
        if !wire.read_errors.is_empty() {
            return Ok(wire.inbound.len().max(1));
        }
        Ok(wire.inbound.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut wire = self.wire.lock();
        if let Some(kind) = wire.read_errors.pop_front() {
            return Err(io::Error::new(kind, format!("simulated read failure ({kind:?})")));
        }
        let n = buf.len().min(wire.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut wire = self.wire.lock();
        if let Some(kind) = wire.write_errors.pop_front() {
            return Err(io::Error::new(kind, format!("simulated write failure ({kind:?})")));
        }
        wire.written.extend_from_slice(bytes);
        if wire.echo {
            wire.inbound.extend(bytes.iter().copied());
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        let mut wire = self.wire.lock();
        wire.closed = true;
        if wire.fail_close {
            return Err(io::Error::other("simulated close failure"));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BackendState {
    ports: Vec<PortDescriptor>,
    probes: HashMap<String, LinkProbe>,
    busy: Vec<String>,
    echo: bool,
}

/// Backend serving [`MemoryLink`]s. Cloning shares the same device table.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    pub fn new(devices: &[&str]) -> Self {
        let backend = Self::default();
        for name in devices {
            backend.plug(PortDescriptor::bare(*name).with_description("virtual serial port"));
        }
        backend
    }

    /// Devices opened from this backend echo writes back to the reader.
    pub fn echoing(self) -> Self {
        self.state.lock().echo = true;
        self
    }

    pub fn plug(&self, port: PortDescriptor) {
        let mut state = self.state.lock();
        state.ports.retain(|p| p.device_name != port.device_name);
        state.ports.push(port);
    }

    pub fn unplug(&self, device_name: &str) {
        self.state.lock().ports.retain(|p| p.device_name != device_name);
    }

    /// Make the next opens of `device_name` fail as if another program held it.
    pub fn mark_busy(&self, device_name: &str) {
        self.state.lock().busy.push(device_name.to_string());
    }

    /// Probe of the most recently opened link for `device_name`.
    pub fn probe(&self, device_name: &str) -> Option<LinkProbe> {
        self.state.lock().probes.get(device_name).cloned()
    }
}

impl SerialBackend for MemoryBackend {
    fn enumerate(&self) -> Vec<PortDescriptor> {
        self.state.lock().ports.clone()
    }

    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>, TerminalError> {
        params.validate()?;
        let mut state = self.state.lock();
        let name = params.device_name.as_str();
        if !state.ports.iter().any(|p| p.device_name == name) {
            return Err(TerminalError::connection(
                name,
                ConnectionFailure::NotFound,
                "no such virtual device",
            ));
        }
        if state.busy.iter().any(|b| b == name) {
            return Err(TerminalError::connection(
                name,
                ConnectionFailure::Busy,
                "virtual device already in use",
            ));
        }
        let (link, probe) = if state.echo {
            MemoryLink::echo()
        } else {
            MemoryLink::new()
        };
        state.probes.insert(name.to_string(), probe);
        Ok(Box::new(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fed_bytes_are_readable_in_order() {
        let (mut link, probe) = MemoryLink::new();
        probe.feed(b"hello");
        assert_eq!(link.bytes_to_read().unwrap(), 5);
        let mut buf = [0u8; 3];
        assert_eq!(link.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(probe.pending(), 2);
    }

    #[test]
    fn echo_link_reads_back_writes() {
        let (mut link, probe) = MemoryLink::echo();
        link.write_all(b"AT\r\n").unwrap();
        assert_eq!(probe.written(), b"AT\r\n");
        assert_eq!(link.bytes_to_read().unwrap(), 4);
    }

    #[test]
    fn queued_failures_surface_once() {
        let (mut link, probe) = MemoryLink::new();
        probe.fail_next_read(io::ErrorKind::TimedOut);
        assert_eq!(link.bytes_to_read().unwrap(), 1);
        let mut buf = [0u8; 4];
        assert_eq!(
            link.read(&mut buf).unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        assert_eq!(link.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn backend_refuses_missing_and_busy_devices() {
        let backend = MemoryBackend::new(&["loop0"]);
        assert!(backend.open(&ConnectionParams::new("loop0", 9600)).is_ok());
        assert!(backend.probe("loop0").is_some());

        let err = backend
            .open(&ConnectionParams::new("loop1", 9600))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TerminalError::Connection {
                kind: ConnectionFailure::NotFound,
                ..
            }
        ));

        backend.mark_busy("loop0");
        let err = backend
            .open(&ConnectionParams::new("loop0", 9600))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            TerminalError::Connection {
                kind: ConnectionFailure::Busy,
                ..
            }
        ));
    }
}
