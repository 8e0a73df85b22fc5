use std::io::{self, Read, Write};

use serialport::SerialPort;

use crate::{
    error::{ConnectionFailure, TerminalError},
    protocol::{config::ConnectionParams, ports::PortDescriptor, tty},
};

/// Byte-level access to an open serial device.
///
/// The reader thread calls [`SerialLink::bytes_to_read`] before reading so a
/// read never waits on an idle line while holding the link lock.
pub trait SerialLink: Send {
    fn bytes_to_read(&mut self) -> io::Result<usize>;
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    /// Release the device. Dropping the link also releases it; this exists
    /// so a failing release can be reported.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl SerialLink for Box<dyn SerialPort> {
    fn bytes_to_read(&mut self) -> io::Result<usize> {
        SerialPort::bytes_to_read(&**self)
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(&mut **self, buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut **self, bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(&mut **self)
    }
}

/// Source of port listings and open links.
pub trait SerialBackend: Send {
    fn enumerate(&self) -> Vec<PortDescriptor>;
    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>, TerminalError>;
}

/// Backend talking to the operating system through `serialport`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SerialBackend for SystemBackend {
    fn enumerate(&self) -> Vec<PortDescriptor> {
        tty::available_ports_sorted()
            .into_iter()
            .map(PortDescriptor::from)
            .collect()
    }

    fn open(&self, params: &ConnectionParams) -> Result<Box<dyn SerialLink>, TerminalError> {
        params.validate()?;
        let builder = params.apply_builder(serialport::new(
            params.device_name.clone(),
            params.baud_rate,
        ));
        match builder.open() {
            Ok(port) => {
                log::info!("Opened serial port {}", params.summary());
                Ok(Box::new(port))
            }
            Err(err) => {
                log::warn!("Failed to open {}: {err}", params.device_name);
                Err(TerminalError::connection(
                    &params.device_name,
                    classify_open_error(&err),
                    err.description.clone(),
                ))
            }
        }
    }
}

pub fn classify_open_error(err: &serialport::Error) -> ConnectionFailure {
    match err.kind() {
        serialport::ErrorKind::NoDevice => ConnectionFailure::NotFound,
        serialport::ErrorKind::InvalidInput => ConnectionFailure::InvalidConfig,
        serialport::ErrorKind::Io(kind) => {
            let lowered = err.description.to_lowercase();
            if lowered.contains("busy") || lowered.contains("in use") {
                ConnectionFailure::Busy
            } else {
                ConnectionFailure::from_io_kind(kind)
            }
        }
        _ => ConnectionFailure::Other,
    }
}
