use derive_more::{Display, Error};
use std::io;

/// Why an open attempt was refused by the operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ConnectionFailure {
    #[display("device busy")]
    Busy,
    #[display("device not found")]
    NotFound,
    #[display("permission denied")]
    PermissionDenied,
    #[display("invalid configuration")]
    InvalidConfig,
    #[display("unexpected failure")]
    Other,
}

impl ConnectionFailure {
    pub fn from_io_kind(kind: io::ErrorKind) -> Self {
        match kind {
            io::ErrorKind::NotFound => Self::NotFound,
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::AddrInUse | io::ErrorKind::WouldBlock => Self::Busy,
            io::ErrorKind::InvalidInput => Self::InvalidConfig,
            _ => Self::Other,
        }
    }
}

/// Errors surfaced by the serial pipeline to the controller.
///
/// An invalid display filter is not an error here; it just lets every
/// frame through.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum TerminalError {
    #[display("cannot open {device} ({kind}): {reason}")]
    Connection {
        device: String,
        kind: ConnectionFailure,
        reason: String,
    },
    #[display("no active serial connection")]
    NotConnected,
    #[display("transport failure: {reason}")]
    Transport { reason: String, fatal: bool },
    #[display("{_0}")]
    Encoding(#[error(not(source))] String),
    #[display("log file {path}: {reason}")]
    Resource { path: String, reason: String },
}

impl TerminalError {
    pub fn connection(device: &str, kind: ConnectionFailure, reason: impl Into<String>) -> Self {
        Self::Connection {
            device: device.to_string(),
            kind,
            reason: reason.into(),
        }
    }

    pub fn resource(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::Resource {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Classify an IO error raised on an open link.
    pub fn transport(err: &io::Error) -> Self {
        Self::Transport {
            reason: err.to_string(),
            fatal: is_fatal_io(err.kind()),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { fatal: true, .. })
    }
}

/// IO error kinds after which the device cannot be expected to recover.
pub fn is_fatal_io(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::NotFound
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}
