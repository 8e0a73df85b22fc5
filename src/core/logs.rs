//! Session log file: every displayed RX frame and every TX send, one line
//! each, between start and end markers.

use chrono::Local;
use parking_lot::Mutex;
use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use strum::Display;

use crate::error::TerminalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Direction {
    #[strum(to_string = "RX")]
    Rx,
    #[strum(to_string = "TX")]
    Tx,
}

pub fn start_marker() -> String {
    format!("--- Log démarré le {} ---\n", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

pub fn end_marker() -> String {
    format!("--- Log terminé le {} ---\n", Local::now().format("%Y-%m-%d %H:%M:%S"))
}

/// `2024-03-01 12:00:01.005 RX: OK`
pub fn format_entry(direction: Direction, text: &str) -> String {
    format!(
        "{} {direction}: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        text.trim_end_matches(['\r', '\n'])
    )
}

/// Name for a log file started without an explicit path.
pub fn auto_log_path(dir: impl AsRef<Path>) -> Result<PathBuf, TerminalError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|err| TerminalError::resource(dir, err))?;
    Ok(dir.join(format!(
        "terminal_log_{}.txt",
        Local::now().format("%Y%m%d_%H%M%S")
    )))
}

#[derive(Debug)]
struct OpenLog {
    path: PathBuf,
    file: File,
}

impl OpenLog {
    fn write_flushed(&mut self, line: &str) -> std::io::Result<()> {
        self.file.write_all(line.as_bytes())?;
        self.file.flush()
    }
}

/// Append-mode log writer. Each line is written and flushed under one lock,
/// so the file can be fed from any thread.
#[derive(Debug, Default)]
pub struct SessionLog {
    inner: Mutex<Option<OpenLog>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().is_some()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.lock().as_ref().map(|log| log.path.clone())
    }

    /// Open `path` for appending and write the start marker. A log that is
    /// already running is stopped first.
    pub fn start(&self, path: impl AsRef<Path>) -> Result<PathBuf, TerminalError> {
        let path = path.as_ref().to_path_buf();
        let mut guard = self.inner.lock();
        if let Some(mut previous) = guard.take() {
            if let Err(err) = previous.write_flushed(&end_marker()) {
                log::warn!("Could not finish log {}: {err}", previous.path.display());
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| TerminalError::resource(&path, err))?;
        let mut log = OpenLog {
            path: path.clone(),
            file,
        };
        log.write_flushed(&start_marker())
            .map_err(|err| TerminalError::resource(&path, err))?;
        log::info!("Session log started at {}", path.display());
        *guard = Some(log);
        Ok(path)
    }

    /// Write the end marker and close. Returns the closed path, or `None`
    /// when no log was running. The log is off afterwards even on error.
    pub fn stop(&self) -> Result<Option<PathBuf>, TerminalError> {
        let Some(mut log) = self.inner.lock().take() else {
            return Ok(None);
        };
        log.write_flushed(&end_marker())
            .map_err(|err| TerminalError::resource(&log.path, err))?;
        log::info!("Session log closed at {}", log.path.display());
        Ok(Some(log.path))
    }

    /// Append one entry if logging. A failing write turns logging off.
    pub fn record(&self, direction: Direction, text: &str) -> Result<(), TerminalError> {
        let mut guard = self.inner.lock();
        let Some(log) = guard.as_mut() else {
            return Ok(());
        };
        if let Err(err) = log.write_flushed(&format_entry(direction, text)) {
            let path = log.path.clone();
            *guard = None;
            log::error!("Session log {} disabled: {err}", path.display());
            return Err(TerminalError::resource(&path, err));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("crazyterm_{tag}_{}.txt", uuid::Uuid::new_v4()))
    }

    #[test]
    fn entries_land_between_markers() {
        let path = temp_file("markers");
        let log = SessionLog::new();
        log.start(&path).unwrap();
        log.record(Direction::Rx, "OK\r\n").unwrap();
        log.record(Direction::Tx, "AT + NL+CR").unwrap();
        assert_eq!(log.stop().unwrap(), Some(path.clone()));
        assert!(!log.is_active());

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("--- Log démarré le "));
        assert!(lines[1].ends_with(" RX: OK"));
        assert!(lines[2].ends_with(" TX: AT + NL+CR"));
        assert!(lines[3].starts_with("--- Log terminé le "));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn restarting_appends_to_existing_file() {
        let path = temp_file("append");
        let log = SessionLog::new();
        log.start(&path).unwrap();
        log.start(&path).unwrap();
        log.stop().unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("démarré").count(), 2);
        assert_eq!(text.matches("terminé").count(), 2);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn recording_without_log_is_a_no_op() {
        let log = SessionLog::new();
        assert!(log.record(Direction::Rx, "ignored").is_ok());
        assert_eq!(log.stop().unwrap(), None);
    }

    #[test]
    fn unwritable_path_is_a_resource_error() {
        let dir = temp_file("missing_dir");
        let err = SessionLog::new().start(dir.join("nested").join("log.txt")).unwrap_err();
        assert!(matches!(err, TerminalError::Resource { .. }));
    }

    #[test]
    fn auto_path_creates_directory() {
        let dir = temp_file("autodir");
        let path = auto_log_path(&dir).unwrap();
        assert!(dir.is_dir());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("terminal_log_") && name.ends_with(".txt"));
        let _ = fs::remove_dir_all(dir);
    }
}
