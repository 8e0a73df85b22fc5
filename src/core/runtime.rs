//! Terminal controller.
//!
//! Owns everything that lives on the UI thread: the serial session, the
//! session log, command history, macros, the repeat timer and the port
//! watcher. Front ends feed it input and call [`Terminal::pump`] every tick.

use parking_lot::RwLock;
use std::{
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    core::{
        bus::{AppEvent, EventBus},
        display::{StyleHint, UiSink},
        history::CommandHistory,
        logs::{auto_log_path, Direction, SessionLog},
        macros::{MacroSet, SavedMacros},
        persistence::TerminalSettings,
    },
    error::{ConnectionFailure, TerminalError},
    protocol::{
        encode::{encode, EolMode, SendFormat},
        format::{format_hex, DisplayMode, DisplayOptions},
        link::SerialBackend,
        ports::{PortChange, PortDescriptor, PortWatcher},
        runtime::{RuntimeEvent, Session},
    },
    utils::Ticker,
};

pub const PORT_CHECK_INTERVAL: Duration = Duration::from_millis(5000);

pub struct Terminal<S: UiSink> {
    backend: Box<dyn SerialBackend>,
    sink: S,
    bus: EventBus,
    settings: TerminalSettings,
    options: Arc<RwLock<DisplayOptions>>,
    session: Option<Session>,
    history: CommandHistory,
    macros: MacroSet,
    log: SessionLog,
    watcher: PortWatcher,
    port_ticker: Ticker,
    repeat_ticker: Ticker,
    repeat_enabled: bool,
    input: String,
}

impl<S: UiSink> Terminal<S> {
    pub fn new(backend: Box<dyn SerialBackend>, sink: S, settings: TerminalSettings) -> Self {
        let options = Arc::new(RwLock::new(settings.display_options()));
        let macros = MacroSet::parse(&settings.commands, settings.macro_limit());
        let repeat_ticker = Ticker::new(settings.repeat_interval);
        Self {
            backend,
            sink,
            bus: EventBus::new(),
            settings,
            options,
            session: None,
            history: CommandHistory::new(),
            macros,
            log: SessionLog::new(),
            watcher: PortWatcher::new(),
            port_ticker: Ticker::new(PORT_CHECK_INTERVAL),
            repeat_ticker,
            repeat_enabled: false,
            input: String::new(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn settings(&self) -> &TerminalSettings {
        &self.settings
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut CommandHistory {
        &mut self.history
    }

    pub fn macros(&self) -> &MacroSet {
        &self.macros
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        self.watcher.ports()
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn connected_device(&self) -> Option<&str> {
        self.session.as_ref().map(Session::device_name)
    }

    pub fn counters(&self) -> (u64, u64) {
        self.session.as_ref().map_or((0, 0), Session::counters)
    }

    pub fn is_logging(&self) -> bool {
        self.log.is_active()
    }

    pub fn repeat_active(&self) -> bool {
        self.repeat_ticker.is_active()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    fn info(&mut self, text: impl AsRef<str>) {
        self.sink.append_line(&format!("[System] {}\n", text.as_ref()), StyleHint::Info);
    }

    fn warn(&mut self, text: impl AsRef<str>) {
        self.sink.append_line(&format!("[Warning] {}\n", text.as_ref()), StyleHint::Warning);
    }

    fn error(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        self.sink.append_line(&format!("[Error] {text}\n"), StyleHint::Error);
        self.bus.publish(AppEvent::ErrorOccurred(text.to_string()));
    }

    // ---- display / send options ----

    fn sync_options(&mut self) {
        *self.options.write() = self.settings.display_options();
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.settings.display_mode = mode;
        self.sync_options();
    }

    pub fn set_timestamp(&mut self, timestamp: bool, timing: bool) {
        self.settings.timestamp = timestamp;
        self.settings.show_timing = timing;
        self.sync_options();
    }

    /// `None` turns the filter off and keeps the last pattern.
    pub fn set_filter(&mut self, pattern: Option<&str>) {
        match pattern {
            Some(pattern) => {
                self.settings.filter = pattern.to_string();
                self.settings.enable_filter = true;
            }
            None => self.settings.enable_filter = false,
        }
        self.sync_options();
    }

    pub fn set_send_format(&mut self, format: SendFormat) {
        self.settings.send_format = format;
    }

    pub fn set_eol(&mut self, eol: EolMode) {
        self.settings.eol = eol;
    }

    /// Arm or disarm repeat mode. The timer itself starts on the next send;
    /// disarming stops it right away.
    pub fn set_repeat(&mut self, enabled: bool, interval: Option<Duration>) {
        if let Some(interval) = interval {
            self.settings.repeat_interval = interval;
            self.repeat_ticker.set_interval(interval);
        }
        self.repeat_enabled = enabled;
        if !enabled && self.repeat_ticker.is_active() {
            log::info!("Repeat send stopped");
            self.repeat_ticker.stop();
        }
    }

    pub fn set_connection(&mut self, apply: impl FnOnce(&mut TerminalSettings)) {
        apply(&mut self.settings);
        self.sync_options();
    }

    // ---- ports ----

    pub fn select_port(&mut self, device_name: &str) -> bool {
        let known = self.watcher.select(device_name);
        self.settings.port = device_name.to_string();
        known
    }

    /// Re-enumerate devices. Runs the disconnect path when the connected
    /// device is gone.
    pub fn refresh_ports(&mut self) -> Option<PortChange> {
        let change = self.watcher.poll(self.backend.enumerate())?;

        let wanted = self.settings.port.clone();
        if wanted.is_empty() || !self.watcher.select(&wanted) {
            if let Some(selected) = &change.selected {
                self.settings.port = selected.clone();
            }
        }
        for name in &change.added {
            log::info!("Serial port detected: {name}");
            self.bus.publish(AppEvent::PortDetected(name.clone()));
        }
        for name in &change.removed {
            log::info!("Serial port removed: {name}");
            self.bus.publish(AppEvent::PortRemoved(name.clone()));
        }
        if self.watcher.ports().is_empty() {
            self.info("No serial port detected");
        }

        let lost = self
            .connected_device()
            .filter(|dev| change.removed.iter().any(|r| r == dev))
            .map(str::to_string);
        if let Some(device) = lost {
            self.warn(format!("Port {device} disappeared"));
            self.disconnect();
        }
        Some(change)
    }

    // ---- connection ----

    pub fn connect_to(&mut self, device_name: &str) -> Result<(), TerminalError> {
        self.select_port(device_name);
        self.connect()
    }

    /// Open the selected port. A running session is closed first.
    pub fn connect(&mut self) -> Result<(), TerminalError> {
        if self.settings.port.trim().is_empty() {
            self.error("No serial port available. Check the connections.");
            return Err(TerminalError::connection(
                "",
                ConnectionFailure::InvalidConfig,
                "no serial port selected",
            ));
        }
        if self.session.is_some() {
            self.disconnect();
        }

        let params = self.settings.connection_params();
        match Session::open(&params, self.backend.as_ref(), Arc::clone(&self.options)) {
            Ok(session) => {
                self.session = Some(session);
                self.sink.update_counters(0, 0);
                self.info(format!("Connected to {}", params.summary()));
                self.bus.publish(AppEvent::ConnectionOpened {
                    device: params.device_name.clone(),
                    summary: params.summary(),
                });
                if self.settings.auto_save && !self.settings.save_path.trim().is_empty() {
                    let _ = self.start_logging(None);
                }
                Ok(())
            }
            Err(err) => {
                self.error(format!("Cannot connect: {err}"));
                Err(err)
            }
        }
    }

    /// Close the session. Returns false, after telling the user, when there
    /// was nothing to close.
    pub fn disconnect(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            log::warn!("Disconnect requested without an active connection");
            self.sink
                .append_line("[System] No active connection\n", StyleHint::Warning);
            return false;
        };

        let device = session.device_name().to_string();
        log::info!("Disconnecting from {device}");
        let report = session.close();
        if !report.reader_exited {
            log::warn!("Reader for {device} abandoned");
        }
        if let Some(reason) = &report.close_error {
            log::error!("Error while closing {device}: {reason}");
        }
        // frames that were already dispatched still reach the display
        let leftover: Vec<RuntimeEvent> = session.events().try_iter().collect();
        for event in leftover {
            self.handle_event(event);
        }
        drop(session);

        self.stop_logging();
        if self.repeat_ticker.is_active() {
            log::debug!("Stopping repeat send");
            self.repeat_ticker.stop();
            self.repeat_enabled = false;
        }
        self.sink.append_line("[System] Disconnected\n", StyleHint::Error);
        self.bus.publish(AppEvent::ConnectionClosed { device });
        true
    }

    // ---- send ----

    /// Put `text` in the input field and send it.
    pub fn send(&mut self, text: &str) -> Result<(), TerminalError> {
        self.set_input(text);
        self.send_input()
    }

    /// Send the current input field contents.
    pub fn send_input(&mut self) -> Result<(), TerminalError> {
        if self.session.is_none() {
            log::error!("Send attempted without an active serial connection");
            self.sink
                .append_line("[Error] No active serial connection\n", StyleHint::Error);
            return Err(TerminalError::NotConnected);
        }
        let text = self.input.clone();
        if text.is_empty() {
            return Ok(());
        }

        let format = self.settings.send_format;
        let eol = self.settings.eol;
        let encoded = match encode(&text, format, eol) {
            Ok(encoded) => encoded,
            Err(err) => {
                self.error(format!("Send error: {err}"));
                return Err(err);
            }
        };
        if let Some(warning) = &encoded.warning {
            self.warn(warning);
        }

        let written = match self.session.as_mut().map(|s| s.write(&encoded.bytes)) {
            Some(Ok(n)) => n,
            Some(Err(err)) => {
                self.error(format!("Send error: {err}"));
                if err.is_fatal() {
                    self.disconnect();
                }
                return Err(err);
            }
            None => return Err(TerminalError::NotConnected),
        };
        log::debug!("Sent {written} byte(s)");

        let (rx, tx) = self.counters();
        self.sink.update_counters(rx, tx);

        let mut display = text.clone();
        if format == SendFormat::Ascii {
            if let Some(label) = eol.label() {
                display.push_str(" + ");
                display.push_str(label);
            }
        }
        self.sink
            .append_line(&format!("TX: {display}\n"), StyleHint::Tx);
        self.record_log(Direction::Tx, &display);
        self.history.record(&text);
        self.bus.publish(AppEvent::DataSent { bytes: written });

        if self.repeat_enabled {
            if !self.repeat_ticker.is_active() {
                log::info!(
                    "Repeat send every {} ms",
                    self.repeat_ticker.interval().as_millis()
                );
                self.repeat_ticker.start(Instant::now());
            }
        } else {
            self.repeat_ticker.stop();
            self.input.clear();
        }
        Ok(())
    }

    /// Run a command from a macro or palette. In repeat mode it only fills
    /// the input field.
    pub fn execute_command(&mut self, command: &str) -> Result<(), TerminalError> {
        self.set_input(command);
        if self.repeat_enabled {
            return Ok(());
        }
        self.send_input()
    }

    /// Returns `Ok(false)` when no macro has that name.
    pub fn execute_macro(&mut self, name: &str) -> Result<bool, TerminalError> {
        let Some(command) = self.macros.get(name).map(|m| m.command.clone()) else {
            self.warn(format!("Unknown macro {name:?}"));
            return Ok(false);
        };
        self.execute_command(&command).map(|_| true)
    }

    pub fn save_macros(&mut self, text: &str) -> SavedMacros {
        let limit = self.settings.macro_limit();
        let saved = MacroSet::save_text(text, limit);
        if saved.truncated {
            self.warn(format!("Saved commands limited to {limit}"));
        }
        self.settings.commands = saved.text.clone();
        self.macros = MacroSet::parse(&saved.text, limit);
        saved
    }

    // ---- logging ----

    /// Start logging to `path`, or to a timestamped file in the configured
    /// save directory.
    pub fn start_logging(&mut self, path: Option<PathBuf>) -> Result<PathBuf, TerminalError> {
        let target = match path {
            Some(path) => Ok(path),
            None => {
                let dir = if self.settings.save_path.trim().is_empty() {
                    PathBuf::from(".")
                } else {
                    PathBuf::from(&self.settings.save_path)
                };
                auto_log_path(dir)
            }
        };
        match target.and_then(|path| self.log.start(path)) {
            Ok(path) => {
                self.info(format!("Logging started: {}", path.display()));
                Ok(path)
            }
            Err(err) => {
                self.error(format!("Logging failed: {err}"));
                Err(err)
            }
        }
    }

    /// Returns true when a log was running.
    pub fn stop_logging(&mut self) -> bool {
        match self.log.stop() {
            Ok(Some(_)) => {
                self.sink
                    .append_line("[System] Logging stopped\n", StyleHint::Warning);
                true
            }
            Ok(None) => false,
            Err(err) => {
                self.error(format!("Closing log failed: {err}"));
                true
            }
        }
    }

    fn record_log(&mut self, direction: Direction, text: &str) {
        if let Err(err) = self.log.record(direction, text) {
            self.error(format!("Logging stopped: {err}"));
        }
    }

    // ---- event loop ----

    /// Drain reader events and run due timers. Returns the number of reader
    /// events handled.
    pub fn pump(&mut self, now: Instant) -> usize {
        let events: Vec<RuntimeEvent> = self
            .session
            .as_ref()
            .map(|s| s.events().try_iter().collect())
            .unwrap_or_default();
        let handled = events.len();
        let mut fatal = false;
        for event in events {
            fatal |= self.handle_event(event);
        }
        if fatal && self.session.is_some() {
            self.disconnect();
        }

        if self.repeat_ticker.fire(now) {
            let _ = self.send_input();
        }
        if self.port_ticker.fire(now) {
            self.refresh_ports();
        }
        handled
    }

    /// Start the periodic port check; the first check runs immediately.
    pub fn start_port_watch(&mut self, now: Instant) {
        self.refresh_ports();
        self.port_ticker.start(now);
    }

    /// Returns true for events that require a disconnect.
    fn handle_event(&mut self, event: RuntimeEvent) -> bool {
        match event {
            RuntimeEvent::Frame { text, raw } => {
                self.sink.append_line(&text, StyleHint::Rx);
                self.record_log(Direction::Rx, &text);
                self.bus.publish(AppEvent::DataReceived { bytes: raw.len() });
                false
            }
            RuntimeEvent::Counters { rx, tx } => {
                self.sink.update_counters(rx, tx);
                false
            }
            RuntimeEvent::ReadError { message, consecutive } => {
                self.warn(format!("{message} ({consecutive} in a row)"));
                false
            }
            RuntimeEvent::Fatal(message) => {
                self.error(format!("{message}, closing the connection"));
                true
            }
            RuntimeEvent::Stopped => false,
        }
    }

    /// Hex dump of the bytes kept in the receive ring buffer.
    pub fn dump_received(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|s| format_hex(&s.recent_bytes()))
    }

    /// Close everything before exit.
    pub fn shutdown(&mut self) {
        if self.session.is_some() {
            self.disconnect();
        } else {
            self.stop_logging();
        }
        self.repeat_ticker.stop();
        self.port_ticker.stop();
    }
}
