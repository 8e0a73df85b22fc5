//! Line-oriented terminal front end.
//!
//! Output goes to stdout with one colour per [`StyleHint`]. Input is read on a
//! separate thread and forwarded line by line; lines starting with `/` are
//! console commands, anything else is sent to the device.

use anyhow::{Context, Result};
use std::{
    fs,
    io::{self, BufRead, Write},
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use crossterm::{
    cursor::MoveTo,
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType, SetTitle},
};
use flume::Receiver;
use regex::Regex;

use crate::{
    core::{
        bus::{AppEvent, EventKind},
        display::{DisplayLog, PurgePolicy, StyleHint, UiSink},
        logs::auto_log_path,
        palette::Palette,
        persistence::{JsonFileStore, TerminalSettings},
        runtime::Terminal,
    },
    protocol::{encode::EolMode, encode::SendFormat, format::DisplayMode, link::SerialBackend},
    utils::checksum::{parse_hex, Checksums},
};

/// How often the controller is pumped while waiting for input.
const TICK: Duration = Duration::from_millis(10);

const HELP: &[(&str, &str)] = &[
    ("/connect [DEV]", "open the selected or given port"),
    ("/disconnect", "close the connection"),
    ("/ports", "list serial ports"),
    ("/display <ascii|hex|both>", "receive display mode"),
    ("/format <ascii|hex>", "send format"),
    ("/eol <none|nl|cr|nlcr>", "line ending appended to sends"),
    ("/repeat <off|MS>", "resend the last input every MS milliseconds"),
    ("/filter [REGEX]", "show only matching frames, no argument turns it off"),
    ("/log [FILE]", "start logging"),
    ("/nolog", "stop logging"),
    ("/history", "list sent commands"),
    ("/macros [FILE]", "list macros or load them from FILE"),
    ("/macro <NAME>", "run a macro"),
    ("/palette <esp8266|hc05>", "list AT commands"),
    ("/checksum <HEX>", "SUM8, XOR8 and CRC16 of hex bytes"),
    ("/dump", "hex dump of recently received bytes"),
    ("/clear", "clear the screen"),
    ("/save [FILE]", "write the screen contents to a file"),
    ("/quit", "close everything and exit"),
    ("//text", "send text starting with '/'"),
];

/// [`UiSink`] printing to stdout. A bounded copy of the output is kept for
/// `/save`.
pub struct ConsoleSink {
    log: DisplayLog,
    echo: bool,
}

impl ConsoleSink {
    pub fn new(max_lines: usize) -> Self {
        Self {
            log: DisplayLog::new(max_lines, PurgePolicy::default()),
            echo: true,
        }
    }

    /// Same bookkeeping without touching stdout.
    pub fn detached(max_lines: usize) -> Self {
        Self {
            echo: false,
            ..Self::new(max_lines)
        }
    }

    pub fn log(&self) -> &DisplayLog {
        &self.log
    }

    pub fn clear(&mut self) {
        self.log.clear();
        if self.echo {
            if let Err(err) = execute!(io::stdout(), Clear(ClearType::All), MoveTo(0, 0)) {
                log::debug!("Failed to clear the screen: {err}");
            }
        }
    }

    fn print(text: &str, style: StyleHint) -> io::Result<()> {
        let mut out = io::stdout().lock();
        let color = match style {
            StyleHint::Info => Some(Color::Cyan),
            StyleHint::Error => Some(Color::Red),
            StyleHint::Warning => Some(Color::Yellow),
            StyleHint::Tx => Some(Color::Green),
            StyleHint::Rx => None,
        };
        match color {
            Some(color) => queue!(out, SetForegroundColor(color), Print(text), ResetColor)?,
            None => queue!(out, Print(text))?,
        }
        // frames flushed by the timeout carry no line break of their own
        if !text.ends_with('\n') {
            queue!(out, Print("\n"))?;
        }
        out.flush()
    }
}

impl UiSink for ConsoleSink {
    fn append_line(&mut self, text: &str, style: StyleHint) {
        self.log.append_line(text, style);
        if self.echo {
            if let Err(err) = Self::print(text, style) {
                log::warn!("Failed to write to stdout: {err}");
            }
        }
    }

    fn update_counters(&mut self, rx: u64, tx: u64) {
        self.log.update_counters(rx, tx);
        if self.echo {
            let _ = execute!(
                io::stdout(),
                SetTitle(format!("crazyterm - RX: {rx} bytes, TX: {tx} bytes"))
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Quit,
    Connect(Option<String>),
    Disconnect,
    Ports,
    Display(DisplayMode),
    Format(SendFormat),
    Eol(EolMode),
    /// `None` disarms repeat mode.
    Repeat(Option<Duration>),
    Filter(Option<String>),
    Log(Option<PathBuf>),
    NoLog,
    History,
    Macros(Option<PathBuf>),
    Macro(String),
    Palette(Palette),
    Checksum(String),
    Dump,
    Clear,
    Save(Option<PathBuf>),
    Help,
    Send(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

fn required<'a>(arg: Option<&'a str>, usage: &str) -> Result<&'a str, String> {
    arg.ok_or_else(|| format!("Usage: {usage}"))
}

fn choice<T: std::str::FromStr>(arg: Option<&str>, usage: &str) -> Result<T, String> {
    required(arg, usage)?
        .parse()
        .map_err(|_| format!("Usage: {usage}"))
}

/// Parse one input line. Empty lines yield `None`; errors are usage messages.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    use ConsoleCommand as C;

    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(None);
    }
    if let Some(rest) = line.strip_prefix("//") {
        return Ok(Some(C::Send(format!("/{rest}"))));
    }
    let Some(body) = line.strip_prefix('/') else {
        return Ok(Some(C::Send(line.to_string())));
    };

    let (name, arg) = match body.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, Some(rest.trim()).filter(|a| !a.is_empty())),
        None => (body, None),
    };
    let command = match name.to_ascii_lowercase().as_str() {
        "quit" | "exit" | "q" => C::Quit,
        "connect" => C::Connect(arg.map(str::to_string)),
        "disconnect" => C::Disconnect,
        "ports" => C::Ports,
        "display" => C::Display(choice(arg, "/display <ascii|hex|both>")?),
        "format" => C::Format(choice(arg, "/format <ascii|hex>")?),
        "eol" => C::Eol(choice(arg, "/eol <none|nl|cr|nlcr>")?),
        "repeat" => match required(arg, "/repeat <off|MS>")? {
            "off" => C::Repeat(None),
            ms => match ms.parse::<u64>() {
                Ok(ms) if ms > 0 => C::Repeat(Some(Duration::from_millis(ms))),
                _ => return Err("Usage: /repeat <off|MS>, MS > 0".to_string()),
            },
        },
        "filter" => C::Filter(arg.map(str::to_string)),
        "log" => C::Log(arg.map(PathBuf::from)),
        "nolog" => C::NoLog,
        "history" => C::History,
        "macros" => C::Macros(arg.map(PathBuf::from)),
        "macro" => C::Macro(required(arg, "/macro <NAME>")?.to_string()),
        "palette" => C::Palette(choice(arg, "/palette <esp8266|hc05>")?),
        "checksum" => C::Checksum(required(arg, "/checksum <HEX>")?.to_string()),
        "dump" => C::Dump,
        "clear" => C::Clear,
        "save" => C::Save(arg.map(PathBuf::from)),
        "help" | "?" => C::Help,
        other => return Err(format!("Unknown command /{other}, try /help")),
    };
    Ok(Some(command))
}

fn note(term: &mut Terminal<ConsoleSink>, text: impl AsRef<str>) {
    term.sink_mut()
        .append_line(&format!("[System] {}\n", text.as_ref()), StyleHint::Info);
}

fn warn(term: &mut Terminal<ConsoleSink>, text: impl AsRef<str>) {
    term.sink_mut()
        .append_line(&format!("[Warning] {}\n", text.as_ref()), StyleHint::Warning);
}

/// Surface port changes from the bus; errors are already on screen and only go to the log.
fn drain_app_events(term: &mut Terminal<ConsoleSink>, events: &Receiver<AppEvent>) {
    for event in events.try_iter() {
        match event {
            AppEvent::PortDetected(name) => note(term, format!("Port {name} detected")),
            AppEvent::PortRemoved(name) => note(term, format!("Port {name} removed")),
            AppEvent::ErrorOccurred(message) => log::error!("Terminal error: {message}"),
            _ => {}
        }
    }
}

fn save_dir(term: &Terminal<ConsoleSink>) -> PathBuf {
    let dir = term.settings().save_path.trim();
    if dir.is_empty() {
        PathBuf::from(".")
    } else {
        PathBuf::from(dir)
    }
}

pub fn execute(term: &mut Terminal<ConsoleSink>, command: ConsoleCommand) -> Flow {
    match command {
        ConsoleCommand::Quit => return Flow::Quit,
        ConsoleCommand::Connect(device) => {
            let result = match device {
                Some(device) => term.connect_to(&device),
                None => term.connect(),
            };
            if let Err(err) = result {
                log::debug!("Connect failed: {err}");
            }
        }
        ConsoleCommand::Disconnect => {
            term.disconnect();
        }
        ConsoleCommand::Ports => {
            let changed = term.refresh_ports().is_some();
            let listing: Vec<String> = term
                .ports()
                .iter()
                .map(|p| {
                    let mark = if term.connected_device() == Some(p.device_name.as_str()) {
                        '*'
                    } else if term.settings().port == p.device_name {
                        '>'
                    } else {
                        ' '
                    };
                    format!("{mark} {}  {}", p.device_name, p.description)
                })
                .collect();
            if listing.is_empty() {
                if !changed {
                    note(term, "No serial port detected");
                }
            } else {
                for line in listing {
                    note(term, line);
                }
            }
        }
        ConsoleCommand::Display(mode) => {
            term.set_display_mode(mode);
            note(term, format!("Display mode: {mode}"));
        }
        ConsoleCommand::Format(format) => {
            term.set_send_format(format);
            note(term, format!("Send format: {format}"));
        }
        ConsoleCommand::Eol(eol) => {
            term.set_eol(eol);
            note(term, format!("Line ending: {}", eol.label().unwrap_or("none")));
        }
        ConsoleCommand::Repeat(Some(interval)) => {
            term.set_repeat(true, Some(interval));
            note(
                term,
                format!(
                    "Repeat every {} ms, starting with the next send",
                    interval.as_millis()
                ),
            );
        }
        ConsoleCommand::Repeat(None) => {
            term.set_repeat(false, None);
            note(term, "Repeat off");
        }
        ConsoleCommand::Filter(Some(pattern)) => {
            if let Err(err) = Regex::new(&pattern) {
                warn(term, format!("Invalid pattern, frames pass unfiltered: {err}"));
            }
            term.set_filter(Some(&pattern));
            note(term, format!("Filter: {pattern}"));
        }
        ConsoleCommand::Filter(None) => {
            term.set_filter(None);
            note(term, "Filter off");
        }
        ConsoleCommand::Log(path) => {
            let _ = term.start_logging(path);
        }
        ConsoleCommand::NoLog => {
            if !term.stop_logging() {
                note(term, "Logging is not active");
            }
        }
        ConsoleCommand::History => {
            let entries: Vec<String> = term.history().entries().to_vec();
            if entries.is_empty() {
                note(term, "History is empty");
            }
            for (i, entry) in entries.iter().enumerate() {
                note(term, format!("{:>3}  {entry}", i + 1));
            }
        }
        ConsoleCommand::Macros(Some(path)) => match fs::read_to_string(&path) {
            Ok(text) => {
                term.save_macros(&text);
                let count = term.macros().len();
                note(term, format!("Loaded {count} macro(s) from {}", path.display()));
            }
            Err(err) => warn(term, format!("Cannot read {}: {err}", path.display())),
        },
        ConsoleCommand::Macros(None) => {
            let listing: Vec<String> = term
                .macros()
                .iter()
                .map(|m| format!("{} = {}", m.name, m.command))
                .collect();
            if listing.is_empty() {
                note(term, "No macros defined");
            }
            for line in listing {
                note(term, line);
            }
        }
        ConsoleCommand::Macro(name) => {
            if let Err(err) = term.execute_macro(&name) {
                log::debug!("Macro {name} failed: {err}");
            }
        }
        ConsoleCommand::Palette(palette) => {
            note(term, format!("{palette} AT commands"));
            for category in palette.categories() {
                note(term, format!("[{}]", category.name));
                for cmd in category.commands {
                    note(term, format!("  {:<40} {}", cmd.command, cmd.description));
                }
            }
        }
        ConsoleCommand::Checksum(hex) => match parse_hex(&hex) {
            Ok(bytes) => note(term, Checksums::of(&bytes).to_string()),
            Err(err) => warn(term, format!("Checksum: {err}")),
        },
        ConsoleCommand::Dump => match term.dump_received() {
            Some(dump) if dump.is_empty() => note(term, "Nothing received yet"),
            Some(dump) => note(term, format!("Received: {dump}")),
            None => warn(term, "No active connection"),
        },
        ConsoleCommand::Clear => term.sink_mut().clear(),
        ConsoleCommand::Save(path) => {
            let target = match path {
                Some(path) => Ok(path),
                None => auto_log_path(save_dir(term)),
            };
            let text = term.sink().log().text();
            match target {
                Ok(path) => match fs::write(&path, text) {
                    Ok(()) => note(term, format!("Display saved to {}", path.display())),
                    Err(err) => warn(term, format!("Cannot write {}: {err}", path.display())),
                },
                Err(err) => warn(term, err.to_string()),
            }
        }
        ConsoleCommand::Help => {
            for (usage, what) in HELP {
                note(term, format!("{usage:<28} {what}"));
            }
        }
        ConsoleCommand::Send(text) => {
            if let Err(err) = term.send(&text) {
                log::debug!("Send failed: {err}");
            }
        }
    }
    Flow::Continue
}

pub fn handle_line(term: &mut Terminal<ConsoleSink>, line: &str) -> Flow {
    match parse_line(line) {
        Ok(Some(command)) => execute(term, command),
        Ok(None) => Flow::Continue,
        Err(usage) => {
            warn(term, usage);
            Flow::Continue
        }
    }
}

enum ConsoleInput {
    Line(String),
    Interrupt,
    Eof,
}

fn spawn_input_thread(tx: flume::Sender<ConsoleInput>) -> Result<()> {
    thread::Builder::new()
        .name("console-input".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(ConsoleInput::Line(line)).is_err() {
                            return;
                        }
                    }
                    Err(err) => {
                        log::warn!("Failed to read stdin: {err}");
                        break;
                    }
                }
            }
            let _ = tx.send(ConsoleInput::Eof);
        })
        .context("Failed to spawn input thread")?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ConsoleOptions {
    /// Open the configured port right away.
    pub connect: bool,
    pub log_path: Option<PathBuf>,
}

/// Run the interactive console until `/quit`, Ctrl-C or end of input.
pub fn run(
    backend: Box<dyn SerialBackend>,
    settings: TerminalSettings,
    mut store: JsonFileStore,
    options: ConsoleOptions,
) -> Result<()> {
    let sink = ConsoleSink::new(settings.buffer_size);
    let mut term = Terminal::new(backend, sink, settings);
    let app_events = term.bus().subscribe_to(&[
        EventKind::PortDetected,
        EventKind::PortRemoved,
        EventKind::ErrorOccurred,
    ]);

    let (tx, rx) = flume::unbounded();
    spawn_input_thread(tx.clone())?;
    ctrlc::set_handler(move || {
        let _ = tx.send(ConsoleInput::Interrupt);
    })
    .context("Failed to set Ctrl-C handler")?;

    note(&mut term, "crazyterm ready, type /help for commands");
    term.start_port_watch(Instant::now());
    if options.connect {
        let _ = term.connect();
    }
    if let Some(path) = options.log_path {
        let _ = term.start_logging(Some(path));
    }

    loop {
        match rx.recv_timeout(TICK) {
            Ok(ConsoleInput::Line(line)) => {
                if handle_line(&mut term, &line) == Flow::Quit {
                    break;
                }
            }
            Ok(ConsoleInput::Interrupt) => {
                log::info!("Interrupted");
                break;
            }
            Ok(ConsoleInput::Eof) | Err(flume::RecvTimeoutError::Disconnected) => {
                // let frames already on the way reach the screen
                term.pump(Instant::now());
                break;
            }
            Err(flume::RecvTimeoutError::Timeout) => {}
        }
        term.pump(Instant::now());
        drain_app_events(&mut term, &app_events);
    }

    term.shutdown();
    term.settings().save(&mut store);
    store.save()?;
    Ok(())
}
