use std::{
    fs, io, thread,
    time::{Duration, Instant},
};

use crazyterm::{
    core::{
        bus::{AppEvent, EventKind},
        display::{DisplayLog, PurgePolicy, StyleHint},
        persistence::{JsonFileStore, TerminalSettings},
        runtime::Terminal,
    },
    protocol::{
        encode::{EolMode, SendFormat},
        format::DisplayMode,
        loopback::{LinkProbe, MemoryBackend},
    },
};

fn terminal(backend: &MemoryBackend, display: DisplayLog) -> Terminal<DisplayLog> {
    let settings = TerminalSettings {
        port: "loop0".into(),
        ..TerminalSettings::default()
    };
    Terminal::new(Box::new(backend.clone()), display, settings)
}

fn connected(backend: &MemoryBackend) -> (Terminal<DisplayLog>, LinkProbe) {
    let mut term = terminal(backend, DisplayLog::new(1000, PurgePolicy::HardCap));
    term.connect().unwrap();
    let probe = backend.probe("loop0").unwrap();
    (term, probe)
}

fn pump_until(term: &mut Terminal<DisplayLog>, cond: impl Fn(&Terminal<DisplayLog>) -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        term.pump(Instant::now());
        if cond(term) {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

fn lines(term: &Terminal<DisplayLog>) -> Vec<(String, StyleHint)> {
    term.sink()
        .lines()
        .map(|l| (l.text.clone(), l.style))
        .collect()
}

fn rx_lines(term: &Terminal<DisplayLog>) -> Vec<String> {
    term.sink()
        .lines()
        .filter(|l| l.style == StyleHint::Rx)
        .map(|l| l.text.clone())
        .collect()
}

fn temp_path(ext: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("crazyterm-test-{}.{ext}", uuid::Uuid::new_v4()))
}

#[test]
fn ascii_send_appends_line_ending() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    term.set_eol(EolMode::NlCr);

    term.send("AT").unwrap();

    assert_eq!(probe.written(), b"AT\r\n");
    let last = lines(&term).pop().unwrap();
    assert_eq!(last, ("TX: AT + NL+CR\n".to_string(), StyleHint::Tx));
    assert_eq!(term.counters().1, 4);
    assert_eq!(term.input(), "");
}

#[test]
fn received_frame_in_hex_mode() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    term.set_display_mode(DisplayMode::Hex);

    probe.feed(b"OK\r\n");

    assert!(pump_until(&mut term, |t| !rx_lines(t).is_empty()));
    assert_eq!(rx_lines(&term), vec!["4F 4B 0D 0A"]);
    assert_eq!(term.sink().counters().0, 4);
}

#[test]
fn odd_hex_input_warns_before_sending() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    term.set_send_format(SendFormat::Hex);

    term.send("41 42 4").unwrap();

    assert_eq!(probe.written(), vec![0x41, 0x42, 0x40]);
    let all = lines(&term);
    let n = all.len();
    assert_eq!(all[n - 2].1, StyleHint::Warning);
    assert!(all[n - 2].0.starts_with("[Warning] "));
    assert_eq!(all[n - 1], ("TX: 41 42 4\n".to_string(), StyleHint::Tx));
}

#[test]
fn invalid_hex_aborts_send_but_keeps_session() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    term.set_send_format(SendFormat::Hex);

    assert!(term.send("zz").is_err());
    assert!(probe.written().is_empty());
    assert!(term.is_connected());
    assert!(term.history().is_empty());
}

#[test]
fn display_filter_hides_non_matching_frames() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    term.set_filter(Some("ERR"));

    probe.feed(b"OK\n");
    assert!(pump_until(&mut term, |t| t.sink().counters().0 == 3));
    probe.feed(b"ERR: timeout\n");
    assert!(pump_until(&mut term, |t| !rx_lines(t).is_empty()));

    assert_eq!(rx_lines(&term), vec!["ERR: timeout\n"]);
}

#[test]
fn second_disconnect_reports_no_connection() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);

    assert!(term.disconnect());
    assert!(!term.disconnect());

    assert!(probe.is_closed());
    let texts: Vec<String> = lines(&term).into_iter().map(|(t, _)| t).collect();
    let n = texts.len();
    assert_eq!(texts[n - 2], "[System] Disconnected\n");
    assert_eq!(texts[n - 1], "[System] No active connection\n");
}

#[test]
fn reconnect_closes_the_previous_session_first() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, first) = connected(&backend);

    term.connect().unwrap();

    assert!(first.is_closed());
    let second = backend.probe("loop0").unwrap();
    assert!(!second.is_closed());
    let system: Vec<String> = lines(&term)
        .into_iter()
        .map(|(t, _)| t)
        .filter(|t| t.starts_with("[System] Connected") || t == "[System] Disconnected\n")
        .collect();
    assert_eq!(system.len(), 3);
    assert!(system[0].starts_with("[System] Connected to loop0"));
    assert_eq!(system[1], "[System] Disconnected\n");
    assert!(system[2].starts_with("[System] Connected to loop0"));

    term.send("AT").unwrap();
    assert_eq!(second.written(), b"AT");
    assert!(first.written().is_empty());
}

#[test]
fn history_keeps_last_hundred_commands() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, _probe) = connected(&backend);

    for i in 0..150 {
        term.send(&format!("cmd {i}")).unwrap();
    }

    let entries = term.history().entries();
    assert_eq!(entries.len(), 100);
    assert_eq!(entries.first().map(String::as_str), Some("cmd 50"));
    assert_eq!(entries.last().map(String::as_str), Some("cmd 149"));
    assert_eq!(term.history_mut().previous(), Some("cmd 149"));
}

#[test]
fn display_never_exceeds_its_cap() {
    let backend = MemoryBackend::new(&["loop0"]);
    let mut term = terminal(&backend, DisplayLog::new(50, PurgePolicy::default()));
    term.connect().unwrap();

    for i in 0..300 {
        term.send(&format!("line {i}")).unwrap();
        assert!(term.sink().len() <= 50);
    }
    let last = term.sink().lines().last().unwrap().text.clone();
    assert_eq!(last, "TX: line 299\n");
}

#[test]
fn repeated_read_errors_force_disconnect() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    let events = term.bus().subscribe_to(&[EventKind::ConnectionClosed]);

    for _ in 0..5 {
        probe.fail_next_read(io::ErrorKind::Other);
    }

    assert!(pump_until(&mut term, |t| !t.is_connected()));
    let all = lines(&term);
    let warnings = all
        .iter()
        .filter(|(t, _)| t.starts_with("[Warning] Read error"))
        .count();
    assert_eq!(warnings, 4);
    assert!(all
        .iter()
        .any(|(t, s)| *s == StyleHint::Error && t.contains("closing the connection")));
    assert_eq!(
        events.try_recv().ok(),
        Some(AppEvent::ConnectionClosed {
            device: "loop0".into()
        })
    );
}

#[test]
fn unplugged_device_disconnects_implicitly() {
    let backend = MemoryBackend::new(&["loop0", "loop1"]);
    let mut term = terminal(&backend, DisplayLog::new(1000, PurgePolicy::HardCap));
    term.refresh_ports();
    term.connect().unwrap();

    backend.unplug("loop0");
    let change = term.refresh_ports().unwrap();

    assert_eq!(change.removed, vec!["loop0".to_string()]);
    assert!(!term.is_connected());
    assert!(lines(&term)
        .iter()
        .any(|(t, _)| t.starts_with("[Warning] Port loop0 disappeared")));
    assert_eq!(term.settings().port, "loop1");
}

#[test]
fn session_log_brackets_traffic_with_markers() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);
    let path = temp_path("txt");

    term.start_logging(Some(path.clone())).unwrap();
    term.send("AT").unwrap();
    probe.feed(b"OK\r\n");
    assert!(pump_until(&mut term, |t| !rx_lines(t).is_empty()));
    term.disconnect();
    assert!(!term.is_logging());

    let content = fs::read_to_string(&path).unwrap();
    let _ = fs::remove_file(&path);
    let log_lines: Vec<&str> = content.lines().collect();
    assert!(log_lines[0].starts_with("--- Log démarré le "));
    assert!(log_lines[1].ends_with(" TX: AT"));
    assert!(log_lines[2].ends_with(" RX: OK"));
    assert!(log_lines[3].starts_with("--- Log terminé le "));
    assert_eq!(log_lines.len(), 4);
}

#[test]
fn macros_run_by_name() {
    let backend = MemoryBackend::new(&["loop0"]);
    let (mut term, probe) = connected(&backend);

    term.save_macros("# module\nReset = AT+RST\nVersion = AT+GMR\nbroken line\n");

    assert_eq!(term.macros().len(), 2);
    assert!(term.execute_macro("version").unwrap());
    assert!(!term.execute_macro("missing").unwrap());
    assert_eq!(probe.written(), b"AT+GMR");
}

#[test]
fn settings_survive_a_file_round_trip() {
    let path = temp_path("json");
    let settings = TerminalSettings {
        port: "/dev/ttyUSB0".into(),
        baud_rate: 9600,
        display_mode: DisplayMode::Both,
        eol: EolMode::Cr,
        filter: "ERR".into(),
        enable_filter: true,
        commands: "Reset = AT+RST".into(),
        ..TerminalSettings::default()
    };

    let mut store = JsonFileStore::open(&path).unwrap();
    settings.save(&mut store);
    store.save().unwrap();

    let reopened = JsonFileStore::open(&path).unwrap();
    let _ = fs::remove_file(&path);
    assert_eq!(TerminalSettings::load(&reopened), settings);
}
