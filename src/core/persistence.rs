//! Settings persistence.
//!
//! Settings are flat `section/key` entries holding JSON values. The desktop
//! build kept them in the platform settings registry; here they live in a
//! JSON file next to the working directory, or in memory for tests.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use crate::{
    core::{display::DEFAULT_MAX_LINES, macros::MAX_SAVED_COMMANDS},
    protocol::{
        config::{ConnectionParams, DataBits, FlowControl, Parity, StopBits, DEFAULT_READ_TIMEOUT},
        encode::{EolMode, SendFormat},
        format::{DisplayMode, DisplayOptions},
    },
};

pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(1000);
pub const SETTINGS_FILE_NAME: &str = "crazyterm_settings.json";

pub mod keys {
    pub const PORT: &str = "connection/port";
    pub const BAUD: &str = "connection/baud";
    pub const DATA_BITS: &str = "connection/data";
    pub const PARITY: &str = "connection/parity";
    pub const STOP_BITS: &str = "connection/stop";
    pub const FLOW: &str = "connection/flow";
    pub const DISPLAY_FORMAT: &str = "display/format";
    pub const AUTOSCROLL: &str = "display/autoscroll";
    pub const TIMESTAMP: &str = "display/timestamp";
    pub const SEND_FORMAT: &str = "send/format";
    pub const EOL: &str = "send/eol";
    pub const REPEAT_INTERVAL: &str = "send/repeatInterval";
    pub const BUFFER_SIZE: &str = "advanced/bufferSize";
    pub const FILTER: &str = "advanced/filter";
    pub const ENABLE_FILTER: &str = "advanced/enableFilter";
    pub const SHOW_TIMING: &str = "advanced/showTiming";
    pub const AUTO_SAVE: &str = "advanced/autoSave";
    pub const SAVE_PATH: &str = "advanced/savePath";
    pub const COMMANDS: &str = "commands/list";
}

/// Key/value settings backend.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&mut self, key: &str, value: Value);
    fn remove(&mut self, key: &str);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

/// Settings file in the current working directory.
pub fn default_settings_path() -> Result<PathBuf> {
    let dir = std::env::current_dir().context("Failed to get current working directory")?;
    Ok(dir.join(SETTINGS_FILE_NAME))
}

/// JSON object file; changes stay in memory until [`JsonFileStore::save`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Map<String, Value>,
}

impl JsonFileStore {
    /// Load `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            log::debug!("No settings file at {path:?}, starting with defaults");
            return Ok(Self {
                path,
                values: Map::new(),
            });
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings from {path:?}"))?;
        let values = if raw.trim().is_empty() {
            Map::new()
        } else {
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse settings from {path:?}"))?
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.values)
            .context("Failed to serialize settings")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write settings to {:?}", self.path))?;
        log::debug!("Saved {} setting(s) to {:?}", self.values.len(), self.path);
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }
}

fn read_string(store: &dyn SettingsStore, key: &str, default: &str) -> String {
    match store.get(key) {
        Some(Value::String(s)) => s,
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Accepts both native JSON values and their string spelling, falling back
/// to `default` on anything unparsable.
fn read_parsed<T: FromStr>(store: &dyn SettingsStore, key: &str, default: T) -> T {
    let text = match store.get(key) {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => return default,
    };
    match text.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            log::warn!("Ignoring invalid setting {key} = {text:?}");
            default
        }
    }
}

/// Typed view of every setting the terminal reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub display_mode: DisplayMode,
    pub autoscroll: bool,
    pub timestamp: bool,
    pub send_format: SendFormat,
    pub eol: EolMode,
    pub repeat_interval: Duration,
    pub buffer_size: usize,
    pub filter: String,
    pub enable_filter: bool,
    pub show_timing: bool,
    pub auto_save: bool,
    pub save_path: String,
    pub commands: String,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            display_mode: DisplayMode::Ascii,
            autoscroll: true,
            timestamp: false,
            send_format: SendFormat::Ascii,
            eol: EolMode::None,
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
            buffer_size: DEFAULT_MAX_LINES,
            filter: String::new(),
            enable_filter: false,
            show_timing: false,
            auto_save: false,
            save_path: String::new(),
            commands: String::new(),
        }
    }
}

impl TerminalSettings {
    pub fn load(store: &dyn SettingsStore) -> Self {
        let d = Self::default();
        let buffer_size = read_parsed(store, keys::BUFFER_SIZE, d.buffer_size);
        Self {
            port: read_string(store, keys::PORT, &d.port),
            baud_rate: read_parsed(store, keys::BAUD, d.baud_rate),
            data_bits: read_parsed(store, keys::DATA_BITS, d.data_bits),
            parity: read_parsed(store, keys::PARITY, d.parity),
            stop_bits: read_parsed(store, keys::STOP_BITS, d.stop_bits),
            flow_control: read_parsed(store, keys::FLOW, d.flow_control),
            display_mode: read_parsed(store, keys::DISPLAY_FORMAT, d.display_mode),
            autoscroll: read_parsed(store, keys::AUTOSCROLL, d.autoscroll),
            timestamp: read_parsed(store, keys::TIMESTAMP, d.timestamp),
            send_format: read_parsed(store, keys::SEND_FORMAT, d.send_format),
            eol: read_parsed(store, keys::EOL, d.eol),
            repeat_interval: Duration::from_millis(
                read_parsed(store, keys::REPEAT_INTERVAL, d.repeat_interval.as_millis() as u64)
                    .max(1),
            ),
            buffer_size: if buffer_size == 0 { d.buffer_size } else { buffer_size },
            filter: read_string(store, keys::FILTER, &d.filter),
            enable_filter: read_parsed(store, keys::ENABLE_FILTER, d.enable_filter),
            show_timing: read_parsed(store, keys::SHOW_TIMING, d.show_timing),
            auto_save: read_parsed(store, keys::AUTO_SAVE, d.auto_save),
            save_path: read_string(store, keys::SAVE_PATH, &d.save_path),
            commands: read_string(store, keys::COMMANDS, &d.commands),
        }
    }

    pub fn save(&self, store: &mut dyn SettingsStore) {
        store.set(keys::PORT, Value::from(self.port.clone()));
        store.set(keys::BAUD, Value::from(self.baud_rate));
        store.set(keys::DATA_BITS, Value::from(self.data_bits.to_string()));
        store.set(keys::PARITY, Value::from(self.parity.to_string()));
        store.set(keys::STOP_BITS, Value::from(self.stop_bits.to_string()));
        store.set(keys::FLOW, Value::from(self.flow_control.to_string()));
        store.set(keys::DISPLAY_FORMAT, Value::from(self.display_mode.to_string()));
        store.set(keys::AUTOSCROLL, Value::from(self.autoscroll));
        store.set(keys::TIMESTAMP, Value::from(self.timestamp));
        store.set(keys::SEND_FORMAT, Value::from(self.send_format.to_string()));
        store.set(keys::EOL, Value::from(self.eol.to_string()));
        store.set(
            keys::REPEAT_INTERVAL,
            Value::from(self.repeat_interval.as_millis() as u64),
        );
        store.set(keys::BUFFER_SIZE, Value::from(self.buffer_size as u64));
        store.set(keys::FILTER, Value::from(self.filter.clone()));
        store.set(keys::ENABLE_FILTER, Value::from(self.enable_filter));
        store.set(keys::SHOW_TIMING, Value::from(self.show_timing));
        store.set(keys::AUTO_SAVE, Value::from(self.auto_save));
        store.set(keys::SAVE_PATH, Value::from(self.save_path.clone()));
        if self.commands.is_empty() {
            store.remove(keys::COMMANDS);
        } else {
            store.set(keys::COMMANDS, Value::from(self.commands.clone()));
        }
    }

    pub fn connection_params(&self) -> ConnectionParams {
        ConnectionParams {
            device_name: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
            flow_control: self.flow_control,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn display_options(&self) -> DisplayOptions {
        DisplayOptions {
            mode: self.display_mode,
            timestamp: self.timestamp,
            timing: self.show_timing,
            filter_enabled: self.enable_filter,
            filter: self.filter.clone(),
        }
    }

    pub fn macro_limit(&self) -> usize {
        MAX_SAVED_COMMANDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_store_yields_defaults() {
        let settings = TerminalSettings::load(&MemoryStore::new());
        assert_eq!(settings, TerminalSettings::default());
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.buffer_size, 10_000);
        assert_eq!(settings.repeat_interval, Duration::from_millis(1000));
    }

    #[test]
    fn string_and_native_values_are_both_accepted() {
        let mut store = MemoryStore::new();
        store.set(keys::BAUD, json!("9600"));
        store.set(keys::DATA_BITS, json!(7));
        store.set(keys::PARITY, json!("Even"));
        store.set(keys::EOL, json!("nlcr"));
        store.set(keys::TIMESTAMP, json!("true"));
        store.set(keys::ENABLE_FILTER, json!(true));
        let settings = TerminalSettings::load(&store);
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, DataBits::Seven);
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.eol, EolMode::NlCr);
        assert!(settings.timestamp);
        assert!(settings.enable_filter);
    }

    #[test]
    fn invalid_values_fall_back_per_key() {
        let mut store = MemoryStore::new();
        store.set(keys::BAUD, json!("fast"));
        store.set(keys::BUFFER_SIZE, json!(0));
        store.set(keys::DISPLAY_FORMAT, json!("HEX"));
        let settings = TerminalSettings::load(&store);
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.buffer_size, DEFAULT_MAX_LINES);
        assert_eq!(settings.display_mode, DisplayMode::Hex);
    }

    #[test]
    fn json_file_round_trip() {
        let path = std::env::temp_dir().join(format!("crazyterm_settings_{}.json", uuid::Uuid::new_v4()));
        let mut settings = TerminalSettings {
            port: "/dev/ttyUSB0".into(),
            stop_bits: StopBits::OnePointFive,
            flow_control: FlowControl::RtsCts,
            commands: "Reset = AT+RST".into(),
            ..TerminalSettings::default()
        };
        settings.filter = "ERR".into();

        let mut store = JsonFileStore::open(&path).unwrap();
        settings.save(&mut store);
        store.save().unwrap();

        let reloaded = TerminalSettings::load(&JsonFileStore::open(&path).unwrap());
        assert_eq!(reloaded, settings);
        let _ = fs::remove_file(path);
    }
}
