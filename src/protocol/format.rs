//! Rendering of received frames into display text.

use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum DisplayMode {
    #[default]
    Ascii,
    Hex,
    Both,
}

/// Display settings shared between the controller and the reader thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayOptions {
    pub mode: DisplayMode,
    pub timestamp: bool,
    /// Adds the delay since the previous frame; only shown with `timestamp`.
    pub timing: bool,
    pub filter_enabled: bool,
    pub filter: String,
}

/// Decode bytes as UTF-8, substituting U+FFFD for invalid sequences.
pub fn decode_text(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Single-byte decode where every byte maps to the code point of equal value.
pub fn decode_latin1(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

/// `4F 4B 0D 0A`
pub fn format_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 3);
    for (i, b) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{b:02X}"));
    }
    out
}

pub fn render_body(data: &[u8], mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Ascii => decode_text(data),
        DisplayMode::Hex => format_hex(data),
        DisplayMode::Both => format!("{} [{}]", decode_text(data), format_hex(data)),
    }
}

/// Render one frame.
///
/// Returns the display text together with the frame time to carry into the
/// next call; the carried time is `now` whether or not the caller later
/// suppresses the frame.
pub fn render(
    data: &[u8],
    mode: DisplayMode,
    timestamp: bool,
    timing: bool,
    last_frame_time: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> (String, Option<DateTime<Local>>) {
    let body = render_body(data, mode);
    if !timestamp {
        return (body, Some(now));
    }

    let clock = now.format("%H:%M:%S%.3f");
    let text = match last_frame_time {
        Some(prev) if timing => {
            let delta_us = (now - prev).num_microseconds().unwrap_or(i64::MAX);
            let delta_ms = delta_us as f64 / 1000.0;
            format!("[{clock} +{delta_ms:.1}ms] {body}")
        }
        _ => format!("[{clock}] {body}"),
    };
    (text, Some(now))
}

/// Regex gate for rendered frames. Invalid patterns let everything through.
#[derive(Debug, Default)]
pub struct FrameFilter {
    cached: Option<(String, Option<Regex>)>,
}

impl FrameFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allows(&mut self, enabled: bool, pattern: &str, text: &str) -> bool {
        if !enabled || pattern.is_empty() {
            return true;
        }
        let stale = !matches!(&self.cached, Some((cached, _)) if cached == pattern);
        if stale {
            let compiled = match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(err) => {
                    log::debug!("Display filter {pattern:?} ignored: {err}");
                    None
                }
            };
            self.cached = Some((pattern.to_string(), compiled));
        }
        match &self.cached {
            Some((_, Some(re))) => re.is_match(text),
            _ => true,
        }
    }
}

/// Stateful renderer owned by the reader thread.
#[derive(Debug, Default)]
pub struct FrameRenderer {
    last_frame_time: Option<DateTime<Local>>,
    filter: FrameFilter,
}

impl FrameRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render and filter a frame; `None` means the filter suppressed it.
    pub fn render(
        &mut self,
        data: &[u8],
        options: &DisplayOptions,
        now: DateTime<Local>,
    ) -> Option<String> {
        let (text, next) = render(
            data,
            options.mode,
            options.timestamp,
            options.timing,
            self.last_frame_time,
            now,
        );
        self.last_frame_time = next;
        self.filter
            .allows(options.filter_enabled, &options.filter, &text)
            .then_some(text)
    }

    pub fn last_frame_time(&self) -> Option<DateTime<Local>> {
        self.last_frame_time
    }
}
