//! Bounded in-memory terminal output.

use serde::Serialize;
use std::collections::VecDeque;
use strum::Display;

pub const DEFAULT_MAX_LINES: usize = 10_000;
pub const DEFAULT_BYTE_CAP: usize = 5 * 1024 * 1024;
/// Share of the caps kept after a size-aware purge, in percent.
const RETAIN_PERCENT: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum StyleHint {
    Info,
    Error,
    Warning,
    Rx,
    Tx,
}

/// Where the controller puts user-visible output.
pub trait UiSink {
    fn append_line(&mut self, text: &str, style: StyleHint);
    fn update_counters(&mut self, rx: u64, tx: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgePolicy {
    /// Drop the oldest entries whenever a new one would exceed `max_lines` rows.
    HardCap,
    /// Purge down to 80% of both caps once either would be exceeded.
    SizeAware { byte_cap: usize },
}

impl Default for PurgePolicy {
    fn default() -> Self {
        Self::SizeAware {
            byte_cap: DEFAULT_BYTE_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayLine {
    pub text: String,
    pub style: StyleHint,
}

#[derive(Debug, Clone)]
pub struct DisplayLog {
    lines: VecDeque<DisplayLine>,
    bytes: usize,
    /// Text lines across all entries; a frame may carry several.
    text_lines: usize,
    max_lines: usize,
    policy: PurgePolicy,
    counters: (u64, u64),
}

impl Default for DisplayLog {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES, PurgePolicy::default())
    }
}

impl DisplayLog {
    pub fn new(max_lines: usize, policy: PurgePolicy) -> Self {
        Self {
            lines: VecDeque::new(),
            bytes: 0,
            text_lines: 0,
            max_lines: max_lines.max(1),
            policy,
            counters: (0, 0),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &DisplayLine> {
        self.lines.iter()
    }

    /// Number of appended entries.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Number of text lines shown, a trailing partial line counting as one.
    pub fn line_count(&self) -> usize {
        self.text_lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    pub fn counters(&self) -> (u64, u64) {
        self.counters
    }

    /// Change the line cap; shrinking purges immediately.
    pub fn set_max_lines(&mut self, max_lines: usize) {
        self.max_lines = max_lines.max(1);
        while self.text_lines > self.max_lines {
            self.pop_oldest();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.bytes = 0;
        self.text_lines = 0;
    }

    /// Concatenated text of every line, for saving the display to a file.
    pub fn text(&self) -> String {
        self.lines.iter().map(|l| l.text.as_str()).collect()
    }

    fn pop_oldest(&mut self) {
        if let Some(line) = self.lines.pop_front() {
            self.bytes -= line.text.len();
            self.text_lines -= count_lines(&line.text);
        }
    }

    /// Make room for an entry of `incoming_bytes` spanning `incoming_lines`.
    fn purge_for(&mut self, incoming_bytes: usize, incoming_lines: usize) {
        let line_room = self.max_lines - incoming_lines;
        match self.policy {
            PurgePolicy::HardCap => {
                while !self.lines.is_empty() && self.text_lines > line_room {
                    self.pop_oldest();
                }
            }
            PurgePolicy::SizeAware { byte_cap } => {
                let over_lines = self.text_lines > line_room;
                let over_bytes = self.bytes + incoming_bytes > byte_cap;
                if !over_lines && !over_bytes {
                    return;
                }
                let keep_lines = (self.max_lines * RETAIN_PERCENT / 100).min(line_room);
                let keep_bytes = byte_cap * RETAIN_PERCENT / 100;
                let before = self.lines.len();
                while !self.lines.is_empty()
                    && (self.text_lines > keep_lines || self.bytes > keep_bytes)
                {
                    self.pop_oldest();
                }
                log::debug!(
                    "Display purge dropped {} line(s), {} left",
                    before - self.lines.len(),
                    self.lines.len()
                );
            }
        }
    }
}

impl UiSink for DisplayLog {
    fn append_line(&mut self, text: &str, style: StyleHint) {
        let text = last_lines(text, self.max_lines);
        let incoming_lines = count_lines(text);
        self.purge_for(text.len(), incoming_lines);
        self.bytes += text.len();
        self.text_lines += incoming_lines;
        self.lines.push_back(DisplayLine {
            text: text.to_string(),
            style,
        });
    }

    fn update_counters(&mut self, rx: u64, tx: u64) {
        self.counters = (rx, tx);
    }
}

fn count_lines(text: &str) -> usize {
    text.matches('\n').count() + usize::from(!text.is_empty() && !text.ends_with('\n'))
}

/// Tail of `text` holding at most `keep` lines.
fn last_lines(text: &str, keep: usize) -> &str {
    let body = text.strip_suffix('\n').unwrap_or(text);
    match body.rmatch_indices('\n').nth(keep.saturating_sub(1)) {
        Some((at, _)) => &text[at + 1..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_cap_keeps_exactly_max_lines() {
        let mut log = DisplayLog::new(3, PurgePolicy::HardCap);
        for i in 0..10 {
            log.append_line(&format!("line {i}\n"), StyleHint::Rx);
            assert!(log.len() <= 3);
        }
        let texts: Vec<_> = log.lines().map(|l| l.text.clone()).collect();
        assert_eq!(texts, vec!["line 7\n", "line 8\n", "line 9\n"]);
    }

    #[test]
    fn size_aware_purges_to_eighty_percent_of_lines() {
        let mut log = DisplayLog::new(10, PurgePolicy::SizeAware { byte_cap: 1 << 20 });
        for i in 0..10 {
            log.append_line(&format!("{i}"), StyleHint::Info);
        }
        assert_eq!(log.len(), 10);
        log.append_line("10", StyleHint::Info);
        // purged to 8, then the new line
        assert_eq!(log.len(), 9);
        assert_eq!(log.lines().next().unwrap().text, "2");
    }

    #[test]
    fn size_aware_honours_byte_cap() {
        let mut log = DisplayLog::new(1000, PurgePolicy::SizeAware { byte_cap: 100 });
        for _ in 0..30 {
            log.append_line("0123456789", StyleHint::Rx);
            assert!(log.byte_len() <= 100);
            assert!(log.len() <= 1000);
        }
        assert_eq!(log.byte_len(), log.text().len());
    }

    #[test]
    fn shrinking_cap_purges_and_clear_resets_bytes() {
        let mut log = DisplayLog::default();
        for i in 0..5 {
            log.append_line(&format!("{i}\n"), StyleHint::Tx);
        }
        log.set_max_lines(2);
        assert_eq!(log.text(), "3\n4\n");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.byte_len(), 0);
        assert_eq!(log.line_count(), 0);
    }

    #[test]
    fn multi_line_frames_count_every_row() {
        let frame: String = (0..50).map(|i| format!("row {i}\n")).collect();
        let mut log = DisplayLog::new(10, PurgePolicy::HardCap);
        log.append_line("before\n", StyleHint::Info);
        log.append_line(&frame, StyleHint::Rx);

        assert_eq!(log.line_count(), 10);
        assert_eq!(log.text().matches('\n').count(), 10);
        assert!(log.text().starts_with("row 40\n"));
        assert!(log.text().ends_with("row 49\n"));

        log.append_line("a\nb\nc", StyleHint::Rx);
        assert_eq!(log.line_count(), 3);
        assert_eq!(log.text(), "a\nb\nc");
    }

    #[test]
    fn size_aware_drops_whole_entries_by_row_count() {
        let mut log = DisplayLog::new(10, PurgePolicy::SizeAware { byte_cap: 1 << 20 });
        for i in 0..3 {
            log.append_line(&format!("{i}a\n{i}b\n{i}c\n"), StyleHint::Rx);
        }
        assert_eq!(log.line_count(), 9);
        log.append_line("x\ny\n", StyleHint::Rx);
        // 11 rows would overflow: oldest frames go until 8 remain at most
        assert_eq!(log.len(), 3);
        assert_eq!(log.line_count(), 8);
        assert!(log.text().starts_with("1a\n"));
    }
}
