pub const MAX_HISTORY: usize = 100;

/// Sent-command history with shell-style cursor navigation.
///
/// The cursor sits one past the newest entry after every record, so the
/// first `previous` returns the most recent command.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: Vec<String>,
    cursor: usize,
    capacity: usize,
}

impl Default for CommandHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_HISTORY)
    }
}

impl CommandHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Store a sent command. Exact duplicates are not stored twice, but the
    /// cursor is reset either way.
    pub fn record(&mut self, text: &str) {
        if !self.entries.iter().any(|e| e == text) {
            self.entries.push(text.to_string());
            if self.entries.len() > self.capacity {
                self.entries.remove(0);
            }
        }
        self.cursor = self.entries.len();
    }

    /// Step back; stays on the oldest entry once reached.
    pub fn previous(&mut self) -> Option<&str> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor > 0 {
            self.cursor -= 1;
        }
        self.entries.get(self.cursor).map(String::as_str)
    }

    /// Step forward. Moving past the newest entry yields `None`, meaning
    /// the input field should be cleared.
    pub fn next(&mut self) -> Option<&str> {
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            self.entries.get(self.cursor).map(String::as_str)
        } else {
            self.cursor = self.entries.len();
            None
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_hundred_distinct_commands() {
        let mut history = CommandHistory::new();
        for i in 0..150 {
            history.record(&format!("cmd{i}"));
        }
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.entries()[0], "cmd50");
        assert_eq!(history.entries()[99], "cmd149");
    }

    #[test]
    fn duplicates_are_not_stored_again() {
        let mut history = CommandHistory::new();
        history.record("AT");
        history.record("AT+GMR");
        history.record("AT");
        assert_eq!(history.entries(), ["AT", "AT+GMR"]);
        assert_eq!(history.previous(), Some("AT+GMR"));
    }

    #[test]
    fn navigation_walks_and_clears_past_the_end() {
        let mut history = CommandHistory::new();
        assert_eq!(history.previous(), None);
        for cmd in ["a", "b", "c"] {
            history.record(cmd);
        }
        assert_eq!(history.previous(), Some("c"));
        assert_eq!(history.previous(), Some("b"));
        assert_eq!(history.previous(), Some("a"));
        assert_eq!(history.previous(), Some("a"));
        assert_eq!(history.next(), Some("b"));
        assert_eq!(history.next(), Some("c"));
        assert_eq!(history.next(), None);
        assert_eq!(history.previous(), Some("c"));
    }
}
