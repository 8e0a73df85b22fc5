//! User-defined command shortcuts, edited as `Name = COMMAND` lines.

pub const MAX_SAVED_COMMANDS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    pub name: String,
    pub command: String,
}

/// Split one line into a macro; comments, blanks and lines without `=` are `None`.
fn parse_line(line: &str) -> Option<Macro> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (name, command) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Macro {
        name: name.to_string(),
        command: command.trim().to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroSet {
    macros: Vec<Macro>,
    limit: usize,
}

impl Default for MacroSet {
    fn default() -> Self {
        Self {
            macros: Vec::new(),
            limit: MAX_SAVED_COMMANDS,
        }
    }
}

/// Outcome of [`MacroSet::save_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedMacros {
    /// Text to persist and show back in the editor.
    pub text: String,
    /// Set when valid lines beyond the limit were dropped.
    pub truncated: bool,
}

impl MacroSet {
    /// Parse editor text, keeping at most `limit` macros in order.
    pub fn parse(text: &str, limit: usize) -> Self {
        let macros = text.lines().filter_map(parse_line).take(limit).collect();
        Self { macros, limit }
    }

    /// Normalise editor text before saving. The text is kept verbatim,
    /// comments included, unless it holds more than `limit` macros; then it
    /// is replaced by the first `limit` macro lines alone.
    pub fn save_text(text: &str, limit: usize) -> SavedMacros {
        let valid: Vec<&str> = text
            .lines()
            .filter(|line| parse_line(line).is_some())
            .map(str::trim)
            .collect();
        if valid.len() > limit {
            log::info!("Saved commands limited to {limit}");
            SavedMacros {
                text: valid[..limit].join("\n"),
                truncated: true,
            }
        } else {
            SavedMacros {
                text: text.to_string(),
                truncated: false,
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.iter()
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Case-insensitive lookup by name.
    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# ESP8266\nReset = AT+RST\n\nbroken line\nJoin = AT+CWJAP=\"ssid\",\"pw\"\n  Version=AT+GMR  \n";

    #[test]
    fn parses_names_and_commands() {
        let set = MacroSet::parse(SAMPLE, MAX_SAVED_COMMANDS);
        let pairs: Vec<_> = set
            .iter()
            .map(|m| (m.name.as_str(), m.command.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Reset", "AT+RST"),
                ("Join", "AT+CWJAP=\"ssid\",\"pw\""),
                ("Version", "AT+GMR"),
            ]
        );
        assert_eq!(set.get("version").unwrap().command, "AT+GMR");
    }

    #[test]
    fn parse_caps_the_number_of_macros() {
        let text: String = (0..15).map(|i| format!("M{i} = CMD{i}\n")).collect();
        let set = MacroSet::parse(&text, MAX_SAVED_COMMANDS);
        assert_eq!(set.len(), MAX_SAVED_COMMANDS);
        assert_eq!(set.iter().last().unwrap().name, "M9");
    }

    #[test]
    fn save_keeps_text_within_limit() {
        let saved = MacroSet::save_text(SAMPLE, MAX_SAVED_COMMANDS);
        assert!(!saved.truncated);
        assert_eq!(saved.text, SAMPLE);
    }

    #[test]
    fn save_truncates_to_first_valid_lines() {
        let saved = MacroSet::save_text("# head\nA=1\nB=2\nnoise\n C = 3 \n", 2);
        assert!(saved.truncated);
        assert_eq!(saved.text, "A=1\nB=2");
    }
}
