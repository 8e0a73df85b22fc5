//! Outbound encoding of user input.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::error::TerminalError;

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
pub enum SendFormat {
    #[default]
    Ascii,
    Hex,
}

/// Line ending appended to every send.
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
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum EolMode {
    #[default]
    None,
    Nl,
    Cr,
    NlCr,
}

impl EolMode {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Self::None => b"",
            Self::Nl => b"\n",
            Self::Cr => b"\r",
            Self::NlCr => b"\r\n",
        }
    }

    /// Label shown after the echoed text, e.g. `TX: AT + NL+CR`.
    pub fn label(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Nl => Some("NL"),
            Self::Cr => Some("CR"),
            Self::NlCr => Some("NL+CR"),
        }
    }
}

/// Result of encoding one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    /// Non-fatal remark to show before the TX line.
    pub warning: Option<String>,
}

pub const ODD_HEX_WARNING: &str = "Odd number of hex digits, padded with a trailing 0";

/// Keep only hex digits from free-form input such as `"41 42-4"`.
pub fn clean_hex(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_hexdigit()).collect()
}

pub fn encode(text: &str, format: SendFormat, eol: EolMode) -> Result<Encoded, TerminalError> {
    let (mut bytes, warning) = match format {
        SendFormat::Ascii => (text.as_bytes().to_vec(), None),
        SendFormat::Hex => decode_hex_input(text)?,
    };
    bytes.extend_from_slice(eol.bytes());
    Ok(Encoded { bytes, warning })
}

fn decode_hex_input(text: &str) -> Result<(Vec<u8>, Option<String>), TerminalError> {
    let mut digits = clean_hex(text);
    if digits.is_empty() {
        return Err(TerminalError::Encoding("no valid hex data".to_string()));
    }
    let mut warning = None;
    if digits.len() % 2 != 0 {
        digits.push('0');
        warning = Some(ODD_HEX_WARNING.to_string());
    }
    let bytes = (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|err| TerminalError::Encoding(format!("invalid hex data: {err}")))?;
    Ok((bytes, warning))
}
