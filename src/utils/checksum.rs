//! Checksum calculator and ASCII/HEX converter tools.

use crate::{error::TerminalError, protocol::format::decode_text};

/// Modulo-256 sum of all bytes.
pub fn sum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

pub fn xor8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF).
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &b in data {
        crc ^= b as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksums {
    pub sum8: u8,
    pub xor8: u8,
    pub crc16_modbus: u16,
}

impl Checksums {
    pub fn of(data: &[u8]) -> Self {
        Self {
            sum8: sum8(data),
            xor8: xor8(data),
            crc16_modbus: crc16_modbus(data),
        }
    }
}

impl std::fmt::Display for Checksums {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SUM8=0x{:02X} XOR8=0x{:02X} CRC16/MODBUS=0x{:04X}",
            self.sum8, self.xor8, self.crc16_modbus
        )
    }
}

/// Each character's code point as uppercase hex, space separated.
pub fn text_to_hex(text: &str) -> String {
    text.chars()
        .map(|c| format!("{:02X}", c as u32))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strict hex parse: whitespace is ignored, anything else must form
/// complete byte pairs.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, TerminalError> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(TerminalError::Encoding("invalid hex data".to_string()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|err| TerminalError::Encoding(format!("invalid hex data: {err}")))
}

/// Decode hex to text, replacing invalid UTF-8.
pub fn hex_to_text(text: &str) -> Result<String, TerminalError> {
    parse_hex(text).map(|bytes| decode_text(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modbus_crc_matches_reference_frame() {
        // read holding registers request, slave 1, addr 0, count 10
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_modbus(&frame), 0xCDC5);
        assert_eq!(crc16_modbus(b"123456789"), 0x4B37);
    }

    #[test]
    fn simple_checksums() {
        let sums = Checksums::of(&[0xFF, 0x02, 0x10]);
        assert_eq!(sums.sum8, 0x11);
        assert_eq!(sums.xor8, 0xED);
        assert!(sums.to_string().starts_with("SUM8=0x11 XOR8=0xED"));
    }

    #[test]
    fn converter_both_ways() {
        assert_eq!(text_to_hex("AT\r"), "41 54 0D");
        assert_eq!(text_to_hex("é"), "E9");
        assert_eq!(hex_to_text("4F 4B").unwrap(), "OK");
        assert_eq!(hex_to_text("C3A9").unwrap(), "é");
        assert!(hex_to_text("4F 4").is_err());
        assert!(hex_to_text("zz").is_err());
    }
}
