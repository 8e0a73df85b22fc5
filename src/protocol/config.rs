use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumIter, EnumString};

use serialport::{FlowControl as PortFlow, Parity as PortParity, StopBits as PortStopBits};

use crate::error::{ConnectionFailure, TerminalError};

/// Hardware read timeout applied to every opened port.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum DataBits {
    #[strum(serialize = "5")]
    Five,
    #[strum(serialize = "6")]
    Six,
    #[strum(serialize = "7")]
    Seven,
    #[strum(serialize = "8")]
    Eight,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum StopBits {
    #[strum(serialize = "1")]
    One,
    #[strum(serialize = "1.5")]
    OnePointFive,
    #[strum(serialize = "2")]
    Two,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum FlowControl {
    None,
    XonXoff,
    RtsCts,
    DsrDtr,
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl Parity {
    /// Single-letter form used in `8N1` style summaries.
    pub fn letter(self) -> char {
        match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
        }
    }
}

/// Everything needed to open one serial session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub device_name: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub read_timeout: Duration,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            device_name: String::new(),
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ConnectionParams {
    pub fn new(device_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            device_name: device_name.into(),
            baud_rate,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), TerminalError> {
        if self.device_name.trim().is_empty() {
            return Err(TerminalError::connection(
                &self.device_name,
                ConnectionFailure::InvalidConfig,
                "no serial port selected",
            ));
        }
        if self.baud_rate == 0 {
            return Err(TerminalError::connection(
                &self.device_name,
                ConnectionFailure::InvalidConfig,
                "baud rate must be positive",
            ));
        }
        Ok(())
    }

    /// `"/dev/ttyUSB0 (115200 baud, 8N1)"`
    pub fn summary(&self) -> String {
        format!(
            "{} ({} baud, {}{}{})",
            self.device_name,
            self.baud_rate,
            self.data_bits.bits(),
            self.parity.letter(),
            self.stop_bits
        )
    }

    pub fn apply_builder(&self, b: serialport::SerialPortBuilder) -> serialport::SerialPortBuilder {
        let b = b.data_bits(match self.data_bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        });
        let b = b.stop_bits(match self.stop_bits {
            StopBits::One => PortStopBits::One,
            StopBits::OnePointFive => {
                log::warn!(
                    "1.5 stop bits not supported by the serial driver, opening {} with 2",
                    self.device_name
                );
                PortStopBits::Two
            }
            StopBits::Two => PortStopBits::Two,
        });
        let b = b.parity(match self.parity {
            Parity::None => PortParity::None,
            Parity::Even => PortParity::Even,
            Parity::Odd => PortParity::Odd,
        });
        let b = b.flow_control(match self.flow_control {
            FlowControl::None => PortFlow::None,
            FlowControl::XonXoff => PortFlow::Software,
            FlowControl::RtsCts => PortFlow::Hardware,
            FlowControl::DsrDtr => {
                log::warn!(
                    "DSR/DTR flow control not supported by the serial driver, using RTS/CTS on {}",
                    self.device_name
                );
                PortFlow::Hardware
            }
        });
        b.timeout(self.read_timeout)
    }
}
