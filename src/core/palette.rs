//! Canned AT command catalogues for common serial modules.

use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteCommand {
    pub command: &'static str,
    pub description: &'static str,
}

impl PaletteCommand {
    /// Commands with `<placeholders>` must be edited before sending.
    pub fn needs_arguments(&self) -> bool {
        self.command.contains('<')
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaletteCategory {
    pub name: &'static str,
    pub commands: &'static [PaletteCommand],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum Palette {
    #[strum(serialize = "esp8266", serialize = "esp", to_string = "ESP8266")]
    Esp8266,
    #[strum(serialize = "hc05", serialize = "hc06", serialize = "bt", to_string = "HC-05/HC-06")]
    Hc05,
}

impl Palette {
    pub fn categories(self) -> &'static [PaletteCategory] {
        match self {
            Self::Esp8266 => ESP8266,
            Self::Hc05 => HC05,
        }
    }

    pub fn commands(self) -> impl Iterator<Item = &'static PaletteCommand> {
        self.categories().iter().flat_map(|c| c.commands.iter())
    }

    pub fn find(self, command: &str) -> Option<&'static PaletteCommand> {
        self.commands()
            .find(|c| c.command.eq_ignore_ascii_case(command.trim()))
    }
}

const fn cmd(command: &'static str, description: &'static str) -> PaletteCommand {
    PaletteCommand {
        command,
        description,
    }
}

static ESP8266: &[PaletteCategory] = &[
    PaletteCategory {
        name: "Basic",
        commands: &[
            cmd("AT", "Liveness test. Answers 'OK' when the module works."),
            cmd("AT+RST", "Restart the ESP8266."),
            cmd("AT+GMR", "Show the firmware version."),
            cmd("AT+GSLP=<time>", "Deep sleep for <time> milliseconds."),
            cmd("ATE0", "Disable command echo."),
            cmd("ATE1", "Enable command echo."),
        ],
    },
    PaletteCategory {
        name: "WiFi",
        commands: &[
            cmd("AT+CWMODE=<mode>", "Set WiFi mode: 1=Station, 2=AP, 3=Station+AP."),
            cmd("AT+CWMODE?", "Show the current WiFi mode."),
            cmd("AT+CWJAP=\"<ssid>\",\"<password>\"", "Join a WiFi network."),
            cmd("AT+CWJAP?", "Show the joined network."),
            cmd("AT+CWLAP", "List available access points."),
            cmd("AT+CWQAP", "Leave the current network."),
            cmd("AT+CWSAP=\"<ssid>\",\"<pwd>\",<chl>,<ecn>", "Configure the soft access point."),
            cmd("AT+CWSAP?", "Show the soft access point configuration."),
        ],
    },
    PaletteCategory {
        name: "TCP/IP",
        commands: &[
            cmd("AT+CIPSTATUS", "Show the connection status."),
            cmd("AT+CIPSTART=\"<type>\",\"<addr>\",<port>", "Open a TCP or UDP connection."),
            cmd("AT+CIPSEND=<length>", "Send <length> bytes of data."),
            cmd("AT+CIPCLOSE", "Close the TCP/UDP connection."),
            cmd("AT+CIFSR", "Show the local IP address."),
            cmd("AT+CIPMUX=<mode>", "Enable (1) or disable (0) multiple connections."),
            cmd("AT+CIPSERVER=<mode>[,<port>]", "Run a TCP server."),
        ],
    },
    PaletteCategory {
        name: "Advanced",
        commands: &[
            cmd(
                "AT+UART_DEF=<baud>,<databits>,<stopbits>,<parity>,<flow control>",
                "Set the default UART parameters.",
            ),
            cmd(
                "AT+UART_CUR=<baud>,<databits>,<stopbits>,<parity>,<flow control>",
                "Set the UART parameters until the next restart.",
            ),
            cmd("AT+SLEEP=<mode>", "Sleep mode: 0=off, 1=light, 2=modem."),
            cmd("AT+RFPOWER=<power>", "RF transmit power, 0 to 82."),
            cmd("AT+CWDHCP=<mode>,<en>", "DHCP: mode 0/1/2 (STA/AP/both), en 0/1 (off/on)."),
            cmd("AT+RESTORE", "Restore factory settings."),
        ],
    },
];

static HC05: &[PaletteCategory] = &[
    PaletteCategory {
        name: "Basic",
        commands: &[
            cmd("AT", "Liveness test. Answers 'OK' when the module works."),
            cmd("AT+VERSION", "Show the firmware version."),
            cmd("AT+NAME", "Show the module name."),
            cmd("AT+NAME=<name>", "Rename the module."),
            cmd("AT+RESET", "Restart the module."),
        ],
    },
    PaletteCategory {
        name: "Bluetooth",
        commands: &[
            cmd("AT+ADDR", "Show the module MAC address."),
            cmd("AT+ROLE=0", "Slave role (HC-05 only)."),
            cmd("AT+ROLE=1", "Master role (HC-05 only)."),
            cmd("AT+PSWD=<code>", "Set the pairing PIN, usually 1234."),
            cmd("AT+PIN<code>", "Set the pairing PIN (HC-06 syntax)."),
            cmd("AT+POLAR=<0/1>,<0/1>", "Polarity of the state pins (HC-05 only)."),
        ],
    },
    PaletteCategory {
        name: "UART",
        commands: &[
            cmd("AT+UART=<baud>,<stop>,<parity>", "UART parameters (HC-05), e.g. AT+UART=9600,0,0"),
            cmd(
                "AT+BAUD<n>",
                "Baud rate (HC-06): 1=1200 2=2400 3=4800 4=9600 5=19200 6=38400 7=57600 8=115200",
            ),
            cmd("AT+ORGL", "Restore factory settings (HC-05 only)."),
            cmd("AT+RMAAD", "Forget all paired devices (HC-05 only)."),
        ],
    },
    PaletteCategory {
        name: "Connection (HC-05 only)",
        commands: &[
            cmd("AT+STATE", "Show the connection state."),
            cmd("AT+INIT", "Initialise the SPP profile."),
            cmd("AT+INQ", "Scan for nearby devices."),
            cmd("AT+LINK=<addr>", "Connect to the given MAC address."),
            cmd("AT+DISC", "Drop the current connection."),
            cmd("AT+CMODE=0", "Only connect to the bound address."),
            cmd("AT+CMODE=1", "Connect to any available device."),
        ],
    },
];
