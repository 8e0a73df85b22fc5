use anyhow::{anyhow, Context, Result};
use std::{path::PathBuf, str::FromStr};

use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::{
    core::{palette::Palette, persistence::TerminalSettings},
    protocol::{
        config::{DataBits, FlowControl, Parity, StopBits},
        encode::{EolMode, SendFormat},
        format::DisplayMode,
        link::SerialBackend,
    },
};

pub fn build_command() -> Command {
    Command::new("crazyterm")
        .about("Interactive serial terminal")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("list-ports")
                .long("list-ports")
                .short('l')
                .help("List all available serial ports and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .help("Output one-shot results in JSON format")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("palette")
                .long("palette")
                .help("Print an AT command palette (esp8266, hc05) and exit")
                .value_name("MODULE"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .help("Serial device to open on start")
                .value_name("DEVICE"),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .short('b')
                .help("Baud rate")
                .value_name("BAUD")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new("data-bits")
                .long("data-bits")
                .value_name("BITS")
                .value_parser(["5", "6", "7", "8"]),
        )
        .arg(
            Arg::new("parity")
                .long("parity")
                .value_name("PARITY")
                .value_parser(["none", "even", "odd"]),
        )
        .arg(
            Arg::new("stop-bits")
                .long("stop-bits")
                .value_name("BITS")
                .value_parser(["1", "1.5", "2"]),
        )
        .arg(
            Arg::new("flow")
                .long("flow")
                .help("Flow control")
                .value_name("MODE")
                .value_parser(["none", "xon_xoff", "rts_cts", "dsr_dtr"]),
        )
        .arg(
            Arg::new("display")
                .long("display")
                .short('d')
                .help("How received frames are shown")
                .value_name("MODE")
                .value_parser(["ascii", "hex", "both"]),
        )
        .arg(
            Arg::new("send-format")
                .long("send-format")
                .help("How typed input is encoded")
                .value_name("FORMAT")
                .value_parser(["ascii", "hex"]),
        )
        .arg(
            Arg::new("eol")
                .long("eol")
                .help("Line ending appended to every send")
                .value_name("EOL")
                .value_parser(["none", "nl", "cr", "nlcr"]),
        )
        .arg(
            Arg::new("timestamp")
                .long("timestamp")
                .short('t')
                .help("Prefix received frames with the time of day")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("timing")
                .long("timing")
                .help("With --timestamp, also show the delay since the previous frame")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("filter")
                .long("filter")
                .short('f')
                .help("Only show frames matching this regular expression")
                .value_name("REGEX"),
        )
        .arg(
            Arg::new("log")
                .long("log")
                .help("Append the session to this log file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Settings file (default: crazyterm_settings.json in the working directory)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("loopback")
                .long("loopback")
                .help("Use a virtual echo device instead of real serial ports")
                .action(ArgAction::SetTrue),
        )
}

/// Parse command line arguments and return ArgMatches.
pub fn parse_args() -> ArgMatches {
    build_command().get_matches()
}

fn parse_choice<T: FromStr>(matches: &ArgMatches, id: &str) -> Result<Option<T>> {
    matches
        .get_one::<String>(id)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| anyhow!("invalid value {raw:?} for --{id}"))
        })
        .transpose()
}

/// Layer command line options over loaded settings.
pub fn apply_overrides(matches: &ArgMatches, settings: &mut TerminalSettings) -> Result<()> {
    if let Some(port) = matches.get_one::<String>("port") {
        settings.port = port.clone();
    }
    if let Some(baud) = matches.get_one::<u32>("baud") {
        settings.baud_rate = *baud;
    }
    if let Some(v) = parse_choice::<DataBits>(matches, "data-bits")? {
        settings.data_bits = v;
    }
    if let Some(v) = parse_choice::<Parity>(matches, "parity")? {
        settings.parity = v;
    }
    if let Some(v) = parse_choice::<StopBits>(matches, "stop-bits")? {
        settings.stop_bits = v;
    }
    if let Some(v) = parse_choice::<FlowControl>(matches, "flow")? {
        settings.flow_control = v;
    }
    if let Some(v) = parse_choice::<DisplayMode>(matches, "display")? {
        settings.display_mode = v;
    }
    if let Some(v) = parse_choice::<SendFormat>(matches, "send-format")? {
        settings.send_format = v;
    }
    if let Some(v) = parse_choice::<EolMode>(matches, "eol")? {
        settings.eol = v;
    }
    if matches.get_flag("timestamp") {
        settings.timestamp = true;
    }
    if matches.get_flag("timing") {
        settings.show_timing = true;
    }
    if let Some(filter) = matches.get_one::<String>("filter") {
        settings.filter = filter.clone();
        settings.enable_filter = true;
    }
    Ok(())
}

pub fn print_palette(palette: Palette, json: bool) -> Result<()> {
    if json {
        let s = serde_json::to_string_pretty(palette.categories())
            .context("Failed to serialize palette")?;
        println!("{s}");
        return Ok(());
    }
    println!("{palette} AT commands");
    for category in palette.categories() {
        println!();
        println!("[{}]", category.name);
        for cmd in category.commands {
            println!("  {:<40} {}", cmd.command, cmd.description);
        }
    }
    Ok(())
}

/// Handle flags that print something and exit. Returns true when one ran.
pub fn run_one_shot_actions(matches: &ArgMatches, backend: &dyn SerialBackend) -> Result<bool> {
    let want_json = matches.get_flag("json");

    if matches.get_flag("list-ports") {
        let ports = backend.enumerate();
        if want_json {
            let s = serde_json::to_string_pretty(&ports).context("Failed to serialize ports")?;
            println!("{s}");
        } else if ports.is_empty() {
            eprintln!("No serial port detected");
        } else {
            for p in &ports {
                println!("{}\t{}", p.device_name, p.description);
            }
        }
        return Ok(true);
    }

    if let Some(name) = matches.get_one::<String>("palette") {
        let palette: Palette = name
            .parse()
            .map_err(|_| anyhow!("unknown palette {name:?}, expected esp8266 or hc05"))?;
        print_palette(palette, want_json)?;
        return Ok(true);
    }

    Ok(false)
}
