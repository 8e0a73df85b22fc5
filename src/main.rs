use anyhow::Result;
use std::path::PathBuf;

use crazyterm::{
    boot, cli,
    console::{self, ConsoleOptions},
    core::persistence::{default_settings_path, JsonFileStore, TerminalSettings},
    protocol::{link::SerialBackend, link::SystemBackend, loopback::MemoryBackend},
};

fn main() -> Result<()> {
    boot::init_common();
    let matches = cli::parse_args();

    let backend: Box<dyn SerialBackend> = if matches.get_flag("loopback") {
        log::info!("Using the loopback device");
        Box::new(MemoryBackend::new(&["loop0"]).echoing())
    } else {
        Box::new(SystemBackend)
    };

    if cli::run_one_shot_actions(&matches, backend.as_ref())? {
        return Ok(());
    }

    let path = match matches.get_one::<PathBuf>("config") {
        Some(path) => path.clone(),
        None => default_settings_path()?,
    };
    let store = JsonFileStore::open(&path)?;
    let mut settings = TerminalSettings::load(&store);
    cli::apply_overrides(&matches, &mut settings)?;

    let options = ConsoleOptions {
        connect: matches.contains_id("port"),
        log_path: matches.get_one::<PathBuf>("log").cloned(),
    };
    console::run(backend, settings, store, options)
}
