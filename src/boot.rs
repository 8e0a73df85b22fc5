use chrono::Local;
use log::LevelFilter;
use std::io::{self, Write};

use env_logger::{Builder, Target};

/// Environment variable naming a file that receives the diagnostic log.
pub const LOG_FILE_ENV: &str = "CRAZYTERM_LOG_FILE";

/// Set up diagnostics. Logs go to the file named by `CRAZYTERM_LOG_FILE`
/// (always in debug builds) so they never interleave with terminal output.
pub fn init_common() {
    let log_file = std::env::var(LOG_FILE_ENV).ok().or_else(|| {
        #[cfg(debug_assertions)]
        {
            Some(format!(
                "./crazyterm_{}.log",
                Local::now().format("%Y%m%d%H%M%S")
            ))
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    });

    if let Some(path) = log_file {
        if let Err(err) = init_file_logger(&path) {
            eprintln!("Failed to initialize file logger at '{path}': {err}");
            env_logger::init();
        }
    } else {
        env_logger::init();
    }
}

fn init_file_logger(path: &str) -> io::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;

    let mut builder = Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} {} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(Target::Pipe(Box::new(file)))
        .filter_level(LevelFilter::Debug)
        .parse_default_env()
        .init();

    log::info!("File logger initialized at {path}");

    Ok(())
}
