pub mod serial_daemon;

pub use serial_daemon::{boot_serial_loop, ReaderContext};
