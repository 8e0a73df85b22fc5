pub mod config;
pub mod daemon;
pub mod encode;
pub mod format;
pub mod frame;
pub mod link;
pub mod loopback;
pub mod ports;
pub mod runtime;
pub mod tty;
