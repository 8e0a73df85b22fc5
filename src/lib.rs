//! CrazyTerm: an interactive serial-port terminal.
//!
//! The [`protocol`] layer owns the serial link, the reader thread and the
//! framing/formatting pipeline. [`core`] holds the UI-independent controller
//! ([`core::Terminal`]) with history, macros, logging and settings, and
//! [`console`] is the stdin/stdout front end used by the binary.

#[doc(hidden)]
pub mod boot;
#[doc(hidden)]
pub mod cli;
pub mod console;
pub mod core;
pub mod error;
pub mod protocol;
pub mod utils;

pub use error::TerminalError;
