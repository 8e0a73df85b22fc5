//! UI-independent application logic.
//!
//! Everything here runs on the UI/control thread except [`logs::SessionLog`],
//! which may be written from any thread. Front ends only need a
//! [`display::UiSink`] implementation to drive a [`runtime::Terminal`].
pub mod bus;
pub mod display;
pub mod history;
pub mod logs;
pub mod macros;
pub mod palette;
pub mod persistence;
pub mod runtime;

pub use bus::{AppEvent, EventBus, EventKind};
pub use display::{DisplayLog, PurgePolicy, StyleHint, UiSink};
pub use runtime::Terminal;
