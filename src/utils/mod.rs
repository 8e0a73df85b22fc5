//! Small helpers shared across the application.

pub mod checksum;
pub mod ticker;

pub use ticker::Ticker;
