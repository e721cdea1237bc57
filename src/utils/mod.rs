//! Utility modules

pub mod command;
pub mod executor;
pub mod fs;
pub mod interrupt;
pub mod oauth;
pub mod retention;

// Re-export commonly used types and traits (used by test crate)
pub use executor::{CommandExecutor, RealExecutor};
pub use interrupt::{Interrupt, Interrupted};
