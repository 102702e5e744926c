//! Command implementations

mod clean;
mod config;
mod stats;

pub use clean::clean;
pub use config::config;
pub use stats::stats;
