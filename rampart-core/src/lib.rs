//! Shared types for the rampart load generator: stage schedules, thresholds,
//! metric samples and run summaries.
mod config;
mod constants;
mod error;
mod metric;
mod profile;
mod stats;
mod threshold;

pub use config::*;
pub use constants::*;
pub use error::*;
pub use metric::*;
pub use profile::*;
pub use stats::*;
pub use threshold::*;
