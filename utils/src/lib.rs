//! Shared utilities for the Tandem workspace.

pub mod backoff;
pub mod logging;
pub mod stats;
pub mod time;

pub use backoff::{retry, Backoff};
pub use logging::init_tracing;
pub use stats::StatsCounter;
pub use time::{format_duration, Clock, SystemClock};
