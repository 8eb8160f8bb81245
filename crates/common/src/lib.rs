//! Common types and utilities shared across all crates

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::*;
pub use error::{KxError, Result};
pub use logging::init_tracing;
