//! # Remora Utilities
//!
//! Logging setup shared by programs and test harnesses that embed
//! `remora-core`.

pub mod logging;

pub use logging::{
    LogFormat, LogLevel, LoggingError, LoggingGuard, init_logging, init_logging_to_file, init_logging_with_level,
};
pub use tracing::{debug, error, info, trace, warn};
