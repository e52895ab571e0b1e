//! Logging infrastructure for Lyri.
//!
//! This module provides:
//! - Per-task loggers with file + sink output
//! - Compact mode that keeps tool output out of the log until a failure
//! - Tail buffer for error diagnosis
//! - Integration with the `tracing` ecosystem
//!
//! # Example
//!
//! ```no_run
//! use lyri_core::logging::{LogConfig, TaskLogger};
//!
//! let logger = TaskLogger::new("3f2a", "/var/log/lyri", LogConfig::default()).unwrap();
//! logger.stage("Separate");
//! logger.command("audio-separator song.wav ...");
//! logger.success("Stems ready");
//! ```

mod task_logger;
mod types;

pub use task_logger::{sanitize_filename, TaskLogger};
pub use types::{LogConfig, LogLevel, LogSink, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Output goes to stderr. Calling
/// this twice is harmless.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter_str()));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init();
}

/// Initialize tracing for tests (only logs warnings and above).
#[cfg(test)]
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("warn")
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_test_tracing();
        init_tracing(LogLevel::Debug);
        init_tracing(LogLevel::Info);
    }
}
