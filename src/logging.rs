//! Logging capability
//!
//! Components receive an `Arc<dyn Logger>` at construction instead of
//! reaching for a process-wide logger. The default implementation forwards
//! to `tracing`, so the subscriber installed by the binary decides output.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Injected logging capability
pub trait Logger: Send + Sync {
    /// Emit one message at the given level
    fn log(&self, level: Level, message: fmt::Arguments<'_>);

    fn error(&self, message: fmt::Arguments<'_>) {
        self.log(Level::ERROR, message);
    }

    fn warn(&self, message: fmt::Arguments<'_>) {
        self.log(Level::WARN, message);
    }

    fn info(&self, message: fmt::Arguments<'_>) {
        self.log(Level::INFO, message);
    }

    fn debug(&self, message: fmt::Arguments<'_>) {
        self.log(Level::DEBUG, message);
    }
}

/// Logger that forwards every message to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        if level == Level::ERROR {
            tracing::error!("{}", message);
        } else if level == Level::WARN {
            tracing::warn!("{}", message);
        } else if level == Level::INFO {
            tracing::info!("{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!("{}", message);
        } else {
            tracing::trace!("{}", message);
        }
    }
}

/// Logger that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<(Level, String)>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded messages, oldest first
    pub fn entries(&self) -> Vec<(Level, String)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether any message at `level` contains `needle`
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: Level, message: fmt::Arguments<'_>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

/// Output format for the `tracing` subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse the `general.log_format` config value; unknown values fall back to text
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Install the global `tracing` subscriber.
///
/// 0 = warn, 1 = info, 2+ = debug. `RUST_LOG` is not consulted so that the
/// verbosity flag stays authoritative.
pub fn init_tracing(verbosity: u8, format: LogFormat) {
    let filter = match verbosity {
        0 => EnvFilter::new("mtbcat=warn"),
        1 => EnvFilter::new("mtbcat=info"),
        _ => EnvFilter::new("mtbcat=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    // A second init (tests, embedding) keeps the first subscriber
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.without_time().try_init(),
    };
}
