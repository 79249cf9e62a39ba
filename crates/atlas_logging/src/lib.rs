// Logging setup: console and size-rotating file sinks, per-level console
// formatting and routing of named loggers (tracing targets) to sinks.

pub mod config;
pub mod formatter;
pub mod level;
pub mod rotating_file;

pub use config::{Logging, LoggingConfig};
