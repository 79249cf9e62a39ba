use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Metadata};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry};

use atlas_interface::errors::{AppError, Result};
use atlas_interface::log_targets;

use crate::formatter::Formatter;
use crate::level::Level;
use crate::rotating_file::RotatingFileAppender;

pub const LEVEL_BASED_FORMATTER: &str = "level_based";
pub const DEFAULT_FORMATTER: &str = "default";
pub const DB_FORMATTER: &str = "db_formatter";

pub const CONSOLE_HANDLER: &str = "console";
pub const API_FILE_HANDLER: &str = "api_file_handler";
pub const DB_FILE_HANDLER: &str = "db_file_handler";

pub const API_LOG_PATH: &str = "src/logs/api.log";
pub const DB_LOG_PATH: &str = "src/logs/db.log";
pub const API_LOG_MAX_BYTES: u64 = 10_000;
pub const DB_LOG_MAX_BYTES: u64 = 100_000;
pub const LOG_BACKUP_COUNT: usize = 5; // api.log.1 to api.log.5

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Console,
    RotatingFile {
        path: PathBuf,
        max_bytes: u64,
        backup_count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HandlerConfig {
    pub formatter: String,
    #[serde(default = "lowest_level")]
    pub level: Level,
    pub sink: SinkConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggerConfig {
    pub level: Level,
    pub handlers: Vec<String>,
    // Whether records also reach the handlers of the ancestor loggers.
    #[serde(default = "propagate_by_default")]
    pub propagate: bool,
}

fn lowest_level() -> Level {
    Level::Trace
}

fn propagate_by_default() -> bool {
    true
}

/// Declarative description of formatters, handlers and named loggers.
///
/// Logger names are tracing targets; `a::b` is a child of `a`. Built once at
/// startup with [`LoggingConfig::build`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    pub formatters: BTreeMap<String, Formatter>,
    pub handlers: BTreeMap<String, HandlerConfig>,
    pub loggers: BTreeMap<String, LoggerConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::standard(API_LOG_PATH, DB_LOG_PATH)
    }
}

impl LoggingConfig {
    /// Console plus two rotating files. The web layer goes to the console
    /// and `api_log`, database commands only to `db_log`.
    pub fn standard(api_log: impl AsRef<Path>, db_log: impl AsRef<Path>) -> Self {
        let formatters = BTreeMap::from([
            (LEVEL_BASED_FORMATTER.to_string(), Formatter::LevelBased),
            (DEFAULT_FORMATTER.to_string(), Formatter::Default),
            (DB_FORMATTER.to_string(), Formatter::Database),
        ]);

        let handlers = BTreeMap::from([
            (
                CONSOLE_HANDLER.to_string(),
                HandlerConfig {
                    formatter: LEVEL_BASED_FORMATTER.to_string(),
                    level: Level::Debug,
                    sink: SinkConfig::Console,
                },
            ),
            (
                API_FILE_HANDLER.to_string(),
                HandlerConfig {
                    formatter: DEFAULT_FORMATTER.to_string(),
                    level: Level::Trace,
                    sink: SinkConfig::RotatingFile {
                        path: api_log.as_ref().to_path_buf(),
                        max_bytes: API_LOG_MAX_BYTES,
                        backup_count: LOG_BACKUP_COUNT,
                    },
                },
            ),
            (
                DB_FILE_HANDLER.to_string(),
                HandlerConfig {
                    formatter: DB_FORMATTER.to_string(),
                    level: Level::Trace,
                    sink: SinkConfig::RotatingFile {
                        path: db_log.as_ref().to_path_buf(),
                        max_bytes: DB_LOG_MAX_BYTES,
                        backup_count: LOG_BACKUP_COUNT,
                    },
                },
            ),
        ]);

        let loggers = BTreeMap::from([
            (
                log_targets::API.to_string(),
                LoggerConfig {
                    level: Level::Debug,
                    handlers: vec![CONSOLE_HANDLER.to_string(), API_FILE_HANDLER.to_string()],
                    propagate: false,
                },
            ),
            (
                log_targets::DB_COMMAND.to_string(),
                LoggerConfig {
                    level: Level::Debug,
                    handlers: vec![DB_FILE_HANDLER.to_string()],
                    propagate: false,
                },
            ),
        ]);

        Self {
            formatters,
            handlers,
            loggers,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, handler) in &self.handlers {
            if !self.formatters.contains_key(&handler.formatter) {
                return Err(AppError::ConfigurationError {
                    msg: format!(
                        "handler '{}' uses unknown formatter '{}'",
                        name, handler.formatter
                    ),
                });
            }
        }

        for (name, logger) in &self.loggers {
            if let Some(handler) = logger
                .handlers
                .iter()
                .find(|h| !self.handlers.contains_key(*h))
            {
                return Err(AppError::ConfigurationError {
                    msg: format!("logger '{}' uses unknown handler '{}'", name, handler),
                });
            }
        }

        Ok(())
    }

    /// Whether records of `logger` end up in `handler`, walking up the
    /// ancestors while propagation stays enabled.
    pub fn reaches(&self, logger: &str, handler: &str) -> bool {
        let mut current = Some(logger);

        while let Some(name) = current {
            if let Some(config) = self.loggers.get(name) {
                if config.handlers.iter().any(|h| h == handler) {
                    return true;
                }
                if !config.propagate {
                    return false;
                }
            }
            current = parent(name);
        }

        false
    }

    // One entry per configured logger: unreachable loggers are turned off
    // explicitly so a parent entry does not leak into them.
    fn handler_routes(&self, name: &str, handler: &HandlerConfig) -> HandlerRoutes {
        let levels = self
            .loggers
            .iter()
            .map(|(logger_name, logger)| {
                let level = if self.reaches(logger_name, name) {
                    logger.level.max(handler.level).as_filter()
                } else {
                    LevelFilter::OFF
                };
                (logger_name.clone(), level)
            })
            .collect();

        HandlerRoutes { levels }
    }

    /// Builds the subscriber, with the console handler writing to stdout.
    pub fn build(&self) -> Result<Logging> {
        self.build_with_console(std::io::stdout)
    }

    /// Builds the subscriber, with the console handler writing to `console`.
    ///
    /// Opens every rotating file once; a missing log directory fails here.
    pub fn build_with_console<W>(&self, console: W) -> Result<Logging>
    where
        W: for<'a> MakeWriter<'a> + Clone + Send + Sync + 'static,
    {
        self.validate()?;

        let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

        for (name, handler) in &self.handlers {
            let formatter = self.formatters[&handler.formatter];
            let routes = self.handler_routes(name, handler);
            let filter = filter_fn(move |metadata| routes.enabled(metadata));

            let layer: Box<dyn Layer<Registry> + Send + Sync> = match &handler.sink {
                SinkConfig::Console => tracing_subscriber::fmt::layer()
                    .event_format(formatter)
                    .with_writer(console.clone())
                    .with_filter(filter)
                    .boxed(),
                SinkConfig::RotatingFile {
                    path,
                    max_bytes,
                    backup_count,
                } => {
                    let appender = RotatingFileAppender::new(path, *max_bytes, *backup_count)?;

                    tracing_subscriber::fmt::layer()
                        .event_format(formatter)
                        .with_writer(appender)
                        .with_filter(filter)
                        .boxed()
                }
            };

            layers.push(layer);
        }

        let subscriber = tracing_subscriber::registry().with(layers);

        Ok(Logging {
            dispatch: Dispatch::new(subscriber),
        })
    }
}

fn parent(name: &str) -> Option<&str> {
    name.rsplit_once("::").map(|(parent, _)| parent)
}

/// Threshold of one handler for each configured logger.
///
/// A target is matched against itself and then its `::` ancestors, so
/// `api::users` falls under `api` while `api_gateway` does not.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerRoutes {
    levels: BTreeMap<String, LevelFilter>,
}

impl HandlerRoutes {
    pub fn level_for(&self, target: &str) -> LevelFilter {
        let mut current = Some(target);

        while let Some(name) = current {
            if let Some(level) = self.levels.get(name) {
                return *level;
            }
            current = parent(name);
        }

        LevelFilter::OFF
    }

    pub fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        *metadata.level() <= self.level_for(metadata.target())
    }
}

/// The wired-up logging pipeline produced by [`LoggingConfig::build`].
///
/// Hand [`Logging::dispatch`] to `tracing::dispatcher::with_default` for a
/// scoped pipeline, or call [`Logging::install`] once at process start.
#[derive(Clone)]
pub struct Logging {
    dispatch: Dispatch,
}

impl Logging {
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn install(self) -> Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch)
            .map_err(|e| AppError::ConfigurationError { msg: e.to_string() })
    }
}
