use std::env;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File};
use serde::Deserialize;

use atlas_interface::store::model::ConnectionTarget;
use atlas_logging::config::{API_LOG_PATH, DB_LOG_PATH};
use atlas_logging::LoggingConfig;

// Environment variable holding the database endpoint (credentials included).
pub const ATLAS_URI: &str = "ATLAS_URI";

#[derive(Debug, Clone, Deserialize)]
pub struct Logger {
    pub api_log_path: String,
    pub db_log_path: String,
    // Replaces the standard routing table when present.
    pub routing: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub uri: String,
    pub name: String,
    pub collection: String,
    pub timeout_ms: u64,
    // Verify the endpoint before serving instead of on first use.
    pub ping_on_startup: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub environment: String,
    pub logger: Logger,
    pub database: Database,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        };

        let builder = Self::defaults(config)?
            .add_source(File::with_name(&format!("config/{config}")).required(false))
            .set_override_option("database.uri", env::var(ATLAS_URI).ok())?;

        builder
            .build()?
            // Deserialize (and thus freeze) the entire configuration.
            .try_deserialize()
    }

    fn defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("logger.api_log_path", API_LOG_PATH)?
            .set_default("logger.db_log_path", DB_LOG_PATH)?
            .set_default("database.uri", "")?
            .set_default("database.name", "users")?
            .set_default("database.collection", "users")?
            .set_default("database.timeout_ms", 5000_i64)?
            .set_default("database.ping_on_startup", false)
    }

    pub fn logging_config(&self) -> LoggingConfig {
        self.logger.routing.clone().unwrap_or_else(|| {
            LoggingConfig::standard(&self.logger.api_log_path, &self.logger.db_log_path)
        })
    }
}

impl Database {
    pub fn connection_target(&self) -> ConnectionTarget {
        ConnectionTarget::new(&self.uri, &self.name)
            .with_timeout(Duration::from_millis(self.timeout_ms))
    }
}
