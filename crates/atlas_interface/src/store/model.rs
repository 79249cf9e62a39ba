use std::time::Duration;

// Bound applied to server selection, connection setup and ping when the
// caller does not provide one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// Where to connect and which logical database to select once connected.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub uri: String, // Credentials are embedded in the uri.
    pub database_name: String,
    pub timeout: Duration,
}

impl ConnectionTarget {
    pub fn new(uri: &str, database_name: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database_name: database_name.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
