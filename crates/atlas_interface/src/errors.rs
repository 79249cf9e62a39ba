use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // The endpoint is misconfigured or the driver refused to build a client.
    ConnectionError { msg: String },
    // The server did not answer a ping within the configured timeout.
    ConnectivityError { msg: String },
    // The logging setup references a missing path or an unknown name.
    ConfigurationError { msg: String },
    MongoError { msg: String },
    BsonError { msg: String },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl std::error::Error for AppError {}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AppError::ConnectionError { msg } => write!(f, "Connection Error: '{}'", msg),
            AppError::ConnectivityError { msg } => write!(f, "Connectivity Error: '{}'", msg),
            AppError::ConfigurationError { msg } => write!(f, "Configuration Error: '{}'", msg),
            AppError::MongoError { msg } => write!(f, "MongoDB Error: '{}'", msg),
            AppError::BsonError { msg } => write!(f, "Bson Serialization Error: '{}'", msg),
        }
    }
}
