use thiserror::Error;

/// Result type for infrastructure setup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up infrastructure
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// The global tracing subscriber could not be installed
    #[error("Logging setup error: {0}")]
    Logging(String),
}
