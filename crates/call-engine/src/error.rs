use thiserror::Error;

/// Result type for call engine setup and lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that stop the signaling server from starting or running.
///
/// Failures inside a single call are not errors at this level; they end the
/// pipeline run as a [`PipelineOutcome`](crate::pipeline::PipelineOutcome).
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or missing configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration source could not be read
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    /// Listener bind or transport failure
    #[error("Transport error: {0}")]
    Transport(#[from] sipfront_sip_transport::Error),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Signaling server already started")]
    AlreadyStarted,

    #[error("Signaling server not started")]
    NotStarted,
}
