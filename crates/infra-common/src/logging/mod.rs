//! Structured logging setup

pub mod setup;

pub use setup::{LogFormat, LoggingConfig, log_welcome, parse_log_level, setup_logging};
