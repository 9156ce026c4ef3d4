//! Error types shared by the infrastructure components

pub mod types;

pub use types::{Error, Result};
