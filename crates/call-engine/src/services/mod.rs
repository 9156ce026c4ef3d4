//! External collaborators consulted by the call pipeline
//!
//! Each service sits behind an `async_trait` seam so the pipeline can be
//! exercised against doubles. The HTTP implementations live in [`http`].

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::SignalingConfig;
use crate::error::Result;

pub use http::{HttpDialplanResolver, HttpMediaAllocator, HttpUserDirectory};

/// Outcome taxonomy shared by the directory and the resolver
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    /// The service answered that the principal does not exist
    #[error("principal not found")]
    NotFound,

    /// Timeout, connection failure, or an unexpected answer
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AllocationError {
    #[error("media service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid media allocation: {0}")]
    InvalidResponse(String),
}

/// Endpoint reserved by the media allocator
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllocatedMedia {
    pub host: String,
    pub port: u16,
}

/// Identity directory: does this caller exist?
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, principal: &str) -> std::result::Result<Value, LookupError>;
}

/// Routing resolver: how should calls to this destination be handled?
///
/// The returned payload is opaque to the pipeline.
#[async_trait]
pub trait DialplanResolver: Send + Sync {
    async fn resolve(&self, principal: &str) -> std::result::Result<Value, LookupError>;
}

/// Media allocator: reserve one transport endpoint for a call
#[async_trait]
pub trait MediaAllocator: Send + Sync {
    async fn allocate(&self) -> std::result::Result<AllocatedMedia, AllocationError>;
}

/// The three services one pipeline run consults
#[derive(Clone)]
pub struct CallServices {
    pub directory: Arc<dyn UserDirectory>,
    pub dialplan: Arc<dyn DialplanResolver>,
    pub media: Arc<dyn MediaAllocator>,
}

impl CallServices {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        dialplan: Arc<dyn DialplanResolver>,
        media: Arc<dyn MediaAllocator>,
    ) -> Self {
        Self { directory, dialplan, media }
    }

    /// HTTP clients for the configured service URLs, sharing one connection
    /// pool and the configured request timeout
    pub fn http(config: &SignalingConfig) -> Result<Self> {
        let client = http::build_client(config.service_timeout)?;
        Ok(Self::new(
            Arc::new(HttpUserDirectory::new(client.clone(), config.user_service_url.clone())),
            Arc::new(HttpDialplanResolver::new(client.clone(), config.dialplan_service_url.clone())),
            Arc::new(HttpMediaAllocator::new(client, config.media_service_url.clone())),
        ))
    }
}

impl std::fmt::Debug for CallServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallServices").finish_non_exhaustive()
    }
}
