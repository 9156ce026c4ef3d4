//! HTTP/JSON clients for the directory, resolver and allocator

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::{Value, json};
use tracing::debug;

use super::{AllocatedMedia, AllocationError, DialplanResolver, LookupError, MediaAllocator, UserDirectory};

/// Build the shared client with a per-request timeout
pub fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

/// `base` with `segments` appended, each percent-encoded as a single segment
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| format!("{} cannot be used as a base URL", base))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// GET a principal's resource and classify the answer
async fn lookup(client: &Client, base: &Url, collection: &str, principal: &str) -> Result<Value, LookupError> {
    let url = endpoint(base, &[collection, principal]).map_err(LookupError::Unavailable)?;
    debug!(%url, "Querying service");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LookupError::Unavailable(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(LookupError::NotFound);
    }
    if !status.is_success() {
        return Err(LookupError::Unavailable(format!("unexpected status {}", status)));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| LookupError::Unavailable(e.to_string()))?;
    // Payloads are opaque; a non-JSON body is kept as nothing
    Ok(serde_json::from_slice(&body).unwrap_or(Value::Null))
}

/// `GET {base}/users/{principal}`
#[derive(Debug, Clone)]
pub struct HttpUserDirectory {
    client: Client,
    base: Url,
}

impl HttpUserDirectory {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_user(&self, principal: &str) -> Result<Value, LookupError> {
        lookup(&self.client, &self.base, "users", principal).await
    }
}

/// `GET {base}/dialplans/{principal}`
#[derive(Debug, Clone)]
pub struct HttpDialplanResolver {
    client: Client,
    base: Url,
}

impl HttpDialplanResolver {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl DialplanResolver for HttpDialplanResolver {
    async fn resolve(&self, principal: &str) -> Result<Value, LookupError> {
        lookup(&self.client, &self.base, "dialplans", principal).await
    }
}

/// `POST {base}/sessions` with an empty JSON object
#[derive(Debug, Clone)]
pub struct HttpMediaAllocator {
    client: Client,
    base: Url,
}

impl HttpMediaAllocator {
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl MediaAllocator for HttpMediaAllocator {
    async fn allocate(&self) -> Result<AllocatedMedia, AllocationError> {
        let url = endpoint(&self.base, &["sessions"]).map_err(AllocationError::Unavailable)?;

        let response = self
            .client
            .post(url)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| AllocationError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AllocationError::Unavailable(format!("unexpected status {}", status)));
        }

        let media: AllocatedMedia = response
            .json()
            .await
            .map_err(|e| AllocationError::InvalidResponse(e.to_string()))?;
        if media.host.is_empty() || media.port == 0 {
            return Err(AllocationError::InvalidResponse(format!(
                "unusable endpoint {}:{}",
                media.host, media.port
            )));
        }
        Ok(media)
    }
}
