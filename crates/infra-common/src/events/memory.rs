//! In-memory broker doubles for tests

use std::future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{BrokerConnector, EventChannel, EventError};

/// A message captured by [`MemoryChannel`]
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    /// Payload decoded as JSON, `Null` if it is not valid JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or_default()
    }
}

/// Records every publish instead of sending it anywhere
#[derive(Debug, Default)]
pub struct MemoryChannel {
    published: Mutex<Vec<PublishedMessage>>,
    fail: AtomicBool,
}

impl MemoryChannel {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subsequent publishes fail
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventChannel for MemoryChannel {
    async fn publish(&self, exchange: &str, routing_key: &str, payload: &[u8]) -> Result<(), EventError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EventError::Channel("publish failure injected".to_string()));
        }
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(PublishedMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                payload: payload.to_vec(),
            });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Refuse,
    Hang,
}

/// Connector that fails a set number of times before handing out a
/// [`MemoryChannel`]
#[derive(Debug)]
pub struct MemoryConnector {
    channel: Arc<MemoryChannel>,
    failures: Option<u64>,
    mode: FailureMode,
    attempts: AtomicU64,
}

impl MemoryConnector {
    fn build(failures: Option<u64>, mode: FailureMode) -> Self {
        Self {
            channel: MemoryChannel::shared(),
            failures,
            mode,
            attempts: AtomicU64::new(0),
        }
    }

    /// Succeeds on the first attempt
    pub fn reachable() -> Self {
        Self::build(Some(0), FailureMode::Refuse)
    }

    /// Never succeeds
    pub fn unreachable() -> Self {
        Self::build(None, FailureMode::Refuse)
    }

    /// Refuses `failures` attempts, then succeeds
    pub fn failing_times(failures: u64) -> Self {
        Self::build(Some(failures), FailureMode::Refuse)
    }

    /// Hangs for `failures` attempts, then succeeds
    pub fn hanging_times(failures: u64) -> Self {
        Self::build(Some(failures), FailureMode::Hang)
    }

    /// The channel handed out on success
    pub fn channel(&self) -> Arc<MemoryChannel> {
        self.channel.clone()
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self) -> Result<Arc<dyn EventChannel>, EventError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let succeeds = self.failures.is_some_and(|failures| attempt > failures);
        if succeeds {
            return Ok(self.channel.clone());
        }
        match self.mode {
            FailureMode::Refuse => Err(EventError::Channel("connection refused".to_string())),
            FailureMode::Hang => future::pending().await,
        }
    }

    fn describe(&self) -> String {
        "memory://broker".to_string()
    }
}
