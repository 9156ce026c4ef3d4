//! Background broker connection with fixed-interval retry

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BrokerConnector, ChannelSlot, EventError};

/// Timing of connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait between a failed attempt and the next one
    pub delay: Duration,
    /// Upper bound on a single attempt
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// How the connection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A channel was stored in the slot after `attempts` tries
    Connected { attempts: u64 },
    /// Shutdown was requested before a connection succeeded
    Cancelled { attempts: u64 },
}

/// Establishes the broker channel in the background.
///
/// Attempts repeat at [`ReconnectPolicy::delay`] until one succeeds or the
/// cancellation token fires. There is no attempt limit. After the first
/// success the channel is stored in the [`ChannelSlot`] and the loop exits.
pub struct ConnectionManager {
    connector: Arc<dyn BrokerConnector>,
    slot: ChannelSlot,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, slot: ChannelSlot, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            slot,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token
    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the connection loop on its own task
    pub fn spawn(self) -> JoinHandle<ConnectOutcome> {
        tokio::spawn(self.run())
    }

    pub async fn run(self) -> ConnectOutcome {
        let target = self.connector.describe();
        let mut attempts: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                debug!(attempts, "Broker connection loop cancelled");
                return ConnectOutcome::Cancelled { attempts };
            }
            attempts += 1;

            let result = tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(attempts, "Broker connection attempt cancelled");
                    return ConnectOutcome::Cancelled { attempts };
                }
                result = tokio::time::timeout(self.policy.connect_timeout, self.connector.connect()) => {
                    result.unwrap_or(Err(EventError::ConnectTimeout(self.policy.connect_timeout)))
                }
            };

            match result {
                Ok(channel) => {
                    if !self.slot.set(channel) {
                        warn!("Broker channel was already established, keeping the existing one");
                    }
                    info!(broker = %target, attempts, "Connected to message broker");
                    return ConnectOutcome::Connected { attempts };
                }
                Err(e) => {
                    warn!(
                        broker = %target,
                        attempt = attempts,
                        retry_in_ms = self.policy.delay.as_millis() as u64,
                        error = %e,
                        "Failed to connect to message broker"
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(attempts, "Broker connection loop cancelled while waiting");
                    return ConnectOutcome::Cancelled { attempts };
                }
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }
}
