//! Signaling server wiring
//!
//! Binds the UDP listener, starts the background broker connection and turns
//! every received datagram into an independent pipeline run.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sipfront_infra_common::events::{
    AmqpConnector, BrokerConnector, ChannelSlot, ConnectOutcome, ConnectionManager, EventPublisher,
    ReconnectPolicy,
};
use sipfront_sip_transport::{Transport, TransportEvent, UdpTransport};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::config::SignalingConfig;
use crate::error::{Error, Result};
use crate::pipeline::{CallPipeline, PipelineSettings};
use crate::services::CallServices;

/// How long shutdown waits for in-flight calls
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    transport: UdpTransport,
    dispatch: JoinHandle<()>,
    broker: JoinHandle<ConnectOutcome>,
}

/// The SIP signaling front-end
pub struct SignalingServer {
    config: SignalingConfig,
    services: CallServices,
    connector: Arc<dyn BrokerConnector>,
    slot: ChannelSlot,
    cancel: CancellationToken,
    calls: TaskTracker,
    running: Option<Running>,
}

impl SignalingServer {
    /// Server publishing to the AMQP broker named in `config`
    pub fn new(config: SignalingConfig, services: CallServices) -> Self {
        let connector = Arc::new(AmqpConnector::new(
            config.rabbitmq_url.clone(),
            config.broker_exchange.clone(),
        ));
        Self::with_connector(config, services, connector)
    }

    /// Server publishing through a custom broker connector
    pub fn with_connector(
        config: SignalingConfig,
        services: CallServices,
        connector: Arc<dyn BrokerConnector>,
    ) -> Self {
        Self {
            config,
            services,
            connector,
            slot: ChannelSlot::new(),
            cancel: CancellationToken::new(),
            calls: TaskTracker::new(),
            running: None,
        }
    }

    /// Bind the listener and start processing datagrams.
    ///
    /// A bind failure is returned and the server stays stopped. The broker
    /// connection is established in the background and never blocks start.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (transport, events) = UdpTransport::bind(self.config.listen_addr, None).await?;
        let local_addr = transport.local_addr()?;
        info!(%local_addr, "SIP signaling listening");

        let policy = ReconnectPolicy::default().with_delay(self.config.broker_retry_delay);
        let broker = ConnectionManager::new(self.connector.clone(), self.slot.clone(), policy)
            .with_cancel_token(self.cancel.child_token())
            .spawn();

        let pipeline = CallPipeline::new(
            self.services.clone(),
            Arc::new(transport.clone()),
            self.publisher(),
            PipelineSettings {
                public_ip: self.config.public_ip.clone(),
                reject_with_response: self.config.reject_with_response,
                contact_addr: Some(contact_addr(self.config.public_ip.as_deref(), local_addr)),
            },
        );

        let dispatch = tokio::spawn(dispatch_loop(
            events,
            pipeline,
            self.calls.clone(),
            self.cancel.child_token(),
        ));

        self.running = Some(Running {
            transport,
            dispatch,
            broker,
        });
        Ok(())
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        let running = self.running.as_ref().ok_or(Error::NotStarted)?;
        Ok(running.transport.local_addr()?)
    }

    /// Publisher sharing this server's broker channel
    pub fn publisher(&self) -> EventPublisher {
        EventPublisher::new(self.slot.clone(), self.config.broker_exchange.clone())
    }

    pub fn is_broker_connected(&self) -> bool {
        self.slot.is_established()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Stop accepting datagrams, wait briefly for in-flight calls, then close
    /// the listener and cancel broker reconnection.
    ///
    /// The transport stays open while calls drain so they can still send
    /// their response and publish their event.
    pub async fn shutdown(&mut self) -> Result<()> {
        let running = self.running.take().ok_or(Error::NotStarted)?;
        info!("Shutting down signaling server");

        self.cancel.cancel();
        if let Err(e) = running.dispatch.await {
            warn!(error = %e, "Dispatch loop ended abnormally");
        }

        self.calls.close();
        if tokio::time::timeout(DRAIN_TIMEOUT, self.calls.wait()).await.is_err() {
            warn!(in_flight = self.calls.len(), "Calls still running after shutdown timeout");
        }

        running.transport.close().await?;
        match running.broker.await {
            Ok(outcome) => debug!(?outcome, "Broker connection task finished"),
            Err(e) => warn!(error = %e, "Broker connection task ended abnormally"),
        }

        // Allow a later restart
        self.cancel = CancellationToken::new();
        self.calls = TaskTracker::new();

        info!("Signaling server stopped");
        Ok(())
    }
}

/// `host:port` for the Contact header: the public IP when configured,
/// otherwise the bound address
fn contact_addr(public_ip: Option<&str>, local_addr: SocketAddr) -> String {
    match public_ip.filter(|ip| !ip.is_empty()) {
        Some(ip) => format!("{}:{}", ip, local_addr.port()),
        None => local_addr.to_string(),
    }
}

/// Spawn one pipeline run per received datagram until cancelled or the
/// transport closes
async fn dispatch_loop(
    mut events: mpsc::Receiver<TransportEvent>,
    pipeline: CallPipeline,
    calls: TaskTracker,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(TransportEvent::DatagramReceived { payload, source, .. }) => {
                let pipeline = pipeline.clone();
                calls.spawn(async move {
                    let outcome = pipeline.handle_datagram(&payload, source).await;
                    trace!(%source, state = %outcome.final_state(), "Pipeline run finished");
                });
            }
            Some(TransportEvent::Error { error }) => {
                warn!(%error, "Transport receive error");
            }
            Some(TransportEvent::Closed) | None => {
                debug!("Transport closed");
                break;
            }
        }
    }
    debug!("Dispatch loop stopped");
}

impl std::fmt::Debug for SignalingServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingServer")
            .field("config", &self.config)
            .field("running", &self.running.is_some())
            .field("broker_connected", &self.is_broker_connected())
            .finish()
    }
}
