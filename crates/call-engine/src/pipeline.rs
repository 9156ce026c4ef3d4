//! Per-INVITE call pipeline
//!
//! One run per inbound datagram:
//!
//! ```text
//! Received -> ValidatingCaller -> ResolvingDestination -> AllocatingMedia
//!          -> Responding -> Publishing -> Done
//! ```
//!
//! Any of the three lookup steps can end the run as `Rejected(reason)`. The
//! steps return `Result<_, RejectReason>` and are chained with `?`, so the
//! first failure short-circuits the rest. Non-INVITE datagrams end as
//! `Ignored` without touching any service.
//!
//! A response is sent only after media was allocated, and an event is
//! published only after that response was sent.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use sipfront_infra_common::events::{EventPublisher, PublishOutcome};
use sipfront_sip_core::{CallContext, InboundMessage, MediaSession, ResponseBuilder, StatusLine, synthesize_response};
use sipfront_sip_transport::Transport;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use uuid::Uuid;

use crate::events::CallEvent;
use crate::services::{AllocationError, CallServices, LookupError};

/// Position of a run in the call setup sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Received,
    ValidatingCaller,
    ResolvingDestination,
    AllocatingMedia,
    Responding,
    Publishing,
    Done,
    Rejected,
    Ignored,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallState::Received => "received",
            CallState::ValidatingCaller => "validating_caller",
            CallState::ResolvingDestination => "resolving_destination",
            CallState::AllocatingMedia => "allocating_media",
            CallState::Responding => "responding",
            CallState::Publishing => "publishing",
            CallState::Done => "done",
            CallState::Rejected => "rejected",
            CallState::Ignored => "ignored",
        };
        f.write_str(name)
    }
}

/// Why a call was not accepted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("caller unknown")]
    CallerUnknown,

    #[error("user directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("destination unknown")]
    DestinationUnknown,

    #[error("dialplan resolver unavailable: {0}")]
    ResolverUnavailable(String),

    #[error("media unavailable: {0}")]
    MediaUnavailable(String),
}

impl RejectReason {
    /// Negative response suggested for this rejection
    pub fn status(&self) -> StatusLine {
        match self {
            RejectReason::CallerUnknown | RejectReason::DestinationUnknown => StatusLine::NOT_FOUND,
            RejectReason::DirectoryUnavailable(_)
            | RejectReason::ResolverUnavailable(_)
            | RejectReason::MediaUnavailable(_) => StatusLine::SERVICE_UNAVAILABLE,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.status().code
    }

    /// State the run was in when it was rejected
    pub fn rejected_in(&self) -> CallState {
        match self {
            RejectReason::CallerUnknown | RejectReason::DirectoryUnavailable(_) => CallState::ValidatingCaller,
            RejectReason::DestinationUnknown | RejectReason::ResolverUnavailable(_) => {
                CallState::ResolvingDestination
            }
            RejectReason::MediaUnavailable(_) => CallState::AllocatingMedia,
        }
    }

    fn from_caller_lookup(error: LookupError) -> Self {
        match error {
            LookupError::NotFound => RejectReason::CallerUnknown,
            LookupError::Unavailable(detail) => RejectReason::DirectoryUnavailable(detail),
        }
    }

    fn from_destination_lookup(error: LookupError) -> Self {
        match error {
            LookupError::NotFound => RejectReason::DestinationUnknown,
            LookupError::Unavailable(detail) => RejectReason::ResolverUnavailable(detail),
        }
    }
}

impl From<AllocationError> for RejectReason {
    fn from(error: AllocationError) -> Self {
        RejectReason::MediaUnavailable(error.to_string())
    }
}

/// What happened to the accepted call's event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDelivery {
    Published,
    /// No broker channel was established
    Dropped,
    Failed(String),
}

/// Terminal result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Not an INVITE, or not decodable
    Ignored,
    Rejected(RejectReason),
    /// The acceptance response could not be transmitted
    SendFailed,
    /// The acceptance response was sent
    Completed { event: EventDelivery },
}

impl PipelineOutcome {
    pub fn final_state(&self) -> CallState {
        match self {
            PipelineOutcome::Ignored => CallState::Ignored,
            PipelineOutcome::Rejected(_) => CallState::Rejected,
            PipelineOutcome::SendFailed => CallState::Responding,
            PipelineOutcome::Completed { .. } => CallState::Done,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, PipelineOutcome::Completed { .. })
    }
}

/// Settings that shape responses
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    /// Address advertised in SDP answers instead of the allocated host
    pub public_ip: Option<String>,
    /// Send a negative response on rejection instead of staying silent
    pub reject_with_response: bool,
    /// `host:port` advertised in the Contact header of `200 OK`
    pub contact_addr: Option<String>,
}

/// Runs INVITEs through validation, media allocation, response and event
/// publication
#[derive(Clone)]
pub struct CallPipeline {
    services: CallServices,
    transport: Arc<dyn Transport>,
    publisher: EventPublisher,
    settings: PipelineSettings,
}

impl CallPipeline {
    pub fn new(
        services: CallServices,
        transport: Arc<dyn Transport>,
        publisher: EventPublisher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            services,
            transport,
            publisher,
            settings,
        }
    }

    /// Decode a raw datagram and run it through the pipeline.
    ///
    /// Undecodable datagrams are logged and ignored.
    pub async fn handle_datagram(&self, payload: &[u8], source: SocketAddr) -> PipelineOutcome {
        match InboundMessage::decode(payload, source) {
            Ok(message) => self.process(message).await,
            Err(e) => {
                warn!(%source, bytes = payload.len(), error = %e, "Dropping undecodable datagram");
                PipelineOutcome::Ignored
            }
        }
    }

    /// Run a decoded message through the pipeline
    pub async fn process(&self, message: InboundMessage) -> PipelineOutcome {
        if !message.is_invite() {
            trace!(method = %message.method(), source = %message.source(), "Ignoring non-INVITE request");
            return PipelineOutcome::Ignored;
        }

        let mut context = CallContext::from_message(&message, Uuid::new_v4().to_string());
        let span = info_span!(
            "invite",
            call_id = %context.call_id,
            trace_id = %context.trace_id,
            remote_addr = %context.remote_addr
        );
        self.run(&mut context).instrument(span).await
    }

    async fn run(&self, context: &mut CallContext) -> PipelineOutcome {
        enter(CallState::Received);
        info!(
            from = %context.caller_key(),
            to = %context.destination_key(),
            "Processing INVITE"
        );

        let (dialplan, media) = match self.accept(context).await {
            Ok(accepted) => accepted,
            Err(reason) => {
                warn!(
                    reason = %reason,
                    state = %reason.rejected_in(),
                    status = reason.status_code(),
                    "Call rejected"
                );
                self.send_rejection(context, &reason).await;
                enter(CallState::Rejected);
                return PipelineOutcome::Rejected(reason);
            }
        };
        info!(media_host = %media.host, media_port = media.port, "Call accepted");
        context.media = Some(media);

        enter(CallState::Responding);
        let public_ip = self.settings.public_ip.as_deref();
        let response = synthesize_response(context, public_ip, self.settings.contact_addr.as_deref());
        if let Err(e) = self.transport.send_to(response.as_bytes(), context.remote_addr).await {
            error!(error = %e, "Failed to send 200 OK, abandoning call");
            return PipelineOutcome::SendFailed;
        }
        info!("Sent 200 OK");

        enter(CallState::Publishing);
        let event = CallEvent::call_started(context, public_ip, dialplan);
        let delivery = match self.publisher.publish(&event).await {
            Ok(PublishOutcome::Published) => {
                info!(event_type = %event.event_type, "Published call event");
                EventDelivery::Published
            }
            Ok(PublishOutcome::Dropped) => EventDelivery::Dropped,
            Err(e) => {
                error!(error = %e, "Failed to publish call event");
                EventDelivery::Failed(e.to_string())
            }
        };

        enter(CallState::Done);
        PipelineOutcome::Completed { event: delivery }
    }

    /// The three lookup steps; the first failure ends the sequence
    async fn accept(&self, context: &CallContext) -> Result<(Value, MediaSession), RejectReason> {
        self.validate_caller(context).await?;
        let dialplan = self.resolve_destination(context).await?;
        let media = self.allocate_media().await?;
        Ok((dialplan, media))
    }

    async fn validate_caller(&self, context: &CallContext) -> Result<(), RejectReason> {
        enter(CallState::ValidatingCaller);
        self.services
            .directory
            .find_user(context.caller_key())
            .await
            .map_err(RejectReason::from_caller_lookup)?;
        debug!(caller = %context.caller_key(), "Caller validated");
        Ok(())
    }

    async fn resolve_destination(&self, context: &CallContext) -> Result<Value, RejectReason> {
        enter(CallState::ResolvingDestination);
        let dialplan = self
            .services
            .dialplan
            .resolve(context.destination_key())
            .await
            .map_err(RejectReason::from_destination_lookup)?;
        debug!(destination = %context.destination_key(), dialplan = %dialplan, "Destination resolved");
        Ok(dialplan)
    }

    async fn allocate_media(&self) -> Result<MediaSession, RejectReason> {
        enter(CallState::AllocatingMedia);
        let allocated = self.services.media.allocate().await?;
        debug!(host = %allocated.host, port = allocated.port, "Media allocated");
        Ok(MediaSession::new(allocated.host, allocated.port))
    }

    async fn send_rejection(&self, context: &CallContext, reason: &RejectReason) {
        if !self.settings.reject_with_response {
            return;
        }
        let response = ResponseBuilder::new(reason.status(), context).build();
        match self.transport.send_to(response.as_bytes(), context.remote_addr).await {
            Ok(()) => debug!(status = reason.status_code(), "Sent rejection response"),
            Err(e) => warn!(error = %e, "Failed to send rejection response"),
        }
    }
}

impl fmt::Debug for CallPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallPipeline")
            .field("transport", &self.transport)
            .field("publisher", &self.publisher)
            .field("settings", &self.settings)
            .finish()
    }
}

fn enter(state: CallState) {
    trace!(%state, "Call state");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_statuses() {
        assert_eq!(RejectReason::CallerUnknown.status_code(), 404);
        assert_eq!(RejectReason::DestinationUnknown.status_code(), 404);
        assert_eq!(RejectReason::DirectoryUnavailable("x".into()).status_code(), 503);
        assert_eq!(RejectReason::ResolverUnavailable("x".into()).status_code(), 503);
        assert_eq!(RejectReason::MediaUnavailable("x".into()).status_code(), 503);
    }

    #[test]
    fn test_rejection_states() {
        assert_eq!(RejectReason::CallerUnknown.rejected_in(), CallState::ValidatingCaller);
        assert_eq!(
            RejectReason::ResolverUnavailable("x".into()).rejected_in(),
            CallState::ResolvingDestination
        );
        assert_eq!(
            RejectReason::from(AllocationError::Unavailable("down".into())).rejected_in(),
            CallState::AllocatingMedia
        );
    }

    #[test]
    fn test_lookup_errors_map_by_step() {
        assert_eq!(RejectReason::from_caller_lookup(LookupError::NotFound), RejectReason::CallerUnknown);
        assert_eq!(
            RejectReason::from_destination_lookup(LookupError::NotFound),
            RejectReason::DestinationUnknown
        );
        assert_eq!(
            RejectReason::from_destination_lookup(LookupError::Unavailable("t".into())),
            RejectReason::ResolverUnavailable("t".into())
        );
    }

    #[test]
    fn test_outcome_final_states() {
        assert_eq!(PipelineOutcome::Ignored.final_state(), CallState::Ignored);
        assert_eq!(PipelineOutcome::SendFailed.final_state(), CallState::Responding);
        let done = PipelineOutcome::Completed { event: EventDelivery::Dropped };
        assert_eq!(done.final_state(), CallState::Done);
        assert!(done.is_completed());
    }
}
