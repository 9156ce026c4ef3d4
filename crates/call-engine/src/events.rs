//! Call lifecycle events announced on the broker

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sipfront_infra_common::events::BrokerEvent;
use sipfront_sip_core::{CallContext, MediaSession};

/// Event type and routing key for an accepted call
pub const CALL_STARTED: &str = "call.started";

/// Codec entry as announced in events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodecInfo {
    pub payload_type: u8,
    pub name: String,
}

/// Media leg of an accepted call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_addr: Option<String>,
    pub codecs: Vec<CodecInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_rtp_addr: Option<String>,
}

/// Announcement of a call whose acceptance response was transmitted
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub event_type: String,
    pub trace_id: String,
    pub call_id: String,
    pub from: String,
    pub to: String,
    pub media: Option<MediaInfo>,
    pub dialplan: Value,
    pub timestamp: DateTime<Utc>,
}

impl CallEvent {
    /// Build the `call.started` event for an accepted call.
    ///
    /// Only called once the acceptance response has been sent. The media leg
    /// comes from the context's media session.
    pub fn call_started(context: &CallContext, public_addr: Option<&str>, dialplan: Value) -> Self {
        Self {
            event_type: CALL_STARTED.to_string(),
            trace_id: context.trace_id.clone(),
            call_id: context.call_id.clone(),
            from: context.from.clone(),
            to: context.to.clone(),
            media: context
                .media
                .as_ref()
                .map(|media| MediaInfo::new(media, public_addr, context.caller_rtp_addr.clone())),
            dialplan,
            timestamp: Utc::now(),
        }
    }
}

impl MediaInfo {
    fn new(media: &MediaSession, public_addr: Option<&str>, caller_rtp_addr: Option<String>) -> Self {
        Self {
            host: media.host.clone(),
            port: media.port,
            public_addr: public_addr.filter(|a| !a.is_empty()).map(str::to_string),
            codecs: media
                .codecs
                .iter()
                .map(|c| CodecInfo {
                    payload_type: c.payload_type,
                    name: c.name.to_string(),
                })
                .collect(),
            caller_rtp_addr,
        }
    }
}

impl BrokerEvent for CallEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }
}
