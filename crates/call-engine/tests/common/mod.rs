//! Shared doubles for call engine tests

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use sipfront_call_engine::{
    AllocatedMedia, AllocationError, CallPipeline, CallServices, DialplanResolver, LookupError,
    MediaAllocator, PipelineSettings, UserDirectory,
};
use sipfront_infra_common::events::memory::MemoryChannel;
use sipfront_infra_common::events::{ChannelSlot, EventPublisher};
use sipfront_sip_transport::{Error as TransportError, Result as TransportResult, Transport};

pub const CALLER_ADDR: &str = "10.0.0.5:5060";

pub fn caller_addr() -> SocketAddr {
    CALLER_ADDR.parse().unwrap()
}

/// An INVITE from `from` to `to` with an SDP offer
pub fn invite(call_id: &str, from: &str, to: &str) -> String {
    let sdp = "v=0\r\no=- 1 1 IN IP4 10.0.0.5\r\ns=-\r\nc=IN IP4 10.0.0.5\r\nt=0 0\r\nm=audio 4000 RTP/AVP 0 8\r\n";
    format!(
        "INVITE sip:{to}@example.com SIP/2.0\r\n\
         Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bK-{call_id}\r\n\
         From: <sip:{from}@10.0.0.5>;tag=tag-{call_id}\r\n\
         To: <sip:{to}@example.com>\r\n\
         Call-ID: {call_id}\r\n\
         CSeq: 1 INVITE\r\n\
         Content-Type: application/sdp\r\n\
         Content-Length: {len}\r\n\
         \r\n\
         {sdp}",
        len = sdp.len(),
    )
}

/// Value of the first `name:` header line of a response
pub fn response_header<'a>(response: &'a str, name: &str) -> Option<&'a str> {
    let head = response.split("\r\n\r\n").next()?;
    head.lines().find_map(|line| {
        let (n, v) = line.split_once(':')?;
        n.eq_ignore_ascii_case(name).then(|| v.trim())
    })
}

pub struct StubDirectory {
    known: Vec<String>,
    unavailable: AtomicBool,
    pub queried: Mutex<Vec<String>>,
}

impl StubDirectory {
    pub fn knowing(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|s| s.to_string()).collect(),
            unavailable: AtomicBool::new(false),
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.queried.lock().unwrap().len()
    }
}

#[async_trait]
impl UserDirectory for StubDirectory {
    async fn find_user(&self, principal: &str) -> Result<Value, LookupError> {
        self.queried.lock().unwrap().push(principal.to_string());
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("directory down".to_string()));
        }
        if self.known.iter().any(|k| k == principal) {
            Ok(json!({ "id": principal }))
        } else {
            Err(LookupError::NotFound)
        }
    }
}

pub struct StubResolver {
    known: Vec<String>,
    pub queried: Mutex<Vec<String>>,
}

impl StubResolver {
    pub fn knowing(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|s| s.to_string()).collect(),
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queried.lock().unwrap().len()
    }
}

#[async_trait]
impl DialplanResolver for StubResolver {
    async fn resolve(&self, principal: &str) -> Result<Value, LookupError> {
        self.queried.lock().unwrap().push(principal.to_string());
        if self.known.iter().any(|k| k == principal) {
            Ok(json!({ "destination": principal, "action": "ROUTE" }))
        } else {
            Err(LookupError::NotFound)
        }
    }
}

/// Hands out consecutive even ports starting at 30000
pub struct StubAllocator {
    next_port: AtomicU16,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StubAllocator {
    pub fn new() -> Self {
        Self {
            next_port: AtomicU16::new(30000),
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaAllocator for StubAllocator {
    async fn allocate(&self) -> Result<AllocatedMedia, AllocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AllocationError::Unavailable("no ports left".to_string()));
        }
        Ok(AllocatedMedia {
            host: "10.0.0.9".to_string(),
            port: self.next_port.fetch_add(2, Ordering::SeqCst),
        })
    }
}

/// Transport double recording every datagram it is asked to send
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, SocketAddr)>>,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub fn set_failing(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, SocketAddr)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok("127.0.0.1:5060".parse().unwrap())
    }

    async fn send_to(&self, payload: &[u8], destination: SocketAddr) -> TransportResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::TransportClosed);
        }
        let text = String::from_utf8(payload.to_vec()).unwrap();
        self.sent.lock().unwrap().push((text, destination));
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

/// A pipeline wired to stubs, with handles to inspect them
pub struct Harness {
    pub pipeline: CallPipeline,
    pub directory: Arc<StubDirectory>,
    pub resolver: Arc<StubResolver>,
    pub allocator: Arc<StubAllocator>,
    pub transport: Arc<RecordingTransport>,
    pub channel: Arc<MemoryChannel>,
}

impl Harness {
    /// Users 1001 and 1002 exist; destinations 2000 and 2001 resolve
    pub fn new() -> Self {
        Self::build(true, PipelineSettings::default())
    }

    pub fn without_broker() -> Self {
        Self::build(false, PipelineSettings::default())
    }

    pub fn with_settings(settings: PipelineSettings) -> Self {
        Self::build(true, settings)
    }

    fn build(broker_connected: bool, settings: PipelineSettings) -> Self {
        let directory = Arc::new(StubDirectory::knowing(&["1001", "1002"]));
        let resolver = Arc::new(StubResolver::knowing(&["2000", "2001"]));
        let allocator = Arc::new(StubAllocator::new());
        let transport = Arc::new(RecordingTransport::default());
        let channel = MemoryChannel::shared();

        let slot = if broker_connected {
            ChannelSlot::with_channel(channel.clone())
        } else {
            ChannelSlot::new()
        };

        let pipeline = CallPipeline::new(
            CallServices::new(directory.clone(), resolver.clone(), allocator.clone()),
            transport.clone(),
            EventPublisher::new(slot, "sipfront_events"),
            settings,
        );

        Self {
            pipeline,
            directory,
            resolver,
            allocator,
            transport,
            channel,
        }
    }

    pub async fn send(&self, datagram: &str) -> sipfront_call_engine::PipelineOutcome {
        self.pipeline.handle_datagram(datagram.as_bytes(), caller_addr()).await
    }
}
