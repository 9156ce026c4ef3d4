//! End-to-end signaling over loopback UDP with HTTP service stubs

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::invite;
use serde_json::json;
use sipfront_call_engine::{CallServices, Error, SignalingConfig, SignalingServer};
use sipfront_infra_common::events::memory::{MemoryChannel, MemoryConnector};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn service_stubs() -> MockServer {
    service_stubs_with_media_delay(Duration::ZERO).await
}

async fn service_stubs_with_media_delay(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1001"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/dialplans/2000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"action": "ROUTE"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"host": "127.0.0.1", "port": 40000}))
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

fn config_for(stubs: &MockServer) -> SignalingConfig {
    SignalingConfig::from_vars([
        ("SIP_LISTEN_ADDRESS", "127.0.0.1".to_string()),
        ("SIP_PORT", "0".to_string()),
        ("USER_SERVICE_URL", stubs.uri()),
        ("DIALPLAN_SERVICE_URL", stubs.uri()),
        ("MEDIA_SERVICE_URL", stubs.uri()),
        ("SERVICE_TIMEOUT_MS", "1000".to_string()),
        ("BROKER_RETRY_DELAY_MS", "50".to_string()),
    ])
    .unwrap()
}

async fn start_server(config: SignalingConfig, connector: Arc<MemoryConnector>) -> SignalingServer {
    let services = CallServices::http(&config).unwrap();
    let mut server = SignalingServer::with_connector(config, services, connector);
    server.start().await.unwrap();
    server
}

async fn wait_for_broker(server: &SignalingServer) {
    timeout(Duration::from_secs(5), async {
        while !server.is_broker_connected() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("broker connection was not established");
}

async fn wait_for_events(channel: &MemoryChannel, count: usize) {
    timeout(Duration::from_secs(5), async {
        while channel.published().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("events were not published in time");
}

#[tokio::test]
async fn test_invite_over_udp_is_answered_and_announced() {
    let stubs = service_stubs().await;
    let connector = Arc::new(MemoryConnector::reachable());
    let channel = connector.channel();
    let mut server = start_server(config_for(&stubs), connector).await;
    let server_addr = server.local_addr().unwrap();
    wait_for_broker(&server).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(invite("udp-call-1", "1001", "2000").as_bytes(), server_addr)
        .await
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, from) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no response received")
        .unwrap();
    let response = std::str::from_utf8(&buf[..len]).unwrap();

    assert_eq!(from, server_addr);
    assert!(response.starts_with("SIP/2.0 200 OK\r\n"));
    assert!(response.contains("Call-ID: udp-call-1\r\n"));
    assert!(response.contains(&format!("\r\nContact: <sip:sipfront@{}>\r\n", server_addr)));
    assert!(response.contains("m=audio 40000 RTP/AVP 0 8 101\r\n"));

    wait_for_events(&channel, 1).await;
    let event = channel.published()[0].json();
    assert_eq!(event["callId"], "udp-call-1");
    assert_eq!(event["media"]["port"], 40000);

    server.shutdown().await.unwrap();
    assert!(!server.is_running());
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_call_finish() {
    let stubs = service_stubs_with_media_delay(Duration::from_millis(500)).await;
    let connector = Arc::new(MemoryConnector::reachable());
    let channel = connector.channel();
    let mut server = start_server(config_for(&stubs), connector).await;
    let server_addr = server.local_addr().unwrap();
    wait_for_broker(&server).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(invite("udp-draining", "1001", "2000").as_bytes(), server_addr)
        .await
        .unwrap();

    // The call is parked on the media allocation when shutdown begins
    tokio::time::sleep(Duration::from_millis(150)).await;
    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(Duration::from_secs(1), client.recv_from(&mut buf))
        .await
        .expect("in-flight call was not answered")
        .unwrap();
    let response = std::str::from_utf8(&buf[..len]).unwrap();
    assert!(response.starts_with("SIP/2.0 200 OK\r\n"));
    assert!(response.contains("Call-ID: udp-draining\r\n"));

    let published = channel.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].json()["callId"], "udp-draining");
}

#[tokio::test]
async fn test_rejected_invite_gets_silence() {
    let stubs = service_stubs().await;
    let connector = Arc::new(MemoryConnector::reachable());
    let channel = connector.channel();
    let mut server = start_server(config_for(&stubs), connector).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(invite("udp-unknown", "7777", "2000").as_bytes(), server.local_addr().unwrap())
        .await
        .unwrap();

    let mut buf = vec![0u8; 2048];
    let received = timeout(Duration::from_millis(500), client.recv_from(&mut buf)).await;
    assert!(received.is_err(), "rejected call must not be answered");
    assert!(channel.published().is_empty());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_calls_are_answered_while_broker_is_down() {
    let stubs = service_stubs().await;
    let connector = Arc::new(MemoryConnector::unreachable());
    let mut server = start_server(config_for(&stubs), connector.clone()).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(invite("udp-nobroker", "1001", "2000").as_bytes(), server.local_addr().unwrap())
        .await
        .unwrap();

    let mut buf = vec![0u8; 65535];
    let (len, _) = timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no response received")
        .unwrap();
    assert!(std::str::from_utf8(&buf[..len]).unwrap().starts_with("SIP/2.0 200 OK"));

    assert!(!server.is_broker_connected());
    assert!(connector.attempts() >= 1);
    assert!(connector.channel().published().is_empty());

    // Shutdown cancels the retry loop instead of waiting for the broker
    timeout(Duration::from_secs(5), server.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}

#[tokio::test]
async fn test_bind_conflict_is_fatal() {
    let stubs = service_stubs().await;
    let occupied = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let config = config_for(&stubs).with_listen_addr(occupied.local_addr().unwrap());

    let services = CallServices::http(&config).unwrap();
    let mut server = SignalingServer::with_connector(config, services, Arc::new(MemoryConnector::reachable()));

    let result = server.start().await;
    assert!(matches!(result, Err(Error::Transport(_))));
    assert!(!server.is_running());
    assert!(matches!(server.local_addr(), Err(Error::NotStarted)));
}

#[tokio::test]
async fn test_double_start_is_rejected() {
    let stubs = service_stubs().await;
    let mut server = start_server(config_for(&stubs), Arc::new(MemoryConnector::reachable())).await;

    assert!(matches!(server.start().await, Err(Error::AlreadyStarted)));

    server.shutdown().await.unwrap();
    assert!(matches!(server.shutdown().await, Err(Error::NotStarted)));
}
