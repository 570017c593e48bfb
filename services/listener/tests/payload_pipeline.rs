//! Payload processor and listener against a loopback cobot

use async_trait::async_trait;
use listener_service::{
    DownstreamConfig, InMemoryCatalog, LookupError, PayloadProcessor, ProcessOutcome,
    ProductLookup, Station,
};
use network::{ActivityLog, CommunicationError};
use station_config::StationConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use types::{EventKind, ProductRecord};

/// Accept one connection, read one line, answer with `ack` if given
async fn cobot(ack: Option<&'static str>) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut buf = [0u8; 512];
        while !received.contains(&b'\n') {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        if let Some(ack) = ack {
            socket.write_all(ack.as_bytes()).await.unwrap();
        }
        String::from_utf8(received).unwrap()
    });
    (port, task)
}

fn catalog() -> Arc<InMemoryCatalog> {
    Arc::new(InMemoryCatalog::from_records([ProductRecord {
        kunde: Some("ACME".into()),
        ..ProductRecord::new(1, "WUBRE1234")
    }]))
}

fn downstream(port: u16) -> DownstreamConfig {
    DownstreamConfig {
        timeout: Duration::from_secs(2),
        ..DownstreamConfig::new("127.0.0.1", port)
    }
}

fn kinds(log: &ActivityLog) -> Vec<EventKind> {
    log.snapshot().iter().map(|e| e.kind).collect()
}

struct BrokenCatalog;

#[async_trait]
impl ProductLookup for BrokenCatalog {
    async fn find_by_identifier(&self, _identifier: &str) -> Result<Option<ProductRecord>, LookupError> {
        Err(LookupError::Unavailable("database offline".into()))
    }
}

#[tokio::test]
async fn test_known_product_is_delivered_and_acknowledged() {
    let (port, peer) = cobot(Some("OK")).await;
    let log = Arc::new(ActivityLog::default());
    let processor = PayloadProcessor::new(catalog(), downstream(port), log.clone());

    let outcome = processor.process("scan;wubre-1234;done").await;
    let ProcessOutcome::Delivered { identifier, reply } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(identifier, "wubre-1234");
    assert!(reply.starts_with("LaufendeNummer:1_ProduktNr:WUBRE1234_Kunde:ACME_"));

    assert_eq!(peer.await.unwrap(), format!("{reply}\n"));
    assert_eq!(kinds(&log), vec![EventKind::MessageSent, EventKind::ResponseReceived]);
}

#[tokio::test]
async fn test_unknown_product_sends_not_found() {
    let (port, peer) = cobot(Some("OK")).await;
    let processor = PayloadProcessor::new(catalog(), downstream(port), Arc::new(ActivityLog::default()));

    let outcome = processor.process("WU999").await;
    assert!(matches!(outcome, ProcessOutcome::Delivered { ref reply, .. } if reply == "NichtVorhanden"));
    assert_eq!(peer.await.unwrap(), "NichtVorhanden\n");
}

#[tokio::test]
async fn test_wrong_acknowledgement_is_send_error() {
    let (port, _peer) = cobot(Some("NOPE")).await;
    let log = Arc::new(ActivityLog::default());
    let processor = PayloadProcessor::new(catalog(), downstream(port), log.clone());

    let outcome = processor.process("WUBRE1234").await;
    let ProcessOutcome::DeliveryFailed { error, .. } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert!(matches!(error, CommunicationError::AcknowledgementMismatch { .. }));
    assert_eq!(kinds(&log).last(), Some(&EventKind::SendError));
}

#[tokio::test]
async fn test_fire_and_forget_with_end_marker() {
    let (port, peer) = cobot(None).await;
    let config = DownstreamConfig {
        read_ack: false,
        append_end_marker: true,
        ..downstream(port)
    };
    let log = Arc::new(ActivityLog::default());
    let processor = PayloadProcessor::new(catalog(), config, log.clone());

    let outcome = processor.process("WU42").await;
    assert!(matches!(outcome, ProcessOutcome::Delivered { .. }));
    assert_eq!(peer.await.unwrap(), "NichtVorhandenEND\n");
    assert_eq!(kinds(&log), vec![EventKind::MessageSent]);
}

#[tokio::test]
async fn test_unreachable_cobot_is_send_error() {
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = closed.local_addr().unwrap().port();
    drop(closed);

    let processor = PayloadProcessor::new(catalog(), downstream(port), Arc::new(ActivityLog::default()));
    let outcome = processor.process("WUBRE1234").await;
    assert!(matches!(outcome, ProcessOutcome::DeliveryFailed { .. }));
}

#[tokio::test]
async fn test_payload_without_identifier_sends_nothing() {
    let log = Arc::new(ActivityLog::default());
    let processor = PayloadProcessor::new(catalog(), downstream(1), log.clone());

    assert_eq!(processor.process("hello").await, ProcessOutcome::NoIdentifier);
    assert_eq!(kinds(&log), vec![EventKind::ClientError]);
}

#[tokio::test]
async fn test_lookup_failure_sends_nothing() {
    let log = Arc::new(ActivityLog::default());
    let processor = PayloadProcessor::new(Arc::new(BrokenCatalog), downstream(1), log.clone());

    let outcome = processor.process("WUBRE1234").await;
    let ProcessOutcome::LookupFailed { identifier, error } = outcome else {
        panic!("unexpected outcome {outcome:?}");
    };
    assert_eq!(identifier, "WUBRE1234");
    assert!(error.to_string().contains("database offline"));
    assert_eq!(kinds(&log), vec![EventKind::ClientError]);
}

#[tokio::test]
async fn test_station_end_to_end() {
    let (cobot_port, peer) = cobot(Some("OK")).await;

    let mut config = StationConfig::default();
    config.listener.bind_address = "127.0.0.1".into();
    config.listener.port = 0;
    config.downstream.port = cobot_port;

    let station = Station::new(&config, catalog());
    let addr = station.start(None).unwrap();
    assert!(station.listener().is_running());

    let mut scanner = TcpStream::connect(addr).await.unwrap();
    scanner.write_all(b"<code>WUBRE1234</code>\r\n").await.unwrap();
    let mut ack = String::new();
    tokio::time::timeout(Duration::from_secs(5), scanner.read_to_string(&mut ack))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(ack, "MESSAGE_RECEIVED");

    let delivered = peer.await.unwrap();
    assert!(delivered.starts_with("LaufendeNummer:1_ProduktNr:WUBRE1234"));

    station.stop().await;
    assert!(!station.listener().is_running());

    let kinds = kinds(station.activity_log());
    for expected in [
        EventKind::ListenerStarted,
        EventKind::ClientConnected,
        EventKind::MessageReceived,
        EventKind::MessageSent,
        EventKind::ResponseReceived,
        EventKind::ResponseSent,
        EventKind::ListenerStopped,
    ] {
        assert!(kinds.contains(&expected), "missing {expected} in {kinds:?}");
    }
}
