//! Reconnect behaviour of the resilient stream client against a real loopback peer

use network::{handler_fn, ActivityLog, ConnectionState, ResilientStreamClient, StreamClientConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use types::EventKind;

fn fast_config(port: u16) -> StreamClientConfig {
    StreamClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_timeout: Duration::from_millis(500),
        base_backoff: Duration::from_millis(20),
        max_backoff: Duration::from_millis(200),
        read_buffer_size: 8,
        join_timeout: Duration::from_secs(1),
    }
}

async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("message within timeout")
        .expect("channel open")
}

#[tokio::test]
async fn reconnects_and_keeps_delivering_after_peer_closes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (mut first, _) = listener.accept().await.unwrap();
        first.write_all(b"one\ntwo\npar").await.unwrap();
        drop(first);

        let (mut second, _) = listener.accept().await.unwrap();
        second.write_all(b"three\r").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        second.write_all(b"four END").await.unwrap();
        let _ = release_rx.await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let log = Arc::new(ActivityLog::default());
    let client = ResilientStreamClient::new(fast_config(port)).with_activity_log(log.clone());
    assert!(client.start(handler_fn(move |message, _| {
        tx.send(message)?;
        Ok(())
    })));

    let mut received = Vec::new();
    for _ in 0..4 {
        received.push(next(&mut rx).await);
    }
    assert_eq!(received, vec!["one", "two", "three", "four"]);

    // The fragment cut off by the first disconnect is never delivered
    assert!(timeout(Duration::from_millis(100), rx.recv()).await.is_err());
    assert!(client.is_connected());

    let kinds: Vec<EventKind> = log.snapshot().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds.iter().filter(|k| **k == EventKind::StreamConnected).count(),
        2
    );
    assert!(kinds.contains(&EventKind::StreamDisconnected));

    client.stop().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let _ = release_tx.send(());
}

#[tokio::test]
async fn start_is_idempotent_and_stop_is_repeatable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (_socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let client = ResilientStreamClient::new(fast_config(port));
    assert!(client.start(handler_fn(|_, _| Ok(()))));
    assert!(!client.start(handler_fn(|_, _| Ok(()))));
    assert!(client.is_running());

    client.stop().await;
    client.stop().await;
    assert!(!client.is_running());
}

#[tokio::test]
async fn keeps_retrying_while_peer_is_down() {
    let reserved = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = reserved.local_addr().unwrap().port();
    drop(reserved);

    let log = Arc::new(ActivityLog::default());
    let client = ResilientStreamClient::new(fast_config(port)).with_activity_log(log.clone());
    client.start(handler_fn(|_, _| Ok(())));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(client.is_running());
    assert!(!client.is_connected());
    let failures = log
        .snapshot()
        .iter()
        .filter(|e| e.kind == EventKind::ClientError)
        .count();
    assert!(failures >= 2, "expected repeated connect failures, got {failures}");

    client.stop().await;
}

#[tokio::test]
async fn handler_errors_do_not_break_the_stream() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        socket.write_all(b"bad\ngood\n").await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = ResilientStreamClient::new(fast_config(port));
    client.start(handler_fn(move |message, _| {
        if message == "bad" {
            panic!("handler blew up");
        }
        tx.send(message)?;
        Ok(())
    }));

    assert_eq!(next(&mut rx).await, "good");
    client.stop().await;
}
