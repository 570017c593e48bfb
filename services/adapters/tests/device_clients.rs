//! Script-interface fallback and vision commands against loopback peers

use adapter_service::robot::{PoseOrigin, PoseReader, TextInterfaceClient};
use adapter_service::vision::{VisionClient, VisionCommand};
use network::CommunicationError;
use station_config::RtdeSettings;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use types::Pose;

/// Accept one connection, read the request, answer in `chunks`
async fn chunked_peer(chunks: Vec<&'static str>) -> (u16, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 1024];
        let n = socket.read(&mut buf).await.unwrap();
        for chunk in chunks {
            socket.write_all(chunk.as_bytes()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });
    (port, task)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_text_interface_reads_split_reply() {
    let (port, peer) = chunked_peer(vec!["p[0.1, 0.2, ", "0.3, 0.0, 1.5, -1.5]\n"]).await;
    let client = TextInterfaceClient::new("127.0.0.1", port, Duration::from_secs(2));

    let pose = client.read_pose().await.unwrap();
    assert_eq!(pose, Pose::new(0.1, 0.2, 0.3, 0.0, 1.5, -1.5));
    assert_eq!(peer.await.unwrap(), "get_actual_tcp_pose()\n");
}

#[tokio::test]
async fn test_text_interface_fault_reply() {
    let (port, _peer) = chunked_peer(vec!["Safety stop active [0]\n"]).await;
    let client = TextInterfaceClient::new("127.0.0.1", port, Duration::from_secs(2));

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::UnparsableReply { .. }), "{err}");
}

#[tokio::test]
async fn test_reader_falls_back_when_rtde_port_is_down() {
    let (fallback_port, _peer) = chunked_peer(vec!["[0.5, 0.0, 0.2, 0.0, 0.0, 0.0]"]).await;
    let settings = RtdeSettings {
        host: "127.0.0.1".into(),
        port: closed_port().await,
        fallback_port,
        timeout_ms: 1_000,
        ..RtdeSettings::default()
    };

    let reader = PoseReader::from_settings(&settings).unwrap();
    let reading = reader.read_pose_with_fallback().await.unwrap();
    assert_eq!(reading.origin, PoseOrigin::TextInterface);
    assert!((reading.display_pose().x - 500.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_vision_command_concatenates_chunks() {
    let (port, peer) = chunked_peer(vec!["<TO", "k/>", "\n"]).await;
    let client = VisionClient::new("127.0.0.1", port, Duration::from_secs(1));

    let reply = client.execute(VisionCommand::Trigger).await.unwrap();
    assert_eq!(reply, "<TOk/>");
    assert_eq!(peer.await.unwrap(), "<T/>");
}

#[tokio::test]
async fn test_vision_reply_without_newline_returns_partial_text() {
    let (port, _peer) = chunked_peer(vec!["<LIMA VALUE=\"12.5\" />"]).await;
    let client = VisionClient::new("127.0.0.1", port, Duration::from_millis(400));

    let reply = client.execute(VisionCommand::FocusPosition).await.unwrap();
    assert_eq!(reply, "<LIMA VALUE=\"12.5\" />");
}

#[tokio::test]
async fn test_vision_test_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let reachable = VisionClient::new("127.0.0.1", port, Duration::from_secs(1));
    assert!(reachable.test_connection().await);
    drop(listener);

    let unreachable = VisionClient::new("127.0.0.1", closed_port().await, Duration::from_secs(1));
    assert!(!unreachable.test_connection().await);
}
