//! RTDE handshake against a scripted robot on a loopback socket

use adapter_service::robot::rtde::{RtdeClient, RtdeConfig};
use codec::rtde::{pose_data_payload, VersionAcceptance};
use codec::{read_frame, write_frame, Frame, FrameType};
use network::CommunicationError;
use std::future::Future;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use types::Pose;

const PEER_TIMEOUT: Duration = Duration::from_secs(2);

/// Robot side of one session; every frame it reads is recorded
struct ScriptedRobot {
    stream: TcpStream,
    received: Vec<Frame>,
}

impl ScriptedRobot {
    async fn expect(&mut self, frame_type: FrameType) -> Frame {
        let frame = read_frame(&mut self.stream, PEER_TIMEOUT).await.unwrap();
        assert_eq!(frame.frame_type, u8::from(frame_type), "unexpected {frame}");
        self.received.push(frame.clone());
        frame
    }

    async fn reply(&mut self, frame_type: impl Into<u8>, payload: &[u8]) {
        write_frame(&mut self.stream, frame_type.into(), payload, PEER_TIMEOUT)
            .await
            .unwrap();
    }

    /// Accept version 2, assign `recipe_id`, confirm start
    async fn handshake(&mut self, recipe_id: u8) {
        self.expect(FrameType::RequestProtocolVersion).await;
        self.reply(FrameType::RequestProtocolVersion, &[0x00, 0x02]).await;
        self.setup_and_start(recipe_id).await;
    }

    async fn setup_and_start(&mut self, recipe_id: u8) {
        self.expect(FrameType::ControlPackageSetupOutputs).await;
        let mut setup = vec![recipe_id];
        setup.extend_from_slice(b"VECTOR6D");
        self.reply(FrameType::ControlPackageSetupOutputs, &setup).await;

        self.expect(FrameType::ControlPackageStart).await;
        self.reply(FrameType::ControlPackageStart, &[1]).await;
    }

    /// Record whatever the client still sends until it closes
    async fn drain(mut self) -> Vec<Frame> {
        while let Ok(frame) = read_frame(&mut self.stream, PEER_TIMEOUT).await {
            self.received.push(frame);
        }
        self.received
    }
}

async fn spawn_robot<F, Fut>(script: F) -> (RtdeClient, JoinHandle<Vec<Frame>>)
where
    F: FnOnce(ScriptedRobot) -> Fut + Send + 'static,
    Fut: Future<Output = Vec<Frame>> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        script(ScriptedRobot {
            stream,
            received: Vec::new(),
        })
        .await
    });
    let client = RtdeClient::new(RtdeConfig::new("127.0.0.1", port, Duration::from_secs(1)));
    (client, task)
}

fn sample_pose() -> Pose {
    Pose::new(0.4, -0.1, 0.25, 3.1, -0.05, 1.2)
}

fn count(frames: &[Frame], frame_type: FrameType) -> usize {
    frames.iter().filter(|f| f.is(frame_type)).count()
}

#[tokio::test]
async fn test_version_2_accepted_first_never_tries_version_1() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.handshake(7).await;
        robot
            .reply(FrameType::DataPackage, &pose_data_payload(7, &sample_pose()))
            .await;
        robot.drain().await
    })
    .await;

    let pose = client.read_pose().await.unwrap();
    assert_eq!(pose, sample_pose());

    let frames = robot.await.unwrap();
    assert_eq!(count(&frames, FrameType::RequestProtocolVersion), 1);
    assert_eq!(&frames[0].payload[..], &[0x00, 0x02]);

    // v2 setup: f64 frequency, then the variable name
    let setup = &frames[1];
    assert_eq!(&setup.payload[..8], &125.0f64.to_be_bytes());
    assert_eq!(&setup.payload[8..], b"actual_TCP_pose");

    // best-effort pause after the capture
    assert_eq!(frames.last().map(|f| f.frame_type), Some(b'P'));
}

#[tokio::test]
async fn test_falls_back_to_version_1() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        let first = robot.expect(FrameType::RequestProtocolVersion).await;
        assert_eq!(&first.payload[..], &[0x00, 0x02]);
        robot.reply(FrameType::RequestProtocolVersion, &[0x00]).await;

        let second = robot.expect(FrameType::RequestProtocolVersion).await;
        assert_eq!(&second.payload[..], &[0x00, 0x01]);
        robot.reply(FrameType::RequestProtocolVersion, &[0x01]).await;

        robot.setup_and_start(3).await;
        robot
            .reply(FrameType::DataPackage, &pose_data_payload(3, &sample_pose()))
            .await;
        robot.drain().await
    })
    .await;

    let pose = client.read_pose().await.unwrap();
    assert_eq!(pose, sample_pose());

    let frames = robot.await.unwrap();
    assert_eq!(count(&frames, FrameType::RequestProtocolVersion), 2);
    // v1 setup carries the names only
    let setup = frames
        .iter()
        .find(|f| f.is(FrameType::ControlPackageSetupOutputs))
        .unwrap();
    assert_eq!(&setup.payload[..], b"actual_TCP_pose");
}

#[tokio::test]
async fn test_no_version_accepted() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        for _ in 0..2 {
            robot.expect(FrameType::RequestProtocolVersion).await;
            robot.reply(FrameType::RequestProtocolVersion, &[0x00, 0x00]).await;
        }
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert_eq!(err, CommunicationError::ProtocolVersionRejected { tried: vec![2, 1] });
    assert_eq!(count(&robot.await.unwrap(), FrameType::ControlPackageSetupOutputs), 0);
}

#[tokio::test]
async fn test_text_frames_are_skipped() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        robot.reply(FrameType::TextMessage, b"controller booting").await;
        robot.reply(FrameType::RequestProtocolVersion, &[0x00, 0x02]).await;
        robot.setup_and_start(1).await;
        robot.reply(FrameType::LegacyTextMessage, b"log line").await;
        robot.reply(FrameType::TextMessage, b"another").await;
        robot
            .reply(FrameType::DataPackage, &pose_data_payload(1, &sample_pose()))
            .await;
        robot.drain().await
    })
    .await;

    assert_eq!(client.read_pose().await.unwrap(), sample_pose());
    robot.await.unwrap();
}

#[tokio::test]
async fn test_recipe_mismatch_fails_and_closes() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.handshake(5).await;
        robot
            .reply(FrameType::DataPackage, &pose_data_payload(6, &sample_pose()))
            .await;
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert_eq!(err, CommunicationError::RecipeMismatch { expected: 5, got: 6 });

    // drain only returns once the client closed its side; no pause on failure
    let frames = tokio::time::timeout(Duration::from_secs(3), robot)
        .await
        .expect("client closed the connection")
        .unwrap();
    assert_eq!(count(&frames, FrameType::ControlPackagePause), 0);
}

#[tokio::test]
async fn test_setup_rejected() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        robot.reply(FrameType::RequestProtocolVersion, &[0x00, 0x02]).await;
        robot.expect(FrameType::ControlPackageSetupOutputs).await;
        robot.reply(FrameType::ControlPackageSetupOutputs, &[0x00]).await;
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::SetupRejected { .. }), "{err}");
    robot.await.unwrap();
}

#[tokio::test]
async fn test_unknown_variable_is_setup_rejection() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        robot.reply(FrameType::RequestProtocolVersion, &[0x00, 0x02]).await;
        robot.expect(FrameType::ControlPackageSetupOutputs).await;
        robot.reply(FrameType::ControlPackageSetupOutputs, b"\x01NOT_FOUND").await;
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::SetupRejected { .. }), "{err}");
    robot.await.unwrap();
}

#[tokio::test]
async fn test_start_rejected() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        robot.reply(FrameType::RequestProtocolVersion, &[0x00, 0x02]).await;
        robot.expect(FrameType::ControlPackageSetupOutputs).await;
        robot.reply(FrameType::ControlPackageSetupOutputs, b"\x02DOUBLE").await;
        robot.expect(FrameType::ControlPackageStart).await;
        robot.reply(FrameType::ControlPackageStart, &[0]).await;
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::StartRejected { .. }), "{err}");
    robot.await.unwrap();
}

#[tokio::test]
async fn test_short_data_frame_is_malformed() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.handshake(1).await;
        robot.reply(FrameType::DataPackage, &[1, 0, 0, 0]).await;
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::MalformedFrame { .. }), "{err}");
    robot.await.unwrap();
}

#[tokio::test]
async fn test_unexpected_frame_during_negotiation() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        robot.reply(FrameType::ControlPackageStart, &[1]).await;
        robot.drain().await
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::UnexpectedFrame { .. }), "{err}");
    assert!(err.to_string().contains("negotiate_version"));
    robot.await.unwrap();
}

#[tokio::test]
async fn test_peer_closing_mid_handshake() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        robot.received
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::ConnectionClosed { .. }), "{err}");
    robot.await.unwrap();
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let (client, robot) = spawn_robot(|mut robot| async move {
        robot.expect(FrameType::RequestProtocolVersion).await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        robot.received
    })
    .await;

    let err = client.read_pose().await.unwrap_err();
    assert!(matches!(err, CommunicationError::Timeout { .. }), "{err}");
    robot.await.unwrap();
}

#[tokio::test]
async fn test_flag_acceptance_with_legacy_reply_type() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let robot = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut robot = ScriptedRobot {
            stream,
            received: Vec::new(),
        };
        robot.expect(FrameType::RequestProtocolVersion).await;
        // legacy controllers answer with 'P' and a single flag byte
        robot.reply(b'P', &[0x01]).await;
        robot.setup_and_start(9).await;
        robot
            .reply(FrameType::DataPackage, &pose_data_payload(9, &sample_pose()))
            .await;
        robot.drain().await
    });

    let config = RtdeConfig {
        acceptance: VersionAcceptance::Flag,
        ..RtdeConfig::new("127.0.0.1", port, Duration::from_secs(1))
    };
    let pose = RtdeClient::new(config).read_pose().await.unwrap();
    assert_eq!(pose, sample_pose());
    robot.await.unwrap();
}

#[tokio::test]
async fn test_consecutive_calls_use_fresh_sessions() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let robot = tokio::spawn(async move {
        let mut accepted = 0;
        for recipe in [4u8, 8u8] {
            let (stream, _) = listener.accept().await.unwrap();
            let mut robot = ScriptedRobot {
                stream,
                received: Vec::new(),
            };
            robot.handshake(recipe).await;
            robot
                .reply(FrameType::DataPackage, &pose_data_payload(recipe, &sample_pose()))
                .await;
            robot.drain().await;
            accepted += 1;
        }
        accepted
    });

    let client = RtdeClient::new(RtdeConfig::new("127.0.0.1", port, Duration::from_secs(1)));
    client.read_pose().await.unwrap();
    client.read_pose().await.unwrap();
    assert_eq!(robot.await.unwrap(), 2);
}
