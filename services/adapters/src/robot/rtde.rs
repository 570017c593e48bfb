//! # RTDE One-Shot Pose Client
//!
//! Opens one connection to the controller's RTDE port, runs the handshake,
//! captures a single `actual_TCP_pose` data package and closes again.
//!
//! ```text
//! Connect ─► NegotiateVersion ─► SetupOutputs ─► Start ─► AwaitData ─► (Pause) ─► Closed
//!               │ try 2, then 1      recipe_id ◄─┘          │ skip 'M'/'b'
//!               └─ none accepted: ProtocolVersionRejected   └─ recipe must match
//! ```
//!
//! Every error is surfaced to the caller; there is no retry inside a call and
//! nothing survives between calls. The connection is closed on every path.

use codec::rtde::{self, SetupOutcome, VersionAcceptance};
use codec::{hexdump, read_frame, write_frame, Frame, FrameType, ProtocolError, HEXDUMP_LIMIT};
use network::{CommunicationError, PeerAddress, Result, TcpConnection};
use station_config::RtdeSettings;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};
use types::Pose;

/// Upper bound on waiting for the pause acknowledgement
pub const PAUSE_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Connection and negotiation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RtdeConfig {
    pub host: String,
    pub port: u16,
    /// Bound on connecting and on every single frame read or write
    pub timeout: Duration,
    pub acceptance: VersionAcceptance,
    /// Protocol versions to try, most preferred first
    pub versions: Vec<u16>,
    pub frequency_hz: f64,
}

impl Default for RtdeConfig {
    fn default() -> Self {
        Self {
            host: station_config::defaults::rtde::HOST.to_string(),
            port: rtde::RTDE_PORT,
            timeout: Duration::from_millis(station_config::defaults::rtde::TIMEOUT_MS),
            acceptance: VersionAcceptance::default(),
            versions: rtde::CANDIDATE_VERSIONS.to_vec(),
            frequency_hz: rtde::DEFAULT_FREQUENCY_HZ,
        }
    }
}

impl RtdeConfig {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &RtdeSettings) -> Result<Self> {
        Ok(Self {
            acceptance: parse_acceptance(&settings.acceptance)?,
            ..Self::new(settings.host.clone(), settings.port, settings.timeout())
        })
    }

    pub fn peer(&self) -> PeerAddress {
        PeerAddress::new(self.host.clone(), self.port)
    }
}

/// Map the configured strategy name onto [`VersionAcceptance`]
pub fn parse_acceptance(name: &str) -> Result<VersionAcceptance> {
    match name {
        "version_echo" => Ok(VersionAcceptance::VersionEcho),
        "flag" => Ok(VersionAcceptance::Flag),
        other => Err(CommunicationError::configuration(
            format!("unknown version acceptance strategy '{other}'"),
            Some("rtde.acceptance"),
        )),
    }
}

/// Where a session currently is in the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    Connect,
    NegotiateVersion,
    SetupOutputs,
    Start,
    AwaitData,
    Pause,
    Closed,
}

impl SessionStage {
    pub const fn as_str(self) -> &'static str {
        match self {
            SessionStage::Connect => "connect",
            SessionStage::NegotiateVersion => "negotiate_version",
            SessionStage::SetupOutputs => "setup_outputs",
            SessionStage::Start => "start",
            SessionStage::AwaitData => "await_data",
            SessionStage::Pause => "pause",
            SessionStage::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stateless client; each [`read_pose`](RtdeClient::read_pose) is one session
#[derive(Debug, Clone)]
pub struct RtdeClient {
    config: RtdeConfig,
}

impl RtdeClient {
    pub fn new(config: RtdeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RtdeConfig {
        &self.config
    }

    /// Capture one pose in meters/radians
    pub async fn read_pose(&self) -> Result<Pose> {
        let peer = self.config.peer();
        let mut conn = TcpConnection::connect(&peer, self.config.timeout).await?;

        let mut session = ProtocolSession::new(&mut conn, &self.config);
        let result = session.capture_pose().await;
        if result.is_ok() {
            session.pause().await;
        }
        let stage = session.finish();
        conn.shutdown().await;

        match &result {
            Ok(pose) => info!(peer = %peer, pose = %pose, "RTDE pose captured"),
            Err(e) => warn!(peer = %peer, stage = %stage, error = %e, "RTDE session failed"),
        }
        result
    }
}

/// One-shot read with default negotiation settings
pub async fn read_pose(host: &str, port: u16, timeout: Duration) -> Result<Pose> {
    RtdeClient::new(RtdeConfig::new(host, port, timeout))
        .read_pose()
        .await
}

/// Handshake state of a single connection; `recipe_id` never outlives it
struct ProtocolSession<'a> {
    conn: &'a mut TcpConnection,
    config: &'a RtdeConfig,
    stage: SessionStage,
    version: Option<u16>,
    recipe_id: Option<u8>,
}

impl<'a> ProtocolSession<'a> {
    fn new(conn: &'a mut TcpConnection, config: &'a RtdeConfig) -> Self {
        Self {
            conn,
            config,
            stage: SessionStage::Connect,
            version: None,
            recipe_id: None,
        }
    }

    async fn capture_pose(&mut self) -> Result<Pose> {
        let version = self.negotiate_version().await?;
        let recipe_id = self.setup_outputs(version).await?;
        self.start().await?;
        self.await_data(recipe_id).await
    }

    fn enter(&mut self, stage: SessionStage) {
        debug!(peer = %self.conn.peer_addr(), from = %self.stage, to = %stage, "RTDE stage");
        self.stage = stage;
    }

    /// Returns the stage the session failed in, or `Closed`
    fn finish(mut self) -> SessionStage {
        let last = self.stage;
        debug!(
            version = ?self.version,
            recipe_id = ?self.recipe_id,
            last_stage = %last,
            "RTDE session closing"
        );
        self.enter(SessionStage::Closed);
        last
    }

    async fn negotiate_version(&mut self) -> Result<u16> {
        self.enter(SessionStage::NegotiateVersion);
        let config = self.config;

        for &version in &config.versions {
            if self.request_version(version).await? {
                info!(peer = %self.conn.peer_addr(), version, "RTDE protocol version accepted");
                self.version = Some(version);
                return Ok(version);
            }
            debug!(peer = %self.conn.peer_addr(), version, "RTDE protocol version rejected");
        }

        Err(CommunicationError::ProtocolVersionRejected {
            tried: config.versions.clone(),
        })
    }

    async fn request_version(&mut self, version: u16) -> Result<bool> {
        self.send(FrameType::RequestProtocolVersion, &rtde::version_request(version))
            .await?;
        let reply = self
            .expect_reply(FrameType::RequestProtocolVersion, rtde::is_version_reply)
            .await?;
        Ok(self.config.acceptance.accepts(version, &reply.payload)?)
    }

    async fn setup_outputs(&mut self, version: u16) -> Result<u8> {
        self.enter(SessionStage::SetupOutputs);
        let request = rtde::setup_outputs_request(
            version,
            self.config.frequency_hz,
            &[rtde::TCP_POSE_VARIABLE],
        );
        self.send(FrameType::ControlPackageSetupOutputs, &request).await?;

        let setup = u8::from(FrameType::ControlPackageSetupOutputs);
        let reply = self
            .expect_reply(FrameType::ControlPackageSetupOutputs, |t| t == setup)
            .await?;

        match rtde::parse_setup_reply(&reply.payload)? {
            SetupOutcome::Accepted { recipe_id, types } => {
                info!(peer = %self.conn.peer_addr(), recipe_id, types = %types, "RTDE outputs configured");
                self.recipe_id = Some(recipe_id);
                Ok(recipe_id)
            }
            SetupOutcome::Rejected { reason } => Err(CommunicationError::SetupRejected { reason }),
        }
    }

    async fn start(&mut self) -> Result<()> {
        self.enter(SessionStage::Start);
        self.send(FrameType::ControlPackageStart, &[]).await?;

        let start = u8::from(FrameType::ControlPackageStart);
        let reply = self
            .expect_reply(FrameType::ControlPackageStart, |t| t == start)
            .await?;

        if !rtde::parse_start_reply(&reply.payload)? {
            return Err(CommunicationError::StartRejected {
                message: format!(
                    "start reply payload {}",
                    hexdump(&reply.payload, HEXDUMP_LIMIT)
                ),
            });
        }
        Ok(())
    }

    async fn await_data(&mut self, recipe_id: u8) -> Result<Pose> {
        self.enter(SessionStage::AwaitData);
        loop {
            let frame = self.receive().await?;
            if frame.is_text() {
                self.log_text(&frame);
                continue;
            }
            if !frame.is(FrameType::DataPackage) {
                return Err(self.unexpected(FrameType::DataPackage, &frame));
            }

            let (got, pose) = rtde::parse_pose_data(&frame.payload)?;
            if got != recipe_id {
                return Err(CommunicationError::RecipeMismatch {
                    expected: recipe_id,
                    got,
                });
            }
            return Ok(pose);
        }
    }

    /// Best effort; the connection closes afterwards regardless
    async fn pause(&mut self) {
        self.enter(SessionStage::Pause);
        let timeout = PAUSE_REPLY_TIMEOUT.min(self.config.timeout);
        let stream = self.conn.stream_mut();

        if let Err(e) = write_frame(&mut *stream, FrameType::ControlPackagePause.into(), &[], timeout).await {
            debug!(error = %e, "RTDE pause request not sent");
            return;
        }
        match read_frame(&mut *stream, timeout).await {
            Ok(frame) => debug!(frame = %frame, "RTDE pause reply"),
            Err(e) => debug!(error = %e, "No RTDE pause reply"),
        }
    }

    /// Read frames until one passes `accept`, skipping text frames
    async fn expect_reply(&mut self, expected: FrameType, accept: impl Fn(u8) -> bool) -> Result<Frame> {
        loop {
            let frame = self.receive().await?;
            if accept(frame.frame_type) {
                return Ok(frame);
            }
            if frame.is_text() {
                self.log_text(&frame);
                continue;
            }
            return Err(self.unexpected(expected, &frame));
        }
    }

    async fn send(&mut self, frame_type: FrameType, payload: &[u8]) -> Result<()> {
        write_frame(
            self.conn.stream_mut(),
            frame_type.into(),
            payload,
            self.config.timeout,
        )
        .await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<Frame> {
        Ok(read_frame(self.conn.stream_mut(), self.config.timeout).await?)
    }

    fn log_text(&self, frame: &Frame) {
        info!(
            peer = %self.conn.peer_addr(),
            stage = %self.stage,
            text = %frame.text(),
            "Skipping RTDE text message"
        );
    }

    fn unexpected(&self, expected: FrameType, frame: &Frame) -> CommunicationError {
        ProtocolError::unexpected_frame(expected.into(), frame.frame_type, self.stage.as_str()).into()
    }
}
