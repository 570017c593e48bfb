//! Vision-controller command client
//!
//! Each command is one short-lived connection: write the command text, read
//! until a newline or the timeout, return the trimmed reply. Replies are XML
//! snippets; interpreting them is left to the caller.

use network::{PeerAddress, Result, TcpConnection};
use station_config::VisionSettings;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed commands understood by the vision controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisionCommand {
    Autofocus,
    FocusPosition,
    Trigger,
    ReadCode,
    AutoFocusWidth,
    AutoFocusHeight,
    AutoFocusDepth,
    AutoFocusOriginX,
    AutoFocusOriginY,
    AutoFocusOriginZ,
}

impl VisionCommand {
    pub const ALL: [VisionCommand; 10] = [
        VisionCommand::Autofocus,
        VisionCommand::FocusPosition,
        VisionCommand::Trigger,
        VisionCommand::ReadCode,
        VisionCommand::AutoFocusWidth,
        VisionCommand::AutoFocusHeight,
        VisionCommand::AutoFocusDepth,
        VisionCommand::AutoFocusOriginX,
        VisionCommand::AutoFocusOriginY,
        VisionCommand::AutoFocusOriginZ,
    ];

    /// Wire text of the command
    pub const fn as_str(self) -> &'static str {
        match self {
            VisionCommand::Autofocus => r#"<LIMA CMD="Project_SetNode" DIR="Request" PATH="Module Application.Smart Camera.Optic Control.Auto Focus" VALUE="1" />"#,
            VisionCommand::FocusPosition => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Optic Control.Focus Position [mm]" />"#,
            VisionCommand::Trigger => "<T/>",
            VisionCommand::ReadCode => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Module Spreadsheet.Exports.C1" />"#,
            VisionCommand::AutoFocusWidth => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Auto Focus Box.Width" />"#,
            VisionCommand::AutoFocusHeight => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Auto Focus Box.Height" />"#,
            VisionCommand::AutoFocusDepth => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Auto Focus Box.Depth" />"#,
            VisionCommand::AutoFocusOriginX => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Auto Focus Box.Origin.X" />"#,
            VisionCommand::AutoFocusOriginY => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Auto Focus Box.Origin.Y" />"#,
            VisionCommand::AutoFocusOriginZ => r#"<LIMA CMD="Project_GetNode" DIR="Request" PATH="Module Application.Smart Camera.Auto Focus Box.Origin.Z" />"#,
        }
    }

    /// Short name used on the command line and in logs
    pub const fn name(self) -> &'static str {
        match self {
            VisionCommand::Autofocus => "autofocus",
            VisionCommand::FocusPosition => "get_focus",
            VisionCommand::Trigger => "trigger",
            VisionCommand::ReadCode => "get_code",
            VisionCommand::AutoFocusWidth => "af_width",
            VisionCommand::AutoFocusHeight => "af_height",
            VisionCommand::AutoFocusDepth => "af_depth",
            VisionCommand::AutoFocusOriginX => "af_origin_x",
            VisionCommand::AutoFocusOriginY => "af_origin_y",
            VisionCommand::AutoFocusOriginZ => "af_origin_z",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for VisionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct VisionClient {
    peer: PeerAddress,
    timeout: Duration,
}

impl VisionClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            peer: PeerAddress::new(host, port),
            timeout,
        }
    }

    pub fn from_settings(settings: &VisionSettings) -> Self {
        Self::new(settings.host.clone(), settings.port, settings.timeout())
    }

    pub fn peer(&self) -> &PeerAddress {
        &self.peer
    }

    /// Send raw command text and return the trimmed reply
    pub async fn send_command(&self, command: &str) -> Result<String> {
        let mut conn = TcpConnection::connect(&self.peer, self.timeout).await?;
        let reply = exchange(&mut conn, command, self.timeout).await;
        conn.shutdown().await;

        let reply = reply?.trim().to_string();
        debug!(peer = %self.peer, command, reply = %reply, "Vision command");
        Ok(reply)
    }

    pub async fn execute(&self, command: VisionCommand) -> Result<String> {
        self.send_command(command.as_str()).await
    }

    /// Whether a connection can be opened at all
    pub async fn test_connection(&self) -> bool {
        match TcpConnection::connect(&self.peer, self.timeout).await {
            Ok(conn) => {
                conn.shutdown().await;
                true
            }
            Err(e) => {
                warn!(peer = %self.peer, error = %e, "Vision controller unreachable");
                false
            }
        }
    }
}

async fn exchange(conn: &mut TcpConnection, command: &str, timeout: Duration) -> Result<String> {
    conn.send(command.as_bytes(), timeout).await?;
    conn.read_text_until(|text| text.contains('\n'), timeout).await
}
