//! Robot pose readers
//!
//! [`RtdeClient`] is the primary source; [`TextInterfaceClient`] is the
//! fallback when the binary handshake fails. [`PoseReader`] composes them and
//! tags each reading with the source that produced it.

pub mod rtde;
pub mod script;

pub use rtde::{read_pose, RtdeClient, RtdeConfig, SessionStage};
pub use script::{parse_pose_reply, TextInterfaceClient};

use async_trait::async_trait;
use network::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use station_config::RtdeSettings;
use tracing::warn;
use types::Pose;

/// Interface a pose was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseOrigin {
    Rtde,
    TextInterface,
}

impl fmt::Display for PoseOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoseOrigin::Rtde => f.write_str("rtde"),
            PoseOrigin::TextInterface => f.write_str("text_interface"),
        }
    }
}

/// A pose in meters/radians and where it came from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseReading {
    pub pose: Pose,
    pub origin: PoseOrigin,
}

impl PoseReading {
    /// Millimeters/degrees, as operators and the product records use them
    pub fn display_pose(&self) -> Pose {
        self.pose.to_millimeters_degrees()
    }
}

/// Anything that can produce one pose reading on demand
#[async_trait]
pub trait PoseSource: Send + Sync {
    fn origin(&self) -> PoseOrigin;

    async fn read_pose(&self) -> Result<Pose>;
}

#[async_trait]
impl PoseSource for RtdeClient {
    fn origin(&self) -> PoseOrigin {
        PoseOrigin::Rtde
    }

    async fn read_pose(&self) -> Result<Pose> {
        RtdeClient::read_pose(self).await
    }
}

#[async_trait]
impl PoseSource for TextInterfaceClient {
    fn origin(&self) -> PoseOrigin {
        PoseOrigin::TextInterface
    }

    async fn read_pose(&self) -> Result<Pose> {
        TextInterfaceClient::read_pose(self).await
    }
}

/// Primary source with an optional fallback
#[derive(Clone)]
pub struct PoseReader {
    primary: Arc<dyn PoseSource>,
    fallback: Option<Arc<dyn PoseSource>>,
}

impl PoseReader {
    pub fn new(primary: Arc<dyn PoseSource>, fallback: Option<Arc<dyn PoseSource>>) -> Self {
        Self { primary, fallback }
    }

    /// RTDE on `rtde.port`, script interface on `rtde.fallback_port`
    pub fn from_settings(settings: &RtdeSettings) -> Result<Self> {
        let primary = RtdeClient::new(RtdeConfig::from_settings(settings)?);
        let fallback = TextInterfaceClient::from_settings(settings);
        Ok(Self::new(Arc::new(primary), Some(Arc::new(fallback))))
    }

    /// Try the primary source, then the fallback.
    ///
    /// When both fail the fallback's error is returned; the primary's is
    /// logged.
    pub async fn read_pose_with_fallback(&self) -> Result<PoseReading> {
        let primary_err = match self.primary.read_pose().await {
            Ok(pose) => {
                return Ok(PoseReading {
                    pose,
                    origin: self.primary.origin(),
                })
            }
            Err(e) => e,
        };

        let Some(fallback) = &self.fallback else {
            return Err(primary_err);
        };

        warn!(
            source = %self.primary.origin(),
            fallback = %fallback.origin(),
            error = %primary_err,
            "Pose read failed, trying fallback"
        );
        let pose = fallback.read_pose().await?;
        Ok(PoseReading {
            pose,
            origin: fallback.origin(),
        })
    }
}
