//! # Workstation Device Adapters
//!
//! ## Purpose
//!
//! Clients for the devices the workstation talks to on demand, as opposed to
//! the long-lived links in `network`:
//!
//! - [`robot`]: one-shot RTDE pose reads with a text-interface fallback
//! - [`vision`]: fixed command strings for the vision controller
//!
//! ## Integration Points
//!
//! - **Framing**: `codec` frames and RTDE payload builders
//! - **Sockets**: `network::TcpConnection`, every call bounded by a timeout
//! - **Configuration**: built from `station_config` settings sections
//! - **Errors**: every failure is a `network::CommunicationError`

pub mod robot;
pub mod vision;

pub use robot::{
    read_pose, PoseOrigin, PoseReader, PoseReading, PoseSource, RtdeClient, RtdeConfig,
    TextInterfaceClient,
};
pub use vision::{VisionClient, VisionCommand};
