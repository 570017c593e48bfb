//! # Station Configuration
//!
//! Defaults and layered loading for the workstation device links.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use station_config::{defaults, load_config};
//!
//! let config = load_config(None).expect("valid configuration");
//! assert_eq!(defaults::rtde::PORT, 30004);
//! println!("robot at {}:{}", config.rtde.host, config.rtde.port);
//! ```

pub mod defaults;
pub mod station_config;

pub use station_config::{
    load_config, CatalogSettings, DownstreamSettings, ListenerSettings, RtdeSettings,
    StationConfig, StreamSettings, VisionSettings, ACCEPTANCE_STRATEGIES,
};
