//! Default configuration values
//!
//! Factory defaults of the workstation network. Every value can be overridden
//! from the TOML file or the environment.

/// Robot controller, binary RTDE interface
pub mod rtde {
    pub const HOST: &str = "10.3.218.4";
    pub const PORT: u16 = 30004;
    pub const TIMEOUT_MS: u64 = 3_000;

    /// Text command interface used when RTDE fails
    pub const FALLBACK_PORT: u16 = 30002;

    /// `version_echo` or `flag`
    pub const ACCEPTANCE: &str = "version_echo";
}

/// Vision controller command interface
pub mod vision {
    pub const HOST: &str = "10.3.218.3";
    pub const PORT: u16 = 33020;
    pub const TIMEOUT_MS: u64 = 5_000;
}

/// Upstream text stream
pub mod stream {
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 34000;
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Reconnection backoff base (milliseconds)
    pub const BASE_BACKOFF_MS: u64 = 1_000;

    /// Reconnection backoff ceiling (milliseconds)
    pub const MAX_BACKOFF_MS: u64 = 30_000;

    /// The stream is only opened when explicitly enabled
    pub const ENABLED: bool = false;
}

/// Inbound listener
pub mod listener {
    pub const BIND_ADDRESS: &str = "0.0.0.0";
    pub const PORT: u16 = 34000;
    pub const MAX_CONNECTIONS: usize = 16;
    pub const READ_BUFFER_SIZE: usize = 4096;
    pub const NOTIFY_HOST: &str = "127.0.0.1";
    pub const NOTIFY_PORT: u16 = 3401;
}

/// Cobot receiving the formatted replies
pub mod downstream {
    pub const HOST: &str = "127.0.0.1";
    pub const PORT: u16 = 3401;
    pub const TIMEOUT_MS: u64 = 5_000;

    /// Wait for the `OK` acknowledgement after each reply
    pub const READ_ACK: bool = true;

    /// Append the `END` marker before the trailing newline
    pub const APPEND_END_MARKER: bool = false;
}

/// Prefix of environment overrides, e.g. `STATION_RTDE__HOST`
pub const ENV_PREFIX: &str = "STATION";

/// Separator between nested keys in environment overrides
pub const ENV_SEPARATOR: &str = "__";
