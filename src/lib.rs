//! NetMetr client
//!
//! Measures download and upload speed and ping over IPv4 and IPv6 by driving
//! the external `rmbt` binary against a NetMetr control server. Results come
//! back per protocol family as simple megabit/millisecond values.

pub mod app;
pub mod cli;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod models;
pub mod netmetr;
pub mod output;

// Re-export commonly used types
pub use error::{AppError, ProtocolFailureKind, Result};
pub use measurement::{MeasurementBackend, MeasurementOutcome, RmbtBackend};
pub use models::{CombinedResult, Config, Protocol, ProtocolMode, ProtocolResult, SpeedSummary};
pub use netmetr::Netmetr;

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Build information embedded by build.rs
pub const BUILD_TIME: &str = env!("BUILD_TIME");
pub const GIT_COMMIT: &str = env!("GIT_COMMIT");
pub const TARGET_TRIPLE: &str = env!("TARGET_TRIPLE");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_CONTROL_SERVER: &str = "control.netmetr.cz";
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_HISTORY_LOGS: u32 = 10;
    pub const DEFAULT_RMBT_BINARY: &str = "rmbt";
    pub const DEFAULT_PING_BINARY: &str = "ping";
    pub const DEFAULT_STATE_FILE: &str = "netmetr-state.json";
    pub const DEFAULT_HISTORY_FILE: &str = "/tmp/netmetr-history.json";
    pub const DEFAULT_ENABLE_COLOR: bool = true;
    /// Used when `LANG` gives no usable language
    pub const DEFAULT_LANGUAGE: &str = "en_US";
}
