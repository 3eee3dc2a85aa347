//! Data models: configuration and measurement results

pub mod config;
pub mod result;

pub use config::Config;
pub use result::{CombinedResult, Protocol, ProtocolMode, ProtocolResult, SpeedSummary};
