//! Measurement result shapes returned to callers

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// IP protocol family under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Protocol {
    IPv4,
    IPv6,
}

impl Protocol {
    /// Both families, in measurement order
    pub const ALL: [Protocol; 2] = [Protocol::IPv4, Protocol::IPv6];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::IPv4 => "IPv4",
            Protocol::IPv6 => "IPv6",
        }
    }

    /// The other protocol family
    pub fn other(&self) -> Protocol {
        match self {
            Protocol::IPv4 => Protocol::IPv6,
            Protocol::IPv6 => Protocol::IPv4,
        }
    }

    /// Protocol family of an IP address
    pub fn of_addr(addr: &IpAddr) -> Protocol {
        match addr {
            IpAddr::V4(_) => Protocol::IPv4,
            IpAddr::V6(_) => Protocol::IPv6,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which protocol families a run measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolMode {
    #[serde(rename = "only_4")]
    Only4,
    #[serde(rename = "only_6")]
    Only6,
    #[serde(rename = "prefer_4")]
    Prefer4,
    #[default]
    #[serde(rename = "prefer_6")]
    Prefer6,
    Both,
}

impl ProtocolMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolMode::Only4 => "only_4",
            ProtocolMode::Only6 => "only_6",
            ProtocolMode::Prefer4 => "prefer_4",
            ProtocolMode::Prefer6 => "prefer_6",
            ProtocolMode::Both => "both",
        }
    }

    /// Mode selected by the `-4`/`-6` switches, if any was given
    pub fn from_flags(ipv4: bool, ipv6: bool) -> Option<Self> {
        match (ipv4, ipv6) {
            (true, true) => Some(ProtocolMode::Both),
            (true, false) => Some(ProtocolMode::Only4),
            (false, true) => Some(ProtocolMode::Only6),
            (false, false) => None,
        }
    }

    /// Protocols measured unconditionally in this mode
    pub fn primary(&self) -> BTreeSet<Protocol> {
        match self {
            ProtocolMode::Only4 | ProtocolMode::Prefer4 => BTreeSet::from([Protocol::IPv4]),
            ProtocolMode::Only6 | ProtocolMode::Prefer6 => BTreeSet::from([Protocol::IPv6]),
            ProtocolMode::Both => Protocol::ALL.into_iter().collect(),
        }
    }

    /// Protocol tried when the primary one produced no result
    pub fn fallback(&self) -> Option<Protocol> {
        match self {
            ProtocolMode::Prefer4 => Some(Protocol::IPv6),
            ProtocolMode::Prefer6 => Some(Protocol::IPv4),
            _ => None,
        }
    }
}

impl FromStr for ProtocolMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "only_4" => Ok(ProtocolMode::Only4),
            "only_6" => Ok(ProtocolMode::Only6),
            "prefer_4" => Ok(ProtocolMode::Prefer4),
            "prefer_6" => Ok(ProtocolMode::Prefer6),
            "both" => Ok(ProtocolMode::Both),
            other => Err(AppError::config(format!("Not a valid protocol mode: {}", other))),
        }
    }
}

impl fmt::Display for ProtocolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simplified result of one successful protocol measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSummary {
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
}

impl SpeedSummary {
    /// Build from raw kbps throughputs and the shortest ping in nanoseconds
    pub fn from_raw(download_kbps: f64, upload_kbps: f64, ping_shortest_ns: u64) -> Self {
        Self {
            download_mbps: round2(download_kbps / 1000.0),
            upload_mbps: round2(upload_kbps / 1000.0),
            ping_ms: round2(ping_shortest_ns as f64 / 1_000_000.0),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Outcome of one protocol within a combined measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtocolResult {
    Success(SpeedSummary),
    Failure { error: String },
}

impl ProtocolResult {
    pub fn failure<S: Into<String>>(error: S) -> Self {
        ProtocolResult::Failure { error: error.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProtocolResult::Success(_))
    }

    pub fn summary(&self) -> Option<&SpeedSummary> {
        match self {
            ProtocolResult::Success(summary) => Some(summary),
            ProtocolResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ProtocolResult::Success(_) => None,
            ProtocolResult::Failure { error } => Some(error),
        }
    }
}

/// Per-protocol results keyed by protocol name
///
/// Serializes as `{"IPv4": {...}, "IPv6": {"error": "..."}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinedResult(BTreeMap<Protocol, ProtocolResult>);

impl CombinedResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, protocol: Protocol, result: ProtocolResult) {
        self.0.insert(protocol, result);
    }

    pub fn get(&self, protocol: Protocol) -> Option<&ProtocolResult> {
        self.0.get(&protocol)
    }

    /// Protocols present in the result
    pub fn protocols(&self) -> BTreeSet<Protocol> {
        self.0.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Protocol, &ProtocolResult)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether at least one protocol produced a success value
    pub fn any_success(&self) -> bool {
        self.0.values().any(ProtocolResult::is_success)
    }

    /// Add the entries of another result, keeping existing keys
    pub fn merge(&mut self, other: CombinedResult) {
        for (protocol, result) in other.0 {
            self.0.entry(protocol).or_insert(result);
        }
    }
}
