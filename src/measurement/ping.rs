//! Shortest round-trip time via the system `ping` binary

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::Protocol;
use regex::Regex;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;

/// Pause between two consecutive pings
pub const PING_INTERVAL: Duration = Duration::from_millis(500);

fn ping_time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("valid ping time pattern"))
}

/// Arguments for a single ping towards `host`
pub fn ping_args(protocol: Protocol, host: &str, bind: Option<IpAddr>) -> Vec<String> {
    let mut args = vec![
        "-c1".to_string(),
        match protocol {
            Protocol::IPv4 => "-4".to_string(),
            Protocol::IPv6 => "-6".to_string(),
        },
    ];

    if let Some(address) = bind {
        args.push("-I".to_string());
        args.push(address.to_string());
    }

    args.push(host.to_string());
    args
}

/// Round-trip time in nanoseconds reported by one ping run
pub fn parse_ping_time(output: &str) -> Option<u64> {
    let captures = ping_time_pattern().captures(output)?;
    let millis: f64 = captures.get(1)?.as_str().parse().ok()?;
    Some((millis * 1_000_000.0).round() as u64)
}

/// Ping settings for one measurement
pub struct Pinger<'a> {
    pub binary: &'a str,
    pub interval: Duration,
    pub logger: &'a Logger,
}

impl Pinger<'_> {
    /// Ping `host` `count` times and return the shortest time in nanoseconds
    pub async fn shortest(&self, protocol: Protocol, host: &str, count: u32, bind: Option<IpAddr>) -> Result<u64> {
        let args = ping_args(protocol, host, bind);
        let mut times = Vec::with_capacity(count as usize);

        for attempt in 0..count {
            if attempt > 0 {
                tokio::time::sleep(self.interval).await;
            }

            let output = Command::new(self.binary)
                .args(&args)
                .output()
                .await
                .map_err(|e| AppError::measurement(format!("Failed to run {}: {}", self.binary, e)))?;

            if !output.status.success() {
                self.logger
                    .debug("Ping attempt failed")
                    .field("attempt", attempt + 1)
                    .field("status", output.status.to_string())
                    .log()
                    .await;
                continue;
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let time = parse_ping_time(&stdout)
                .ok_or_else(|| AppError::measurement("Problem decoding pings"))?;
            times.push(time);
        }

        let shortest = times
            .into_iter()
            .min()
            .ok_or_else(|| AppError::measurement(format!("Problem getting lowest ping: no reply from {}", host)))?;

        self.logger
            .debug("Ping finished")
            .field("host", host)
            .field("shortest_ns", shortest)
            .log()
            .await;

        Ok(shortest)
    }
}
