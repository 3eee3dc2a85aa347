//! Formatter trait and the plain and JSON renderings

use crate::error::Result;
use crate::models::{CombinedResult, Protocol, ProtocolResult, SpeedSummary};

/// Renders measurement results for the terminal
pub trait OutputFormatter: Send + Sync {
    /// Render a combined (per-protocol) result
    fn format_result(&self, result: &CombinedResult) -> Result<String>;

    /// Render the result of a single-protocol measurement
    fn format_summary(&self, protocol: Protocol, summary: &SpeedSummary) -> Result<String>;
}

/// Width of the protocol column
pub(crate) const PROTOCOL_WIDTH: usize = 6;

pub(crate) fn summary_text(summary: &SpeedSummary) -> String {
    format!(
        "download {:>8.2} Mbit/s   upload {:>8.2} Mbit/s   ping {:>7.2} ms",
        summary.download_mbps, summary.upload_mbps, summary.ping_ms
    )
}

/// Human-readable output without ANSI colors
#[derive(Debug, Default)]
pub struct PlainFormatter;

impl PlainFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputFormatter for PlainFormatter {
    fn format_result(&self, result: &CombinedResult) -> Result<String> {
        if result.is_empty() {
            return Ok("No protocol was measured".to_string());
        }

        let lines: Vec<String> = result
            .iter()
            .map(|(protocol, entry)| match entry {
                ProtocolResult::Success(summary) => {
                    format!("{:<width$}{}", protocol.as_str(), summary_text(summary), width = PROTOCOL_WIDTH)
                }
                ProtocolResult::Failure { error } => {
                    format!("{:<width$}error: {}", protocol.as_str(), error, width = PROTOCOL_WIDTH)
                }
            })
            .collect();

        Ok(lines.join("\n"))
    }

    fn format_summary(&self, protocol: Protocol, summary: &SpeedSummary) -> Result<String> {
        Ok(format!("{:<width$}{}", protocol.as_str(), summary_text(summary), width = PROTOCOL_WIDTH))
    }
}

/// Machine-readable output
#[derive(Debug, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

impl OutputFormatter for JsonFormatter {
    fn format_result(&self, result: &CombinedResult) -> Result<String> {
        Ok(serde_json::to_string_pretty(result)?)
    }

    fn format_summary(&self, protocol: Protocol, summary: &SpeedSummary) -> Result<String> {
        let mut result = CombinedResult::new();
        result.insert(protocol, ProtocolResult::Success(*summary));
        self.format_result(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CombinedResult {
        let mut result = CombinedResult::new();
        result.insert(
            Protocol::IPv4,
            ProtocolResult::Success(SpeedSummary { download_mbps: 90.69, upload_mbps: 58.08, ping_ms: 4.2 }),
        );
        result.insert(Protocol::IPv6, ProtocolResult::failure("Not available"));
        result
    }

    #[test]
    fn test_plain_formatter() {
        let output = PlainFormatter::new().format_result(&sample()).unwrap();
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("IPv4"));
        assert!(lines[0].contains("90.69 Mbit/s"));
        assert!(lines[0].contains("4.20 ms"));
        assert_eq!(lines[1], "IPv6  error: Not available");
    }

    #[test]
    fn test_plain_formatter_empty() {
        let output = PlainFormatter::new().format_result(&CombinedResult::new()).unwrap();
        assert_eq!(output, "No protocol was measured");
    }

    #[test]
    fn test_json_formatter() {
        let output = JsonFormatter::new().format_result(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["IPv4"]["download_mbps"], 90.69);
        assert_eq!(value["IPv6"]["error"], "Not available");

        let summary = SpeedSummary { download_mbps: 1.0, upload_mbps: 2.0, ping_ms: 3.0 };
        let output = JsonFormatter::new().format_summary(Protocol::IPv6, &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["IPv6"]["ping_ms"], 3.0);
    }
}
