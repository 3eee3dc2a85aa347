//! Colored terminal output

use super::formatter::{summary_text, OutputFormatter, PROTOCOL_WIDTH};
use crate::error::Result;
use crate::models::{CombinedResult, Protocol, ProtocolResult, SpeedSummary};
use colored::Colorize;

/// Colored human-readable output
#[derive(Debug, Default)]
pub struct ColoredFormatter;

impl ColoredFormatter {
    pub fn new() -> Self {
        Self
    }

    fn success_line(&self, protocol: Protocol, summary: &SpeedSummary) -> String {
        format!(
            "{} {}",
            format!("{:<width$}", protocol.as_str(), width = PROTOCOL_WIDTH - 1).bold(),
            summary_text(summary).green()
        )
    }
}

impl OutputFormatter for ColoredFormatter {
    fn format_result(&self, result: &CombinedResult) -> Result<String> {
        if result.is_empty() {
            return Ok("No protocol was measured".yellow().to_string());
        }

        let lines: Vec<String> = result
            .iter()
            .map(|(&protocol, entry)| match entry {
                ProtocolResult::Success(summary) => self.success_line(protocol, summary),
                ProtocolResult::Failure { error } => format!(
                    "{} {}",
                    format!("{:<width$}", protocol.as_str(), width = PROTOCOL_WIDTH - 1).bold(),
                    format!("error: {}", error).red()
                ),
            })
            .collect();

        Ok(lines.join("\n"))
    }

    fn format_summary(&self, protocol: Protocol, summary: &SpeedSummary) -> Result<String> {
        Ok(self.success_line(protocol, summary))
    }
}
