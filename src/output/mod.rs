//! Output formatting of measurement results
//!
//! Results are rendered as colored or plain text tables, or as JSON for
//! scripts.

mod colored;
mod formatter;

pub use self::colored::ColoredFormatter;
pub use self::formatter::{JsonFormatter, OutputFormatter, PlainFormatter};

/// Output formatting factory for creating appropriate formatters
pub struct OutputFormatterFactory;

impl OutputFormatterFactory {
    /// Create a formatter based on color support and preferences
    pub fn create_formatter(enable_color: bool, json: bool) -> Box<dyn OutputFormatter> {
        if json {
            Box::new(JsonFormatter::new())
        } else if enable_color {
            Box::new(ColoredFormatter::new())
        } else {
            Box::new(PlainFormatter::new())
        }
    }

    /// Formatter for a loaded configuration
    pub fn for_config(config: &crate::models::Config) -> Box<dyn OutputFormatter> {
        Self::create_formatter(config.enable_color, config.json_output)
    }
}
