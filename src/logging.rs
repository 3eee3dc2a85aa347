//! Structured logging for the NetMetr client
//!
//! Every component gets a named [`Logger`]. Entries carry a timestamp, a level,
//! the logger name and structured fields such as the protocol or the error
//! category, and are rendered as console lines, JSON objects or a compact
//! one-liner. Warnings and errors go to stderr, everything else to stdout.

use crate::error::{AppError, Result};
use crate::models::Config;
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Log level, ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Request bodies, raw tool output
    Debug,
    /// Measurement progress and results
    Info,
    Warn,
    /// A step failed; the run may still go on
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }

    fn colorize(&self, label: &str) -> ColoredString {
        match self {
            LogLevel::Debug => label.cyan(),
            LogLevel::Info => label.green(),
            LogLevel::Warn => label.yellow(),
            LogLevel::Error => label.red().bold(),
        }
    }
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console format
    #[default]
    Console,
    /// One JSON object per line
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "console" => Ok(LogFormat::Console),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(AppError::config(format!("Invalid log format: {}", s))),
        }
    }
}

/// One structured log record
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub logger: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

/// Named logger
pub struct Logger {
    name: String,
    min_level: LogLevel,
    use_color: bool,
    format: LogFormat,
    /// Shared by all loggers of one client run
    session: Arc<RwLock<Option<String>>>,
}

impl Logger {
    pub fn new(name: String) -> Self {
        Self {
            name,
            min_level: LogLevel::Info,
            use_color: true,
            format: LogFormat::Console,
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Logger honoring the `debug`, `quiet`, color and format settings
    pub fn with_config(name: String, config: &Config) -> Self {
        let min_level = if config.debug {
            LogLevel::Debug
        } else if config.quiet {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };

        Self {
            min_level,
            use_color: config.enable_color,
            format: config.log_format,
            ..Self::new(name)
        }
    }

    /// Logger that only reports errors, for library callers that want no chatter
    pub fn quiet(name: &str) -> Self {
        Self {
            min_level: LogLevel::Error,
            use_color: false,
            ..Self::new(name.to_string())
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn would_log(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    pub async fn set_session_id(&self, session_id: String) {
        *self.session.write().await = Some(session_id);
    }

    pub fn debug(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Debug, message)
    }

    pub fn info(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Info, message)
    }

    pub fn warn(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Warn, message)
    }

    pub fn error(&self, message: &str) -> LogEntryBuilder<'_> {
        LogEntryBuilder::new(self, LogLevel::Error, message)
    }

    async fn write_entry(&self, mut entry: LogEntry) {
        if !self.would_log(entry.level) {
            return;
        }
        entry.session_id = self.session.read().await.clone();

        let line = self.render(&entry);
        if entry.level >= LogLevel::Warn {
            let _ = writeln!(io::stderr(), "{}", line);
        } else {
            let _ = writeln!(io::stdout(), "{}", line);
        }
    }

    fn render(&self, entry: &LogEntry) -> String {
        match self.format {
            LogFormat::Console => self.format_console(entry),
            LogFormat::Json => serde_json::to_string(entry)
                .unwrap_or_else(|_| format!("{{\"level\":\"ERROR\",\"message\":{:?}}}", entry.message)),
            LogFormat::Compact => format!(
                "{} {} {}: {}",
                entry.timestamp.format("%H:%M:%S"),
                &entry.level.as_str()[..1],
                entry.logger,
                entry.message
            ),
        }
    }

    fn format_console(&self, entry: &LogEntry) -> String {
        let label = format!("{:>5}", entry.level.as_str());
        let level = if self.use_color {
            entry.level.colorize(&label).to_string()
        } else {
            label
        };

        let mut line = format!(
            "{} {} [{}] {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            entry.logger,
            entry.message
        );

        // BTreeMap keeps the fields sorted
        if !entry.fields.is_empty() {
            let fields: Vec<String> = entry.fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            line.push_str(&format!(" {{{}}}", fields.join(", ")));
        }

        line
    }
}

/// Collects fields for one entry; nothing is written until [`LogEntryBuilder::log`]
pub struct LogEntryBuilder<'a> {
    logger: &'a Logger,
    entry: LogEntry,
}

impl<'a> LogEntryBuilder<'a> {
    fn new(logger: &'a Logger, level: LogLevel, message: &str) -> Self {
        Self {
            logger,
            entry: LogEntry {
                timestamp: Utc::now(),
                level,
                logger: logger.name.clone(),
                message: message.to_string(),
                session_id: None,
                fields: BTreeMap::new(),
            },
        }
    }

    /// Add a structured field; values that fail to serialize are dropped
    pub fn field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.entry.fields.insert(key.to_string(), value);
        }
        self
    }

    /// Attach the error message and its category
    pub fn error_info(self, error: &AppError) -> Self {
        let builder = self
            .field("error", error.to_string())
            .field("error_category", error.category());
        match error {
            AppError::ProtocolFailure { protocol, kind, .. } => {
                builder.field("protocol", protocol.as_str()).field("failure", kind.label())
            }
            _ => builder,
        }
    }

    pub async fn log(self) {
        self.logger.write_entry(self.entry).await;
    }
}

/// Creates named loggers sharing one session ID
pub struct LoggerFactory {
    config: Config,
    session: Arc<RwLock<Option<String>>>,
    session_id: String,
}

impl LoggerFactory {
    pub fn new(config: &Config) -> Self {
        let session_id = Uuid::new_v4().to_string();
        Self {
            config: config.clone(),
            session: Arc::new(RwLock::new(Some(session_id.clone()))),
            session_id,
        }
    }

    pub fn create_logger(&self, name: &str) -> Arc<Logger> {
        Arc::new(Logger {
            session: self.session.clone(),
            ..Logger::with_config(name.to_string(), &self.config)
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolFailureKind;
    use crate::models::Protocol;
    use std::str::FromStr;

    fn sample_entry() -> LogEntry {
        let mut fields = BTreeMap::new();
        fields.insert("protocol".to_string(), serde_json::json!("IPv4"));
        fields.insert("download_mbps".to_string(), serde_json::json!(90.69));
        LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            logger: "NETMETR".to_string(),
            message: "IPv4 test result".to_string(),
            session_id: Some("abc".to_string()),
            fields,
        }
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Error);
    }

    #[test]
    fn test_log_format_parsing() {
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("console").unwrap(), LogFormat::Console);
        assert_eq!(LogFormat::from_str("compact").unwrap(), LogFormat::Compact);
        assert_eq!(LogFormat::from_str("xml").unwrap_err().category(), "CONFIG");
    }

    #[test]
    fn test_logger_with_config() {
        let config = Config {
            debug: true,
            enable_color: false,
            ..Default::default()
        };
        let logger = Logger::with_config("TEST".to_string(), &config);
        assert!(logger.would_log(LogLevel::Debug));
        assert!(!logger.use_color);

        let config = Config {
            quiet: true,
            ..Default::default()
        };
        let logger = Logger::with_config("TEST".to_string(), &config);
        assert!(!logger.would_log(LogLevel::Info));
        assert!(logger.would_log(LogLevel::Warn));
    }

    #[test]
    fn test_quiet_logger() {
        let logger = Logger::quiet("LIB");
        assert_eq!(logger.name(), "LIB");
        assert!(!logger.would_log(LogLevel::Warn));
        assert!(logger.would_log(LogLevel::Error));
    }

    #[test]
    fn test_console_format() {
        let mut logger = Logger::new("NETMETR".to_string());
        logger.use_color = false;

        let line = logger.render(&sample_entry());
        assert!(line.contains(" INFO [NETMETR] IPv4 test result"));
        assert!(line.ends_with("{download_mbps=90.69, protocol=\"IPv4\"}"));
        assert!(!line.contains("abc"));
    }

    #[test]
    fn test_json_and_compact_formats() {
        let mut logger = Logger::new("NETMETR".to_string());

        logger.format = LogFormat::Json;
        let parsed: serde_json::Value = serde_json::from_str(&logger.render(&sample_entry())).unwrap();
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["session_id"], "abc");
        assert_eq!(parsed["fields"]["protocol"], "IPv4");

        logger.format = LogFormat::Compact;
        assert!(logger.render(&sample_entry()).ends_with(" I NETMETR: IPv4 test result"));
    }

    #[test]
    fn test_error_info_fields() {
        let logger = Logger::quiet("TEST");
        let error = AppError::ProtocolFailure {
            protocol: Protocol::IPv6,
            kind: ProtocolFailureKind::Unavailable,
            reason: "No IPv6 control server address available".to_string(),
        };

        let builder = logger.error("IPv6 measurement failed").error_info(&error);
        assert_eq!(builder.entry.fields["error_category"], error.category());
        assert_eq!(builder.entry.fields["protocol"], "IPv6");
        assert_eq!(builder.entry.fields["failure"], "Not available");
    }

    #[tokio::test]
    async fn test_factory_loggers_share_session() {
        let factory = LoggerFactory::new(&Config::default());
        let control = factory.create_logger("CONTROL");
        let rmbt = factory.create_logger("RMBT");
        assert_eq!(control.name(), "CONTROL");

        assert_eq!(rmbt.session.read().await.as_deref(), Some(factory.session_id()));
        control.set_session_id("renamed".to_string()).await;
        assert_eq!(rmbt.session.read().await.as_deref(), Some("renamed"));
    }
}
