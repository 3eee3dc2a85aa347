//! Error handling for the NetMetr client
//!
//! Failures fall into two tiers. General failures (configuration, control
//! server unreachable, I/O) abort the whole run. Protocol failures are tied
//! to one address family and are folded into the combined result by
//! [`crate::Netmetr::measure`].

use crate::models::Protocol;
use thiserror::Error;

/// Why a single protocol measurement did not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolFailureKind {
    /// The control server could not serve this address family
    Unavailable,
    /// The measurement tools ran but did not deliver a result
    Failed,
}

impl ProtocolFailureKind {
    /// Text recorded in the `error` field of a combined result
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unavailable => "Not available",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for ProtocolFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => f.write_str("not available"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Custom error types for the NetMetr client
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Control server communication errors
    #[error("Control server error: {0}")]
    ControlServer(String),

    /// Measurement tool errors (ping, rmbt)
    #[error("Measurement error: {0}")]
    Measurement(String),

    /// A failure confined to one protocol family
    #[error("{protocol} measurement {kind}: {reason}")]
    ProtocolFailure {
        protocol: Protocol,
        kind: ProtocolFailureKind,
        reason: String,
    },

    /// I/O errors (file operations, process spawning)
    #[error("I/O error: {0}")]
    Io(String),

    /// Parsing errors (URLs, JSON, addresses)
    #[error("Parsing error: {0}")]
    Parse(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new control server error
    pub fn control_server<S: Into<String>>(message: S) -> Self {
        Self::ControlServer(message.into())
    }

    /// Create a new measurement error
    pub fn measurement<S: Into<String>>(message: S) -> Self {
        Self::Measurement(message.into())
    }

    /// Create a new protocol failure
    pub fn protocol_failure<S: Into<String>>(protocol: Protocol, kind: ProtocolFailureKind, reason: S) -> Self {
        Self::ProtocolFailure {
            protocol,
            kind,
            reason: reason.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io(message.into())
    }

    /// Create a new parsing error
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Scope an error raised while measuring `protocol`
    ///
    /// Control server errors make the protocol unavailable. Measurement,
    /// local I/O and parse errors fail it. Configuration and internal errors
    /// stay general.
    pub fn within_protocol(self, protocol: Protocol) -> Self {
        match self {
            Self::ControlServer(reason) => Self::protocol_failure(protocol, ProtocolFailureKind::Unavailable, reason),
            Self::Measurement(reason) | Self::Io(reason) | Self::Parse(reason) => {
                Self::protocol_failure(protocol, ProtocolFailureKind::Failed, reason)
            }
            other => other,
        }
    }

    /// Whether this error concerns the whole run rather than one protocol
    pub fn is_general(&self) -> bool {
        !matches!(self, Self::ProtocolFailure { .. })
    }

    /// Get error category for logging and reporting
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG",
            Self::ControlServer(_) => "CONTROL",
            Self::Measurement(_) => "MEASUREMENT",
            Self::ProtocolFailure { .. } => "PROTOCOL",
            Self::Io(_) => "IO",
            Self::Parse(_) => "PARSE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Get exit code for this error type
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) => 1,
            Self::ControlServer(_) => 2,
            Self::Measurement(_) | Self::ProtocolFailure { .. } => 3,
            Self::Io(_) => 5,
            Self::Internal(_) => 99,
        }
    }

    /// Get user-friendly error message with suggestions
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::Config(msg) => {
                format!("Configuration problem: {}\n\nSuggestion: Check your .env file, NETMETR_* variables or command line arguments.", msg)
            }
            Self::ControlServer(msg) => {
                format!("Control server problem: {}\n\nSuggestion: Check your internet connection and the --control-server address.", msg)
            }
            Self::Measurement(msg) | Self::ProtocolFailure { reason: msg, .. } => {
                format!("Measurement failed: {}\n\nSuggestion: Make sure the rmbt and ping binaries are installed and try again later.", msg)
            }
            Self::Io(msg) => {
                format!("File operation failed: {}\n\nSuggestion: Check file permissions and disk space.", msg)
            }
            Self::Parse(msg) => {
                format!("Failed to parse data: {}\n\nSuggestion: Check the format of your input data or configuration values.", msg)
            }
            Self::Internal(msg) => {
                format!("Internal error: {}\n\nThis is likely a bug. Please report this issue with the error details.", msg)
            }
        }
    }

    /// Format error for console display with color coding
    pub fn format_for_console(&self, use_color: bool) -> String {
        let category = self.category();
        let message = self.to_string();

        if use_color {
            use colored::Colorize;
            match self {
                Self::Config(_) | Self::Parse(_) => {
                    format!("[{}] {}", category.red().bold(), message.red())
                }
                Self::ControlServer(_) => {
                    format!("[{}] {}", category.yellow().bold(), message.yellow())
                }
                Self::Measurement(_) | Self::ProtocolFailure { .. } | Self::Io(_) => {
                    format!("[{}] {}", category.cyan().bold(), message.cyan())
                }
                Self::Internal(_) => {
                    format!("[{}] {}", category.bright_red().bold(), message.bright_red())
                }
            }
        } else {
            format!("[{}] {}", category, message)
        }
    }
}

// Standard library error conversions
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(error: url::ParseError) -> Self {
        Self::parse(format!("URL parse error: {}", error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::control_server(format!("Malformed control server response: {}", error))
        } else {
            Self::control_server(format!("Failed to contact the control server: {}", error))
        }
    }
}

impl From<dotenv::Error> for AppError {
    fn from(error: dotenv::Error) -> Self {
        Self::config(format!("Environment file error: {}", error))
    }
}

impl From<std::num::ParseIntError> for AppError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::parse(format!("Integer parse error: {}", error))
    }
}

impl From<std::net::AddrParseError> for AppError {
    fn from(error: std::net::AddrParseError) -> Self {
        Self::parse(format!("IP address parse error: {}", error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

/// Custom Result type for the application
pub type Result<T> = std::result::Result<T, AppError>;

/// Error context trait for adding context to errors
pub trait ErrorContext<T> {
    /// Add context to an error, keeping its category
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let context = f();
            match e.into() {
                AppError::Config(msg) => AppError::Config(format!("{}: {}", context, msg)),
                AppError::ControlServer(msg) => AppError::ControlServer(format!("{}: {}", context, msg)),
                AppError::Measurement(msg) => AppError::Measurement(format!("{}: {}", context, msg)),
                AppError::Io(msg) => AppError::Io(format!("{}: {}", context, msg)),
                AppError::Parse(msg) => AppError::Parse(format!("{}: {}", context, msg)),
                AppError::Internal(msg) => AppError::Internal(format!("{}: {}", context, msg)),
                failure @ AppError::ProtocolFailure { .. } => failure,
            }
        })
    }
}
