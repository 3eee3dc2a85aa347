//! Configuration data model and validation

use crate::error::{AppError, Result};
use crate::logging::LogFormat;
use crate::models::ProtocolMode;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Control server address (`host` or `host:port`, no scheme)
    #[serde(default = "default_control_server")]
    pub control_server: String,

    /// Client UUID; the control server assigns one when absent
    #[serde(default)]
    pub uuid: Option<String>,

    /// Talk HTTPS to the control server
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,

    /// Protocol families to measure
    #[serde(default)]
    pub protocol_mode: ProtocolMode,

    /// Local address to measure from; overrides the protocol mode
    #[serde(default)]
    pub bind_address: Option<IpAddr>,

    /// Whether `--autostart` runs are allowed at all
    #[serde(default)]
    pub autostart_enabled: bool,

    /// Local hours (0-23) in which an autostarted run may proceed
    #[serde(default)]
    pub hours_to_run: Vec<u32>,

    /// Delay before an autostarted run, in seconds
    #[serde(default)]
    pub autostart_delay_seconds: u64,

    /// Number of history entries requested by `--dwlhist`
    #[serde(default = "default_max_history_logs")]
    pub max_history_logs: u32,

    /// RMBT measurement binary
    #[serde(default = "default_rmbt_binary")]
    pub rmbt_binary: String,

    /// Ping binary
    #[serde(default = "default_ping_binary")]
    pub ping_binary: String,

    /// Control server request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_seconds: u64,

    /// File holding the persisted UUID and sync code
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Where `--dwlhist` stores the downloaded history
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Print the combined result as JSON
    #[serde(default)]
    pub json_output: bool,

    /// Only warnings and errors
    #[serde(default)]
    pub quiet: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            control_server: default_control_server(),
            uuid: None,
            use_tls: default_use_tls(),
            protocol_mode: ProtocolMode::default(),
            bind_address: None,
            autostart_enabled: false,
            hours_to_run: Vec::new(),
            autostart_delay_seconds: 0,
            max_history_logs: default_max_history_logs(),
            rmbt_binary: default_rmbt_binary(),
            ping_binary: default_ping_binary(),
            timeout_seconds: default_timeout_secs(),
            state_file: default_state_file(),
            history_file: default_history_file(),
            enable_color: default_enable_color(),
            log_format: LogFormat::default(),
            json_output: false,
            quiet: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn autostart_delay(&self) -> Duration {
        Duration::from_secs(self.autostart_delay_seconds)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Result<()> {
        validate_control_server(&self.control_server)?;

        if let Some(uuid) = &self.uuid {
            validate_uuid(uuid)?;
        }

        if let Some(hour) = self.hours_to_run.iter().find(|&&hour| hour > 23) {
            return Err(AppError::config(format!("Invalid hour to run: {} (expected 0-23)", hour)));
        }

        if self.max_history_logs == 0 {
            return Err(AppError::config("History log count must be greater than 0"));
        }

        if self.timeout_seconds == 0 {
            return Err(AppError::config("Timeout must be greater than 0"));
        }

        if self.timeout_seconds > 300 {
            return Err(AppError::config("Timeout cannot exceed 300 seconds"));
        }

        if self.rmbt_binary.trim().is_empty() {
            return Err(AppError::config("RMBT binary path cannot be empty"));
        }

        if self.ping_binary.trim().is_empty() {
            return Err(AppError::config("Ping binary path cannot be empty"));
        }

        Ok(())
    }

    /// Merge `NETMETR_*` environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(server) = std::env::var("NETMETR_CONTROL_SERVER") {
            self.control_server = server.trim().to_string();
        }

        if let Ok(uuid) = std::env::var("NETMETR_UUID") {
            let uuid = uuid.trim();
            self.uuid = (!uuid.is_empty()).then(|| uuid.to_string());
        }

        if let Ok(mode) = std::env::var("NETMETR_PROTOCOL_MODE") {
            self.protocol_mode = mode.parse()?;
        }

        if let Ok(enabled) = std::env::var("NETMETR_AUTOSTART_ENABLED") {
            self.autostart_enabled = parse_env_bool("NETMETR_AUTOSTART_ENABLED", &enabled)?;
        }

        if let Ok(hours) = std::env::var("NETMETR_HOURS_TO_RUN") {
            self.hours_to_run = parse_hours(&hours)?;
        }

        if let Ok(delay) = std::env::var("NETMETR_AUTOSTART_DELAY") {
            self.autostart_delay_seconds = delay
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid NETMETR_AUTOSTART_DELAY value '{}': {}", delay, e)))?;
        }

        if let Ok(count) = std::env::var("NETMETR_MAX_HISTORY_LOGS") {
            self.max_history_logs = count
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid NETMETR_MAX_HISTORY_LOGS value '{}': {}", count, e)))?;
        }

        if let Ok(binary) = std::env::var("NETMETR_RMBT_BINARY") {
            self.rmbt_binary = binary.trim().to_string();
        }

        if let Ok(binary) = std::env::var("NETMETR_PING_BINARY") {
            self.ping_binary = binary.trim().to_string();
        }

        if let Ok(timeout) = std::env::var("NETMETR_TIMEOUT_SECONDS") {
            self.timeout_seconds = timeout
                .trim()
                .parse()
                .map_err(|e| AppError::config(format!("Invalid NETMETR_TIMEOUT_SECONDS value '{}': {}", timeout, e)))?;
        }

        if let Ok(path) = std::env::var("NETMETR_STATE_FILE") {
            self.state_file = PathBuf::from(path.trim());
        }

        if let Ok(path) = std::env::var("NETMETR_HISTORY_FILE") {
            self.history_file = PathBuf::from(path.trim());
        }

        if let Ok(enable_color) = std::env::var("NETMETR_ENABLE_COLOR") {
            self.enable_color = parse_env_bool("NETMETR_ENABLE_COLOR", &enable_color)?;
        }

        if let Ok(format) = std::env::var("NETMETR_LOG_FORMAT") {
            self.log_format = format.parse()?;
        }

        Ok(())
    }
}

/// Control server address must be a bare `host[:port]`
pub fn validate_control_server(address: &str) -> Result<()> {
    if address.trim().is_empty() {
        return Err(AppError::config("Control server address cannot be empty"));
    }

    if address.contains("://") || address.contains('/') {
        return Err(AppError::config(format!(
            "Control server must be given as host[:port] without scheme or path: {}",
            address
        )));
    }

    let parsed = url::Url::parse(&format!("http://{}/", address))
        .map_err(|e| AppError::config(format!("Invalid control server address '{}': {}", address, e)))?;
    if parsed.host_str().is_none() {
        return Err(AppError::config(format!("Control server address has no host: {}", address)));
    }

    Ok(())
}

pub fn validate_uuid(value: &str) -> Result<()> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|e| AppError::config(format!("Invalid UUID '{}': {}", value, e)))
}

/// Parse a comma or space separated list of hours
pub fn parse_hours(value: &str) -> Result<Vec<u32>> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u32>()
                .map_err(|e| AppError::config(format!("Invalid hour '{}': {}", s, e)))
        })
        .collect()
}

fn parse_env_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(AppError::config(format!("Invalid {} value '{}'", name, other))),
    }
}

// Default value functions for serde
fn default_control_server() -> String {
    crate::defaults::DEFAULT_CONTROL_SERVER.to_string()
}

fn default_use_tls() -> bool {
    true
}

fn default_max_history_logs() -> u32 {
    crate::defaults::DEFAULT_MAX_HISTORY_LOGS
}

fn default_rmbt_binary() -> String {
    crate::defaults::DEFAULT_RMBT_BINARY.to_string()
}

fn default_ping_binary() -> String {
    crate::defaults::DEFAULT_PING_BINARY.to_string()
}

fn default_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_TIMEOUT.as_secs()
}

fn default_state_file() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_STATE_FILE)
}

fn default_history_file() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_HISTORY_FILE)
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}
