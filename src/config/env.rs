//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::models::config::{parse_hours, validate_control_server, validate_uuid};
use crate::models::ProtocolMode;
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load `.env` from the working directory if it exists
    ///
    /// Returns whether a file was loaded. Variables already set in the
    /// process environment win over the file.
    pub fn load_env_file() -> Result<bool> {
        Self::load_env_file_from(Path::new(".env"))
    }

    pub fn load_env_file_from(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }

        dotenv::from_path(path)
            .map_err(|e| AppError::config(format!("Failed to load {}: {}", path.display(), e)))?;
        Ok(true)
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "NETMETR_CONTROL_SERVER" => validate_control_server(value.trim())?,
            "NETMETR_UUID" => {
                if !value.trim().is_empty() {
                    validate_uuid(value.trim())?;
                }
            }
            "NETMETR_PROTOCOL_MODE" => {
                value.parse::<ProtocolMode>()?;
            }
            "NETMETR_HOURS_TO_RUN" => {
                let hours = parse_hours(value)?;
                if let Some(hour) = hours.iter().find(|&&hour| hour > 23) {
                    return Err(AppError::config(format!("NETMETR_HOURS_TO_RUN contains invalid hour: {}", hour)));
                }
            }
            "NETMETR_AUTOSTART_DELAY" => {
                value.trim().parse::<u64>()
                    .map_err(|e| AppError::config(format!("Invalid NETMETR_AUTOSTART_DELAY value '{}': {}", value, e)))?;
            }
            "NETMETR_MAX_HISTORY_LOGS" => {
                let count: u32 = value.trim().parse()
                    .map_err(|e| AppError::config(format!("Invalid NETMETR_MAX_HISTORY_LOGS value '{}': {}", value, e)))?;
                if count == 0 {
                    return Err(AppError::config("NETMETR_MAX_HISTORY_LOGS must be greater than 0"));
                }
            }
            "NETMETR_TIMEOUT_SECONDS" => {
                let timeout: u64 = value.trim().parse()
                    .map_err(|e| AppError::config(format!("Invalid NETMETR_TIMEOUT_SECONDS value '{}': {}", value, e)))?;
                if timeout == 0 || timeout > 300 {
                    return Err(AppError::config(format!("NETMETR_TIMEOUT_SECONDS must be between 1 and 300, got: {}", timeout)));
                }
            }
            "NETMETR_AUTOSTART_ENABLED" | "NETMETR_ENABLE_COLOR" => {
                match value.trim().to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" | "0" | "false" | "no" | "off" => {}
                    _ => return Err(AppError::config(format!("Invalid {} value '{}'", key, value))),
                }
            }
            "NETMETR_LOG_FORMAT" => {
                value.parse::<crate::logging::LogFormat>()?;
            }
            _ => {
                // Paths and binaries are taken as given
            }
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("NETMETR_CONTROL_SERVER", "Control server address (host or host:port)", "control.netmetr.cz"),
            ("NETMETR_UUID", "Client UUID", "1f0e6a8c-2b3d-4e5f-8a9b-0c1d2e3f4a5b"),
            ("NETMETR_PROTOCOL_MODE", "only_4, only_6, prefer_4, prefer_6 or both", "prefer_6"),
            ("NETMETR_AUTOSTART_ENABLED", "Allow --autostart runs", "true"),
            ("NETMETR_HOURS_TO_RUN", "Hours (0-23) in which --autostart runs", "2,3,4"),
            ("NETMETR_AUTOSTART_DELAY", "Seconds to wait before an autostarted run", "600"),
            ("NETMETR_MAX_HISTORY_LOGS", "History entries fetched by --dwlhist", "10"),
            ("NETMETR_RMBT_BINARY", "Path of the rmbt binary", "/usr/bin/rmbt"),
            ("NETMETR_PING_BINARY", "Path of the ping binary", "/bin/ping"),
            ("NETMETR_TIMEOUT_SECONDS", "Control server request timeout (1-300)", "30"),
            ("NETMETR_STATE_FILE", "File with the persisted UUID and sync code", "/etc/netmetr/state.json"),
            ("NETMETR_HISTORY_FILE", "Where --dwlhist saves the history", "/tmp/netmetr-history.json"),
            ("NETMETR_ENABLE_COLOR", "Enable colored output", "true"),
            ("NETMETR_LOG_FORMAT", "console, json or compact", "console"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<26} {}\n", var, description));
            help.push_str(&format!("  {:<26} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Vec<String> {
        Self::get_supported_env_vars()
            .into_iter()
            .filter_map(|(var_name, _, _)| {
                let value = std::env::var(var_name).ok()?;
                Self::validate_env_var(var_name, &value).err().map(|e| format!("{}: {}", var_name, e))
            })
            .collect()
    }
}
