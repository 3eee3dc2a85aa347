//! Configuration parsing from CLI arguments and environment variables

use crate::{cli::Cli, config::env::EnvManager, error::Result, models::Config};

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        let mut config = Config::default();

        // .env never overrides variables that are already set
        EnvManager::load_env_file()?;
        config.merge_from_env()?;

        self.apply_cli_overrides(&mut config);

        config.validate()?;

        Ok(config)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) {
        if let Some(ref server) = self.cli.control_server {
            config.control_server = server.trim().to_string();
        }

        if let Some(ref uuid) = self.cli.uuid {
            config.uuid = Some(uuid.trim().to_string());
        }

        if self.cli.unsecure_connection {
            config.use_tls = false;
        }

        if let Some(mode) = self.cli.protocol_mode() {
            config.protocol_mode = mode;
        }

        if self.cli.bind_address.is_some() {
            config.bind_address = self.cli.bind_address;
        }

        config.enable_color = config.enable_color && self.cli.use_colors();
        config.json_output = self.cli.json;
        config.quiet = self.cli.quiet;
        config.debug = self.cli.debug;
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    ConfigParser::new(cli).parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Control server: {}", config.control_server));
    summary.push(format!("UUID: {}", config.uuid.as_deref().unwrap_or("(assigned by server)")));
    summary.push(format!("TLS: {}", config.use_tls));
    summary.push(format!("Protocol mode: {}", config.protocol_mode));
    if let Some(address) = config.bind_address {
        summary.push(format!("Bind address: {}", address));
    }
    summary.push(format!("Autostart: {} (hours: {:?}, delay: {}s)",
        config.autostart_enabled, config.hours_to_run, config.autostart_delay_seconds));
    summary.push(format!("rmbt binary: {}", config.rmbt_binary));
    summary.push(format!("ping binary: {}", config.ping_binary));
    summary.push(format!("Timeout: {}s", config.timeout_seconds));
    summary.push(format!("State file: {}", config.state_file.display()));
    summary.push(format!("Color Output: {}", config.enable_color));

    summary.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProtocolMode;
    use clap::Parser;
    use std::env;

    const ENV_VARS: &[&str] = &[
        "NETMETR_CONTROL_SERVER",
        "NETMETR_UUID",
        "NETMETR_PROTOCOL_MODE",
        "NETMETR_TIMEOUT_SECONDS",
        "NETMETR_ENABLE_COLOR",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_cli_overrides() {
        let _guard = crate::config::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let cli = Cli::parse_from([
            "netmetr",
            "--control-server", "control.example.net:8080",
            "--uuid", "1f0e6a8c-2b3d-4e5f-8a9b-0c1d2e3f4a5b",
            "--unsecure-connection",
            "--no-color",
            "-4",
            "--json",
        ]);
        let config = ConfigParser::new(cli).parse().unwrap();

        assert_eq!(config.control_server, "control.example.net:8080");
        assert_eq!(config.uuid.as_deref(), Some("1f0e6a8c-2b3d-4e5f-8a9b-0c1d2e3f4a5b"));
        assert!(!config.use_tls);
        assert!(!config.enable_color);
        assert_eq!(config.protocol_mode, ProtocolMode::Only4);
        assert!(config.json_output);
    }

    #[test]
    fn test_cli_overrides_env_vars() {
        let _guard = crate::config::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        env::set_var("NETMETR_CONTROL_SERVER", "env.example.net");
        env::set_var("NETMETR_PROTOCOL_MODE", "both");
        env::set_var("NETMETR_TIMEOUT_SECONDS", "12");

        let cli = Cli::parse_from(["netmetr", "--control-server", "cli.example.net"]);
        let config = ConfigParser::new(cli).parse().unwrap();

        assert_eq!(config.control_server, "cli.example.net");
        assert_eq!(config.protocol_mode, ProtocolMode::Both);
        assert_eq!(config.timeout_seconds, 12);

        clear_env();
    }

    #[test]
    fn test_invalid_env_value_is_config_error() {
        let _guard = crate::config::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        env::set_var("NETMETR_PROTOCOL_MODE", "sideways");
        let error = ConfigParser::new(Cli::parse_from(["netmetr"])).parse().unwrap_err();
        assert_eq!(error.category(), "CONFIG");

        clear_env();
    }

    #[test]
    fn test_invalid_cli_uuid_is_config_error() {
        let _guard = crate::config::ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let error = load_config(Cli::parse_from(["netmetr", "--uuid", "nope"])).unwrap_err();
        assert_eq!(error.category(), "CONFIG");
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_config_summary() {
        let config = Config {
            bind_address: Some("192.0.2.1".parse().unwrap()),
            ..Config::default()
        };
        let summary = display_config_summary(&config);

        assert!(summary.contains("Control server: control.netmetr.cz"));
        assert!(summary.contains("Protocol mode: prefer_6"));
        assert!(summary.contains("Bind address: 192.0.2.1"));
        assert!(summary.contains("UUID: (assigned by server)"));
    }
}
