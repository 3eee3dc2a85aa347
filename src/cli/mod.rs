//! Command-line interface

use crate::models::{Protocol, ProtocolMode};
use clap::Parser;
use std::net::IpAddr;

/// NetMetr - client application for download and upload speed measurement
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "netmetr")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Run only if enabled and the current hour is one of the configured hours
    #[arg(long)]
    pub autostart: bool,

    /// Download measurement history from the control server and save it
    #[arg(long)]
    pub dwlhist: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Do not run the measurement (useful with --dwlhist)
    #[arg(long)]
    pub no_run: bool,

    /// Control server address (host or host:port)
    #[arg(long, value_name = "ADDRESS")]
    pub control_server: Option<String>,

    /// Client UUID to use instead of the persisted one
    #[arg(long)]
    pub uuid: Option<String>,

    /// Talk plain HTTP to the control server
    #[arg(long)]
    pub unsecure_connection: bool,

    /// Only create the persisted identity file and exit
    #[arg(long)]
    pub only_config: bool,

    /// Measure over IPv4
    #[arg(short = '4', long = "ipv4")]
    pub ipv4: bool,

    /// Measure over IPv6
    #[arg(short = '6', long = "ipv6")]
    pub ipv6: bool,

    /// Print only warnings and errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Measure from this local address; the protocol follows its family
    #[arg(short, long, value_name = "ADDRESS")]
    pub bind_address: Option<IpAddr>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Show supported environment variables and exit
    #[arg(long)]
    pub env_help: bool,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.quiet && self.debug {
            return Err("Cannot specify both --quiet and --debug".to_string());
        }

        if let Some(ref server) = self.control_server {
            if server.trim().is_empty() {
                return Err("--control-server cannot be empty".to_string());
            }
        }

        if let Some(ref uuid) = self.uuid {
            if uuid.trim().is_empty() {
                return Err("--uuid cannot be empty".to_string());
            }
        }

        if let Some(address) = self.bind_address {
            let bound = Protocol::of_addr(&address);
            let excluded = match (self.ipv4, self.ipv6) {
                (true, false) => Some(Protocol::IPv4),
                (false, true) => Some(Protocol::IPv6),
                _ => None,
            };
            if let Some(selected) = excluded.filter(|&selected| selected != bound) {
                return Err(format!(
                    "Bind address {} is {} but only {} was requested",
                    address, bound, selected
                ));
            }
        }

        Ok(())
    }

    /// Protocol mode forced by `-4`/`-6`, if any
    pub fn protocol_mode(&self) -> Option<ProtocolMode> {
        ProtocolMode::from_flags(self.ipv4, self.ipv6)
    }

    /// Whether the persisted identity applies to this run
    ///
    /// A UUID or control server given on the command line takes the run
    /// out of the persisted identity.
    pub fn uses_persisted_identity(&self) -> bool {
        self.uuid.is_none() && self.control_server.is_none()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        !self.no_color && supports_color()
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    true
}
