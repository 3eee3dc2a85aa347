//! Device and network details reported with each result

use std::path::{Path, PathBuf};

/// Network type reported for wired/unknown connections
pub const NETWORK_TYPE_DEFAULT: u16 = 98;
/// Network type reported when the default route goes through a modem
pub const NETWORK_TYPE_MOBILE: u16 = 104;

const MOBILE_INTERFACE_PREFIX: &str = "wwan";
const ROUTE_FLAG_UP: u32 = 0x1;

/// Network type derived from a `/proc/net/route` table
pub fn network_type_from_routes(table: &str) -> u16 {
    let mobile_default = table.lines().any(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[1] != "00000000" {
            return false;
        }

        let up = u32::from_str_radix(fields[3], 16)
            .map(|flags| flags & ROUTE_FLAG_UP != 0)
            .unwrap_or(false);
        up && fields[0].starts_with(MOBILE_INTERFACE_PREFIX)
    });

    if mobile_default {
        NETWORK_TYPE_MOBILE
    } else {
        NETWORK_TYPE_DEFAULT
    }
}

/// Network type of this machine; unreadable route tables count as default
pub fn network_type() -> u16 {
    std::fs::read_to_string("/proc/net/route")
        .map(|table| network_type_from_routes(&table))
        .unwrap_or(NETWORK_TYPE_DEFAULT)
}

/// Router model and software versions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemInfo {
    pub model: String,
    pub hw_version: String,
    pub os_version: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self::from_root(Path::new("/"))
    }

    /// Read the system files below `root`
    pub fn from_root(root: &Path) -> Self {
        let read = |relative: &str, default: &str| -> String {
            let path: PathBuf = root.join(relative);
            std::fs::read_to_string(path)
                .ok()
                .and_then(|content| content.lines().next().map(|line| line.trim().to_string()))
                .filter(|line| !line.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            model: read("tmp/sysinfo/model", "default"),
            hw_version: read("tmp/sysinfo/board_name", "unknown"),
            os_version: read("etc/turris-version", "unknown"),
        }
    }

    /// Product string shown by the control server
    pub fn product(&self) -> String {
        format!("os: {} hw: {}", self.os_version, self.hw_version)
    }
}
