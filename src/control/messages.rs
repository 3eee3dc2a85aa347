//! Request and response bodies of the RMBT control server API

use crate::measurement::{MeasurementOutcome, SpeedSample, SystemInfo};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Client name reported to the control server
pub const CLIENT_NAME: &str = "HW-PROBE";
/// Client type reported to the control server
pub const CLIENT_TYPE: &str = "DESKTOP";
/// Test protocol version
pub const CLIENT_VERSION: &str = "0.1";

/// Software version string shown on the NetMetr web
pub fn client_software_version() -> String {
    format!("Rust netmetr client v{}", crate::VERSION)
}

/// Body of the `settings` request (UUID check / assignment)
#[derive(Debug, Clone, Serialize)]
pub struct SettingsRequest {
    /// Omitted when the server should create a new UUID
    pub uuid: Option<String>,
    /// Test server type
    pub name: &'static str,
    pub terms_and_conditions_accepted: &'static str,
    #[serde(rename = "type")]
    pub client_type: &'static str,
    pub version_name: String,
}

impl SettingsRequest {
    pub fn new(uuid: Option<&str>) -> Self {
        Self {
            uuid: uuid.map(str::to_string),
            name: "RMBT",
            terms_and_conditions_accepted: "true",
            client_type: CLIENT_TYPE,
            version_name: client_software_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsResponse {
    #[serde(default)]
    pub settings: Vec<SettingsEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsEntry {
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub urls: ControlUrls,
}

/// Protocol-specific control server addresses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlUrls {
    #[serde(default)]
    pub control_ipv4_only: Option<String>,
    #[serde(default)]
    pub control_ipv6_only: Option<String>,
}

/// Body of the `testRequest` request
#[derive(Debug, Clone, Serialize)]
pub struct TestRequest {
    pub client: &'static str,
    pub language: String,
    /// Milliseconds since the Unix epoch
    pub time: i64,
    pub timezone: String,
    #[serde(rename = "type")]
    pub client_type: &'static str,
    pub uuid: String,
    pub version: &'static str,
}

/// Test parameters assigned by the control server
///
/// The server sends numeric values either as JSON numbers or as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSettings {
    pub test_token: String,
    pub test_server_address: String,
    #[serde(deserialize_with = "number_or_string")]
    pub test_server_port: u16,
    #[serde(default, deserialize_with = "bool_or_string")]
    pub test_server_encryption: bool,
    #[serde(deserialize_with = "number_or_string")]
    pub test_numthreads: u32,
    #[serde(deserialize_with = "number_or_string")]
    pub test_duration: u32,
    #[serde(deserialize_with = "number_or_string")]
    pub test_numpings: u32,
}

/// Body of the `history` request
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRequest {
    pub language: String,
    pub timezone: String,
    pub result_limit: String,
    pub uuid: String,
}

/// Body of the `sync` request
#[derive(Debug, Clone, Serialize)]
pub struct SyncRequest {
    pub language: String,
    pub timezone: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub sync: Vec<SyncEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncEntry {
    #[serde(default)]
    pub sync_code: Option<String>,
}

/// Measurement report uploaded to the `result` endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ResultReport {
    pub client_language: String,
    pub client_name: &'static str,
    pub client_version: &'static str,
    pub client_software_version: String,
    #[serde(rename = "geoLocations")]
    pub geo_locations: Vec<serde_json::Value>,
    pub model: String,
    pub network_type: u16,
    pub product: String,
    pub test_bytes_download: Option<u64>,
    pub test_bytes_upload: Option<u64>,
    pub test_nsec_download: Option<u64>,
    pub test_nsec_upload: Option<u64>,
    pub test_num_threads: Option<u32>,
    pub test_ping_shortest: u64,
    pub num_threads_ul: Option<u32>,
    pub test_speed_download: u64,
    pub test_speed_upload: u64,
    pub test_token: String,
    pub pings: Vec<serde_json::Value>,
    pub speed_detail: Option<Vec<SpeedSample>>,
}

impl ResultReport {
    pub fn new(
        test_token: &str,
        outcome: &MeasurementOutcome,
        system: &SystemInfo,
        network_type: u16,
        language: &str,
    ) -> Self {
        let speed = &outcome.speed;
        Self {
            client_language: language.to_string(),
            client_name: CLIENT_NAME,
            client_version: CLIENT_VERSION,
            client_software_version: client_software_version(),
            geo_locations: Vec::new(),
            model: system.model.clone(),
            network_type,
            product: system.product(),
            test_bytes_download: speed.res_total_bytes_dl,
            test_bytes_upload: speed.res_total_bytes_ul,
            test_nsec_download: speed.res_dl_time_ns,
            test_nsec_upload: speed.res_ul_time_ns,
            test_num_threads: speed.res_dl_num_flows,
            test_ping_shortest: outcome.ping_shortest_ns,
            num_threads_ul: speed.res_ul_num_flows,
            test_speed_download: speed.res_dl_throughput_kbps.round() as u64,
            test_speed_upload: speed.res_ul_throughput_kbps.round() as u64,
            test_token: test_token.to_string(),
            pings: Vec::new(),
            speed_detail: outcome.speed_detail.clone(),
        }
    }
}

/// The `error` field of a control server response, when it reports one
pub fn response_error(body: &serde_json::Value) -> Option<String> {
    use serde_json::Value;

    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(items) if items.is_empty() => None,
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
                .collect::<Vec<_>>()
                .join("; "),
        ),
        other => Some(other.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

fn number_or_string<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match NumberOrString::<T>::deserialize(deserializer)? {
        NumberOrString::Number(value) => Ok(value),
        NumberOrString::String(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    String(String),
}

fn bool_or_string<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(value) => Ok(value),
        BoolOrString::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(de::Error::custom(format!("invalid boolean '{}'", other))),
        },
    }
}
