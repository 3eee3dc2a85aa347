//! RMBT control server client
//!
//! Every call is a JSON POST to `{scheme}://{address}/RMBTControlServer/{path}`.
//! Transport problems, HTTP error statuses and responses carrying a non-empty
//! `error` field all surface as [`AppError::ControlServer`].

pub mod messages;

use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::models::{Config, Protocol};
use messages::{
    response_error, HistoryRequest, ResultReport, SettingsRequest, SettingsResponse, SyncRequest,
    SyncResponse, TestRequest, TestSettings, CLIENT_NAME, CLIENT_TYPE, CLIENT_VERSION,
};
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use url::Url;

/// Path prefix of every control server endpoint
const API_ROOT: &str = "RMBTControlServer";

/// UUID and per-protocol control addresses confirmed by the control server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub uuid: String,
    pub control_ipv4: Option<String>,
    pub control_ipv6: Option<String>,
}

impl Registration {
    /// Control server address dedicated to `protocol`
    pub fn address_for(&self, protocol: Protocol) -> Result<&str> {
        let address = match protocol {
            Protocol::IPv4 => self.control_ipv4.as_deref(),
            Protocol::IPv6 => self.control_ipv6.as_deref(),
        };

        address
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| AppError::control_server(format!("No {} control server address available", protocol)))
    }
}

/// HTTP client for the control server API
pub struct ControlServer {
    client: Client,
    use_tls: bool,
    language: String,
    logger: Arc<Logger>,
}

impl ControlServer {
    /// Create a client, optionally sourcing all connections from `bind`
    pub fn new(config: &Config, bind: Option<IpAddr>, logger: Arc<Logger>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .local_address(bind)
            .user_agent(format!("{}/{}", crate::PKG_NAME, crate::VERSION))
            .build()
            .map_err(|e| AppError::config(format!("Failed to create control server client: {}", e)))?;

        Ok(Self {
            client,
            use_tls: config.use_tls,
            language: client_language(),
            logger,
        })
    }

    /// Language tag sent with every request
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Build the URL of an API endpoint on `address`
    pub fn create_url(&self, address: &str, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let scheme = if self.use_tls { "https" } else { "http" };
        let mut url = Url::parse(&format!("{}://{}/{}/{}", scheme, address, API_ROOT, path))
            .map_err(|e| AppError::control_server(format!("Invalid control server address '{}': {}", address, e)))?;

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        Ok(url)
    }

    /// Check `uuid` with the server (or obtain a new one) and fetch the
    /// protocol-specific control addresses
    pub async fn register(&self, address: &str, uuid: Option<&str>) -> Result<Registration> {
        let url = self.create_url(address, "settings", &[("skip_history", "true")])?;
        let response: SettingsResponse = self.send_request(url, &SettingsRequest::new(uuid)).await?;

        let entry = response
            .settings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::control_server("Settings response contains no settings"))?;

        let uuid = entry
            .uuid
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| AppError::control_server("UUID missing in the settings response"))?;

        Ok(Registration {
            uuid,
            control_ipv4: entry.urls.control_ipv4_only,
            control_ipv6: entry.urls.control_ipv6_only,
        })
    }

    /// Ask for a test token and test server
    pub async fn request_settings(&self, address: &str, uuid: &str) -> Result<TestSettings> {
        let url = self.create_url(address, "testRequest", &[])?;
        let request = TestRequest {
            client: CLIENT_NAME,
            language: self.language.clone(),
            time: chrono::Utc::now().timestamp_millis(),
            timezone: client_timezone(),
            client_type: CLIENT_TYPE,
            uuid: uuid.to_string(),
            version: CLIENT_VERSION,
        };

        self.send_request(url, &request).await
    }

    /// Upload a measurement report
    pub async fn upload_result(&self, address: &str, report: &ResultReport) -> Result<()> {
        let url = self.create_url(address, "result", &[])?;
        let _: serde_json::Value = self.send_request(url, report).await?;
        Ok(())
    }

    /// Download up to `limit` history entries of `uuid`
    pub async fn download_history(&self, address: &str, uuid: &str, limit: u32) -> Result<serde_json::Value> {
        let url = self.create_url(address, "history", &[])?;
        let request = HistoryRequest {
            language: self.language.clone(),
            timezone: client_timezone(),
            result_limit: limit.to_string(),
            uuid: uuid.to_string(),
        };

        self.send_request(url, &request).await
    }

    /// Download the sync code of `uuid`
    pub async fn download_sync_code(&self, address: &str, uuid: &str) -> Result<String> {
        let url = self.create_url(address, "sync", &[])?;
        let request = SyncRequest {
            language: self.language.clone(),
            timezone: client_timezone(),
            uuid: uuid.to_string(),
        };

        let response: SyncResponse = self.send_request(url, &request).await?;
        response
            .sync
            .into_iter()
            .next()
            .and_then(|entry| entry.sync_code)
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| AppError::control_server("Sync code missing in the sync response"))
    }

    async fn send_request<T, R>(&self, url: Url, payload: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        self.logger
            .debug("Control server request")
            .field("url", url.as_str())
            .field("request", payload)
            .log()
            .await;

        let host = url.host_str().unwrap_or_default().to_string();
        let response = self
            .client
            .post(url)
            .header(ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| contact_error(&host, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(contact_error(&host, format!("HTTP status {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::control_server(format!("Malformed control server response: {}", e)))?;

        self.logger.debug("Control server response").field("response", &body).log().await;

        if let Some(error) = response_error(&body) {
            return Err(AppError::control_server(format!("Control server response contains error: {}", error)));
        }

        serde_json::from_value(body)
            .map_err(|e| AppError::control_server(format!("Unexpected control server response: {}", e)))
    }
}

fn contact_error(host: &str, reason: impl std::fmt::Display) -> AppError {
    AppError::control_server(format!(
        "Failed to contact the control server '{}'. This may be caused by poor internet connection or wrong server address: {}",
        host, reason
    ))
}

/// Language tag derived from `LANG`, e.g. `cs_CZ.UTF-8` gives `cs_CZ`
pub fn client_language() -> String {
    std::env::var("LANG")
        .ok()
        .and_then(|lang| language_from_locale(&lang))
        .unwrap_or_else(|| crate::defaults::DEFAULT_LANGUAGE.to_string())
}

fn language_from_locale(locale: &str) -> Option<String> {
    let language = locale.split(['.', '@']).next()?.trim();
    if language.is_empty() || language == "C" || language == "POSIX" {
        None
    } else {
        Some(language.to_string())
    }
}

/// Timezone reported to the control server
pub fn client_timezone() -> String {
    std::env::var("TZ")
        .ok()
        .filter(|tz| !tz.trim().is_empty())
        .unwrap_or_else(|| chrono::Local::now().format("%Z").to_string())
}
