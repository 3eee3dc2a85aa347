//! Measurement orchestration
//!
//! [`Netmetr`] registers with the control server once, then measures each
//! requested protocol family in turn: test request, ping and rmbt through the
//! [`MeasurementBackend`], result upload. [`Netmetr::measure`] folds
//! per-protocol failures into the [`CombinedResult`]; the single-protocol
//! variants return them as errors.

use crate::control::messages::ResultReport;
use crate::control::{ControlServer, Registration};
use crate::error::{AppError, Result};
use crate::logging::Logger;
use crate::measurement::{system, MeasurementBackend, RmbtBackend, SystemInfo};
use crate::models::{CombinedResult, Config, Protocol, ProtocolMode, ProtocolResult, SpeedSummary};
use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// NetMetr client bound to one configuration
pub struct Netmetr {
    config: Config,
    control: ControlServer,
    backend: Arc<dyn MeasurementBackend>,
    system: SystemInfo,
    logger: Arc<Logger>,
    registration: OnceCell<Registration>,
}

impl Netmetr {
    /// Client measuring with the system `ping` and `rmbt`
    pub fn new(config: Config, logger: Arc<Logger>) -> Result<Self> {
        let backend = Arc::new(RmbtBackend::new(&config, logger.clone()));
        Self::with_backend(config, logger, backend)
    }

    pub fn with_backend(config: Config, logger: Arc<Logger>, backend: Arc<dyn MeasurementBackend>) -> Result<Self> {
        config.validate()?;
        let control = ControlServer::new(&config, None, logger.clone())?;

        Ok(Self {
            config,
            control,
            backend,
            system: SystemInfo::detect(),
            logger,
            registration: OnceCell::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register with the control server, once per instance
    pub async fn register(&self) -> Result<&Registration> {
        self.registration
            .get_or_try_init(|| async {
                match self.config.uuid {
                    Some(ref uuid) => self.logger.info("Checking uuid on the control server...").field("uuid", uuid).log().await,
                    None => self.logger.info("Requesting a new uuid from the control server...").log().await,
                }

                let registration = self
                    .control
                    .register(&self.config.control_server, self.config.uuid.as_deref())
                    .await?;

                if self.config.uuid.as_deref() != Some(registration.uuid.as_str()) {
                    self.logger.info("Control server assigned a new uuid").field("uuid", &registration.uuid).log().await;
                }

                Ok::<_, AppError>(registration)
            })
            .await
    }

    /// Client UUID confirmed by the control server
    pub async fn uuid(&self) -> Result<String> {
        Ok(self.register().await?.uuid.clone())
    }

    /// Measure every protocol in `protocols`
    ///
    /// The result has exactly one entry per requested protocol. Protocol
    /// failures become `{"error": ...}` entries; only general failures are
    /// returned as errors.
    pub async fn measure(&self, protocols: &BTreeSet<Protocol>) -> Result<CombinedResult> {
        let mut result = CombinedResult::new();
        if protocols.is_empty() {
            return Ok(result);
        }

        self.register().await?;

        for &protocol in protocols {
            let entry = match self.measure_protocol(protocol, &self.control, None).await {
                Ok(summary) => ProtocolResult::Success(summary),
                Err(AppError::ProtocolFailure { kind, reason, .. }) => {
                    self.logger
                        .error(&format!("{} measurement {}", protocol, kind))
                        .field("reason", &reason)
                        .log()
                        .await;
                    ProtocolResult::failure(kind.label())
                }
                Err(e) => return Err(e),
            };
            result.insert(protocol, entry);
        }

        Ok(result)
    }

    /// Measure according to a protocol mode
    ///
    /// `prefer_*` modes measure the other family too when the preferred one
    /// produced no result.
    pub async fn measure_mode(&self, mode: ProtocolMode) -> Result<CombinedResult> {
        let mut result = self.measure(&mode.primary()).await?;

        if let Some(fallback) = mode.fallback() {
            if !result.any_success() {
                self.logger
                    .info(&format!("Preferred protocol unavailable, trying {}", fallback))
                    .log()
                    .await;
                result.merge(self.measure(&BTreeSet::from([fallback])).await?);
            }
        }

        Ok(result)
    }

    /// Measure IPv4 only; any failure is an error
    pub async fn measure_4(&self) -> Result<SpeedSummary> {
        self.measure_strict(Protocol::IPv4).await
    }

    /// Measure IPv6 only; any failure is an error
    pub async fn measure_6(&self) -> Result<SpeedSummary> {
        self.measure_strict(Protocol::IPv6).await
    }

    /// Measure from a local address; the protocol follows its family
    pub async fn measure_bind(&self, address: IpAddr) -> Result<SpeedSummary> {
        check_bindable(address)?;
        self.register().await?;

        let control = ControlServer::new(&self.config, Some(address), self.logger.clone())?;
        self.measure_protocol(Protocol::of_addr(&address), &control, Some(address)).await
    }

    /// Download the last `limit` results of this client
    pub async fn download_history(&self, limit: u32) -> Result<serde_json::Value> {
        let uuid = &self.register().await?.uuid;
        self.control.download_history(&self.config.control_server, uuid, limit).await
    }

    pub async fn download_sync_code(&self) -> Result<String> {
        let uuid = &self.register().await?.uuid;
        self.control.download_sync_code(&self.config.control_server, uuid).await
    }

    async fn measure_strict(&self, protocol: Protocol) -> Result<SpeedSummary> {
        self.register().await?;
        self.measure_protocol(protocol, &self.control, None).await
    }

    async fn measure_protocol(&self, protocol: Protocol, control: &ControlServer, bind: Option<IpAddr>) -> Result<SpeedSummary> {
        let registration = self.register().await?;
        self.logger.info(&format!("Preparing for {} measurement...", protocol)).log().await;

        self.run_protocol(registration, protocol, control, bind)
            .await
            .map_err(|e| e.within_protocol(protocol))
    }

    async fn run_protocol(
        &self,
        registration: &Registration,
        protocol: Protocol,
        control: &ControlServer,
        bind: Option<IpAddr>,
    ) -> Result<SpeedSummary> {
        let address = registration.address_for(protocol)?;
        let settings = control.request_settings(address, &registration.uuid).await?;

        let outcome = self.backend.run(protocol, &settings, bind).await?;

        let report = ResultReport::new(
            &settings.test_token,
            &outcome,
            &self.system,
            system::network_type(),
            control.language(),
        );
        self.logger.info("Uploading the result...").log().await;
        control.upload_result(address, &report).await?;

        let summary = outcome.summary();
        self.logger
            .info(&format!("{} test result", protocol))
            .field("download_mbps", summary.download_mbps)
            .field("upload_mbps", summary.upload_mbps)
            .field("ping_ms", summary.ping_ms)
            .log()
            .await;

        Ok(summary)
    }
}

/// Whether `address` belongs to this host
fn check_bindable(address: IpAddr) -> Result<()> {
    TcpListener::bind(SocketAddr::new(address, 0))
        .map(drop)
        .map_err(|e| AppError::config(format!("Cannot bind to address {}: {}", address, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::messages::TestSettings;
    use crate::error::ProtocolFailureKind;
    use crate::measurement::{MeasurementOutcome, RmbtResult};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Mutex;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UUID: &str = "1f0e6a8c-2b3d-4e5f-8a9b-0c1d2e3f4a5b";

    /// Backend that fails for selected protocols and records its calls
    #[derive(Default)]
    struct StubBackend {
        failing: BTreeSet<Protocol>,
        calls: Mutex<Vec<(Protocol, Option<IpAddr>)>>,
    }

    impl StubBackend {
        fn failing(protocols: impl IntoIterator<Item = Protocol>) -> Self {
            Self {
                failing: protocols.into_iter().collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(Protocol, Option<IpAddr>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MeasurementBackend for StubBackend {
        async fn run(&self, protocol: Protocol, settings: &TestSettings, bind: Option<IpAddr>) -> Result<MeasurementOutcome> {
            self.calls.lock().unwrap().push((protocol, bind));
            assert_eq!(settings.test_token, "token-1");

            if self.failing.contains(&protocol) {
                return Err(AppError::measurement("rmbt exited with status 1"));
            }

            let (dl, ul) = match protocol {
                Protocol::IPv4 => (90_687.3, 58_081.9),
                Protocol::IPv6 => (45_000.0, 20_000.0),
            };
            Ok(MeasurementOutcome {
                ping_shortest_ns: 4_204_000,
                speed: RmbtResult {
                    res_dl_throughput_kbps: dl,
                    res_ul_throughput_kbps: ul,
                    res_total_bytes_dl: Some(1_000_000),
                    res_total_bytes_ul: Some(500_000),
                    res_dl_time_ns: Some(7_000_000_000),
                    res_ul_time_ns: Some(7_000_000_000),
                    res_dl_num_flows: Some(3),
                    res_ul_num_flows: Some(3),
                },
                speed_detail: None,
            })
        }
    }

    /// Backend failing every run with the same general error
    struct ErrorBackend(fn() -> AppError);

    #[async_trait]
    impl MeasurementBackend for ErrorBackend {
        async fn run(&self, _: Protocol, _: &TestSettings, _: Option<IpAddr>) -> Result<MeasurementOutcome> {
            Err((self.0)())
        }
    }

    /// Control server offering the given per-protocol addresses
    async fn control_server(ipv4: bool, ipv6: bool) -> MockServer {
        let server = MockServer::start().await;
        let address = server.address().to_string();

        let mut urls = serde_json::Map::new();
        if ipv4 {
            urls.insert("control_ipv4_only".to_string(), json!(address));
        }
        if ipv6 {
            urls.insert("control_ipv6_only".to_string(), json!(address));
        }

        Mock::given(method("POST"))
            .and(path("/RMBTControlServer/settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "settings": [{"uuid": UUID, "urls": urls}],
                "error": []
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/RMBTControlServer/testRequest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "test_token": "token-1",
                "test_server_address": "rmbt.example.net",
                "test_server_port": "443",
                "test_server_encryption": true,
                "test_numthreads": "3",
                "test_duration": "7",
                "test_numpings": "1",
                "error": []
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/RMBTControlServer/result"))
            .and(body_partial_json(json!({"test_token": "token-1", "client_name": "HW-PROBE"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": []})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/RMBTControlServer/sync"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sync": [{"sync_code": "AB12"}]})))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/RMBTControlServer/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"history": []})))
            .mount(&server)
            .await;

        server
    }

    fn config_for(address: &str) -> Config {
        Config {
            control_server: address.to_string(),
            use_tls: false,
            timeout_seconds: 5,
            ..Config::default()
        }
    }

    fn netmetr(address: &str, backend: Arc<dyn MeasurementBackend>) -> Netmetr {
        Netmetr::with_backend(config_for(address), Arc::new(Logger::quiet("TEST")), backend).unwrap()
    }

    fn both() -> BTreeSet<Protocol> {
        Protocol::ALL.into_iter().collect()
    }

    #[tokio::test]
    async fn test_measure_both_protocols() {
        let server = control_server(true, true).await;
        let backend = Arc::new(StubBackend::default());
        let client = netmetr(&server.address().to_string(), backend.clone());

        let result = client.measure(&both()).await.unwrap();

        assert_eq!(result.protocols(), both());
        let ipv4 = result.get(Protocol::IPv4).and_then(ProtocolResult::summary).unwrap();
        assert_eq!(ipv4.download_mbps, 90.69);
        assert_eq!(ipv4.upload_mbps, 58.08);
        assert_eq!(ipv4.ping_ms, 4.2);
        assert!(result.get(Protocol::IPv6).unwrap().is_success());
        assert_eq!(backend.calls(), vec![(Protocol::IPv4, None), (Protocol::IPv6, None)]);
    }

    #[tokio::test]
    async fn test_missing_ipv6_control_url_is_not_available() {
        let server = control_server(true, false).await;
        let backend = Arc::new(StubBackend::default());
        let client = netmetr(&server.address().to_string(), backend.clone());

        let result = client.measure(&both()).await.unwrap();

        assert!(result.get(Protocol::IPv4).unwrap().is_success());
        assert_eq!(result.get(Protocol::IPv6).and_then(ProtocolResult::error), Some("Not available"));
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_is_failed() {
        let server = control_server(true, true).await;
        let backend = Arc::new(StubBackend::failing([Protocol::IPv4]));
        let client = netmetr(&server.address().to_string(), backend);

        let result = client.measure(&both()).await.unwrap();

        assert_eq!(result.get(Protocol::IPv4).and_then(ProtocolResult::error), Some("Failed"));
        assert!(result.get(Protocol::IPv6).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_local_io_failure_is_failed() {
        let server = control_server(true, true).await;
        let client = netmetr(&server.address().to_string(), Arc::new(ErrorBackend(|| AppError::io("Failed to create working directory"))));

        let result = client.measure(&both()).await.unwrap();
        assert_eq!(result.protocols(), both());
        assert_eq!(result.get(Protocol::IPv4).and_then(ProtocolResult::error), Some("Failed"));
        assert_eq!(result.get(Protocol::IPv6).and_then(ProtocolResult::error), Some("Failed"));
    }

    #[tokio::test]
    async fn test_config_error_inside_protocol_stays_general() {
        let server = control_server(true, true).await;
        let client = netmetr(&server.address().to_string(), Arc::new(ErrorBackend(|| AppError::config("rmbt binary is not configured"))));

        let error = client.measure(&both()).await.unwrap_err();
        assert!(error.is_general());
        assert_eq!(error.category(), "CONFIG");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rmbt_backend_failure_is_failed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ping = dir.path().join("ping");
        std::fs::write(&ping, "#!/bin/sh\necho '64 bytes from 192.0.2.1: icmp_seq=1 ttl=57 time=3.1 ms'\n").unwrap();
        std::fs::set_permissions(&ping, std::fs::Permissions::from_mode(0o755)).unwrap();

        let server = control_server(true, true).await;
        let config = Config {
            ping_binary: ping.to_str().unwrap().to_string(),
            rmbt_binary: "false".to_string(),
            ..config_for(&server.address().to_string())
        };
        let client = Netmetr::new(config, Arc::new(Logger::quiet("TEST"))).unwrap();

        let result = client.measure(&both()).await.unwrap();
        assert_eq!(result.get(Protocol::IPv4).and_then(ProtocolResult::error), Some("Failed"));
        assert_eq!(result.get(Protocol::IPv6).and_then(ProtocolResult::error), Some("Failed"));

        match client.measure_4().await {
            Err(AppError::ProtocolFailure { kind, reason, .. }) => {
                assert_eq!(kind, ProtocolFailureKind::Failed);
                assert!(reason.contains("rmbt exited with"));
            }
            other => panic!("expected an IPv4 protocol failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_measure_empty_set_does_not_contact_server() {
        let client = netmetr("127.0.0.1:9", Arc::new(StubBackend::default()));
        let result = client.measure(&BTreeSet::new()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_control_server_is_general_error() {
        for protocols in [
            BTreeSet::from([Protocol::IPv4]),
            BTreeSet::from([Protocol::IPv6]),
            both(),
        ] {
            let client = netmetr("127.0.0.1:9", Arc::new(StubBackend::default()));
            let error = client.measure(&protocols).await.unwrap_err();
            assert!(error.is_general());
            assert_eq!(error.category(), "CONTROL");
        }

        let client = netmetr("127.0.0.1:9", Arc::new(StubBackend::default()));
        assert!(client.measure_4().await.unwrap_err().is_general());
        assert!(client.measure_6().await.unwrap_err().is_general());
    }

    #[tokio::test]
    async fn test_measure_4_is_strict() {
        let server = control_server(false, true).await;
        let client = netmetr(&server.address().to_string(), Arc::new(StubBackend::default()));

        match client.measure_4().await {
            Err(AppError::ProtocolFailure { protocol, kind, .. }) => {
                assert_eq!(protocol, Protocol::IPv4);
                assert_eq!(kind, ProtocolFailureKind::Unavailable);
            }
            other => panic!("expected an IPv4 protocol failure, got {:?}", other),
        }

        let summary = client.measure_6().await.unwrap();
        assert_eq!(summary.download_mbps, 45.0);
    }

    #[tokio::test]
    async fn test_measure_6_reports_measurement_failure() {
        let server = control_server(true, true).await;
        let client = netmetr(&server.address().to_string(), Arc::new(StubBackend::failing([Protocol::IPv6])));

        match client.measure_6().await {
            Err(AppError::ProtocolFailure { protocol, kind, reason }) => {
                assert_eq!(protocol, Protocol::IPv6);
                assert_eq!(kind, ProtocolFailureKind::Failed);
                assert!(reason.contains("rmbt exited"));
            }
            other => panic!("expected an IPv6 protocol failure, got {:?}", other),
        }
        assert!(client.measure_4().await.is_ok());
    }

    #[tokio::test]
    async fn test_prefer_mode_falls_back() {
        let server = control_server(true, false).await;
        let client = netmetr(&server.address().to_string(), Arc::new(StubBackend::default()));

        let result = client.measure_mode(ProtocolMode::Prefer6).await.unwrap();
        assert_eq!(result.protocols(), both());
        assert_eq!(result.get(Protocol::IPv6).and_then(ProtocolResult::error), Some("Not available"));
        assert!(result.get(Protocol::IPv4).unwrap().is_success());
    }

    #[tokio::test]
    async fn test_prefer_mode_without_fallback_when_preferred_works() {
        let server = control_server(true, true).await;
        let backend = Arc::new(StubBackend::default());
        let client = netmetr(&server.address().to_string(), backend.clone());

        let result = client.measure_mode(ProtocolMode::Prefer4).await.unwrap();
        assert_eq!(result.protocols(), BTreeSet::from([Protocol::IPv4]));
        assert_eq!(backend.calls().len(), 1);

        let result = client.measure_mode(ProtocolMode::Only6).await.unwrap();
        assert_eq!(result.protocols(), BTreeSet::from([Protocol::IPv6]));
    }

    #[tokio::test]
    async fn test_registration_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/RMBTControlServer/settings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"settings": [{"uuid": UUID}]})))
            .expect(1)
            .mount(&server)
            .await;

        let client = netmetr(&server.address().to_string(), Arc::new(StubBackend::default()));
        assert_eq!(client.uuid().await.unwrap(), UUID);
        assert_eq!(client.uuid().await.unwrap(), UUID);

        let result = client.measure(&both()).await.unwrap();
        assert_eq!(result.get(Protocol::IPv4).and_then(ProtocolResult::error), Some("Not available"));
    }

    #[tokio::test]
    async fn test_measure_bind_local_address() {
        let server = control_server(true, true).await;
        let backend = Arc::new(StubBackend::default());
        let client = netmetr(&server.address().to_string(), backend.clone());

        let local: IpAddr = "127.0.0.1".parse().unwrap();
        let summary = client.measure_bind(local).await.unwrap();
        assert_eq!(summary.download_mbps, 90.69);
        assert_eq!(backend.calls(), vec![(Protocol::IPv4, Some(local))]);
    }

    #[tokio::test]
    async fn test_measure_bind_foreign_address_is_config_error() {
        let client = netmetr("127.0.0.1:9", Arc::new(StubBackend::default()));
        let error = client.measure_bind("192.0.2.123".parse().unwrap()).await.unwrap_err();
        assert_eq!(error.category(), "CONFIG");
    }

    #[tokio::test]
    async fn test_sync_code_and_history() {
        let server = control_server(true, true).await;
        let client = netmetr(&server.address().to_string(), Arc::new(StubBackend::default()));

        assert_eq!(client.download_sync_code().await.unwrap(), "AB12");
        assert_eq!(client.download_history(5).await.unwrap(), json!({"history": []}));
    }

    fn protocol_set() -> impl Strategy<Value = BTreeSet<Protocol>> {
        proptest::collection::btree_set(prop_oneof![Just(Protocol::IPv4), Just(Protocol::IPv6)], 0..=2)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_result_keys_match_request(
            requested in protocol_set(),
            failing in protocol_set(),
            ipv4_url in any::<bool>(),
            ipv6_url in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let result = runtime.block_on(async {
                let server = control_server(ipv4_url, ipv6_url).await;
                let client = netmetr(&server.address().to_string(), Arc::new(StubBackend::failing(failing.clone())));
                client.measure(&requested).await
            }).unwrap();

            prop_assert_eq!(result.protocols(), requested.clone());
            for protocol in requested {
                let available = match protocol {
                    Protocol::IPv4 => ipv4_url,
                    Protocol::IPv6 => ipv6_url,
                };
                let entry = result.get(protocol).unwrap();
                prop_assert_eq!(entry.is_success(), available && !failing.contains(&protocol));
            }
        }
    }
}
