//! Measurement backends
//!
//! A backend turns test settings from the control server into a raw outcome:
//! shortest ping, throughput and optional per-flow samples. [`RmbtBackend`]
//! drives the system `ping` and the `rmbt` binary.

pub mod ping;
pub mod rmbt;
pub mod system;

pub use rmbt::{Direction, RmbtResult, SpeedSample};
pub use system::SystemInfo;

use crate::control::messages::TestSettings;
use crate::error::Result;
use crate::logging::Logger;
use crate::models::{Config, Protocol, SpeedSummary};
use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Raw outcome of one protocol measurement
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementOutcome {
    pub ping_shortest_ns: u64,
    pub speed: RmbtResult,
    pub speed_detail: Option<Vec<SpeedSample>>,
}

impl MeasurementOutcome {
    pub fn summary(&self) -> SpeedSummary {
        SpeedSummary::from_raw(
            self.speed.res_dl_throughput_kbps,
            self.speed.res_ul_throughput_kbps,
            self.ping_shortest_ns,
        )
    }
}

/// Runs the actual measurement against an assigned test server
#[async_trait]
pub trait MeasurementBackend: Send + Sync {
    async fn run(&self, protocol: Protocol, settings: &TestSettings, bind: Option<IpAddr>) -> Result<MeasurementOutcome>;
}

/// Backend using the system `ping` and the `rmbt` binary
pub struct RmbtBackend {
    rmbt_binary: String,
    ping_binary: String,
    ping_interval: Duration,
    logger: Arc<Logger>,
}

impl RmbtBackend {
    pub fn new(config: &Config, logger: Arc<Logger>) -> Self {
        Self {
            rmbt_binary: config.rmbt_binary.clone(),
            ping_binary: config.ping_binary.clone(),
            ping_interval: ping::PING_INTERVAL,
            logger,
        }
    }
}

#[async_trait]
impl MeasurementBackend for RmbtBackend {
    async fn run(&self, protocol: Protocol, settings: &TestSettings, bind: Option<IpAddr>) -> Result<MeasurementOutcome> {
        self.logger
            .info(&format!("Starting ping test ({})...", protocol))
            .field("server", &settings.test_server_address)
            .log()
            .await;

        let pinger = ping::Pinger {
            binary: &self.ping_binary,
            interval: self.ping_interval,
            logger: &self.logger,
        };
        let ping_shortest_ns = pinger
            .shortest(protocol, &settings.test_server_address, settings.test_numpings, bind)
            .await?;

        self.logger.info(&format!("Starting speed test ({})...", protocol)).log().await;

        let runner = rmbt::RmbtRunner {
            binary: &self.rmbt_binary,
            logger: &self.logger,
        };
        let (speed, speed_detail) = runner.run(settings).await?;

        Ok(MeasurementOutcome {
            ping_shortest_ns,
            speed,
            speed_detail,
        })
    }
}
