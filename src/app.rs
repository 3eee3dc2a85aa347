//! Main application orchestration and execution

use crate::{
    cli::Cli,
    config::{display_config_summary, load_config, write_atomically, IdentityState, StateStore},
    error::{AppError, Result},
    logging::{Logger, LoggerFactory},
    models::{config::validate_uuid, Config, Protocol},
    netmetr::Netmetr,
    output::OutputFormatterFactory,
};
use chrono::Timelike;
use std::sync::Arc;

/// Main application struct that coordinates all components
pub struct App {
    cli: Cli,
}

impl App {
    /// Create a new application instance with CLI configuration
    pub fn new(cli: Cli) -> Result<Self> {
        cli.validate().map_err(AppError::config)?;
        Ok(Self { cli })
    }

    /// Run the application
    pub async fn run(self) -> Result<()> {
        let mut config = load_config(self.cli.clone())?;
        let logger = LoggerFactory::new(&config).create_logger("NETMETR");

        logger
            .debug(&format!("{} v{}", crate::PKG_NAME, crate::VERSION))
            .field("build_time", crate::BUILD_TIME)
            .field("git_commit", crate::GIT_COMMIT)
            .log()
            .await;

        let store = StateStore::new(&config.state_file);
        let persisted = self.cli.uses_persisted_identity();
        let mut state = if persisted { store.load()? } else { IdentityState::default() };
        if persisted && config.uuid.is_none() {
            config.uuid = match state.uuid.as_deref().map(validate_uuid) {
                Some(Err(e)) => {
                    logger
                        .warn("Ignoring the stored uuid, a new one will be requested")
                        .field("path", store.path().display().to_string())
                        .error_info(&e)
                        .log()
                        .await;
                    None
                }
                _ => state.uuid.clone(),
            };
        }

        if config.debug {
            logger.debug("Configuration loaded").field("summary", display_config_summary(&config)).log().await;
        }

        if self.cli.only_config {
            if persisted {
                store.save(&state)?;
                logger
                    .info("Identity file ready")
                    .field("path", store.path().display().to_string())
                    .log()
                    .await;
            }
            return Ok(());
        }

        if self.cli.autostart {
            let hour = chrono::Local::now().hour();
            if !is_time_to_run(config.autostart_enabled, &config.hours_to_run, hour) {
                logger.info("Not the time to run the measurement").field("hour", hour).log().await;
                return Ok(());
            }

            let delay = config.autostart_delay();
            if !delay.is_zero() {
                logger
                    .info(&format!("Waiting {}s before the measurement", delay.as_secs()))
                    .log()
                    .await;
                tokio::time::sleep(delay).await;
            }
        }

        let netmetr = Netmetr::new(config.clone(), logger.clone())?;
        let uuid = netmetr.uuid().await?;

        if persisted && state.adopt_uuid(&uuid) {
            store.save(&state)?;
            logger.info("Saved the uuid assigned by the control server").field("uuid", &uuid).log().await;
        }

        if !self.cli.no_run {
            self.run_measurement(&netmetr, &config, &logger).await?;
        }

        if self.cli.dwlhist {
            if let Err(e) = self.save_history(&netmetr, &config).await {
                logger.error("History download failed").error_info(&e).log().await;
            } else {
                logger
                    .info("History saved")
                    .field("path", config.history_file.display().to_string())
                    .log()
                    .await;
            }
        }

        match netmetr.download_sync_code().await {
            Ok(code) => {
                if persisted && state.sync_code.as_deref() != Some(code.as_str()) {
                    state.sync_code = Some(code.clone());
                    if let Err(e) = store.save(&state) {
                        logger.error("Failed to save the sync code").error_info(&e).log().await;
                    }
                }
                logger.info(&format!("Your Sync code is: {}", code)).log().await;
            }
            Err(e) => logger.error("Sync code download failed").error_info(&e).log().await,
        }

        Ok(())
    }

    async fn run_measurement(&self, netmetr: &Netmetr, config: &Config, logger: &Arc<Logger>) -> Result<()> {
        let formatter = OutputFormatterFactory::for_config(config);

        let output = match config.bind_address {
            Some(address) => match netmetr.measure_bind(address).await {
                Ok(summary) => Some(formatter.format_summary(Protocol::of_addr(&address), &summary)?),
                Err(e) if !e.is_general() || matches!(e, AppError::Config(_)) => {
                    logger.error("Measurement failed").error_info(&e).log().await;
                    None
                }
                Err(e) => return Err(e),
            },
            None => {
                let result = netmetr.measure_mode(config.protocol_mode).await?;
                Some(formatter.format_result(&result)?)
            }
        };

        if let Some(output) = output {
            if !config.quiet || config.json_output {
                println!("{}", output);
            }
        }

        Ok(())
    }

    async fn save_history(&self, netmetr: &Netmetr, config: &Config) -> Result<()> {
        let history = netmetr.download_history(config.max_history_logs).await?;
        write_atomically(&config.history_file, &serde_json::to_vec_pretty(&history)?)
    }
}

/// Whether an autostarted run may proceed at local `hour`
pub fn is_time_to_run(enabled: bool, hours_to_run: &[u32], hour: u32) -> bool {
    enabled && hours_to_run.contains(&hour)
}
