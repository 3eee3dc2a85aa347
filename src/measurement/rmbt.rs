//! Speed measurement through the external `rmbt` binary
//!
//! The binary prints its result as JSON on stdout and, when asked through its
//! config file, writes per-flow time series into an xz-compressed file.

use crate::control::messages::TestSettings;
use crate::error::{AppError, ErrorContext, Result};
use crate::logging::Logger;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Fields that must be present in the rmbt result
pub const REQUIRED_RESULT_FIELDS: [&str; 2] = ["res_dl_throughput_kbps", "res_ul_throughput_kbps"];

/// Minimal gap between two kept samples of one flow, in nanoseconds
pub const SAMPLE_SPACING_NS: u64 = 30_000_000;

/// Decompressor used for the flows file
const UNXZ_BINARY: &str = "unxz";

/// Result printed by rmbt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmbtResult {
    pub res_dl_throughput_kbps: f64,
    pub res_ul_throughput_kbps: f64,
    #[serde(default)]
    pub res_total_bytes_dl: Option<u64>,
    #[serde(default)]
    pub res_total_bytes_ul: Option<u64>,
    #[serde(default)]
    pub res_dl_time_ns: Option<u64>,
    #[serde(default)]
    pub res_ul_time_ns: Option<u64>,
    #[serde(default)]
    pub res_dl_num_flows: Option<u32>,
    #[serde(default)]
    pub res_ul_num_flows: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    /// Key of the direction in the flows file
    fn flows_key(&self) -> &'static str {
        match self {
            Direction::Download => "dl",
            Direction::Upload => "ul",
        }
    }
}

/// One downsampled point of a flow's transfer progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeedSample {
    pub direction: Direction,
    pub thread: usize,
    /// Nanoseconds since the flow start
    pub time: u64,
    /// Bytes transferred up to `time`
    pub bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowsFile {
    #[serde(default)]
    pub res_details: HashMap<String, Vec<Flow>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Flow {
    #[serde(default)]
    pub time_series: Vec<FlowPoint>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FlowPoint {
    pub t: u64,
    pub b: u64,
}

/// Command line arguments for one rmbt run
pub fn rmbt_args(settings: &TestSettings, config_file: &Path) -> Vec<String> {
    let mut args = Vec::new();
    if settings.test_server_encryption {
        args.push("-e".to_string());
    }

    args.extend([
        "-h".to_string(),
        settings.test_server_address.clone(),
        "-p".to_string(),
        settings.test_server_port.to_string(),
        "-t".to_string(),
        settings.test_token.clone(),
        "-f".to_string(),
        settings.test_numthreads.to_string(),
        "-d".to_string(),
        settings.test_duration.to_string(),
        "-u".to_string(),
        settings.test_duration.to_string(),
        "-c".to_string(),
        config_file.display().to_string(),
    ]);

    args
}

/// Extract the result object from rmbt's stdout
///
/// The last JSON object carrying all required fields wins; anything around
/// the objects is ignored.
pub fn parse_rmbt_output(stdout: &str) -> Result<RmbtResult> {
    let objects = json_objects(stdout);

    let complete = objects
        .iter()
        .rev()
        .find(|object| REQUIRED_RESULT_FIELDS.iter().all(|field| object.contains_key(*field)));

    match complete {
        Some(object) => serde_json::from_value(serde_json::Value::Object(object.clone()))
            .map_err(|e| AppError::measurement(format!("Problem in decoding measurement output: {}", e))),
        None => match objects.last() {
            Some(object) => {
                let missing = REQUIRED_RESULT_FIELDS
                    .iter()
                    .find(|field| !object.contains_key(**field))
                    .copied()
                    .unwrap_or(REQUIRED_RESULT_FIELDS[0]);
                Err(AppError::measurement(format!("Speed measurement failed: '{}' missing in result", missing)))
            }
            None => Err(AppError::measurement("Problem in decoding measurement output: no JSON result found")),
        },
    }
}

fn json_objects(text: &str) -> Vec<serde_json::Map<String, serde_json::Value>> {
    let mut objects = Vec::new();
    let mut offset = 0;

    while let Some(start) = text[offset..].find('{').map(|i| offset + i) {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match stream.next() {
            Some(Ok(serde_json::Value::Object(map))) => {
                objects.push(map);
                offset = start + stream.byte_offset();
            }
            _ => offset = start + 1,
        }
    }

    objects
}

/// Downsample the flows of both directions
///
/// Within one flow a point is kept when it is more than
/// [`SAMPLE_SPACING_NS`] after the previously kept one.
pub fn sample_speed_flows(flows: &FlowsFile) -> Vec<SpeedSample> {
    let mut samples = Vec::new();

    for direction in [Direction::Download, Direction::Upload] {
        let Some(threads) = flows.res_details.get(direction.flows_key()) else {
            continue;
        };

        for (thread, flow) in threads.iter().enumerate() {
            let mut last_time = 0;
            for point in &flow.time_series {
                if point.t.saturating_sub(last_time) > SAMPLE_SPACING_NS {
                    samples.push(SpeedSample { direction, thread, time: point.t, bytes: point.b });
                    last_time = point.t;
                }
            }
        }
    }

    samples
}

/// Temporary directory holding the rmbt config and flow files
struct WorkDir {
    dir: tempfile::TempDir,
}

impl WorkDir {
    /// Create the directory under `root` and write the rmbt config into it
    fn create(root: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("netmetr-")
            .tempdir_in(root)
            .map_err(|e| AppError::measurement(format!("Error creating measurement config file: {}", e)))?;
        let work_dir = Self { dir };

        let rmbt_config = serde_json::json!({ "cnf_file_flows": work_dir.flows_xz().display().to_string() });
        std::fs::write(work_dir.config_file(), rmbt_config.to_string()).map_err(|e| {
            AppError::measurement(format!(
                "Error creating measurement config file {}: {}",
                work_dir.config_file().display(),
                e
            ))
        })?;

        Ok(work_dir)
    }

    fn flows_xz(&self) -> PathBuf {
        self.dir.path().join("flows.json.xz")
    }

    fn config_file(&self) -> PathBuf {
        self.dir.path().join("rmbt.json")
    }
}

/// Runs rmbt and collects its result and flow samples
pub struct RmbtRunner<'a> {
    pub binary: &'a str,
    pub logger: &'a Logger,
}

impl RmbtRunner<'_> {
    pub async fn run(&self, settings: &TestSettings) -> Result<(RmbtResult, Option<Vec<SpeedSample>>)> {
        let work_dir = WorkDir::create(&std::env::temp_dir())?;
        let flows_xz = work_dir.flows_xz();
        let config_file = work_dir.config_file();

        let args = rmbt_args(settings, &config_file);
        self.logger
            .debug("Starting rmbt")
            .field("binary", self.binary)
            .field("args", &args)
            .log()
            .await;

        let mut child = Command::new(self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::measurement(format!("Speed measurement failed: cannot run {}: {}", self.binary, e)))?;

        let stdout = child.stdout.take();
        let stdout_task = tokio::spawn(async move {
            let mut output = String::new();
            if let Some(mut stdout) = stdout {
                stdout.read_to_string(&mut output).await?;
            }
            Ok::<_, std::io::Error>(output)
        });

        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = line.trim();
                if !line.is_empty() {
                    self.logger.debug(line).field("source", "rmbt").log().await;
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::measurement(format!("Speed measurement failed: {}", e)))?;

        let stdout = stdout_task
            .await
            .map_err(|e| AppError::measurement(format!("rmbt output reader failed: {}", e)))?
            .map_err(|e| AppError::measurement(format!("Problem in decoding measurement output: {}", e)))?;

        let result = parse_rmbt_output(&stdout).map_err(|e| {
            if status.success() {
                e
            } else {
                AppError::measurement(format!("Speed measurement failed: rmbt exited with {}", status))
            }
        })?;

        let detail = match self.load_flows(&flows_xz).await {
            Ok(samples) => Some(samples),
            Err(e) => {
                self.logger.error("Speed flows unavailable").error_info(&e).log().await;
                None
            }
        };

        Ok((result, detail))
    }

    async fn load_flows(&self, compressed: &Path) -> Result<Vec<SpeedSample>> {
        let plain: PathBuf = compressed.with_extension("");

        if compressed.exists() {
            let status = Command::new(UNXZ_BINARY)
                .arg("-f")
                .arg(compressed)
                .status()
                .await
                .map_err(|e| AppError::measurement(format!("Failed to run {}: {}", UNXZ_BINARY, e)))?;
            if !status.success() {
                return Err(AppError::measurement(format!("{} exited with {}", UNXZ_BINARY, status)));
            }
        }

        let content = tokio::fs::read_to_string(&plain)
            .await
            .with_context(|| format!("Failed to read speed flows {}", plain.display()))?;
        let flows: FlowsFile = serde_json::from_str(&content)?;

        for direction in [Direction::Download, Direction::Upload] {
            if !flows.res_details.contains_key(direction.flows_key()) {
                self.logger
                    .warn("Direction missing in speed flows")
                    .field("direction", direction)
                    .log()
                    .await;
            }
        }

        Ok(sample_speed_flows(&flows))
    }
}
