use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::colony::LaplacianKernel;
use crate::ingest::StreamConfig;
use crate::record::DEFAULT_MEASUREMENT;
use crate::sensor::tuya::DEFAULT_PORT as DEFAULT_TUYA_PORT;
use crate::sensor::{ProtocolVersion, TuyaConfig};
use crate::transport::InfluxConfig;

const DEFAULT_INFLUX_HOST: &str = "127.0.0.1";
const DEFAULT_INFLUX_PORT: u16 = 8086;
const DEFAULT_WORK_DIR: &str = "captures";
const DEFAULT_LOG_FILE: &str = "colony_watch.log";
const DEFAULT_SENSOR_INTERVAL_SECS: u64 = 30;
const DEFAULT_PICTURE_INTERVAL_SECS: u64 = 600;
const DEFAULT_DEVICE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AgentConfigFile {
    work_dir: Option<PathBuf>,
    log_file: Option<PathBuf>,
    count_on_capture: Option<bool>,
    laplacian: Option<LaplacianKernel>,
    influxdb: Option<InfluxConfigFile>,
    device: Option<DeviceConfigFile>,
    stream: Option<StreamConfigFile>,
    schedule: Option<ScheduleConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct InfluxConfigFile {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    database: Option<String>,
    gzip: Option<bool>,
    measurement: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DeviceConfigFile {
    id: Option<String>,
    ip: Option<String>,
    local_key: Option<String>,
    version: Option<ProtocolVersion>,
    port: Option<u16>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StreamConfigFile {
    url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ScheduleConfigFile {
    sensor_interval_secs: Option<u64>,
    picture_interval_secs: Option<u64>,
}

/// Runtime configuration of the monitoring agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub influx: InfluxConfig,
    pub measurement: String,
    pub device: TuyaConfig,
    pub stream: StreamConfig,
    pub schedule: ScheduleSettings,
    pub work_dir: PathBuf,
    pub log_file: PathBuf,
    pub count_on_capture: bool,
    pub laplacian: LaplacianKernel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    pub sensor_interval: Duration,
    pub picture_interval: Duration,
}

impl AgentConfig {
    /// Optional file named by `COLONY_CONFIG`, then environment overrides.
    ///
    /// A `.env` file in the working directory (or a parent) is read first.
    /// Variables already present in the process environment win over it.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(err) if err.not_found() => {}
            Err(err) => return Err(anyhow!("failed to read .env file: {}", err)),
        }
        Self::from_environment()
    }

    /// Like [`AgentConfig::load`], with an explicit env file that must exist.
    pub fn load_with_env_file(path: &Path) -> Result<Self> {
        dotenvy::from_path(path)
            .map_err(|e| anyhow!("failed to read env file {}: {}", path.display(), e))?;
        Self::from_environment()
    }

    fn from_environment() -> Result<Self> {
        let config_path = std::env::var("COLONY_CONFIG").ok();
        let file_cfg = match config_path.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AgentConfigFile) -> Self {
        let influx_file = file.influxdb.unwrap_or_default();
        let device_file = file.device.unwrap_or_default();
        let stream_file = file.stream.unwrap_or_default();
        let schedule_file = file.schedule.unwrap_or_default();

        let influx = InfluxConfig {
            host: influx_file
                .host
                .unwrap_or_else(|| DEFAULT_INFLUX_HOST.to_string()),
            port: influx_file.port.unwrap_or(DEFAULT_INFLUX_PORT),
            username: influx_file.username.unwrap_or_default(),
            password: influx_file.password.unwrap_or_default(),
            database: influx_file.database.unwrap_or_default(),
            gzip: influx_file.gzip.unwrap_or(true),
            ..InfluxConfig::default()
        };
        let device = TuyaConfig {
            device_id: device_file.id.unwrap_or_default(),
            address: device_file.ip.unwrap_or_default(),
            local_key: device_file.local_key.unwrap_or_default(),
            version: device_file.version.unwrap_or_default(),
            port: device_file.port.unwrap_or(DEFAULT_TUYA_PORT),
            timeout: Duration::from_secs(
                device_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_DEVICE_TIMEOUT_SECS),
            ),
        };
        let stream = StreamConfig {
            url: stream_file.url.unwrap_or_default(),
            timeout: Duration::from_secs(
                stream_file
                    .timeout_secs
                    .unwrap_or(DEFAULT_STREAM_TIMEOUT_SECS),
            ),
        };
        let schedule = ScheduleSettings {
            sensor_interval: Duration::from_secs(
                schedule_file
                    .sensor_interval_secs
                    .unwrap_or(DEFAULT_SENSOR_INTERVAL_SECS),
            ),
            picture_interval: Duration::from_secs(
                schedule_file
                    .picture_interval_secs
                    .unwrap_or(DEFAULT_PICTURE_INTERVAL_SECS),
            ),
        };

        Self {
            influx,
            measurement: influx_file
                .measurement
                .unwrap_or_else(|| DEFAULT_MEASUREMENT.to_string()),
            device,
            stream,
            schedule,
            work_dir: file
                .work_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR)),
            log_file: file
                .log_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE)),
            count_on_capture: file.count_on_capture.unwrap_or(false),
            laplacian: file.laplacian.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(host) = env_value("INFLUXDB_HOST") {
            self.influx.host = host;
        }
        if let Some(port) = env_value("INFLUXDB_PORT") {
            self.influx.port = port
                .parse()
                .map_err(|_| anyhow!("INFLUXDB_PORT must be a port number"))?;
        }
        if let Some(username) = env_value("INFLUXDB_USERNAME") {
            self.influx.username = username;
        }
        if let Some(password) = env_value("INFLUXDB_PASSWORD") {
            self.influx.password = password;
        }
        if let Some(database) = env_value("INFLUXDB_DATABASE") {
            self.influx.database = database;
        }
        if let Some(gzip) = env_value("INFLUXDB_GZIP") {
            self.influx.gzip = parse_bool("INFLUXDB_GZIP", &gzip)?;
        }
        if let Some(measurement) = env_value("INFLUXDB_MEASUREMENT") {
            self.measurement = measurement;
        }

        if let Some(id) = env_value("TUYA_DEVICE_ID") {
            self.device.device_id = id;
        }
        if let Some(ip) = env_value("TUYA_DEVICE_IP") {
            self.device.address = ip;
        }
        if let Some(key) = env_value("TUYA_LOCAL_KEY") {
            self.device.local_key = key;
        }
        if let Some(version) = env_value("TUYA_PROTOCOL_VERSION") {
            self.device.version = ProtocolVersion::parse(&version)?;
        }

        if let Some(dir) = env_value("COLONY_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        if let Some(url) = env_value("COLONY_STREAM_URL") {
            self.stream.url = url;
        }
        if let Some(secs) = env_value("COLONY_SENSOR_INTERVAL_SECS") {
            self.schedule.sensor_interval = parse_secs("COLONY_SENSOR_INTERVAL_SECS", &secs)?;
        }
        if let Some(secs) = env_value("COLONY_PICTURE_INTERVAL_SECS") {
            self.schedule.picture_interval = parse_secs("COLONY_PICTURE_INTERVAL_SECS", &secs)?;
        }
        if let Some(flag) = env_value("COLONY_COUNT_ON_CAPTURE") {
            self.count_on_capture = parse_bool("COLONY_COUNT_ON_CAPTURE", &flag)?;
        }
        if let Some(kernel) = env_value("COLONY_LAPLACIAN") {
            self.laplacian = LaplacianKernel::parse(&kernel)
                .ok_or_else(|| anyhow!("COLONY_LAPLACIAN must be 'weak' or 'strong'"))?;
        }
        if let Some(path) = env_value("COLONY_LOG_FILE") {
            self.log_file = PathBuf::from(path);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.influx.database.trim().is_empty() {
            return Err(anyhow!("INFLUXDB_DATABASE must be set"));
        }
        if self.measurement.trim().is_empty() {
            return Err(anyhow!("measurement name must not be empty"));
        }
        if self.device.device_id.trim().is_empty() {
            return Err(anyhow!("TUYA_DEVICE_ID must be set"));
        }
        if self.device.address.trim().is_empty() {
            return Err(anyhow!("TUYA_DEVICE_IP must be set"));
        }
        if self.device.local_key.is_empty() {
            return Err(anyhow!("TUYA_LOCAL_KEY must be set"));
        }
        self.device.validate()?;
        if self.stream.url.trim().is_empty() {
            return Err(anyhow!("COLONY_STREAM_URL must be set"));
        }
        if self.schedule.sensor_interval.is_zero() || self.schedule.picture_interval.is_zero() {
            return Err(anyhow!("task intervals must be greater than zero"));
        }
        if self.work_dir.as_os_str().is_empty() {
            return Err(anyhow!("work directory must not be empty"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be true or false, got {:?}", key, value)),
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    let seconds: u64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be an integer number of seconds", key))?;
    Ok(Duration::from_secs(seconds))
}

fn read_config_file(path: &Path) -> Result<AgentConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
