use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use drivers::DriverKind;
use poller::PollerConfig;
use rtu_bus::SerialConfig;
use sunspec_server::ServerConfig;

const DEFAULT_UNIT_ID: u8 = 1;
const DEFAULT_HTTP_PORT: u16 = 80;

/// Startup configuration. Loaded once; nothing here is mutable at runtime.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    /// Modbus unit id of the physical device on the RTU bus.
    pub unit_id: u8,
    pub driver: DriverKind,
    pub poller: PollerConfig,
    /// Nameplate power rating exposed through the SunSpec nameplate model.
    pub max_power_w: Option<u16>,
    pub sunspec: ServerConfig,
    pub http: HttpConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            unit_id: DEFAULT_UNIT_ID,
            driver: DriverKind::Solis1p,
            poller: PollerConfig::default(),
            max_power_w: None,
            sunspec: ServerConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config)?;
        }

        apply_env_overrides(&mut config)?;
        Ok(config)
    }

    /// Rejects configurations the bridge cannot run with. Callers treat a
    /// failure here as fatal.
    pub fn validate(&self) -> Result<()> {
        if self.serial.device.trim().is_empty() {
            anyhow::bail!("serial.device must be non-empty");
        }
        if self.serial.baud_rate == 0 {
            anyhow::bail!("serial.baud_rate must be >= 1");
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            anyhow::bail!("serial.data_bits must be between 5 and 8");
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            anyhow::bail!("serial.stop_bits must be 1 or 2");
        }
        if !matches!(self.serial.parity.as_str(), "none" | "even" | "odd") {
            anyhow::bail!("serial.parity must be none, even or odd");
        }
        if self.serial.timeout_ms == 0 {
            anyhow::bail!("serial.timeout_ms must be >= 1");
        }
        if self.unit_id == 0 || self.unit_id > 247 {
            anyhow::bail!("device.unit_id must be between 1 and 247");
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.backoff_base.as_millis() == 0 {
            anyhow::bail!("poller.backoff_base_ms must be >= 1");
        }
        if self.poller.backoff_max < self.poller.backoff_base {
            anyhow::bail!("poller.backoff_max_ms must be >= poller.backoff_base_ms");
        }
        if self.sunspec.port == 0 {
            anyhow::bail!("sunspec.port must be between 1 and 65535");
        }
        if self.http.port == 0 {
            anyhow::bail!("http.port must be between 1 and 65535");
        }
        validate_bind_addr(&self.sunspec.bind_addr, self.sunspec.port)
            .context("sunspec.bind_addr")?;
        validate_bind_addr(&self.http.bind_addr, self.http.port).context("http.bind_addr")?;
        if let Some(max_power) = self.max_power_w {
            if max_power == 0 {
                anyhow::bail!("device.max_power_w must be >= 1 when set");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    serial: Option<FileSerialConfig>,
    device: Option<FileDeviceConfig>,
    poller: Option<FilePollerConfig>,
    sunspec: Option<FileServerConfig>,
    http: Option<FileServerConfig>,
}

#[derive(Debug, Deserialize)]
struct FileSerialConfig {
    device: Option<String>,
    baud_rate: Option<u32>,
    data_bits: Option<u8>,
    stop_bits: Option<u8>,
    parity: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    driver: Option<String>,
    unit_id: Option<u8>,
    max_power_w: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    backoff_base_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileServerConfig {
    bind_addr: Option<String>,
    port: Option<u16>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("SUNSPEC_BRIDGE_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path).with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut BridgeConfig, file: FileConfig) -> Result<()> {
    if let Some(serial) = file.serial {
        if let Some(device) = serial.device {
            config.serial.device = device;
        }
        if let Some(baud_rate) = serial.baud_rate {
            config.serial.baud_rate = baud_rate;
        }
        if let Some(data_bits) = serial.data_bits {
            config.serial.data_bits = data_bits;
        }
        if let Some(stop_bits) = serial.stop_bits {
            config.serial.stop_bits = stop_bits;
        }
        if let Some(parity) = serial.parity {
            config.serial.parity = parity;
        }
        if let Some(timeout_ms) = serial.timeout_ms {
            config.serial.timeout_ms = timeout_ms;
        }
    }

    if let Some(device) = file.device {
        if let Some(driver) = device.driver {
            config.driver = parse_driver(&driver)?;
        }
        if let Some(unit_id) = device.unit_id {
            config.unit_id = unit_id;
        }
        if let Some(max_power) = device.max_power_w {
            config.max_power_w = Some(max_power);
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(backoff_ms) = poller.backoff_base_ms {
            config.poller.backoff_base = Duration::from_millis(backoff_ms);
        }
        if let Some(backoff_ms) = poller.backoff_max_ms {
            config.poller.backoff_max = Duration::from_millis(backoff_ms);
        }
    }

    if let Some(sunspec) = file.sunspec {
        if let Some(bind_addr) = sunspec.bind_addr {
            config.sunspec.bind_addr = bind_addr;
        }
        if let Some(port) = sunspec.port {
            config.sunspec.port = port;
        }
    }

    if let Some(http) = file.http {
        if let Some(bind_addr) = http.bind_addr {
            config.http.bind_addr = bind_addr;
        }
        if let Some(port) = http.port {
            config.http.port = port;
        }
    }

    Ok(())
}

fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    if let Ok(value) = env::var("SUNSPEC_BRIDGE_SERIAL_DEVICE") {
        config.serial.device = value;
    }
    if let Some(baud_rate) = parse_env_u32("SUNSPEC_BRIDGE_BAUD_RATE") {
        config.serial.baud_rate = baud_rate;
    }
    if let Some(timeout_ms) = parse_env_u64("SUNSPEC_BRIDGE_SERIAL_TIMEOUT_MS") {
        config.serial.timeout_ms = timeout_ms;
    }
    if let Ok(value) = env::var("SUNSPEC_BRIDGE_DRIVER") {
        config.driver = parse_driver(&value)?;
    }
    if let Some(unit_id) = parse_env_u8("SUNSPEC_BRIDGE_UNIT_ID") {
        config.unit_id = unit_id;
    }
    if let Some(interval_ms) = parse_env_u64("SUNSPEC_BRIDGE_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }
    if let Some(port) = parse_env_u16("SUNSPEC_BRIDGE_SUNSPEC_PORT") {
        config.sunspec.port = port;
    }
    if let Some(port) = parse_env_u16("SUNSPEC_BRIDGE_HTTP_PORT") {
        config.http.port = port;
    }
    if let Some(max_power) = parse_env_u16("SUNSPEC_BRIDGE_MAX_POWER_W") {
        config.max_power_w = Some(max_power);
    }
    Ok(())
}

fn parse_driver(name: &str) -> Result<DriverKind> {
    DriverKind::from_name(name)
        .ok_or_else(|| anyhow::anyhow!("unknown driver {name:?}, expected solis1p or em24"))
}

fn validate_bind_addr(bind_addr: &str, port: u16) -> Result<()> {
    format!("{bind_addr}:{port}")
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| anyhow::anyhow!("{bind_addr} is not a valid bind address"))
}

fn parse_env_u8(key: &str) -> Option<u8> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
