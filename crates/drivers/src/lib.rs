#![allow(dead_code)]

pub mod em24;
pub mod solis1p;

pub use em24::Em24;
pub use solis1p::Solis1p;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use thiserror::Error;

use rtu_bus::{BusError, RtuBus};
use sunspec_model::DecodeError;
use types::{CanonicalMeasurements, DeviceInfo};

#[derive(Debug, Error)]
pub enum DriverError {
    /// Timeout, CRC failure or exception response on the bus. The previous
    /// snapshot stays valid and the poll loop retries with backoff.
    #[error("device unreachable: {0}")]
    Unreachable(#[from] BusError),
    #[error("malformed device response: {0}")]
    Decode(#[from] DecodeError),
}

/// The capability every supported device provides: identification, one
/// measurement acquisition, and (where the hardware supports it) an active
/// power limit.
#[async_trait]
pub trait DeviceDriver {
    fn name(&self) -> &'static str;

    /// Reads the identity block. Retried by the poll loop until the device
    /// answers for the first time.
    async fn identify(&mut self) -> Result<DeviceInfo, DriverError>;

    /// One full acquisition. Holds the bus only for the duration of its
    /// request/response exchanges and releases it before returning.
    async fn poll(&mut self) -> Result<CanonicalMeasurements, DriverError>;

    /// Pushes the network-commanded power limit to the device, in percent
    /// of the nameplate rating. `None` means unrestricted.
    async fn apply_power_limit(&mut self, limit_pct: Option<u16>) -> Result<(), DriverError>;
}

/// Which driver variant to activate, chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Solis1p,
    Em24,
}

impl DriverKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "solis1p" => Some(Self::Solis1p),
            "em24" => Some(Self::Em24),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solis1p => "solis1p",
            Self::Em24 => "em24",
        }
    }

    /// Binds the variant to the bus it will own for the process lifetime.
    pub fn build(self, bus: RtuBus) -> Driver {
        match self {
            Self::Solis1p => Driver::Solis1p(Solis1p::new(bus)),
            Self::Em24 => Driver::Em24(Em24::new(bus)),
        }
    }
}

/// Closed set of driver variants. A new device type becomes a new variant
/// here, never runtime attribute probing.
pub enum Driver {
    Solis1p(Solis1p),
    Em24(Em24),
}

#[async_trait]
impl DeviceDriver for Driver {
    fn name(&self) -> &'static str {
        match self {
            Self::Solis1p(driver) => driver.name(),
            Self::Em24(driver) => driver.name(),
        }
    }

    async fn identify(&mut self) -> Result<DeviceInfo, DriverError> {
        match self {
            Self::Solis1p(driver) => driver.identify().await,
            Self::Em24(driver) => driver.identify().await,
        }
    }

    async fn poll(&mut self) -> Result<CanonicalMeasurements, DriverError> {
        match self {
            Self::Solis1p(driver) => driver.poll().await,
            Self::Em24(driver) => driver.poll().await,
        }
    }

    async fn apply_power_limit(&mut self, limit_pct: Option<u16>) -> Result<(), DriverError> {
        match self {
            Self::Solis1p(driver) => driver.apply_power_limit(limit_pct).await,
            Self::Em24(driver) => driver.apply_power_limit(limit_pct).await,
        }
    }
}

pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
