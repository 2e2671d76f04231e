#![allow(dead_code)]

use serde::{Deserialize, Serialize};

/// SunSpec inverter operating state (model 101 `St` point).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingState {
    Off,
    Sleeping,
    Starting,
    Mppt,
    Throttled,
    ShuttingDown,
    Fault,
    Standby,
}

impl OperatingState {
    /// Wire value of the `St` enumeration point.
    pub fn code(self) -> u16 {
        match self {
            Self::Off => 1,
            Self::Sleeping => 2,
            Self::Starting => 3,
            Self::Mppt => 4,
            Self::Throttled => 5,
            Self::ShuttingDown => 6,
            Self::Fault => 7,
            Self::Standby => 8,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(Self::Off),
            2 => Some(Self::Sleeping),
            3 => Some(Self::Starting),
            4 => Some(Self::Mppt),
            5 => Some(Self::Throttled),
            6 => Some(Self::ShuttingDown),
            7 => Some(Self::Fault),
            8 => Some(Self::Standby),
            _ => None,
        }
    }
}

/// Device-agnostic measurement snapshot in SI units.
///
/// Immutable once constructed; the poll loop replaces the whole value in the
/// store instead of mutating fields, so readers never see a partial update.
/// Quantities the active device cannot provide are `None` and encode as the
/// SunSpec "not implemented" sentinel for their point type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMeasurements {
    /// Phase voltage in volts.
    pub ac_voltage: f64,
    /// Phase current in amperes.
    pub ac_current: f64,
    /// Line frequency in hertz.
    pub frequency: Option<f64>,
    /// Active power in watts, signed (negative = consuming).
    pub active_power: f64,
    /// Reactive power in var.
    pub reactive_power: Option<f64>,
    /// Apparent power in volt-amperes.
    pub apparent_power: Option<f64>,
    /// Lifetime energy accumulator in watt-hours.
    pub energy_wh: u64,
    pub dc_voltage: Option<f64>,
    pub dc_current: Option<f64>,
    pub operating_state: OperatingState,
    /// Acquisition timestamp, unix milliseconds.
    pub acquired_at_ms: u64,
}

/// Identity block read from the device once at startup and exposed through
/// the SunSpec common model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: String,
    pub model: String,
    pub options: String,
    pub version: String,
    pub serial: String,
}

impl DeviceInfo {
    /// Identity served before the physical device has answered.
    pub fn placeholder() -> Self {
        Self {
            manufacturer: "Generic".to_string(),
            model: "unknown".to_string(),
            options: String::new(),
            version: "0.0.1".to_string(),
            serial: "0".to_string(),
        }
    }
}
