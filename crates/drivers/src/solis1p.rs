//! Solis single-phase inverter, Modbus RTU register layout.

use async_trait::async_trait;
use tracing::debug;

use rtu_bus::RtuBus;
use sunspec_model::{vendor, DecodeError};
use types::{CanonicalMeasurements, DeviceInfo, OperatingState};

/// Input registers the driver reads each cycle.
const REG_VERSION: u16 = 3000;
const REG_ACTIVE_POWER: u16 = 3004;
const REG_TOTAL_ENERGY: u16 = 3008;
const REG_DC_INPUT: u16 = 3021;
const REG_AC_OUTPUT: u16 = 3035;
const REG_FREQUENCY: u16 = 3042;
const REG_SERIAL: u16 = 3060;

/// Holding register taking the active power ceiling, percent x 100.
const REG_POWER_LIMIT: u16 = 3049;
const POWER_LIMIT_OFF: u16 = 10_000;

pub struct Solis1p {
    bus: RtuBus,
}

impl Solis1p {
    pub fn new(bus: RtuBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl super::DeviceDriver for Solis1p {
    fn name(&self) -> &'static str {
        "solis1p"
    }

    async fn identify(&mut self) -> Result<DeviceInfo, super::DriverError> {
        let serial = self.bus.read_input_registers(REG_SERIAL, 4).await?;
        let version = self.bus.read_input_registers(REG_VERSION, 1).await?;
        Ok(DeviceInfo {
            manufacturer: "Solis".to_string(),
            model: "Generic".to_string(),
            options: String::new(),
            version: format!("{:x}", vendor::u16_at(&version, 0)?),
            serial: vendor::solis_serial(&serial),
        })
    }

    async fn poll(&mut self) -> Result<CanonicalMeasurements, super::DriverError> {
        let ac = self.bus.read_input_registers(REG_AC_OUTPUT, 2).await?;
        let power = self.bus.read_input_registers(REG_ACTIVE_POWER, 2).await?;
        let energy = self.bus.read_input_registers(REG_TOTAL_ENERGY, 2).await?;
        let freq = self.bus.read_input_registers(REG_FREQUENCY, 1).await?;
        let dc = self.bus.read_input_registers(REG_DC_INPUT, 2).await?;
        Ok(decode_poll(&ac, &power, &energy, &freq, &dc, super::unix_ms())?)
    }

    async fn apply_power_limit(&mut self, limit_pct: Option<u16>) -> Result<(), super::DriverError> {
        let value = match limit_pct {
            Some(pct) => pct.min(100).saturating_mul(100),
            None => POWER_LIMIT_OFF,
        };
        debug!(value, "writing power limit");
        self.bus.write_single_register(REG_POWER_LIMIT, value).await?;
        Ok(())
    }
}

/// Maps one cycle's raw register reads onto the canonical snapshot.
///
/// Raw units: AC volts and amps in 0.1 steps, power in watts, energy in
/// kilowatt-hours, frequency in 0.01 Hz, DC volts and amps in 0.1 steps.
pub fn decode_poll(
    ac: &[u16],
    power: &[u16],
    energy: &[u16],
    freq: &[u16],
    dc: &[u16],
    acquired_at_ms: u64,
) -> Result<CanonicalMeasurements, DecodeError> {
    let ac_voltage = vendor::u16_at(ac, 0)? as f64 / 10.0;
    let ac_current = vendor::u16_at(ac, 1)? as f64 / 10.0;
    let active_power = vendor::u32_be(power, 0)? as f64;
    let energy_wh = vendor::u32_be(energy, 0)? as u64 * 1_000;
    let frequency = vendor::u16_at(freq, 0)? as f64 / 100.0;
    let dc_voltage = vendor::u16_at(dc, 0)? as f64 / 10.0;
    let dc_current = vendor::u16_at(dc, 1)? as f64 / 10.0;

    let operating_state = if active_power > 0.0 {
        OperatingState::Mppt
    } else {
        OperatingState::Sleeping
    };

    Ok(CanonicalMeasurements {
        ac_voltage,
        ac_current,
        frequency: Some(frequency),
        active_power,
        reactive_power: None,
        apparent_power: None,
        energy_wh,
        dc_voltage: Some(dc_voltage),
        dc_current: Some(dc_current),
        operating_state,
        acquired_at_ms,
    })
}
