//! Carlo Gavazzi EM24 energy meter presented as an inverter.
//!
//! Exists to exercise the SunSpec-serving path without the real inverter
//! awake; inverter-only quantities (the DC side) are reported as absent.

use async_trait::async_trait;
use tracing::debug;

use rtu_bus::RtuBus;
use sunspec_model::{vendor, DecodeError};
use types::{CanonicalMeasurements, DeviceInfo, OperatingState};

/// Input registers, all int32 with the low word transmitted first.
const REG_VOLTAGES: u16 = 0x0000;
const REG_CURRENTS: u16 = 0x000C;
const REG_TOTAL_POWER: u16 = 0x0028;
const REG_FREQUENCY: u16 = 0x0037;
const REG_TOTAL_ENERGY: u16 = 0x003E;
const REG_SERIAL: u16 = 0x1300;

pub struct Em24 {
    bus: RtuBus,
}

impl Em24 {
    pub fn new(bus: RtuBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl super::DeviceDriver for Em24 {
    fn name(&self) -> &'static str {
        "em24"
    }

    async fn identify(&mut self) -> Result<DeviceInfo, super::DriverError> {
        let serial = self.bus.read_input_registers(REG_SERIAL, 7).await?;
        Ok(DeviceInfo {
            manufacturer: "Carlo Gavazzi".to_string(),
            model: "EM24".to_string(),
            serial: vendor::ascii(&serial),
            ..DeviceInfo::placeholder()
        })
    }

    async fn poll(&mut self) -> Result<CanonicalMeasurements, super::DriverError> {
        let voltages = self.bus.read_input_registers(REG_VOLTAGES, 6).await?;
        let currents = self.bus.read_input_registers(REG_CURRENTS, 6).await?;
        let power = self.bus.read_input_registers(REG_TOTAL_POWER, 2).await?;
        let freq = self.bus.read_input_registers(REG_FREQUENCY, 1).await?;
        let energy = self.bus.read_input_registers(REG_TOTAL_ENERGY, 2).await?;
        Ok(decode_poll(
            &voltages,
            &currents,
            &power,
            &freq,
            &energy,
            super::unix_ms(),
        )?)
    }

    async fn apply_power_limit(&mut self, limit_pct: Option<u16>) -> Result<(), super::DriverError> {
        // A meter has nothing to curtail.
        if limit_pct.is_some() {
            debug!("power limit ignored by meter driver");
        }
        Ok(())
    }
}

/// Maps one cycle's raw register reads onto the canonical snapshot.
///
/// Raw units: volts in 0.1 steps, amps in milliamps, watts in 0.1 steps,
/// frequency in 0.1 Hz, energy in 0.1 kWh.
pub fn decode_poll(
    voltages: &[u16],
    currents: &[u16],
    power: &[u16],
    freq: &[u16],
    energy: &[u16],
    acquired_at_ms: u64,
) -> Result<CanonicalMeasurements, DecodeError> {
    let ac_voltage = vendor::i32_word_swapped(voltages, 0)? as f64 / 10.0;
    let ac_current = vendor::i32_word_swapped(currents, 0)? as f64 / 1_000.0;
    let active_power = vendor::i32_word_swapped(power, 0)? as f64 / 10.0;
    let frequency = vendor::u16_at(freq, 0)? as f64 / 10.0;
    let energy_wh = vendor::i32_word_swapped(energy, 0)?.max(0) as u64 * 100;

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
        dc_voltage: None,
        dc_current: None,
        operating_state,
        acquired_at_ms,
    })
}
