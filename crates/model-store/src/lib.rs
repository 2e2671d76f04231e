#![allow(dead_code)]

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use sunspec_model::{build_image, layout, Controls, RegisterImage};
use types::{CanonicalMeasurements, DeviceInfo};

/// Poll-side health, exposed to the status surface as a staleness
/// indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollHealth {
    pub consecutive_failures: u32,
    pub last_success_ms: Option<u64>,
    pub last_error: Option<String>,
}

/// One complete store generation. Cloning is cheap: the encoded image is
/// behind an `Arc` and is shared, never mutated.
#[derive(Debug, Clone)]
pub struct StoreState {
    pub device: Option<DeviceInfo>,
    pub measurements: Option<CanonicalMeasurements>,
    pub controls: Controls,
    pub health: PollHealth,
    pub image: Arc<RegisterImage>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreWriteError {
    #[error("register {addr} is not writable")]
    NotWritable { addr: u16 },
    #[error("value {value} out of range for register {addr}")]
    InvalidValue { addr: u16, value: u16 },
}

/// The canonical shared state between the poll loop, the SunSpec server and
/// the status surface.
///
/// Every mutation builds the complete successor state off-line and installs
/// it with a single `send_replace`, so a reader either sees the whole old
/// generation or the whole new one; there is no observable intermediate.
/// This is the only synchronization primitive the bridge needs.
pub struct ModelStore {
    tx: watch::Sender<StoreState>,
    max_power_w: Option<u16>,
}

/// Read-only subscription handle for the serving tasks.
#[derive(Clone)]
pub struct StoreReader {
    rx: watch::Receiver<StoreState>,
}

impl StoreReader {
    pub fn current(&self) -> StoreState {
        self.rx.borrow().clone()
    }
}

impl ModelStore {
    pub fn new(max_power_w: Option<u16>) -> Self {
        let controls = Controls::default();
        let state = StoreState {
            device: None,
            measurements: None,
            controls: controls.clone(),
            health: PollHealth::default(),
            image: Arc::new(build_image(None, None, &controls, max_power_w)),
        };
        let (tx, _rx) = watch::channel(state);
        Self { tx, max_power_w }
    }

    pub fn reader(&self) -> StoreReader {
        StoreReader {
            rx: self.tx.subscribe(),
        }
    }

    /// The current generation, read in one non-suspending step.
    pub fn current(&self) -> StoreState {
        self.tx.borrow().clone()
    }

    fn install(&self, mutate: impl FnOnce(&mut StoreState)) {
        let mut next = self.tx.borrow().clone();
        mutate(&mut next);
        next.image = Arc::new(build_image(
            next.device.as_ref(),
            next.measurements.as_ref(),
            &next.controls,
            self.max_power_w,
        ));
        self.tx.send_replace(next);
    }

    /// Records the identity block once the device has answered. Enables the
    /// SunSpec marker on the served image.
    pub fn set_device_info(&self, device: DeviceInfo) {
        info!(manufacturer = %device.manufacturer, serial = %device.serial, "device identified");
        self.install(|state| state.device = Some(device));
    }

    /// Installs a fresh measurement snapshot and clears the failure streak.
    /// Single writer: only the poll loop calls this.
    pub fn update(&self, measurements: CanonicalMeasurements) {
        self.install(|state| {
            state.health.consecutive_failures = 0;
            state.health.last_success_ms = Some(measurements.acquired_at_ms);
            state.health.last_error = None;
            state.measurements = Some(measurements);
        });
    }

    /// Notes a failed poll cycle. The last-known-good snapshot is retained.
    pub fn record_failure(&self, reason: &str) {
        self.install(|state| {
            state.health.consecutive_failures = state.health.consecutive_failures.saturating_add(1);
            state.health.last_error = Some(reason.to_string());
        });
    }

    /// Applies a client write to a single control register.
    pub fn write_register(&self, addr: u16, value: u16) -> Result<(), StoreWriteError> {
        self.write_registers(addr, std::slice::from_ref(&value))
    }

    /// Applies a client write spanning `values.len()` registers, all or
    /// nothing: the whole span is validated before any register changes.
    pub fn write_registers(&self, start: u16, values: &[u16]) -> Result<(), StoreWriteError> {
        let mut controls = self.tx.borrow().controls.clone();
        for (offset, value) in values.iter().enumerate() {
            let addr = start + offset as u16;
            apply_control_write(&mut controls, addr, *value)?;
        }
        debug!(start, count = values.len(), "control registers written");
        self.install(|state| state.controls = controls);
        Ok(())
    }
}

fn apply_control_write(
    controls: &mut Controls,
    addr: u16,
    value: u16,
) -> Result<(), StoreWriteError> {
    match addr {
        layout::reg::W_MAX_LIM_PCT => {
            if value > 100 {
                return Err(StoreWriteError::InvalidValue { addr, value });
            }
            controls.w_max_lim_pct = value;
        }
        layout::reg::W_MAX_LIM_PCT_RVRT_TMS => {
            controls.w_max_lim_rvrt_tms = value;
        }
        layout::reg::W_MAX_LIM_ENA => {
            if value > 1 {
                return Err(StoreWriteError::InvalidValue { addr, value });
            }
            controls.w_max_lim_ena = value == 1;
        }
        _ => return Err(StoreWriteError::NotWritable { addr }),
    }
    Ok(())
}
