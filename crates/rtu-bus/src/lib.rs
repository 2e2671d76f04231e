#![allow(dead_code)]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tokio_modbus::client::{rtu, Context, Reader, Writer};
use tokio_modbus::slave::Slave;
use tokio_modbus::ExceptionCode;
use tokio_serial::SerialStream;
use tracing::debug;

/// Serial-line parameters for the RTU side of the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub device: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    /// "none", "even" or "odd".
    pub parity: String,
    /// Per-transaction timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: 9_600,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
            timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
    #[error("modbus transport error: {0}")]
    Transport(#[from] tokio_modbus::Error),
    #[error("device exception: {0:?}")]
    Exception(ExceptionCode),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Exclusive handle on the half-duplex serial bus.
///
/// Exactly one `RtuBus` exists per process and the active driver owns it, so
/// "at most one outstanding bus transaction" holds by construction. Every
/// transaction is bounded by the configured timeout; a hung exchange reports
/// [`BusError::Timeout`] instead of stalling the rest of the system.
pub struct RtuBus {
    ctx: Context,
    timeout: Duration,
    timeout_ms: u64,
}

impl RtuBus {
    /// Opens the serial port and attaches an RTU context for `unit_id`.
    ///
    /// Failure here means the configuration is unusable; callers treat it as
    /// fatal rather than retrying.
    pub fn open(config: &SerialConfig, unit_id: u8) -> Result<Self, BusError> {
        let builder = tokio_serial::new(&config.device, config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .stop_bits(stop_bits(config.stop_bits))
            .parity(parity(&config.parity))
            .timeout(Duration::from_millis(config.timeout_ms));
        let port = SerialStream::open(&builder)?;
        let ctx = rtu::attach_slave(port, Slave(unit_id));
        debug!(device = %config.device, baud_rate = config.baud_rate, unit_id, "serial port opened");
        Ok(Self {
            ctx,
            timeout: Duration::from_millis(config.timeout_ms),
            timeout_ms: config.timeout_ms,
        })
    }

    pub async fn read_input_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, BusError> {
        let request = self.ctx.read_input_registers(addr, count);
        match timeout(self.timeout, request).await {
            Ok(Ok(Ok(words))) => {
                debug!(addr, count, "rtu read ok");
                Ok(words)
            }
            Ok(Ok(Err(code))) => Err(BusError::Exception(code)),
            Ok(Err(err)) => Err(BusError::Transport(err)),
            Err(_) => Err(BusError::Timeout {
                timeout_ms: self.timeout_ms,
            }),
        }
    }

    pub async fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, BusError> {
        let request = self.ctx.read_holding_registers(addr, count);
        match timeout(self.timeout, request).await {
            Ok(Ok(Ok(words))) => {
                debug!(addr, count, "rtu read ok");
                Ok(words)
            }
            Ok(Ok(Err(code))) => Err(BusError::Exception(code)),
            Ok(Err(err)) => Err(BusError::Transport(err)),
            Err(_) => Err(BusError::Timeout {
                timeout_ms: self.timeout_ms,
            }),
        }
    }

    pub async fn write_single_register(&mut self, addr: u16, value: u16) -> Result<(), BusError> {
        let request = self.ctx.write_single_register(addr, value);
        match timeout(self.timeout, request).await {
            Ok(Ok(Ok(()))) => {
                debug!(addr, value, "rtu write ok");
                Ok(())
            }
            Ok(Ok(Err(code))) => Err(BusError::Exception(code)),
            Ok(Err(err)) => Err(BusError::Transport(err)),
            Err(_) => Err(BusError::Timeout {
                timeout_ms: self.timeout_ms,
            }),
        }
    }
}

fn data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn stop_bits(bits: u8) -> tokio_serial::StopBits {
    match bits {
        2 => tokio_serial::StopBits::Two,
        _ => tokio_serial::StopBits::One,
    }
}

fn parity(name: &str) -> tokio_serial::Parity {
    match name {
        "even" => tokio_serial::Parity::Even,
        "odd" => tokio_serial::Parity::Odd,
        _ => tokio_serial::Parity::None,
    }
}
