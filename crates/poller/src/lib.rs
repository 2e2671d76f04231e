#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use drivers::{DeviceDriver, DriverError};
use model_store::ModelStore;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Inter-cycle delay while the device is healthy.
    pub poll_interval: Duration,
    /// First-failure backoff; doubles per consecutive failure.
    pub backoff_base: Duration,
    /// Backoff ceiling.
    pub backoff_max: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// The RTU master task: periodically drives the active driver over the
/// serial bus and installs the result in the store.
///
/// The loop owns the driver (and through it the bus), so no other activity
/// can interleave a bus transaction mid-exchange. A failed cycle only
/// lengthens the next delay; nothing short of task shutdown stops the loop.
pub struct PollLoop<D> {
    driver: D,
    store: Arc<ModelStore>,
    shutdown: watch::Receiver<bool>,
    config: PollerConfig,
}

impl<D: DeviceDriver + Send> PollLoop<D> {
    pub fn new(
        driver: D,
        store: Arc<ModelStore>,
        shutdown: watch::Receiver<bool>,
        config: PollerConfig,
    ) -> Self {
        Self {
            driver,
            store,
            shutdown,
            config,
        }
    }

    pub async fn run(mut self) {
        let mut identified = false;
        let mut failures = 0u32;

        loop {
            if *self.shutdown.borrow() {
                info!(driver = self.driver.name(), "poll loop shutdown requested");
                break;
            }

            let cycle_start = Instant::now();
            match self.cycle(&mut identified).await {
                Ok(()) => failures = 0,
                Err(err) => {
                    failures = failures.saturating_add(1);
                    self.store.record_failure(&err.to_string());
                    warn!(
                        driver = self.driver.name(),
                        consecutive_failures = failures,
                        error = %err,
                        "poll cycle failed"
                    );
                }
            }

            let delay = backoff_delay(
                self.config.poll_interval,
                failures,
                self.config.backoff_base,
                self.config.backoff_max,
            );
            info!(
                driver = self.driver.name(),
                elapsed_ms = cycle_start.elapsed().as_millis() as u64,
                delay_ms = delay.as_millis() as u64,
                consecutive_failures = failures,
                "poll cycle complete"
            );

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!(driver = self.driver.name(), "poll loop shutdown requested");
                        break;
                    }
                }
            }
        }
    }

    async fn cycle(&mut self, identified: &mut bool) -> Result<(), DriverError> {
        if !*identified {
            let info = self.driver.identify().await?;
            self.store.set_device_info(info);
            *identified = true;
        }

        let measurements = self.driver.poll().await?;
        self.store.update(measurements);

        let limit = self.store.current().controls.active_limit_pct();
        self.driver.apply_power_limit(limit).await?;
        Ok(())
    }
}

/// Inter-cycle delay: the plain poll interval while healthy, exponential
/// from `backoff_base` per consecutive failure, capped at `backoff_max` and
/// never shorter than the poll interval itself.
pub fn backoff_delay(
    base: Duration,
    failures: u32,
    backoff_base: Duration,
    backoff_max: Duration,
) -> Duration {
    if failures == 0 {
        return base;
    }

    let shift = failures.saturating_sub(1).min(31);
    let factor = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
    let candidate = backoff_base.saturating_mul(factor);
    let backoff = if candidate > backoff_max {
        backoff_max
    } else {
        candidate
    };
    if backoff > base {
        backoff
    } else {
        base
    }
}
