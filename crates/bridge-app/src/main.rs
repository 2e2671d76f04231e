use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use bridge_app::http::{self, AppState};
use bridge_app::BridgeConfig;
use model_store::ModelStore;
use poller::PollLoop;
use rtu_bus::RtuBus;

// One execution context for everything: the poll loop, the SunSpec server
// and the status surface interleave only at await points, so the store's
// replace-wholesale updates are the only synchronization the bridge needs.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_config_arg();
    let config = BridgeConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // An unopenable serial port is a configuration problem, not a transient
    // bus fault; give up immediately.
    let bus = RtuBus::open(&config.serial, config.unit_id).context("open serial port failed")?;
    let driver = config.driver.build(bus);
    info!(driver = config.driver.as_str(), device = %config.serial.device, "driver selected");

    let store = Arc::new(ModelStore::new(config.max_power_w));

    let poll_handle = tokio::spawn(
        PollLoop::new(
            driver,
            store.clone(),
            shutdown_rx.clone(),
            config.poller.clone(),
        )
        .run(),
    );

    let sunspec_config = config.sunspec.clone();
    let sunspec_store = store.clone();
    let sunspec_shutdown = shutdown_rx.clone();
    let sunspec_handle = tokio::spawn(async move {
        if let Err(err) = sunspec_server::serve(&sunspec_config, sunspec_store, sunspec_shutdown).await
        {
            warn!(error = %err, "sunspec server exited with error");
        }
    });

    let http_config = config.http.clone();
    let http_state = AppState {
        store: store.clone(),
        config: Arc::new(config),
    };
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(&http_config, http_state, shutdown_rx).await {
            warn!(error = %err, "status server exited with error");
        }
    });

    notify_ready();

    tokio::signal::ctrl_c()
        .await
        .context("install ctrl-c handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = poll_handle.await;
    let _ = sunspec_handle.await;
    let _ = http_handle.await;
    Ok(())
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}
