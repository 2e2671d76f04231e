//! Read-only HTTP status surface.
//!
//! Renders the current store generation for humans and monitoring; it never
//! touches the bus and exposes no control endpoints.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::watch;
use tracing::info;

use model_store::ModelStore;
use types::{CanonicalMeasurements, DeviceInfo};

use crate::config::{BridgeConfig, HttpConfig};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ModelStore>,
    pub config: Arc<BridgeConfig>,
}

#[derive(Serialize)]
struct StatusResponse {
    /// "ok", "stale" while the poll loop is backing off, or
    /// "not_yet_acquired" before the first successful poll.
    acquisition: &'static str,
    driver: &'static str,
    device: Option<DeviceInfo>,
    measurements: Option<CanonicalMeasurements>,
    consecutive_failures: u32,
    last_success_ms: Option<u64>,
    age_ms: Option<u64>,
    last_error: Option<String>,
    power_limit_pct: Option<u16>,
}

#[derive(Serialize)]
struct ConfigResponse {
    driver: &'static str,
    serial_device: String,
    baud_rate: u32,
    unit_id: u8,
    poll_interval_ms: u64,
    sunspec_port: u16,
    http_port: u16,
    max_power_w: Option<u16>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/config", get(config))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let current = state.store.current();
    let acquisition = if current.measurements.is_none() {
        "not_yet_acquired"
    } else if current.health.consecutive_failures > 0 {
        "stale"
    } else {
        "ok"
    };
    let age_ms = current
        .health
        .last_success_ms
        .map(|ts| unix_ms().saturating_sub(ts));

    Json(StatusResponse {
        acquisition,
        driver: state.config.driver.as_str(),
        device: current.device,
        measurements: current.measurements,
        consecutive_failures: current.health.consecutive_failures,
        last_success_ms: current.health.last_success_ms,
        age_ms,
        last_error: current.health.last_error,
        power_limit_pct: current.controls.active_limit_pct(),
    })
}

async fn config(State(state): State<AppState>) -> Json<ConfigResponse> {
    let config = &state.config;
    Json(ConfigResponse {
        driver: config.driver.as_str(),
        serial_device: config.serial.device.clone(),
        baud_rate: config.serial.baud_rate,
        unit_id: config.unit_id,
        poll_interval_ms: config.poller.poll_interval.as_millis() as u64,
        sunspec_port: config.sunspec.port,
        http_port: config.http.port,
        max_power_w: config.max_power_w,
    })
}

/// Runs the status server until shutdown is signalled.
pub async fn serve(
    config: &HttpConfig,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "status server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
