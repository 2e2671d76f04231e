#![allow(dead_code)]

use std::future;
use std::net::SocketAddr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tracing::{debug, info, warn};

use model_store::{ModelStore, StoreWriteError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 502,
        }
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid listen address {0}")]
    InvalidAddress(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Answers SunSpec register requests from the current store generation.
///
/// `call` never suspends: each request reads exactly one snapshot, copies
/// the requested span out of it and replies, so two requests racing a poll
/// update can never observe a mix of generations.
#[derive(Clone)]
pub struct SunspecService {
    store: Arc<ModelStore>,
}

impl SunspecService {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    fn read_span(&self, addr: u16, count: u16) -> Result<Vec<u16>, ExceptionCode> {
        let state = self.store.current();
        match state.image.read(addr, count) {
            Some(words) => {
                debug!(addr, count, "register read");
                Ok(words.to_vec())
            }
            None => {
                warn!(addr, count, "read outside the served model");
                Err(ExceptionCode::IllegalDataAddress)
            }
        }
    }

    fn write_span(&self, addr: u16, values: &[u16]) -> Result<(), ExceptionCode> {
        match self.store.write_registers(addr, values) {
            Ok(()) => {
                info!(addr, count = values.len(), "control register written");
                Ok(())
            }
            Err(StoreWriteError::NotWritable { addr }) => {
                warn!(addr, "write to read-only register");
                Err(ExceptionCode::IllegalDataAddress)
            }
            Err(StoreWriteError::InvalidValue { addr, value }) => {
                warn!(addr, value, "control write out of range");
                Err(ExceptionCode::IllegalDataValue)
            }
        }
    }
}

impl tokio_modbus::server::Service for SunspecService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let res = match req {
            Request::ReadHoldingRegisters(addr, count) => self
                .read_span(addr, count)
                .map(Response::ReadHoldingRegisters),
            Request::ReadInputRegisters(addr, count) => self
                .read_span(addr, count)
                .map(Response::ReadInputRegisters),
            Request::WriteSingleRegister(addr, value) => self
                .write_span(addr, std::slice::from_ref(&value))
                .map(|()| Response::WriteSingleRegister(addr, value)),
            Request::WriteMultipleRegisters(addr, values) => self
                .write_span(addr, &values)
                .map(|()| Response::WriteMultipleRegisters(addr, values.len() as u16)),
            _ => {
                warn!(request = ?req, "unsupported function code");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

/// Runs the SunSpec TCP server until shutdown is signalled.
pub async fn serve(
    config: &ServerConfig,
    store: Arc<ModelStore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
        .parse()
        .map_err(|_| ServeError::InvalidAddress(format!("{}:{}", config.bind_addr, config.port)))?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "sunspec server listening");

    let server = Server::new(listener);
    let service = SunspecService::new(store);
    let on_connected = move |stream, socket_addr| {
        let service = service.clone();
        async move {
            debug!(%socket_addr, "sunspec client connected");
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(service.clone()))
            })
        }
    };
    let on_process_error = |err| {
        warn!(error = %err, "sunspec connection error");
    };

    tokio::select! {
        result = server.serve(&on_connected, on_process_error) => {
            result?;
        }
        _ = shutdown.changed() => {
            if *shutdown.borrow() {
                info!("sunspec server shutdown requested");
            }
        }
    }

    Ok(())
}
