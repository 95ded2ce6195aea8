//! Keygate Server
//!
//! Holds an RSA key pair in memory and serves key export, RSA-OAEP,
//! AES-GCM and envelope operations.
//!
//! # Modes
//!
//! - **HTTP** (default): REST routes plus `POST /rpc` on `PORT` (3000)
//! - **raw RPC**: `USE_RAW_RPC=1` - newline-delimited JSON-RPC over TCP on `RPC_PORT` (1234)

use anyhow::Result;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use keygate::config::{GatewayConfig, ServeMode};
use keygate::http::{handle_http_request, AppState};
use keygate::{Gateway, KeyAuthority};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

async fn run_http_server(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "HTTP server listening");

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle_http_request(Arc::clone(&state), req));

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(remote_addr = %remote_addr, error = %e, "Connection error");
            }
        });
    }
}

/// Newline-delimited JSON-RPC over TCP
async fn run_raw_rpc_server(state: Arc<AppState>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Raw JSON-RPC server listening");

    loop {
        let (stream, remote_addr) = listener.accept().await?;
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let handler = state.rpc_handler();
            if let Err(e) = handler.serve_lines(reader, writer, state.max_body_bytes()).await {
                error!(remote_addr = %remote_addr, error = %e, "Connection error");
            }
        });
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Keygate Server...");

    let config = GatewayConfig::from_env()?;
    info!(
        mode = ?config.mode,
        key_bits = config.key_bits,
        allowed_origin = %config.allowed_origin,
        "Configuration loaded"
    );

    let authority = Arc::new(KeyAuthority::new());
    let gateway = Arc::new(Gateway::new(Arc::clone(&authority), config.key_bits));

    info!("Generating initial key pair...");
    let initial = gateway.generate_key_pair().await?;
    info!(fingerprint = %initial.fingerprint, "Initial key pair ready");

    let state = Arc::new(AppState::new(gateway, &config));

    match config.mode {
        ServeMode::Http => run_http_server(state, config.http_port).await,
        ServeMode::RawRpc => run_raw_rpc_server(state, config.rpc_port).await,
    }
}
