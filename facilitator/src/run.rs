//! sol402 Facilitator HTTP server entrypoint.
//!
//! This module initializes and runs the Axum-based HTTP server that exposes
//! the x402 v1 protocol interface for payment verification and settlement
//! across configured Solana networks.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/verify` | Get supported verification schema |
//! | `POST` | `/verify` | Verify a payment payload against requirements |
//! | `GET` | `/settle` | Get supported settlement schema |
//! | `POST` | `/settle` | Settle an accepted payment payload on-chain |
//! | `GET` | `/supported` | List supported payment kinds (scheme/network) |
//! | `GET` | `/health` | Health check endpoint |
//!
//! # Environment Variables
//!
//! - `HOST` - Server bind address (default: `0.0.0.0`)
//! - `PORT` - Server port (default: `9090`)
//! - `CONFIG` - Path to configuration file (default: `config.json`)
//! - `SOL402_CORS_ALLOWED_ORIGINS` - comma-separated CORS allowlist, or `*` to allow all
//! - `SOL402_NETWORKS` / `SOL402_DEFAULT_NETWORK` / `SOL402_RPC_URL*` - network selection
//! - `SOL402_SIGNER_KEY` - keypair for the legacy settlement path
//! - `RUST_LOG` - tracing filter (default: `info`)

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use dotenvy::dotenv;
use tower_http::cors;

use sol402_chain_solana::V1SolanaExact;
use sol402_chain_solana::chain::RpcConnectionPool;
use sol402_chain_solana::v1_solana_exact::V1SolanaExactFacilitator;
use sol402_facilitator_local::util::{SigDown, init_tracing};
use sol402_facilitator_local::{FacilitatorLocal, handlers};
use sol402_types::scheme::SchemeRegistry;

use crate::config::Config;

fn build_cors_layer() -> Result<cors::CorsLayer, io::Error> {
    let raw = std::env::var("SOL402_CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string());

    let base = cors::CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(cors::Any);

    if raw.trim() == "*" {
        return Ok(base.allow_origin(cors::Any));
    }

    let origins: Vec<HeaderValue> = raw
        .split(",")
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(HeaderValue::from_str)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid SOL402_CORS_ALLOWED_ORIGINS: {e}"),
            )
        })?;

    if origins.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "SOL402_CORS_ALLOWED_ORIGINS is empty",
        ));
    }

    Ok(base.allow_origin(origins))
}

/// Initializes the sol402 facilitator server.
///
/// - Loads `.env` variables.
/// - Initializes tracing.
/// - Builds the connection pool for the configured Solana networks.
/// - Starts an Axum HTTP server with the protocol handlers.
///
/// Binds to the address specified by the `HOST` and `PORT` env vars.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env variables
    dotenv().ok();
    init_tracing();

    let config = Config::load()?;

    let mut pool = RpcConnectionPool::new(config.chain_ids()?, config.default_chain_id()?)
        .with_endpoints(config.rpc_endpoints()?);
    if let Some(signer) = config.signer()? {
        pool = pool.with_signer(signer);
    }

    let mut schemes = SchemeRegistry::new();
    schemes.register(&V1SolanaExact, Box::new(V1SolanaExactFacilitator::new(pool)));

    let facilitator = FacilitatorLocal::new(schemes);
    let axum_state = Arc::new(facilitator);

    let http_endpoints = Router::new()
        .merge(handlers::routes().with_state(axum_state))
        .layer(build_cors_layer()?);

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .inspect_err(|e| tracing::error!("Failed to bind to {}: {}", addr, e))?;

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
