//! # pdfdesk-gateway
//!
//! Front-facing API routes of the PDF tools web app. Most routes validate
//! their input and relay to the backend; `/api/auth/me` and `/api/pdf-info`
//! are answered locally.

mod api;
mod auth;
mod config;
mod error;
mod pdf;
mod proxy;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::GatewayConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pdfdesk_gateway=debug")),
        )
        .init();

    info!("Starting pdfdesk gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = GatewayConfig::from_env();
    info!(?config, "Loaded configuration");

    let http_addr = config.http_addr;
    let state = AppState::new(config);

    tokio::select! {
        result = api::serve(state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
