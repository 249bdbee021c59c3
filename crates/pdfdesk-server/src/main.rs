//! # pdfdesk-server
//!
//! Backend API of the PDF tools web app.
//!
//! This binary provides:
//! - **Account auth**: email/password signup and login, Google sign-in,
//!   refresh-token rotation and logout
//! - **Session middleware** that re-checks every token against the user store
//! - **Conversion tracking** and the admin file-record listing
//! - **Statistics** over tracked conversions
//! - **Administration** of users and system logs
//! - **Per-IP rate limiting**

mod api;
mod auth;
mod config;
mod cookies;
mod error;
mod identity;
mod rate_limit;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pdfdesk_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::identity::{GoogleIdentityVerifier, KeySource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pdfdesk_server=debug")),
        )
        .init();

    info!("Starting pdfdesk backend v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?;
    let identity = Arc::new(GoogleIdentityVerifier::new(
        config.google_client_id.clone(),
        KeySource::google(),
    ));

    let http_addr = config.http_addr;
    let app_state = AppState::new(config, db, identity);

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Expired refresh sessions: at startup, then hourly
    let db = app_state.db.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match db.lock().await.purge_expired_sessions(Utc::now()) {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "Purged expired sessions"),
                Err(e) => warn!(error = %e, "Failed to purge expired sessions"),
            }
        }
    });

    // Rate limiter cleanup (every 5 minutes, evict buckets idle >10 min)
    for limiter in [
        app_state.rate_limiter.clone(),
        app_state.auth_rate_limiter.clone(),
    ] {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.evict_idle(std::time::Duration::from_secs(600)).await;
            }
        });
    }

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
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
