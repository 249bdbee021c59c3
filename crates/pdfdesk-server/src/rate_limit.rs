//! Per-client request quotas.
//!
//! Requests are keyed by client address. Behind the gateway every connection
//! comes from the gateway, so the forwarded address is used whenever the peer
//! is a trusted proxy.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::ServerError;

/// Refill rate and burst size of a quota.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quota {
    pub per_second: f64,
    pub burst: f64,
}

impl Quota {
    /// Sign-in endpoints: 50 attempts per 15 minutes.
    pub const SIGN_IN: Quota = Quota {
        per_second: 50.0 / 900.0,
        burst: 50.0,
    };
}

#[derive(Debug)]
struct Allowance {
    remaining: f64,
    updated: Instant,
}

impl Allowance {
    fn take(&mut self, quota: Quota, now: Instant) -> bool {
        let idle = now.saturating_duration_since(self.updated).as_secs_f64();
        self.remaining = (self.remaining + idle * quota.per_second).min(quota.burst);
        self.updated = now;

        if self.remaining < 1.0 {
            return false;
        }
        self.remaining -= 1.0;
        true
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    quota: Quota,
    trusted_proxies: Arc<[IpAddr]>,
    clients: Arc<Mutex<HashMap<IpAddr, Allowance>>>,
}

impl RateLimiter {
    pub fn new(quota: Quota, trusted_proxies: &[IpAddr]) -> Self {
        Self {
            quota,
            trusted_proxies: trusted_proxies.into(),
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spend one request of `client`'s quota. False once it is used up.
    pub async fn admit(&self, client: IpAddr) -> bool {
        self.admit_at(client, Instant::now()).await
    }

    async fn admit_at(&self, client: IpAddr, now: Instant) -> bool {
        let mut clients = self.clients.lock().await;
        clients
            .entry(client)
            .or_insert(Allowance {
                remaining: self.quota.burst,
                updated: now,
            })
            .take(self.quota, now)
    }

    /// Forget clients not seen for `max_idle`.
    pub async fn evict_idle(&self, max_idle: Duration) {
        let now = Instant::now();
        self.clients
            .lock()
            .await
            .retain(|_, allowance| now.saturating_duration_since(allowance.updated) < max_idle);
    }

    pub fn client_ip(&self, headers: &HeaderMap, extensions: &Extensions) -> Option<IpAddr> {
        client_ip(headers, extensions, &self.trusted_proxies)
    }
}

pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Result<Response, ServerError> {
    if let Some(client) = limiter.client_ip(req.headers(), req.extensions()) {
        if !limiter.admit(client).await {
            warn!(client = %client, path = %req.uri().path(), "Rate limit exceeded");
            return Err(ServerError::TooManyRequests);
        }
    }

    Ok(next.run(req).await)
}

/// Address of the browser behind a request.
///
/// A direct peer is authoritative unless it is a trusted proxy. Without a
/// known peer (in-process calls) the forwarded headers are used.
pub fn client_ip(
    headers: &HeaderMap,
    extensions: &Extensions,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match peer {
        Some(peer) if !trusted_proxies.contains(&peer) => Some(peer),
        _ => forwarded_ip(headers).or(peer),
    }
}

/// First `X-Forwarded-For` hop, else `X-Real-IP`.
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    header("x-forwarded-for")
        .and_then(|chain| chain.split(',').next())
        .and_then(|hop| hop.trim().parse().ok())
        .or_else(|| header("x-real-ip").and_then(|ip| ip.trim().parse().ok()))
}
