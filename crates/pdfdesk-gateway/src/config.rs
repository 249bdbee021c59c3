//! Gateway configuration loaded from environment variables.

use std::net::SocketAddr;

use pdfdesk_shared::constants::{
    DEFAULT_BACKEND_URL, DEFAULT_GATEWAY_PORT, DEV_ACCESS_SECRET, MAX_UPLOAD_SIZE,
};

#[derive(Clone)]
pub struct GatewayConfig {
    /// Env: `HTTP_ADDR`, default `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// Origin of the backend API, without a trailing slash.
    /// Env: `BACKEND_URL`
    /// Default: `http://localhost:3002`
    pub backend_url: String,

    /// Access-token secret shared with the backend.
    /// Env: `JWT_SECRET`
    pub jwt_secret: String,

    /// Largest accepted multipart body.
    /// Env: `MAX_UPLOAD_BYTES`, default 50 MiB
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("http_addr", &self.http_addr)
            .field("backend_url", &self.backend_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_GATEWAY_PORT).into(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            jwt_secret: DEV_ACCESS_SECRET.to_string(),
            max_upload_bytes: MAX_UPLOAD_SIZE,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(url) = lookup("BACKEND_URL").filter(|u| !u.trim().is_empty()) {
            config.backend_url = url.trim().trim_end_matches('/').to_string();
        }

        match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => config.jwt_secret = secret,
            None => tracing::warn!("JWT_SECRET not set, using development secret"),
        }

        if let Some(val) = lookup("MAX_UPLOAD_BYTES") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_upload_bytes = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_UPLOAD_BYTES, using default"),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GatewayConfig::from_lookup(|_| None);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3000).into());
        assert_eq!(config.backend_url, "http://localhost:3002");
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn overrides_and_fallbacks() {
        let config = GatewayConfig::from_lookup(|key| match key {
            "BACKEND_URL" => Some("http://api.internal:9000/".into()),
            "JWT_SECRET" => Some("shh".into()),
            "MAX_UPLOAD_BYTES" => Some("lots".into()),
            _ => None,
        });
        assert_eq!(config.backend_url, "http://api.internal:9000");
        assert_eq!(config.jwt_secret, "shh");
        assert_eq!(config.max_upload_bytes, MAX_UPLOAD_SIZE);
        assert!(!format!("{config:?}").contains("shh"));
    }
}
