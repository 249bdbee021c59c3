//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the backend starts with zero configuration
//! for local development. Signing secrets fall back to development values
//! with a warning.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;
use pdfdesk_shared::constants::{
    ACCESS_TOKEN_TTL_SECS, DEFAULT_BACKEND_PORT, DEV_ACCESS_SECRET, DEV_REFRESH_SECRET,
    REFRESH_TOKEN_TTL_SECS,
};
use pdfdesk_shared::parse_lifetime;

/// Server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3002`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./pdfdesk.db`
    pub database_path: PathBuf,

    /// HMAC secret for access tokens.
    /// Env: `JWT_SECRET`
    pub jwt_secret: String,

    /// HMAC secret for refresh tokens.
    /// Env: `JWT_REFRESH_SECRET`
    pub jwt_refresh_secret: String,

    /// Env: `JWT_EXPIRES_IN`, default `15m`
    pub access_ttl: Duration,

    /// Env: `JWT_REFRESH_EXPIRES_IN`, default `7d`
    pub refresh_ttl: Duration,

    /// Expected audience of Google ID tokens. Google sign-in is disabled
    /// when unset.
    /// Env: `GOOGLE_CLIENT_ID`
    pub google_client_id: Option<String>,

    /// Origin allowed by CORS, with credentials.
    /// Env: `FRONTEND_URL`
    /// Default: `http://localhost:3000`
    pub frontend_url: String,

    /// Mark auth cookies `Secure` and `SameSite=Strict`.
    /// Env: `COOKIE_SECURE` (true/false)
    /// Default: `false`
    pub cookie_secure: bool,

    /// Lower-cased emails that register as admins.
    /// Env: `ADMIN_EMAILS` (comma-separated)
    pub admin_emails: Vec<String>,

    /// Env: `RATE_LIMIT_PER_SEC`, default `10`
    pub rate_limit_per_sec: f64,

    /// Env: `RATE_LIMIT_BURST`, default `30`
    pub rate_limit_burst: f64,

    /// Peers whose `X-Forwarded-For` is believed, normally the gateway.
    /// Env: `TRUSTED_PROXIES` (comma-separated)
    /// Default: `127.0.0.1,::1`
    pub trusted_proxies: Vec<IpAddr>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("access_ttl_secs", &self.access_ttl.num_seconds())
            .field("refresh_ttl_secs", &self.refresh_ttl.num_seconds())
            .field("google_sign_in", &self.google_client_id.is_some())
            .field("frontend_url", &self.frontend_url)
            .field("cookie_secure", &self.cookie_secure)
            .field("admin_emails", &self.admin_emails.len())
            .field("rate_limit_per_sec", &self.rate_limit_per_sec)
            .field("rate_limit_burst", &self.rate_limit_burst)
            .field("trusted_proxies", &self.trusted_proxies)
            .finish_non_exhaustive()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_BACKEND_PORT).into(),
            database_path: PathBuf::from("./pdfdesk.db"),
            jwt_secret: DEV_ACCESS_SECRET.to_string(),
            jwt_refresh_secret: DEV_REFRESH_SECRET.to_string(),
            access_ttl: Duration::seconds(ACCESS_TOKEN_TTL_SECS),
            refresh_ttl: Duration::seconds(REFRESH_TOKEN_TTL_SECS),
            google_client_id: None,
            frontend_url: "http://localhost:3000".to_string(),
            cookie_secure: false,
            admin_emails: Vec::new(),
            rate_limit_per_sec: 10.0,
            rate_limit_burst: 30.0,
            trusted_proxies: vec![Ipv4Addr::LOCALHOST.into(), Ipv6Addr::LOCALHOST.into()],
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = lookup("DATABASE_PATH").filter(|p| !p.is_empty()) {
            config.database_path = PathBuf::from(path);
        }

        match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => config.jwt_secret = secret,
            None => tracing::warn!("JWT_SECRET not set, using development secret"),
        }

        match lookup("JWT_REFRESH_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => config.jwt_refresh_secret = secret,
            None => tracing::warn!("JWT_REFRESH_SECRET not set, using development secret"),
        }

        if let Some(value) = lookup("JWT_EXPIRES_IN") {
            match parse_lifetime(&value) {
                Some(ttl) => config.access_ttl = ttl,
                None => tracing::warn!(value = %value, "Invalid JWT_EXPIRES_IN, using default"),
            }
        }

        if let Some(value) = lookup("JWT_REFRESH_EXPIRES_IN") {
            match parse_lifetime(&value) {
                Some(ttl) => config.refresh_ttl = ttl,
                None => {
                    tracing::warn!(value = %value, "Invalid JWT_REFRESH_EXPIRES_IN, using default")
                }
            }
        }

        config.google_client_id = lookup("GOOGLE_CLIENT_ID")
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        if let Some(url) = lookup("FRONTEND_URL").filter(|u| !u.is_empty()) {
            config.frontend_url = url.trim_end_matches('/').to_string();
        }

        if let Some(val) = lookup("COOKIE_SECURE") {
            config.cookie_secure = val == "true" || val == "1";
        }

        if let Some(list) = lookup("ADMIN_EMAILS") {
            config.admin_emails = list
                .split(',')
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }

        if let Some(val) = lookup("RATE_LIMIT_PER_SEC") {
            match val.parse::<f64>() {
                Ok(n) if n > 0.0 => config.rate_limit_per_sec = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_PER_SEC, using default"),
            }
        }

        if let Some(val) = lookup("RATE_LIMIT_BURST") {
            match val.parse::<f64>() {
                Ok(n) if n >= 1.0 => config.rate_limit_burst = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_BURST, using default"),
            }
        }

        if let Some(list) = lookup("TRUSTED_PROXIES") {
            config.trusted_proxies = list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .filter_map(|entry| match entry.parse::<IpAddr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        tracing::warn!(value = %entry, "Ignoring invalid TRUSTED_PROXIES entry");
                        None
                    }
                })
                .collect();
        }

        config
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        let email = email.trim().to_ascii_lowercase();
        self.admin_emails.iter().any(|e| *e == email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3002).into());
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.refresh_ttl, Duration::days(7));
        assert!(config.google_client_id.is_none());
        assert_eq!(config.jwt_secret, DEV_ACCESS_SECRET);
        assert_eq!(
            config.trusted_proxies,
            vec!["127.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse().unwrap()]
        );
    }

    #[test]
    fn test_trusted_proxies() {
        let config = ServerConfig::from_lookup(lookup(&[(
            "TRUSTED_PROXIES",
            "10.0.0.5, gateway.local,,fd00::1",
        )]));
        assert_eq!(
            config.trusted_proxies,
            vec!["10.0.0.5".parse::<IpAddr>().unwrap(), "fd00::1".parse().unwrap()]
        );

        let config = ServerConfig::from_lookup(lookup(&[("TRUSTED_PROXIES", "")]));
        assert!(config.trusted_proxies.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "127.0.0.1:4000"),
            ("JWT_SECRET", "s1"),
            ("JWT_EXPIRES_IN", "1h"),
            ("GOOGLE_CLIENT_ID", " client-123 "),
            ("ADMIN_EMAILS", "Root@Example.com, ops@example.com,,"),
            ("COOKIE_SECURE", "true"),
            ("FRONTEND_URL", "https://pdf.example.com/"),
        ]));

        assert_eq!(config.http_addr, ([127, 0, 0, 1], 4000).into());
        assert_eq!(config.jwt_secret, "s1");
        assert_eq!(config.access_ttl, Duration::hours(1));
        assert_eq!(config.google_client_id.as_deref(), Some("client-123"));
        assert_eq!(config.admin_emails, vec!["root@example.com", "ops@example.com"]);
        assert!(config.is_admin_email("ROOT@example.com "));
        assert!(!config.is_admin_email("someone@example.com"));
        assert!(config.cookie_secure);
        assert_eq!(config.frontend_url, "https://pdf.example.com");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("JWT_EXPIRES_IN", "soon"),
            ("RATE_LIMIT_PER_SEC", "-3"),
            ("GOOGLE_CLIENT_ID", "   "),
        ]));

        assert_eq!(config.http_addr, ([0, 0, 0, 0], 3002).into());
        assert_eq!(config.access_ttl, Duration::minutes(15));
        assert_eq!(config.rate_limit_per_sec, 10.0);
        assert!(config.google_client_id.is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = ServerConfig::from_lookup(lookup(&[("JWT_SECRET", "super-secret-value")]));
        assert!(!format!("{config:?}").contains("super-secret-value"));
    }
}
