//! Relay of gateway requests to the backend API.
//!
//! A relayed call copies a fixed set of caller headers, sends the request
//! once and hands back the backend's status and JSON body unchanged. Any
//! transport or decoding failure is reported to the handler, which turns it
//! into its own `Failed to ...` message.

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::GatewayError;

/// Caller headers copied onto the backend request, when present.
const FORWARDED_HEADERS: [HeaderName; 4] = [
    header::AUTHORIZATION,
    header::COOKIE,
    HeaderName::from_static("x-forwarded-for"),
    header::USER_AGENT,
];

pub struct Backend {
    http: reqwest::Client,
    base_url: String,
}

/// What the backend answered.
#[derive(Debug)]
pub struct Relayed {
    pub status: StatusCode,
    pub body: Value,
    pub set_cookies: Vec<HeaderValue>,
}

impl Relayed {
    /// The backend response, with its `Set-Cookie` headers when `with_cookies`.
    pub fn into_response(self, with_cookies: bool) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if with_cookies {
            let headers = response.headers_mut();
            for cookie in self.set_cookies {
                headers.append(header::SET_COOKIE, cookie);
            }
        }
        response
    }
}

/// A request to relay: method, backend path and optional JSON body.
pub struct Outbound<'a> {
    pub method: Method,
    pub path: &'a str,
    pub query: &'a [(&'a str, &'a str)],
    pub body: Option<Bytes>,
}

impl<'a> Outbound<'a> {
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::GET,
            path,
            query: &[],
            body: None,
        }
    }

    pub fn post(path: &'a str, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            path,
            query: &[],
            body: Some(body),
        }
    }

    pub fn with_query(mut self, query: &'a [(&'a str, &'a str)]) -> Self {
        self.query = query;
        self
    }
}

impl Backend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Send `outbound` with the caller's forwardable headers.
    pub async fn send(
        &self,
        outbound: Outbound<'_>,
        incoming: &HeaderMap,
    ) -> Result<Relayed, reqwest::Error> {
        let url = format!("{}{}", self.base_url, outbound.path);
        let mut request = self.http.request(outbound.method, &url);

        for name in &FORWARDED_HEADERS {
            if let Some(value) = incoming.get(name) {
                request = request.header(name, value);
            }
        }
        if !outbound.query.is_empty() {
            request = request.query(outbound.query);
        }
        if let Some(body) = outbound.body {
            request = request
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let set_cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .cloned()
            .collect();
        let body = response.json::<Value>().await?;

        debug!(url = %url, status = %status, "Relayed backend response");
        Ok(Relayed {
            status,
            body,
            set_cookies,
        })
    }

    /// [`send`](Self::send), mapping any failure to `failure`.
    pub async fn relay(
        &self,
        outbound: Outbound<'_>,
        incoming: &HeaderMap,
        failure: &'static str,
    ) -> Result<Relayed, GatewayError> {
        self.send(outbound, incoming).await.map_err(|e| {
            warn!(error = %e, "{failure}");
            GatewayError::Upstream(failure)
        })
    }
}
