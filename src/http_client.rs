//! HTTP transport for the authentication handshake
//!
//! Features:
//! - One reqwest client per [`HttpClient`], so the cookie jar (and with it the
//!   upgraded login) carries across every handshake stage
//! - TLS 1.3 via rustls, gzip, HTTP/2 when offered
//! - Connect + request timeouts, bounded redirects
//!
//! The handshake code never talks to reqwest directly. It builds
//! [`WireRequest`]s and reads [`WireResponse`]s through the [`Transport`]
//! trait, which keeps the protocol testable without a network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, instrument};

/// User agent sent with every handshake request.
const USER_AGENT: &str = concat!("radrec/", env!("CARGO_PKG_VERSION"));

/// HTTP method of a [`WireRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request as the handshake protocol describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub method: Method,
    pub url: String,
    /// Header pairs, in the order they are sent.
    pub headers: Vec<(String, String)>,
    /// Form-encoded body fields (POST only).
    pub form: Vec<(String, String)>,
}

impl WireRequest {
    /// Start a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            form: Vec::new(),
        }
    }

    /// Start a form-encoded POST request.
    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            form,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header value by case-insensitive name.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Status, headers and text body of a handshake response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl WireResponse {
    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Transport-level failure: DNS, connect, TLS, timeout, body read.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self(format!("request timed out: {err}"))
        } else if err.is_connect() {
            Self(format!("connection failed: {err}"))
        } else {
            Self(err.to_string())
        }
    }
}

/// Sends handshake requests.
///
/// Implementations must reuse one session context (cookies) for every call
/// made through the same value.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError>;
}

/// reqwest-backed [`Transport`].
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a client with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            // Session continuity between login, auth1 and auth2
            .cookie_store(true)
            .use_rustls_tls()
            .gzip(true)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(skip(self, request), fields(method = ?request.method, url = %strip_query(&request.url)))]
    async fn send(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url).form(&request.form),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.text().await?;

        debug!(status, body_len = body.len(), "Response received");

        Ok(WireResponse {
            status,
            headers,
            body,
        })
    }
}

/// Query strings may carry session ids; keep them out of logs.
fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_header_lookup_ignores_case() {
        let response = WireResponse {
            status: 200,
            headers: vec![("x-radiko-authtoken".into(), "tok".into())],
            body: String::new(),
        };
        assert_eq!(response.header("X-Radiko-AuthToken"), Some("tok"));
        assert_eq!(response.header("X-Radiko-KeyOffset"), None);
    }

    #[test]
    fn success_range() {
        let mut response = WireResponse {
            status: 204,
            headers: vec![],
            body: String::new(),
        };
        assert!(response.is_success());
        response.status = 302;
        assert!(!response.is_success());
    }

    #[test]
    fn request_builder_keeps_header_order() {
        let request = WireRequest::get("https://example.com")
            .header("A", "1")
            .header("B", "2");
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.headers[0].0, "A");
        assert_eq!(request.headers[1].0, "B");
        assert_eq!(request.header_value("b"), Some("2"));
    }

    #[test]
    fn strip_query_hides_session() {
        assert_eq!(
            strip_query("https://radiko.jp/v2/api/auth2?radiko_session=abc"),
            "https://radiko.jp/v2/api/auth2"
        );
    }

    #[test]
    fn client_builds() {
        assert!(HttpClient::new(Duration::from_secs(5)).is_ok());
    }
}
