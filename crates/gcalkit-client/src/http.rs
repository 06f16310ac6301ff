//! The HTTP capability every component is built on.
//!
//! Components never create their own HTTP client: they receive an
//! [`HttpClient`] at construction. [`ReqwestClient`] is the production
//! implementation; [`MockHttpClient`](crate::MockHttpClient) replays scripted
//! responses in tests.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use gcalkit_core::{CalendarError, CalendarResult};
use reqwest::Method;
use tracing::trace;
use url::Url;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Content type of form-encoded bodies.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Adds a header, replacing any header with the same name.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Sets the body and its content type.
    pub fn with_body(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.set_header("Content-Type", content_type);
        self.body = Some(body.into());
        self
    }

    /// Sets a form-encoded body.
    pub fn with_form(self, params: &[(&str, &str)]) -> Self {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        self.with_body(FORM_CONTENT_TYPE, body)
    }

    /// Replaces the header called `name` (case-insensitive).
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Returns the value of the header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Reads `key` from a form-encoded body.
    pub fn form_value(&self, key: &str) -> Option<String> {
        let body = self.body.as_deref()?;
        url::form_urlencoded::parse(body.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Reads `key` from the URL query string.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Returns the value of the header called `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Sends HTTP requests.
///
/// Implementations must not follow redirects on their own: redirect handling
/// is part of the legacy transport's protocol.
pub trait HttpClient: Send + Sync + fmt::Debug {
    /// Performs one round trip. Non-2xx statuses are not errors at this level.
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, CalendarResult<HttpResponse>>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the given timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> CalendarResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| {
                CalendarError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, CalendarResult<HttpResponse>> {
        Box::pin(async move {
            trace!(method = %request.method, url = %request.url, "sending request");

            let mut builder = self.client.request(request.method, request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|e| {
                let message = if e.is_timeout() {
                    "request timeout".to_string()
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    format!("request failed: {}", e)
                };
                CalendarError::network(message).with_source(e)
            })?;

            let status = response.status().as_u16();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();
            let body = response.text().await.map_err(|e| {
                CalendarError::network(format!("failed to read response: {}", e)).with_source(e)
            })?;

            trace!(status, "received response");
            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }
}
