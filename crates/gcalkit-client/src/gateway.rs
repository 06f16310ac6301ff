//! Request dispatch and response classification.
//!
//! [`HttpGateway`] resolves paths against the API base of the selected
//! generation, hands the request to the connection's [`Transport`] and
//! returns successful responses. Every non-2xx status is turned into a
//! [`CalendarError`] by [`classify`].

use gcalkit_core::{CalendarError, CalendarResult, ErrorKind};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::auth::{Credential, PkceAuthorization};
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::Transport;

/// Maximum number of redirects followed for one legacy request.
pub const MAX_REDIRECTS: usize = 10;

/// JSON content type.
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// Atom content type used by the legacy feeds.
pub const ATOM_CONTENT_TYPE: &str = "application/atom+xml";

/// Which API surface a connection talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiGeneration {
    /// Calendar API v3, JSON bodies.
    Json,
    /// Calendar Data API feeds, Atom bodies.
    LegacyXml,
}

impl ApiGeneration {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => JSON_CONTENT_TYPE,
            Self::LegacyXml => ATOM_CONTENT_TYPE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::LegacyXml => "legacy_xml",
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorField,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorField {
    /// API errors: `{"error": {"code": 403, "message": "..."}}`
    Detailed { message: String },
    /// Token endpoint errors: `{"error": "invalid_grant"}`
    Code(String),
}

/// Extracts the human-readable error message from a response body.
///
/// Reads `error.message` (or `error_description`) from a JSON body, and
/// falls back to the trimmed raw body.
pub fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: ErrorField::Detailed { message },
            ..
        }) => message,
        Ok(ErrorBody {
            error: ErrorField::Code(code),
            error_description,
        }) => error_description.unwrap_or(code),
        Err(_) => body.trim().to_string(),
    }
}

/// Maps the message of a 403 response onto its error kind.
pub fn forbidden_kind(message: &str) -> ErrorKind {
    match message {
        "Forbidden" => ErrorKind::Forbidden,
        "Daily Limit Exceeded" => ErrorKind::DailyLimitExceeded,
        "User Rate Limit Exceeded" => ErrorKind::UserRateLimitExceeded,
        "Rate Limit Exceeded" => ErrorKind::RateLimitExceeded,
        "Calendar usage limits exceeded." => ErrorKind::CalendarUsageLimitExceeded,
        _ => ErrorKind::Forbidden,
    }
}

/// Returns the response if it is a 2xx, otherwise the classified error.
pub fn classify(response: HttpResponse, generation: ApiGeneration) -> CalendarResult<HttpResponse> {
    if response.is_success() {
        return Ok(response);
    }

    let message = error_message(&response.body);
    let kind = match response.status {
        400 => ErrorKind::RequestFailed,
        401 => match generation {
            ApiGeneration::Json => ErrorKind::InvalidCredentials,
            ApiGeneration::LegacyXml => ErrorKind::AuthorizationFailed,
        },
        403 => forbidden_kind(&message),
        404 => ErrorKind::NotFound,
        409 => ErrorKind::IdentifierAlreadyExists,
        410 => ErrorKind::Gone,
        412 => ErrorKind::PreconditionFailed,
        500 => ErrorKind::BackendError,
        status => {
            warn!(status, "unexpected response status");
            ErrorKind::RequestFailed
        }
    };

    let message = if message.is_empty() {
        format!("request failed with HTTP {}", response.status)
    } else {
        message
    };
    Err(CalendarError::new(kind, message).with_status(response.status))
}

/// Decodes a JSON response body.
pub(crate) fn decode_json<T: DeserializeOwned>(body: &str, what: &str) -> CalendarResult<T> {
    serde_json::from_str(body).map_err(|e| {
        CalendarError::invalid_response(format!("failed to parse {}: {}", what, e)).with_source(e)
    })
}

/// Encodes a JSON request body.
pub(crate) fn encode_json<T: Serialize>(value: &T, what: &str) -> CalendarResult<String> {
    serde_json::to_string(value).map_err(|e| {
        CalendarError::invalid_argument(format!("failed to encode {}: {}", what, e)).with_source(e)
    })
}

/// Appends form-encoded query parameters to a path.
pub(crate) fn path_with_query(path: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    format!("{}?{}", path, query)
}

/// Sends requests through the connection's transport.
#[derive(Debug)]
pub struct HttpGateway {
    transport: Box<dyn Transport>,
    base: Url,
}

impl HttpGateway {
    pub fn new(transport: Box<dyn Transport>, base: Url) -> Self {
        Self { transport, base }
    }

    pub fn generation(&self) -> ApiGeneration {
        self.transport.generation()
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolves an absolute URL, or a path (with optional query) under the base.
    pub fn resolve(&self, path_or_url: &str) -> CalendarResult<Url> {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            return Url::parse(path_or_url).map_err(|e| {
                CalendarError::invalid_argument(format!("invalid URL '{}': {}", path_or_url, e))
                    .with_source(e)
            });
        }

        let (path, query) = match path_or_url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_or_url, None),
        };
        let mut url = self.base.clone();
        let joined = format!(
            "{}/{}",
            self.base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(query);
        Ok(url)
    }

    /// Sends `method` to `path_or_url` with an optional body.
    pub async fn request(
        &self,
        method: Method,
        path_or_url: &str,
        body: Option<String>,
    ) -> CalendarResult<HttpResponse> {
        let url = self.resolve(path_or_url)?;
        self.send(method, url, body).await
    }

    /// Sends `method` to an already resolved URL.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
    ) -> CalendarResult<HttpResponse> {
        let content_type = self.generation().content_type();
        let mut request = HttpRequest::new(method, url).with_header("Accept", content_type);
        if let Some(body) = body {
            request = request.with_body(content_type, body);
        }
        self.transport.send(request).await
    }

    pub async fn authorization_url(&self) -> CalendarResult<Url> {
        self.transport.authorization_url().await
    }

    pub async fn authorization_url_with_pkce(&self) -> CalendarResult<PkceAuthorization> {
        self.transport.authorization_url_with_pkce().await
    }

    pub async fn exchange_authorization_code(&self, code: String) -> CalendarResult<()> {
        self.transport.exchange_authorization_code(code).await
    }

    pub async fn credential(&self) -> Option<Credential> {
        self.transport.credential().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16, body: &str, generation: ApiGeneration) -> CalendarError {
        classify(HttpResponse::new(status, body), generation).unwrap_err()
    }

    fn forbidden(message: &str) -> ErrorKind {
        let body = serde_json::json!({
            "error": {"code": 403, "message": message, "errors": [{"reason": "x"}]}
        });
        status(403, &body.to_string(), ApiGeneration::Json).kind()
    }

    #[test]
    fn success_passes_through() {
        let response = classify(HttpResponse::new(204, ""), ApiGeneration::Json).unwrap();
        assert_eq!(response.status, 204);
    }

    #[test]
    fn status_table() {
        let cases = [
            (400, ErrorKind::RequestFailed),
            (401, ErrorKind::InvalidCredentials),
            (404, ErrorKind::NotFound),
            (409, ErrorKind::IdentifierAlreadyExists),
            (410, ErrorKind::Gone),
            (412, ErrorKind::PreconditionFailed),
            (500, ErrorKind::BackendError),
            (418, ErrorKind::RequestFailed),
            (503, ErrorKind::RequestFailed),
        ];
        for (code, kind) in cases {
            let err = status(code, "", ApiGeneration::Json);
            assert_eq!(err.kind(), kind, "status {}", code);
            assert_eq!(err.status(), Some(code));
        }
    }

    #[test]
    fn legacy_unauthorized_is_authorization_failed() {
        let err = status(401, "Token invalid", ApiGeneration::LegacyXml);
        assert_eq!(err.kind(), ErrorKind::AuthorizationFailed);
        assert_eq!(err.message(), "Token invalid");
    }

    #[test]
    fn forbidden_dispatch() {
        assert_eq!(forbidden("Rate Limit Exceeded"), ErrorKind::RateLimitExceeded);
        assert_eq!(forbidden("Forbidden"), ErrorKind::Forbidden);
        assert_eq!(forbidden("Daily Limit Exceeded"), ErrorKind::DailyLimitExceeded);
        assert_eq!(
            forbidden("User Rate Limit Exceeded"),
            ErrorKind::UserRateLimitExceeded
        );
        assert_eq!(
            forbidden("Calendar usage limits exceeded."),
            ErrorKind::CalendarUsageLimitExceeded
        );
        assert_eq!(forbidden("Something else entirely"), ErrorKind::Forbidden);
    }

    #[test]
    fn forbidden_plain_body_is_trimmed() {
        let err = status(403, "  Rate Limit Exceeded\n", ApiGeneration::LegacyXml);
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
    }

    #[test]
    fn error_message_sources() {
        assert_eq!(
            error_message(r#"{"error": {"code": 404, "message": "Not Found"}}"#),
            "Not Found"
        );
        assert_eq!(
            error_message(r#"{"error": "invalid_grant", "error_description": "Bad Request"}"#),
            "Bad Request"
        );
        assert_eq!(error_message(r#"{"error": "invalid_client"}"#), "invalid_client");
        assert_eq!(error_message(" plain text "), "plain text");
    }

    #[test]
    fn query_is_form_encoded() {
        assert_eq!(path_with_query("calendars", &[]), "calendars");
        assert_eq!(
            path_with_query(
                "calendars/primary/events/quickAdd",
                &[("text", "movie tomorrow 23:00".to_string())]
            ),
            "calendars/primary/events/quickAdd?text=movie+tomorrow+23%3A00"
        );
    }

    #[test]
    fn empty_body_gets_status_message() {
        let err = status(404, "", ApiGeneration::Json);
        assert_eq!(err.message(), "request failed with HTTP 404");
    }
}
